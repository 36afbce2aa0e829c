//! Serde shapes of the Cloud API v4 JSON documents.
//!
//! Every resource is an envelope of `id`, `properties`, and optionally
//! `metadata` and `entities`. Required fields are not defaulted so that a
//! truncated body surfaces as a decode error rather than a blank resource.

use serde::{Deserialize, Serialize};

use super::types::{
    Datacenter, DatacenterId, Image, ImageId, ImageRef, IpBlock, IpBlockId, Lan, LanId,
    LanRequest, Location, Nic, NicId, NicRequest, Server, ServerId, ServerRequest, Volume,
    VolumeId, VolumeRequest,
};
use super::ApiError;

#[derive(Debug, Serialize)]
pub(super) struct Envelope<P> {
    pub(super) properties: P,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) entities: Option<ServerEntitiesOut>,
}

impl<P> Envelope<P> {
    pub(super) const fn bare(properties: P) -> Self {
        Self {
            properties,
            entities: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct Items<T> {
    pub(super) items: Vec<T>,
}

#[derive(Debug, Serialize)]
pub(super) struct IpBlockPropertiesOut<'a> {
    pub(super) location: &'a str,
    pub(super) size: u32,
}

#[derive(Debug, Serialize)]
pub(super) struct DatacenterPropertiesOut<'a> {
    pub(super) name: &'a str,
    pub(super) location: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct LanPropertiesOut<'a> {
    pub(super) name: &'a str,
    pub(super) public: bool,
}

impl<'a> From<&'a LanRequest> for LanPropertiesOut<'a> {
    fn from(request: &'a LanRequest) -> Self {
        Self {
            name: &request.name,
            public: request.public,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct VolumePropertiesOut<'a> {
    name: &'a str,
    size: u32,
    #[serde(rename = "type")]
    disk_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_alias: Option<&'a str>,
    ssh_keys: &'a [String],
    availability_zone: &'a str,
}

impl<'a> From<&'a VolumeRequest> for VolumePropertiesOut<'a> {
    fn from(request: &'a VolumeRequest) -> Self {
        let (image, image_alias) = match &request.image {
            ImageRef::Id(id) => (Some(id.as_str()), None),
            ImageRef::Alias(alias) => (None, Some(alias.as_str())),
        };
        Self {
            name: &request.name,
            size: request.size_gb,
            disk_type: request.disk_type.as_str(),
            image,
            image_alias,
            ssh_keys: &request.ssh_keys,
            availability_zone: &request.availability_zone,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct NicPropertiesOut<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    lan: Option<u32>,
    ips: &'a [String],
    dhcp: bool,
}

impl<'a> NicPropertiesOut<'a> {
    /// The API models LAN references as integers; our identifiers are
    /// strings, so a non-numeric LAN id cannot be sent.
    pub(super) fn try_from_request(request: &'a NicRequest) -> Result<Self, ApiError> {
        let lan = request
            .lan
            .as_ref()
            .map(|id| {
                id.as_str()
                    .parse::<u32>()
                    .map_err(|err| ApiError::InvalidRequest {
                        message: format!("LAN id '{id}' is not numeric: {err}"),
                    })
            })
            .transpose()?;
        Ok(Self {
            name: &request.name,
            lan,
            ips: &request.ips,
            dhcp: request.dhcp,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ServerPropertiesOut<'a> {
    name: &'a str,
    ram: u32,
    cores: u32,
    cpu_family: &'a str,
    availability_zone: &'a str,
}

impl<'a> From<&'a ServerRequest> for ServerPropertiesOut<'a> {
    fn from(request: &'a ServerRequest) -> Self {
        Self {
            name: &request.name,
            ram: request.ram_mb,
            cores: request.cores,
            cpu_family: &request.cpu_family,
            availability_zone: &request.availability_zone,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ServerEntitiesOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) volumes: Option<Items<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) nics: Option<Items<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
pub(super) struct IdRef<'a> {
    pub(super) id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(super) struct Resource<P> {
    pub(super) id: String,
    pub(super) properties: P,
    #[serde(default)]
    pub(super) metadata: Option<Metadata>,
    #[serde(default)]
    pub(super) entities: Option<ServerEntitiesIn>,
}

#[derive(Debug, Deserialize)]
pub(super) struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub(super) items: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct Metadata {
    #[serde(default)]
    pub(super) state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerEntitiesIn {
    #[serde(default)]
    volumes: Option<Collection<Resource<VolumePropertiesIn>>>,
    #[serde(default)]
    nics: Option<Collection<Resource<NicPropertiesIn>>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct IpBlockPropertiesIn {
    #[serde(default)]
    ips: Vec<String>,
    location: String,
    size: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct DatacenterPropertiesIn {
    name: String,
    location: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct LanPropertiesIn {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    public: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct VolumePropertiesIn {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct NicPropertiesIn {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    lan: Option<u32>,
    #[serde(default)]
    ips: Vec<String>,
    #[serde(default)]
    dhcp: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerPropertiesIn {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ImagePropertiesIn {
    #[serde(default)]
    name: Option<String>,
    image_type: String,
    location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct LocationPropertiesIn {
    #[serde(default)]
    image_aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RequestStatus {
    pub(super) metadata: RequestStatusMetadata,
}

#[derive(Debug, Deserialize)]
pub(super) struct RequestStatusMetadata {
    pub(super) status: String,
    #[serde(default)]
    pub(super) message: Option<String>,
}

/// Volume sizes arrive as JSON numbers that may carry a fractional part.
fn whole_gigabytes(size: Option<f64>) -> u32 {
    size.map_or(0, |value| {
        let rendered = format!("{value:.0}");
        rendered.parse::<u32>().unwrap_or(0)
    })
}

impl From<Resource<IpBlockPropertiesIn>> for IpBlock {
    fn from(resource: Resource<IpBlockPropertiesIn>) -> Self {
        Self {
            id: IpBlockId::from(resource.id),
            location: resource.properties.location,
            size: resource.properties.size,
            ips: resource.properties.ips,
        }
    }
}

impl From<Resource<DatacenterPropertiesIn>> for Datacenter {
    fn from(resource: Resource<DatacenterPropertiesIn>) -> Self {
        Self {
            id: DatacenterId::from(resource.id),
            name: resource.properties.name,
            location: resource.properties.location,
        }
    }
}

impl From<Resource<LanPropertiesIn>> for Lan {
    fn from(resource: Resource<LanPropertiesIn>) -> Self {
        Self {
            id: LanId::from(resource.id),
            name: resource.properties.name.unwrap_or_default(),
            public: resource.properties.public,
        }
    }
}

impl From<Resource<VolumePropertiesIn>> for Volume {
    fn from(resource: Resource<VolumePropertiesIn>) -> Self {
        Self {
            id: VolumeId::from(resource.id),
            name: resource.properties.name.unwrap_or_default(),
            size_gb: whole_gigabytes(resource.properties.size),
        }
    }
}

impl From<Resource<NicPropertiesIn>> for Nic {
    fn from(resource: Resource<NicPropertiesIn>) -> Self {
        Self {
            id: NicId::from(resource.id),
            name: resource.properties.name.unwrap_or_default(),
            lan: resource.properties.lan,
            ips: resource.properties.ips,
            dhcp: resource.properties.dhcp,
        }
    }
}

impl From<Resource<ServerPropertiesIn>> for Server {
    fn from(resource: Resource<ServerPropertiesIn>) -> Self {
        let status = resource
            .metadata
            .and_then(|metadata| metadata.state)
            .unwrap_or_default();
        let (volumes, nics) = resource.entities.map_or_else(
            || (Vec::new(), Vec::new()),
            |entities| {
                (
                    entities
                        .volumes
                        .map(|list| list.items.into_iter().map(Volume::from).collect())
                        .unwrap_or_default(),
                    entities
                        .nics
                        .map(|list| list.items.into_iter().map(Nic::from).collect())
                        .unwrap_or_default(),
                )
            },
        );
        Self {
            id: ServerId::from(resource.id),
            name: resource.properties.name,
            status,
            nics,
            volumes,
        }
    }
}

impl From<Resource<ImagePropertiesIn>> for Image {
    fn from(resource: Resource<ImagePropertiesIn>) -> Self {
        Self {
            id: ImageId::from(resource.id),
            name: resource.properties.name.unwrap_or_default(),
            image_type: resource.properties.image_type,
            location: resource.properties.location,
        }
    }
}

impl From<Resource<LocationPropertiesIn>> for Location {
    fn from(resource: Resource<LocationPropertiesIn>) -> Self {
        Self {
            id: resource.id,
            image_aliases: resource.properties.image_aliases,
        }
    }
}
