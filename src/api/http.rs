//! Blocking HTTPS adapter for the ProfitBricks Cloud API v4.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::LOCATION;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::types::{
    Accepted, Datacenter, DatacenterId, Image, IpBlock, IpBlockId, JobHandle, JobStatus, Lan,
    LanId, LanRequest, Location, Nic, NicId, NicRequest, Server, ServerId, ServerRequest, Volume,
    VolumeId, VolumeRequest,
};
use super::wire::{
    Collection, DatacenterPropertiesIn, DatacenterPropertiesOut, Envelope, IdRef,
    ImagePropertiesIn, IpBlockPropertiesIn, IpBlockPropertiesOut, Items, LanPropertiesIn,
    LanPropertiesOut, LocationPropertiesIn, NicPropertiesIn, NicPropertiesOut, RequestStatus,
    Resource, ServerEntitiesOut, ServerPropertiesIn, ServerPropertiesOut, VolumePropertiesIn,
    VolumePropertiesOut,
};
use super::{ApiError, CloudApi, Credentials};

/// Public Cloud API v4 endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.profitbricks.com/cloudapi/v4";

const USER_AGENT: &str = concat!("pbmachine/", env!("CARGO_PKG_VERSION"));

/// [`CloudApi`] implementation backed by `reqwest`'s blocking client.
#[derive(Clone, Debug)]
pub struct HttpCloudApi {
    client: Client,
    endpoint: String,
    credentials: Credentials,
}

impl HttpCloudApi {
    /// Builds a client for `endpoint` authenticating with `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] when the TLS backend cannot be
    /// initialised.
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| ApiError::Transport {
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim().trim_end_matches('/').to_owned(),
            credentials,
        })
    }

    /// Endpoint the client talks to, without a trailing slash.
    #[must_use]
    pub const fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    /// Request status URL for `job`. Relative handles resolve against the
    /// endpoint.
    fn status_url(&self, job: &JobHandle) -> String {
        let handle = job.as_str();
        if handle.starts_with("https://") || handle.starts_with("http://") {
            handle.to_owned()
        } else {
            self.url(handle)
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .map_err(|err| ApiError::Transport {
                message: err.to_string(),
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), body))
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let body = response.text().map_err(|err| ApiError::Transport {
            message: err.to_string(),
        })?;
        serde_json::from_str(&body).map_err(|err| ApiError::Decode {
            message: err.to_string(),
        })
    }

    fn job_handle(response: &Response) -> JobHandle {
        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(JobHandle::from)
            .unwrap_or_default()
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET");
        let response = self.send(self.client.get(self.url(path)))?;
        Self::decode(response)
    }

    fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Accepted<T>, ApiError> {
        debug!(path, "POST");
        let response = self.send(self.client.post(self.url(path)).json(body))?;
        let job = Self::job_handle(&response);
        let resource = Self::decode(response)?;
        Ok(Accepted { job, resource })
    }

    fn post_action(&self, path: &str) -> Result<(), ApiError> {
        debug!(path, "POST");
        self.send(self.client.post(self.url(path)))?;
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<JobHandle, ApiError> {
        debug!(path, "DELETE");
        let response = self.send(self.client.delete(self.url(path)))?;
        Ok(Self::job_handle(&response))
    }
}

fn to_item<T: Serialize>(properties: T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(Envelope::bare(properties)).map_err(|err| ApiError::InvalidRequest {
        message: err.to_string(),
    })
}

fn server_body(request: &ServerRequest) -> Result<Envelope<ServerPropertiesOut<'_>>, ApiError> {
    let volumes = request
        .volume
        .as_ref()
        .map(|volume| to_item(VolumePropertiesOut::from(volume)))
        .transpose()?
        .map(|item| Items { items: vec![item] });
    let nics = request
        .nic
        .as_ref()
        .map(|nic| NicPropertiesOut::try_from_request(nic).and_then(to_item))
        .transpose()?
        .map(|item| Items { items: vec![item] });
    let entities = (volumes.is_some() || nics.is_some())
        .then_some(ServerEntitiesOut { volumes, nics });
    Ok(Envelope {
        properties: ServerPropertiesOut::from(request),
        entities,
    })
}

impl CloudApi for HttpCloudApi {
    fn reserve_ip_block(&self, size: u32, location: &str) -> Result<Accepted<IpBlock>, ApiError> {
        let body = Envelope::bare(IpBlockPropertiesOut { location, size });
        let accepted: Accepted<Resource<IpBlockPropertiesIn>> = self.post("ipblocks", &body)?;
        Ok(Accepted {
            job: accepted.job,
            resource: accepted.resource.into(),
        })
    }

    fn list_ip_blocks(&self) -> Result<Vec<IpBlock>, ApiError> {
        let list: Collection<Resource<IpBlockPropertiesIn>> = self.get("ipblocks?depth=1")?;
        Ok(list.items.into_iter().map(IpBlock::from).collect())
    }

    fn release_ip_block(&self, id: &IpBlockId) -> Result<JobHandle, ApiError> {
        self.delete(&format!("ipblocks/{id}"))
    }

    fn create_datacenter(
        &self,
        name: &str,
        location: &str,
    ) -> Result<Accepted<Datacenter>, ApiError> {
        let body = Envelope::bare(DatacenterPropertiesOut { name, location });
        let accepted: Accepted<Resource<DatacenterPropertiesIn>> =
            self.post("datacenters", &body)?;
        Ok(Accepted {
            job: accepted.job,
            resource: accepted.resource.into(),
        })
    }

    fn get_datacenter(&self, id: &DatacenterId) -> Result<Datacenter, ApiError> {
        let resource: Resource<DatacenterPropertiesIn> = self.get(&format!("datacenters/{id}"))?;
        Ok(resource.into())
    }

    fn delete_datacenter(&self, id: &DatacenterId) -> Result<JobHandle, ApiError> {
        self.delete(&format!("datacenters/{id}"))
    }

    fn create_lan(
        &self,
        datacenter: &DatacenterId,
        request: &LanRequest,
    ) -> Result<Accepted<Lan>, ApiError> {
        let body = Envelope::bare(LanPropertiesOut::from(request));
        let accepted: Accepted<Resource<LanPropertiesIn>> =
            self.post(&format!("datacenters/{datacenter}/lans"), &body)?;
        Ok(Accepted {
            job: accepted.job,
            resource: accepted.resource.into(),
        })
    }

    fn delete_lan(&self, datacenter: &DatacenterId, lan: &LanId) -> Result<JobHandle, ApiError> {
        self.delete(&format!("datacenters/{datacenter}/lans/{lan}"))
    }

    fn create_server(
        &self,
        datacenter: &DatacenterId,
        request: &ServerRequest,
    ) -> Result<Accepted<Server>, ApiError> {
        let body = server_body(request)?;
        let accepted: Accepted<Resource<ServerPropertiesIn>> =
            self.post(&format!("datacenters/{datacenter}/servers"), &body)?;
        Ok(Accepted {
            job: accepted.job,
            resource: accepted.resource.into(),
        })
    }

    fn get_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<Server, ApiError> {
        let resource: Resource<ServerPropertiesIn> =
            self.get(&format!("datacenters/{datacenter}/servers/{server}?depth=3"))?;
        Ok(resource.into())
    }

    fn list_servers(&self, datacenter: &DatacenterId) -> Result<Vec<Server>, ApiError> {
        let list: Collection<Resource<ServerPropertiesIn>> =
            self.get(&format!("datacenters/{datacenter}/servers?depth=3"))?;
        Ok(list.items.into_iter().map(Server::from).collect())
    }

    fn delete_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<JobHandle, ApiError> {
        self.delete(&format!("datacenters/{datacenter}/servers/{server}"))
    }

    fn create_volume(
        &self,
        datacenter: &DatacenterId,
        request: &VolumeRequest,
    ) -> Result<Accepted<Volume>, ApiError> {
        let body = Envelope::bare(VolumePropertiesOut::from(request));
        let accepted: Accepted<Resource<VolumePropertiesIn>> =
            self.post(&format!("datacenters/{datacenter}/volumes"), &body)?;
        Ok(Accepted {
            job: accepted.job,
            resource: accepted.resource.into(),
        })
    }

    fn attach_volume(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        volume: &VolumeId,
    ) -> Result<JobHandle, ApiError> {
        let body = IdRef {
            id: volume.as_str(),
        };
        let accepted: Accepted<Resource<VolumePropertiesIn>> = self.post(
            &format!("datacenters/{datacenter}/servers/{server}/volumes"),
            &body,
        )?;
        Ok(accepted.job)
    }

    fn delete_volume(
        &self,
        datacenter: &DatacenterId,
        volume: &VolumeId,
    ) -> Result<JobHandle, ApiError> {
        self.delete(&format!("datacenters/{datacenter}/volumes/{volume}"))
    }

    fn create_nic(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        request: &NicRequest,
    ) -> Result<Accepted<Nic>, ApiError> {
        let body = Envelope::bare(NicPropertiesOut::try_from_request(request)?);
        let accepted: Accepted<Resource<NicPropertiesIn>> = self.post(
            &format!("datacenters/{datacenter}/servers/{server}/nics"),
            &body,
        )?;
        Ok(Accepted {
            job: accepted.job,
            resource: accepted.resource.into(),
        })
    }

    fn update_nic(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        nic: &NicId,
        request: &NicRequest,
    ) -> Result<JobHandle, ApiError> {
        let path = format!("datacenters/{datacenter}/servers/{server}/nics/{nic}");
        debug!(path = path.as_str(), "PATCH");
        let body = NicPropertiesOut::try_from_request(request)?;
        let response = self.send(self.client.patch(self.url(&path)).json(&body))?;
        Ok(Self::job_handle(&response))
    }

    fn list_images(&self) -> Result<Vec<Image>, ApiError> {
        let list: Collection<Resource<ImagePropertiesIn>> = self.get("images?depth=1")?;
        Ok(list.items.into_iter().map(Image::from).collect())
    }

    fn get_location(&self, location: &str) -> Result<Location, ApiError> {
        let resource: Resource<LocationPropertiesIn> = self.get(&format!("locations/{location}"))?;
        Ok(resource.into())
    }

    fn start_server(&self, datacenter: &DatacenterId, server: &ServerId) -> Result<(), ApiError> {
        self.post_action(&format!("datacenters/{datacenter}/servers/{server}/start"))
    }

    fn stop_server(&self, datacenter: &DatacenterId, server: &ServerId) -> Result<(), ApiError> {
        self.post_action(&format!("datacenters/{datacenter}/servers/{server}/stop"))
    }

    fn reboot_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<(), ApiError> {
        self.post_action(&format!("datacenters/{datacenter}/servers/{server}/reboot"))
    }

    fn job_status(&self, job: &JobHandle) -> Result<JobStatus, ApiError> {
        debug!(job = job.as_str(), "GET request status");
        let response = self.send(self.client.get(self.status_url(job)))?;
        let status: RequestStatus = Self::decode(response)?;
        Ok(JobStatus::from_provider(
            &status.metadata.status,
            status.metadata.message,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://api.example.test/cloudapi/v4", "datacenters")]
    #[case("https://api.example.test/cloudapi/v4/", "/datacenters")]
    fn url_joins_without_duplicate_slashes(#[case] endpoint: &str, #[case] path: &str) {
        let api = HttpCloudApi::new(endpoint, Credentials::new("user", "pass"))
            .unwrap_or_else(|err| panic!("client: {err}"));
        assert_eq!(
            api.url(path),
            "https://api.example.test/cloudapi/v4/datacenters"
        );
    }

    #[rstest]
    #[case(
        "https://api.example.test/cloudapi/v4/requests/42/status",
        "https://api.example.test/cloudapi/v4/requests/42/status"
    )]
    #[case(
        "/requests/42/status",
        "https://api.example.test/cloudapi/v4/requests/42/status"
    )]
    #[case(
        "requests/42/status",
        "https://api.example.test/cloudapi/v4/requests/42/status"
    )]
    fn status_url_resolves_relative_handles(#[case] handle: &str, #[case] expected: &str) {
        let api = HttpCloudApi::new(
            "https://api.example.test/cloudapi/v4",
            Credentials::new("user", "pass"),
        )
        .unwrap_or_else(|err| panic!("client: {err}"));
        assert_eq!(api.status_url(&JobHandle::from(handle)), expected);
    }

    #[test]
    fn composite_server_body_nests_volume_and_nic() {
        let request = ServerRequest {
            name: String::from("box"),
            ram_mb: 2048,
            cores: 4,
            cpu_family: String::from("AMD_OPTERON"),
            availability_zone: String::from("AUTO"),
            volume: None,
            nic: Some(NicRequest {
                name: String::from("box"),
                lan: Some(LanId::from("1")),
                ips: vec![String::from("203.0.113.7")],
                dhcp: true,
            }),
        };
        let body = server_body(&request).unwrap_or_else(|err| panic!("body: {err}"));
        let rendered =
            serde_json::to_value(&body).unwrap_or_else(|err| panic!("serialise: {err}"));

        assert_eq!(rendered["properties"]["cpuFamily"], "AMD_OPTERON");
        assert_eq!(
            rendered["entities"]["nics"]["items"][0]["properties"]["lan"],
            1
        );
        assert!(rendered["entities"].get("volumes").is_none());
    }
}
