//! Typed provider entities, identifiers, and request payloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a provider-assigned value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the wrapped value as a string slice.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }

            /// Returns `true` when the value is blank.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }
    };
}

newtype!(
    /// Opaque reference to an asynchronous provider job (the `Location`
    /// header returned by a mutating call).
    JobHandle
);
newtype!(
    /// Virtual datacenter identifier.
    DatacenterId
);
newtype!(
    /// Server identifier.
    ServerId
);
newtype!(
    /// LAN identifier. The provider assigns small integers rendered as
    /// strings.
    LanId
);
newtype!(
    /// Volume identifier.
    VolumeId
);
newtype!(
    /// Network interface identifier.
    NicId
);
newtype!(
    /// Reserved IP block identifier.
    IpBlockId
);
newtype!(
    /// Catalog image identifier.
    ImageId
);

/// Storage class of a volume.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum DiskType {
    /// Spinning disk.
    #[default]
    #[serde(rename = "HDD")]
    Hdd,
    /// Solid-state disk.
    #[serde(rename = "SSD")]
    Ssd,
}

impl DiskType {
    /// Provider spelling of the disk type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hdd => "HDD",
            Self::Ssd => "SSD",
        }
    }

    /// Image family used when searching the catalog.
    ///
    /// The catalog only publishes HDD images; SSD volumes boot from them too.
    #[must_use]
    pub const fn image_family(self) -> Self {
        Self::Hdd
    }
}

impl fmt::Display for DiskType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for DiskType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HDD" => Ok(Self::Hdd),
            "SSD" => Ok(Self::Ssd),
            other => Err(format!("unsupported disk type '{other}' (expected HDD or SSD)")),
        }
    }
}

/// Boot image reference for a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageRef {
    /// Concrete catalog image.
    Id(ImageId),
    /// Location-scoped alias resolved by the provider.
    Alias(String),
}

/// Lifecycle phase of an asynchronous job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    /// Queued or running.
    Pending,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

/// Status reported for a job handle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobStatus {
    /// Current phase.
    pub state: JobState,
    /// Provider message, usually present on failure.
    pub message: Option<String>,
}

impl JobStatus {
    /// Builds a status from the provider's status string.
    #[must_use]
    pub fn from_provider(status: &str, message: Option<String>) -> Self {
        let state = match status {
            "DONE" => JobState::Done,
            "FAILED" => JobState::Failed,
            _ => JobState::Pending,
        };
        Self { state, message }
    }
}

/// Result of a mutating call that the provider accepted for processing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Accepted<T> {
    /// Handle to poll until the job is terminal.
    pub job: JobHandle,
    /// Resource as echoed by the provider, with its assigned identifier.
    pub resource: T,
}

/// Virtual datacenter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Datacenter {
    /// Provider identifier.
    pub id: DatacenterId,
    /// Display name.
    pub name: String,
    /// Region code such as `us/las`.
    pub location: String,
}

/// Reserved block of public addresses.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IpBlock {
    /// Provider identifier.
    pub id: IpBlockId,
    /// Region the block is reserved in.
    pub location: String,
    /// Number of addresses requested.
    pub size: u32,
    /// Addresses held by the block.
    pub ips: Vec<String>,
}

/// Private or public LAN inside a datacenter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lan {
    /// Provider identifier.
    pub id: LanId,
    /// Display name.
    pub name: String,
    /// Whether the LAN is internet-facing.
    pub public: bool,
}

/// Network interface attached to a server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nic {
    /// Provider identifier.
    pub id: NicId,
    /// Display name.
    pub name: String,
    /// LAN the interface is connected to.
    pub lan: Option<u32>,
    /// Addresses bound to the interface.
    pub ips: Vec<String>,
    /// Whether DHCP is enabled.
    pub dhcp: bool,
}

/// Block storage volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Volume {
    /// Provider identifier.
    pub id: VolumeId,
    /// Display name.
    pub name: String,
    /// Size in gigabytes.
    pub size_gb: u32,
}

/// Virtual server with its attached entities.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Server {
    /// Provider identifier.
    pub id: ServerId,
    /// Display name.
    pub name: String,
    /// Provider-reported machine status (for example `AVAILABLE`).
    pub status: String,
    /// Attached network interfaces.
    pub nics: Vec<Nic>,
    /// Attached volumes.
    pub volumes: Vec<Volume>,
}

impl Server {
    /// First address of the primary interface, when one is bound.
    #[must_use]
    pub fn primary_ip(&self) -> Option<&str> {
        self.nics
            .first()
            .and_then(|nic| nic.ips.first())
            .map(String::as_str)
            .filter(|ip| !ip.is_empty())
    }

    /// Boot volume, when one is attached.
    #[must_use]
    pub fn boot_volume(&self) -> Option<&Volume> {
        self.volumes.first()
    }
}

/// Catalog image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Provider identifier.
    pub id: ImageId,
    /// Display name; may be empty for unnamed snapshots.
    pub name: String,
    /// Image family (`HDD` or `CDROM`).
    pub image_type: String,
    /// Region the image is published in.
    pub location: String,
}

/// Region descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    /// Region code such as `us/las`.
    pub id: String,
    /// Image aliases the region resolves on volume creation.
    pub image_aliases: Vec<String>,
}

/// Parameters for creating a LAN.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LanRequest {
    /// Display name.
    pub name: String,
    /// Whether the LAN is internet-facing.
    pub public: bool,
}

/// Parameters for creating a volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeRequest {
    /// Display name.
    pub name: String,
    /// Size in gigabytes.
    pub size_gb: u32,
    /// Storage class.
    pub disk_type: DiskType,
    /// Boot image.
    pub image: ImageRef,
    /// Public keys injected into the image.
    pub ssh_keys: Vec<String>,
    /// Availability zone (`AUTO`, `ZONE_1`, ...).
    pub availability_zone: String,
}

/// Parameters for creating or patching a network interface.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NicRequest {
    /// Display name.
    pub name: String,
    /// LAN to join; `None` leaves the interface unconnected.
    pub lan: Option<LanId>,
    /// Addresses to bind.
    pub ips: Vec<String>,
    /// Whether DHCP is enabled.
    pub dhcp: bool,
}

/// Parameters for creating a server, optionally with its volume and NIC.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerRequest {
    /// Display name.
    pub name: String,
    /// Memory in megabytes.
    pub ram_mb: u32,
    /// Number of cores.
    pub cores: u32,
    /// CPU family (`AMD_OPTERON`, `INTEL_XEON`).
    pub cpu_family: String,
    /// Availability zone (`AUTO`, `ZONE_1`, ...).
    pub availability_zone: String,
    /// Boot volume created together with the server.
    pub volume: Option<VolumeRequest>,
    /// Primary interface created together with the server.
    pub nic: Option<NicRequest>,
}
