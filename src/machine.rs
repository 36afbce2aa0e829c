//! Machine record and validated creation parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::{DatacenterId, DiskType, LanId, ServerId};
use crate::error::DriverError;

/// How the machine's datacenter came to exist; controls teardown scope.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatacenterOrigin {
    /// The datacenter was supplied by the user and may hold other servers.
    Preexisting,
    /// The datacenter was created for this machine.
    #[default]
    CreatedByRun,
}

/// Provider resources produced by a successful create, committed together.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionedResources {
    /// Datacenter hosting the server.
    pub datacenter_id: DatacenterId,
    /// Whether the datacenter was created by the run.
    pub datacenter_origin: DatacenterOrigin,
    /// Created server.
    pub server_id: ServerId,
    /// Created LAN.
    pub lan_id: LanId,
    /// Address reserved for the machine.
    pub ip_address: String,
}

/// Persistent driver state for one machine.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Machine {
    /// Machine name, also used to name its provider resources.
    pub name: String,
    /// Datacenter hosting the server.
    #[serde(default)]
    pub datacenter_id: Option<DatacenterId>,
    /// Provisioned server.
    #[serde(default)]
    pub server_id: Option<ServerId>,
    /// Provisioned LAN.
    #[serde(default)]
    pub lan_id: Option<LanId>,
    /// Public address of the primary NIC.
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Whether teardown may delete the whole datacenter.
    pub datacenter_origin: DatacenterOrigin,
    /// Public SSH key injected into the boot volume.
    #[serde(default)]
    pub ssh_public_key: Option<String>,
}

impl Machine {
    /// Creates an empty record for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datacenter_id: None,
            server_id: None,
            lan_id: None,
            ip_address: None,
            datacenter_origin: DatacenterOrigin::default(),
            ssh_public_key: None,
        }
    }

    /// Records every resource of a successful run in one assignment.
    pub fn commit(&mut self, resources: ProvisionedResources) {
        let ProvisionedResources {
            datacenter_id,
            datacenter_origin,
            server_id,
            lan_id,
            ip_address,
        } = resources;
        *self = Self {
            name: self.name.clone(),
            datacenter_id: Some(datacenter_id),
            server_id: Some(server_id),
            lan_id: Some(lan_id),
            ip_address: Some(ip_address),
            datacenter_origin,
            ssh_public_key: self.ssh_public_key.take(),
        };
    }

    /// Forgets the provider resources after a successful removal.
    pub fn clear_resources(&mut self) {
        self.datacenter_id = None;
        self.server_id = None;
        self.lan_id = None;
        self.ip_address = None;
    }

    /// Datacenter and server identifiers, required by every lifecycle call.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingResource`] when either is unset.
    pub fn server_address(&self) -> Result<(&DatacenterId, &ServerId), DriverError> {
        let datacenter = self
            .datacenter_id
            .as_ref()
            .ok_or(DriverError::MissingResource("datacenter id"))?;
        let server = self
            .server_id
            .as_ref()
            .ok_or(DriverError::MissingResource("server id"))?;
        Ok((datacenter, server))
    }
}

/// How the server, volume, and NIC are created.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStrategy {
    /// One call creating the server with its volume and NIC.
    #[default]
    Composite,
    /// Separate calls for server, volume, attachment, NIC, and NIC binding.
    Stepwise,
}

impl fmt::Display for ServerStrategy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Composite => "composite",
            Self::Stepwise => "stepwise",
        })
    }
}

impl FromStr for ServerStrategy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "composite" => Ok(Self::Composite),
            "stepwise" => Ok(Self::Stepwise),
            other => Err(format!(
                "unsupported server strategy '{other}' (expected composite or stepwise)"
            )),
        }
    }
}

/// Validated parameters for creating a machine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineSpec {
    /// Region code such as `us/las`.
    pub location: String,
    /// Image alias or catalog name fragment.
    pub image: String,
    /// Boot volume storage class.
    pub disk_type: DiskType,
    /// Boot volume size in gigabytes.
    pub disk_size_gb: u32,
    /// Memory in megabytes.
    pub ram_mb: u32,
    /// Number of cores.
    pub cores: u32,
    /// CPU family.
    pub cpu_family: String,
    /// Server availability zone.
    pub server_availability_zone: String,
    /// Volume availability zone.
    pub volume_availability_zone: String,
    /// Existing datacenter to place the machine in.
    pub datacenter_id: Option<DatacenterId>,
    /// Server creation strategy.
    pub strategy: ServerStrategy,
}

impl MachineSpec {
    /// Starts a builder for a [`MachineSpec`].
    #[must_use]
    pub fn builder() -> MachineSpecBuilder {
        MachineSpecBuilder::new()
    }

    /// Checks that every required field is present and non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DriverError> {
        let text_fields = [
            ("location", &self.location),
            ("image", &self.image),
            ("cpu_family", &self.cpu_family),
            ("server_availability_zone", &self.server_availability_zone),
            ("volume_availability_zone", &self.volume_availability_zone),
        ];
        if let Some((field, _)) = text_fields.iter().find(|(_, value)| value.is_empty()) {
            return Err(DriverError::Validation((*field).to_owned()));
        }

        let numeric_fields = [
            ("disk_size", self.disk_size_gb),
            ("ram", self.ram_mb),
            ("cores", self.cores),
        ];
        if let Some((field, _)) = numeric_fields.iter().find(|(_, value)| *value == 0) {
            return Err(DriverError::Validation((*field).to_owned()));
        }

        if self
            .datacenter_id
            .as_ref()
            .is_some_and(DatacenterId::is_empty)
        {
            return Err(DriverError::Validation(String::from("datacenter_id")));
        }
        Ok(())
    }
}

/// Builder for [`MachineSpec`].
#[derive(Clone, Debug, Default)]
pub struct MachineSpecBuilder {
    location: String,
    image: String,
    disk_type: DiskType,
    disk_size_gb: u32,
    ram_mb: u32,
    cores: u32,
    cpu_family: String,
    server_availability_zone: String,
    volume_availability_zone: String,
    datacenter_id: Option<String>,
    strategy: ServerStrategy,
}

impl MachineSpecBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the region code.
    #[must_use]
    pub fn location(mut self, value: impl Into<String>) -> Self {
        self.location = value.into();
        self
    }

    /// Sets the image alias or name fragment.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the boot volume storage class.
    #[must_use]
    pub const fn disk_type(mut self, value: DiskType) -> Self {
        self.disk_type = value;
        self
    }

    /// Sets the boot volume size in gigabytes.
    #[must_use]
    pub const fn disk_size_gb(mut self, value: u32) -> Self {
        self.disk_size_gb = value;
        self
    }

    /// Sets the memory in megabytes.
    #[must_use]
    pub const fn ram_mb(mut self, value: u32) -> Self {
        self.ram_mb = value;
        self
    }

    /// Sets the number of cores.
    #[must_use]
    pub const fn cores(mut self, value: u32) -> Self {
        self.cores = value;
        self
    }

    /// Sets the CPU family.
    #[must_use]
    pub fn cpu_family(mut self, value: impl Into<String>) -> Self {
        self.cpu_family = value.into();
        self
    }

    /// Sets the server availability zone.
    #[must_use]
    pub fn server_availability_zone(mut self, value: impl Into<String>) -> Self {
        self.server_availability_zone = value.into();
        self
    }

    /// Sets the volume availability zone.
    #[must_use]
    pub fn volume_availability_zone(mut self, value: impl Into<String>) -> Self {
        self.volume_availability_zone = value.into();
        self
    }

    /// Places the machine in an existing datacenter.
    #[must_use]
    pub fn datacenter_id(mut self, value: Option<String>) -> Self {
        self.datacenter_id = value;
        self
    }

    /// Sets the server creation strategy.
    #[must_use]
    pub const fn strategy(mut self, value: ServerStrategy) -> Self {
        self.strategy = value;
        self
    }

    /// Builds and validates the [`MachineSpec`], trimming string inputs.
    ///
    /// A blank datacenter ID is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Validation`] when a required field is empty or
    /// zero.
    pub fn build(self) -> Result<MachineSpec, DriverError> {
        let spec = MachineSpec {
            location: self.location.trim().to_owned(),
            image: self.image.trim().to_owned(),
            disk_type: self.disk_type,
            disk_size_gb: self.disk_size_gb,
            ram_mb: self.ram_mb,
            cores: self.cores,
            cpu_family: self.cpu_family.trim().to_owned(),
            server_availability_zone: self.server_availability_zone.trim().to_owned(),
            volume_availability_zone: self.volume_availability_zone.trim().to_owned(),
            datacenter_id: self
                .datacenter_id
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(DatacenterId::from),
            strategy: self.strategy,
        };
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn complete_builder() -> MachineSpecBuilder {
        MachineSpec::builder()
            .location(" us/las ")
            .image("Ubuntu-16.04")
            .disk_size_gb(50)
            .ram_mb(2048)
            .cores(4)
            .cpu_family("AMD_OPTERON")
            .server_availability_zone("AUTO")
            .volume_availability_zone("AUTO")
    }

    #[test]
    fn build_trims_and_drops_blank_datacenter() {
        let spec = complete_builder()
            .datacenter_id(Some(String::from("   ")))
            .build()
            .unwrap_or_else(|err| panic!("build: {err}"));

        assert_eq!(spec.location, "us/las");
        assert_eq!(spec.datacenter_id, None);
        assert_eq!(spec.strategy, ServerStrategy::Composite);
    }

    #[rstest]
    #[case(complete_builder().image(" "), "image")]
    #[case(complete_builder().cores(0), "cores")]
    #[case(complete_builder().ram_mb(0), "ram")]
    #[case(complete_builder().cpu_family(""), "cpu_family")]
    fn build_rejects_missing_fields(#[case] builder: MachineSpecBuilder, #[case] field: &str) {
        let err = builder
            .build()
            .err()
            .unwrap_or_else(|| panic!("{field} should be rejected"));
        let DriverError::Validation(actual) = err else {
            panic!("expected Validation, got {err:?}");
        };
        assert_eq!(actual, field);
    }

    #[test]
    fn machine_record_rejects_unknown_keys() {
        let json = r#"{"name":"box","datacenter_origin":"created_by_run","colour":"blue"}"#;
        assert!(serde_json::from_str::<Machine>(json).is_err());
    }

    #[test]
    fn machine_record_requires_origin() {
        let json = r#"{"name":"box"}"#;
        assert!(serde_json::from_str::<Machine>(json).is_err());
    }

    #[test]
    fn commit_keeps_name_and_key() {
        let mut machine = Machine::new("box");
        machine.ssh_public_key = Some(String::from("ssh-rsa AAAA"));

        machine.commit(ProvisionedResources {
            datacenter_id: DatacenterId::from("dc-1"),
            datacenter_origin: DatacenterOrigin::Preexisting,
            server_id: ServerId::from("srv-1"),
            lan_id: LanId::from("1"),
            ip_address: String::from("203.0.113.7"),
        });

        assert_eq!(machine.name, "box");
        assert_eq!(machine.ssh_public_key.as_deref(), Some("ssh-rsa AAAA"));
        assert_eq!(machine.datacenter_origin, DatacenterOrigin::Preexisting);
        assert_eq!(machine.ip_address.as_deref(), Some("203.0.113.7"));
    }
}
