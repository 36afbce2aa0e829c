//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::api::{Credentials, DEFAULT_ENDPOINT, DiskType};
use crate::machine::{MachineSpec, ServerStrategy};

/// ProfitBricks driver configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "PROFITBRICKS")]
pub struct ProfitBricksConfig {
    /// Account user name. Required for every provider call.
    pub username: Option<String>,
    /// Account password. Required for every provider call.
    pub password: Option<String>,
    /// Cloud API endpoint.
    #[ortho_config(default = DEFAULT_ENDPOINT.to_owned())]
    pub endpoint: String,
    /// Existing virtual datacenter to create machines in. When unset a
    /// datacenter is created per machine.
    pub datacenter_id: Option<String>,
    /// Region code. Defaults to `us/las`.
    #[ortho_config(default = "us/las".to_owned())]
    pub location: String,
    /// Image alias or catalog name fragment.
    #[ortho_config(default = "Ubuntu-16.04".to_owned())]
    pub image: String,
    /// Boot volume storage class, `HDD` or `SSD`.
    #[ortho_config(default = "HDD".to_owned())]
    pub disk_type: String,
    /// Boot volume size in gigabytes.
    #[ortho_config(default = 50)]
    pub disk_size: u32,
    /// Memory in megabytes.
    #[ortho_config(default = 2048)]
    pub ram: u32,
    /// Number of cores.
    #[ortho_config(default = 4)]
    pub cores: u32,
    /// CPU family, `AMD_OPTERON` or `INTEL_XEON`.
    #[ortho_config(default = "AMD_OPTERON".to_owned())]
    pub cpu_family: String,
    /// Server availability zone.
    #[ortho_config(default = "AUTO".to_owned())]
    pub server_availability_zone: String,
    /// Volume availability zone.
    #[ortho_config(default = "AUTO".to_owned())]
    pub volume_availability_zone: String,
    /// Server creation strategy, `composite` or `stepwise`.
    #[ortho_config(default = "composite".to_owned())]
    pub server_strategy: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to the configuration file",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const USERNAME: FieldMetadata =
    FieldMetadata::new("ProfitBricks user name", "PROFITBRICKS_USERNAME", "username");
const PASSWORD: FieldMetadata =
    FieldMetadata::new("ProfitBricks password", "PROFITBRICKS_PASSWORD", "password");

impl ProfitBricksConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    fn require_present<'v>(
        value: Option<&'v String>,
        metadata: &FieldMetadata,
    ) -> Result<&'v str, ConfigError> {
        value
            .map(String::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| metadata.missing())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("pbmachine")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the validated account credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and configuration key to set.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let username = Self::require_present(self.username.as_ref(), &USERNAME)?;
        let password = Self::require_present(self.password.as_ref(), &PASSWORD)?;
        Ok(Credentials::new(username, password))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when an enumerated field has an unknown
    /// value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials()?;
        Self::require_field(
            &self.endpoint,
            &FieldMetadata::new("Cloud API endpoint", "PROFITBRICKS_ENDPOINT", "endpoint"),
        )?;
        Self::require_field(
            &self.location,
            &FieldMetadata::new("location", "PROFITBRICKS_LOCATION", "location"),
        )?;
        Self::require_field(
            &self.image,
            &FieldMetadata::new("image", "PROFITBRICKS_IMAGE", "image"),
        )?;
        Self::require_field(
            &self.cpu_family,
            &FieldMetadata::new("CPU family", "PROFITBRICKS_CPU_FAMILY", "cpu_family"),
        )?;
        self.parsed_disk_type()?;
        self.parsed_strategy()?;
        Ok(())
    }

    fn parsed_disk_type(&self) -> Result<DiskType, ConfigError> {
        self.disk_type.parse().map_err(ConfigError::Invalid)
    }

    fn parsed_strategy(&self) -> Result<ServerStrategy, ConfigError> {
        self.server_strategy.parse().map_err(ConfigError::Invalid)
    }

    /// Builds a [`MachineSpec`] using the configured values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn as_spec(&self) -> Result<MachineSpec, ConfigError> {
        self.validate()?;
        MachineSpec::builder()
            .location(&self.location)
            .image(&self.image)
            .disk_type(self.parsed_disk_type()?)
            .disk_size_gb(self.disk_size)
            .ram_mb(self.ram)
            .cores(self.cores)
            .cpu_family(&self.cpu_family)
            .server_availability_zone(&self.server_availability_zone)
            .volume_availability_zone(&self.volume_availability_zone)
            .datacenter_id(self.datacenter_id.clone())
            .strategy(self.parsed_strategy()?)
            .build()
            .map_err(|err| ConfigError::Invalid(err.to_string()))
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn config() -> ProfitBricksConfig {
        ProfitBricksConfig {
            username: Some(String::from("user@example.com")),
            password: Some(String::from("secret")),
            endpoint: String::from(DEFAULT_ENDPOINT),
            datacenter_id: None,
            location: String::from("us/las"),
            image: String::from("Ubuntu-16.04"),
            disk_type: String::from("SSD"),
            disk_size: 50,
            ram: 2048,
            cores: 4,
            cpu_family: String::from("AMD_OPTERON"),
            server_availability_zone: String::from("AUTO"),
            volume_availability_zone: String::from("AUTO"),
            server_strategy: String::from("stepwise"),
        }
    }

    #[rstest]
    fn as_spec_parses_enumerations(config: ProfitBricksConfig) {
        let spec = config
            .as_spec()
            .unwrap_or_else(|err| panic!("spec: {err}"));
        assert_eq!(spec.disk_type, DiskType::Ssd);
        assert_eq!(spec.strategy, ServerStrategy::Stepwise);
    }

    #[rstest]
    fn missing_password_names_env_and_key(mut config: ProfitBricksConfig) {
        config.password = Some(String::from("   "));
        let err = config
            .validate()
            .err()
            .unwrap_or_else(|| panic!("blank password should fail"));
        let ConfigError::MissingField(message) = err else {
            panic!("expected MissingField, got {err:?}");
        };
        assert!(message.contains("PROFITBRICKS_PASSWORD"));
        assert!(message.contains("password"));
    }

    #[rstest]
    fn unknown_disk_type_is_invalid(mut config: ProfitBricksConfig) {
        config.disk_type = String::from("NVME");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
