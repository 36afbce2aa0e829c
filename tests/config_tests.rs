//! Unit tests for configuration validation and spec construction.

use pbmachine::api::DiskType;
use pbmachine::{ConfigError, DEFAULT_ENDPOINT, ProfitBricksConfig, ServerStrategy};
use rstest::*;

#[fixture]
fn valid_config() -> ProfitBricksConfig {
    ProfitBricksConfig {
        username: Some(String::from("user@example.com")),
        password: Some(String::from("secret")),
        endpoint: String::from(DEFAULT_ENDPOINT),
        datacenter_id: None,
        location: String::from("us/las"),
        image: String::from("Ubuntu-16.04"),
        disk_type: String::from("HDD"),
        disk_size: 50,
        ram: 2048,
        cores: 4,
        cpu_family: String::from("AMD_OPTERON"),
        server_availability_zone: String::from("AUTO"),
        volume_availability_zone: String::from("AUTO"),
        server_strategy: String::from("composite"),
    }
}

/// Verifies that validation produces actionable errors mentioning both the
/// environment variable and configuration key for each required field.
#[test]
fn config_validation_produces_actionable_errors_for_all_fields() {
    fn assert_actionable(
        mut cfg: ProfitBricksConfig,
        mutate: impl FnOnce(&mut ProfitBricksConfig),
        env_var: &str,
        toml_key: &str,
    ) {
        mutate(&mut cfg);
        let error = cfg
            .validate()
            .err()
            .unwrap_or_else(|| panic!("validation should fail for {toml_key}"));
        let ConfigError::MissingField(ref message) = error else {
            panic!("expected MissingField error, got {error:?}");
        };
        assert!(
            message.contains(env_var),
            "error should mention env var {env_var}: {message}"
        );
        assert!(
            message.contains("configuration file"),
            "error should mention config file: {message}"
        );
        assert!(
            message.contains(toml_key),
            "error should mention TOML key {toml_key}: {message}"
        );
    }

    assert_actionable(
        valid_config(),
        |cfg| cfg.username = None,
        "PROFITBRICKS_USERNAME",
        "username",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.password = Some(String::new()),
        "PROFITBRICKS_PASSWORD",
        "password",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.endpoint.clear(),
        "PROFITBRICKS_ENDPOINT",
        "endpoint",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.location.clear(),
        "PROFITBRICKS_LOCATION",
        "location",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.image.clear(),
        "PROFITBRICKS_IMAGE",
        "image",
    );
    assert_actionable(
        valid_config(),
        |cfg| cfg.cpu_family.clear(),
        "PROFITBRICKS_CPU_FAMILY",
        "cpu_family",
    );
}

#[test]
fn config_as_spec_carries_every_field() {
    let cfg = ProfitBricksConfig {
        datacenter_id: Some(String::from(" dc-1 ")),
        ..valid_config()
    };
    let spec = cfg
        .as_spec()
        .unwrap_or_else(|err| panic!("valid config yields spec: {err}"));

    assert_eq!(spec.location, cfg.location);
    assert_eq!(spec.image, cfg.image);
    assert_eq!(spec.disk_type, DiskType::Hdd);
    assert_eq!(spec.disk_size_gb, cfg.disk_size);
    assert_eq!(spec.ram_mb, cfg.ram);
    assert_eq!(spec.cores, cfg.cores);
    assert_eq!(spec.cpu_family, cfg.cpu_family);
    assert_eq!(spec.server_availability_zone, "AUTO");
    assert_eq!(spec.volume_availability_zone, "AUTO");
    assert_eq!(
        spec.datacenter_id.as_ref().map(ToString::to_string),
        Some(String::from("dc-1"))
    );
    assert_eq!(spec.strategy, ServerStrategy::Composite);
}

#[rstest]
#[case("ssd", DiskType::Ssd)]
#[case("HDD", DiskType::Hdd)]
fn config_disk_type_is_case_insensitive(#[case] raw: &str, #[case] expected: DiskType) {
    let cfg = ProfitBricksConfig {
        disk_type: String::from(raw),
        ..valid_config()
    };
    let spec = cfg
        .as_spec()
        .unwrap_or_else(|err| panic!("spec: {err}"));
    assert_eq!(spec.disk_type, expected);
}

#[test]
fn config_rejects_unknown_strategy() {
    let cfg = ProfitBricksConfig {
        server_strategy: String::from("parallel"),
        ..valid_config()
    };
    let err = cfg
        .validate()
        .err()
        .unwrap_or_else(|| panic!("unknown strategy should fail"));
    assert!(
        matches!(err, ConfigError::Invalid(ref message) if message.contains("parallel")),
        "unexpected error: {err}"
    );
}

#[test]
fn config_rejects_zero_cores() {
    let cfg = ProfitBricksConfig {
        cores: 0,
        ..valid_config()
    };
    let err = cfg
        .as_spec()
        .err()
        .unwrap_or_else(|| panic!("zero cores should fail"));
    assert!(
        err.to_string().contains("cores"),
        "unexpected error: {err}"
    );
}

#[test]
fn credentials_debug_output_hides_password() {
    let credentials = valid_config()
        .credentials()
        .unwrap_or_else(|err| panic!("credentials: {err}"));
    let rendered = format!("{credentials:?}");
    assert!(!rendered.contains("secret"), "rendered: {rendered}");
    assert!(rendered.contains("user@example.com"), "rendered: {rendered}");
}
