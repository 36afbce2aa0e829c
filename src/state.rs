//! Canonical machine states and the provider status mapping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operational state reported to the host lifecycle manager.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalState {
    /// Status absent or unrecognised.
    #[default]
    Unknown,
    /// Powered on and available.
    Running,
    /// Suspended by the provider.
    Paused,
    /// Powered off, blocked, or inactive.
    Stopped,
    /// Crashed.
    Error,
}

impl CanonicalState {
    /// Lower-case name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Maps a provider machine status onto a [`CanonicalState`].
///
/// Matching is exact; unrecognised values become [`CanonicalState::Unknown`].
#[must_use]
pub fn map_state(provider_status: &str) -> CanonicalState {
    match provider_status {
        "AVAILABLE" => CanonicalState::Running,
        "PAUSED" => CanonicalState::Paused,
        "BLOCKED" | "SHUTDOWN" | "SHUTOFF" | "INACTIVE" => CanonicalState::Stopped,
        "CRASHED" => CanonicalState::Error,
        _ => CanonicalState::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("NOSTATE", CanonicalState::Unknown)]
    #[case("AVAILABLE", CanonicalState::Running)]
    #[case("PAUSED", CanonicalState::Paused)]
    #[case("BLOCKED", CanonicalState::Stopped)]
    #[case("SHUTDOWN", CanonicalState::Stopped)]
    #[case("SHUTOFF", CanonicalState::Stopped)]
    #[case("CRASHED", CanonicalState::Error)]
    #[case("INACTIVE", CanonicalState::Stopped)]
    #[case("BUSY", CanonicalState::Unknown)]
    #[case("", CanonicalState::Unknown)]
    #[case("available", CanonicalState::Unknown)]
    fn maps_provider_status(#[case] status: &str, #[case] expected: CanonicalState) {
        assert_eq!(map_state(status), expected);
    }

    #[test]
    fn displays_lower_case() {
        assert_eq!(CanonicalState::Running.to_string(), "running");
    }
}
