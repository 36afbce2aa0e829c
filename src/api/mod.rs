//! Provider API capability consumed by the provisioning core.
//!
//! [`CloudApi`] is the seam between orchestration and transport: the
//! orchestrator, poller, and teardown controller only ever talk to this
//! trait. [`HttpCloudApi`] implements it against the ProfitBricks Cloud API
//! and the test doubles in [`crate::test_support`] implement it in memory.

mod http;
mod types;
mod wire;

use std::fmt;

use thiserror::Error;

pub use http::{DEFAULT_ENDPOINT, HttpCloudApi};
pub use types::{
    Accepted, Datacenter, DatacenterId, DiskType, Image, ImageId, ImageRef, IpBlock, IpBlockId,
    JobHandle, JobState, JobStatus, Lan, LanId, LanRequest, Location, Nic, NicId, NicRequest,
    Server, ServerId, ServerRequest, Volume, VolumeId, VolumeRequest,
};

/// Errors reported by a [`CloudApi`] implementation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// Raised when the provider rejects the credentials (HTTP 401).
    #[error("unauthorised: {body}")]
    Unauthorized {
        /// Response body returned by the provider.
        body: String,
    },
    /// Raised when the addressed resource does not exist (HTTP 404).
    #[error("resource not found: {body}")]
    NotFound {
        /// Response body returned by the provider.
        body: String,
    },
    /// Raised for any other non-success HTTP status.
    #[error("provider returned status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body returned by the provider.
        body: String,
    },
    /// Raised when the request never produced a response.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("failed to decode provider response: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },
    /// Raised when a request cannot be expressed on the wire.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the failure.
        message: String,
    },
}

impl ApiError {
    /// Classifies a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let text = body.into();
        match status {
            401 => Self::Unauthorized { body: text },
            404 => Self::NotFound { body: text },
            _ => Self::Rejected { status, body: text },
        }
    }
}

/// Account credentials for the provider API.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    /// Account user name.
    pub username: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a user name and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Provider operations required to provision and tear down a machine.
///
/// Mutating calls return as soon as the provider accepts them; the returned
/// [`JobHandle`] must be polled through [`CloudApi::job_status`] before any
/// dependent call references the resource.
pub trait CloudApi {
    /// Reserves a block of `size` public addresses in `location`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn reserve_ip_block(&self, size: u32, location: &str) -> Result<Accepted<IpBlock>, ApiError>;

    /// Lists every IP block visible to the account.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn list_ip_blocks(&self) -> Result<Vec<IpBlock>, ApiError>;

    /// Releases a reserved IP block.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn release_ip_block(&self, id: &IpBlockId) -> Result<JobHandle, ApiError>;

    /// Creates a virtual datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn create_datacenter(&self, name: &str, location: &str)
    -> Result<Accepted<Datacenter>, ApiError>;

    /// Fetches a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] when the datacenter does not exist.
    fn get_datacenter(&self, id: &DatacenterId) -> Result<Datacenter, ApiError>;

    /// Deletes a datacenter together with everything inside it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn delete_datacenter(&self, id: &DatacenterId) -> Result<JobHandle, ApiError>;

    /// Creates a LAN inside a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn create_lan(
        &self,
        datacenter: &DatacenterId,
        request: &LanRequest,
    ) -> Result<Accepted<Lan>, ApiError>;

    /// Deletes a LAN.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn delete_lan(&self, datacenter: &DatacenterId, lan: &LanId) -> Result<JobHandle, ApiError>;

    /// Creates a server, optionally with its volume and NIC in the same job.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn create_server(
        &self,
        datacenter: &DatacenterId,
        request: &ServerRequest,
    ) -> Result<Accepted<Server>, ApiError>;

    /// Fetches a server with its NICs and volumes.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn get_server(&self, datacenter: &DatacenterId, server: &ServerId)
    -> Result<Server, ApiError>;

    /// Lists the servers in a datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn list_servers(&self, datacenter: &DatacenterId) -> Result<Vec<Server>, ApiError>;

    /// Deletes a server. Attached volumes survive.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn delete_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<JobHandle, ApiError>;

    /// Creates a standalone volume.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn create_volume(
        &self,
        datacenter: &DatacenterId,
        request: &VolumeRequest,
    ) -> Result<Accepted<Volume>, ApiError>;

    /// Attaches a volume to a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn attach_volume(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        volume: &VolumeId,
    ) -> Result<JobHandle, ApiError>;

    /// Deletes a volume.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn delete_volume(
        &self,
        datacenter: &DatacenterId,
        volume: &VolumeId,
    ) -> Result<JobHandle, ApiError>;

    /// Creates a network interface on a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn create_nic(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        request: &NicRequest,
    ) -> Result<Accepted<Nic>, ApiError>;

    /// Patches a network interface's LAN membership and bound addresses.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn update_nic(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        nic: &NicId,
        request: &NicRequest,
    ) -> Result<JobHandle, ApiError>;

    /// Lists the image catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn list_images(&self) -> Result<Vec<Image>, ApiError>;

    /// Fetches a region descriptor, including its image aliases.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn get_location(&self, location: &str) -> Result<Location, ApiError>;

    /// Powers a server on.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn start_server(&self, datacenter: &DatacenterId, server: &ServerId) -> Result<(), ApiError>;

    /// Powers a server off.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn stop_server(&self, datacenter: &DatacenterId, server: &ServerId) -> Result<(), ApiError>;

    /// Reboots a server.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the provider rejects the call.
    fn reboot_server(&self, datacenter: &DatacenterId, server: &ServerId)
    -> Result<(), ApiError>;

    /// Queries the status of an asynchronous job.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] when the status endpoint cannot be read.
    fn job_status(&self, job: &JobHandle) -> Result<JobStatus, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(401, "Unauthorized")]
    #[case(404, "NotFound")]
    #[case(422, "Rejected")]
    #[case(500, "Rejected")]
    fn from_status_classifies_codes(#[case] status: u16, #[case] expected: &str) {
        let err = ApiError::from_status(status, "body");
        let actual = match err {
            ApiError::Unauthorized { .. } => "Unauthorized",
            ApiError::NotFound { .. } => "NotFound",
            ApiError::Rejected { .. } => "Rejected",
            other => panic!("unexpected classification: {other:?}"),
        };
        assert_eq!(actual, expected);
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials::new("user@example.com", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("user@example.com"));
        assert!(!rendered.contains("hunter2"), "password leaked: {rendered}");
    }
}
