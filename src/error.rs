//! Error taxonomy surfaced by the driver operations.

use thiserror::Error;

use crate::api::{ApiError, JobHandle};
use crate::config::ConfigError;
use crate::state::CanonicalState;

/// Errors raised while provisioning, controlling, or tearing down a machine.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Raised when configuration cannot be loaded or is incomplete.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when a required value is missing or malformed.
    #[error("missing or invalid field: {0}")]
    Validation(String),
    /// Raised when neither an alias nor a catalog image matches.
    #[error("no image matching '{name}' found in {location}")]
    ImageNotFound {
        /// Requested image name.
        name: String,
        /// Region that was searched.
        location: String,
    },
    /// Raised when the provider rejects the credentials.
    #[error("{operation} failed: unauthorised, check the user name and password: {message}")]
    Authentication {
        /// Operation that was attempted.
        operation: String,
        /// Provider response body.
        message: String,
    },
    /// Raised when the provider answers with a non-success status.
    #[error("{operation} failed with status {status}: {body}")]
    ProviderRejected {
        /// Operation that was attempted.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Provider response body.
        body: String,
    },
    /// Raised when the provider could not be reached.
    #[error("{operation} failed: {message}")]
    Transport {
        /// Operation that was attempted.
        operation: String,
        /// Description of the failure.
        message: String,
    },
    /// Raised when a provider response has an unexpected shape.
    #[error("{operation} returned an unreadable response: {message}")]
    Decode {
        /// Operation that was attempted.
        operation: String,
        /// Description of the failure.
        message: String,
    },
    /// Raised when a machine state query fails for a reason other than
    /// authentication.
    #[error("error occurred while fetching a server: {message}")]
    Query {
        /// Description of the failure.
        message: String,
    },
    /// Raised when an asynchronous job reports FAILED.
    #[error("job {job} failed: {message}")]
    JobFailed {
        /// Job that failed.
        job: JobHandle,
        /// Provider failure message.
        message: String,
    },
    /// Raised when a job stays pending for the whole poll budget.
    #[error("timed out waiting for job {job} after {attempts} attempts")]
    Timeout {
        /// Job that never finished.
        job: JobHandle,
        /// Number of status queries issued.
        attempts: u32,
    },
    /// Raised when a mutating call produced no job handle to poll.
    #[error("{operation} returned no job handle to wait on")]
    EmptyJobHandle {
        /// Operation whose handle was empty.
        operation: String,
    },
    /// Raised when compensating cleanup fails after an earlier step failed.
    #[error("{cause} (rollback also failed: {rollback})")]
    RollbackFailed {
        /// Error that triggered the rollback.
        cause: Box<DriverError>,
        /// Error raised by the rollback itself.
        rollback: Box<DriverError>,
    },
    /// Raised when SSH key material cannot be produced.
    #[error("ssh key generation failed: {0}")]
    Credential(String),
    /// Raised when the machine record lacks an identifier an operation needs.
    #[error("machine has no recorded {0}")]
    MissingResource(&'static str),
    /// Raised when the server has no address bound to its primary NIC.
    #[error("IP address is not set")]
    MissingIp,
    /// Raised when an operation requires a running machine.
    #[error("machine is not running (state: {state})")]
    NotRunning {
        /// State observed instead.
        state: CanonicalState,
    },
}

impl DriverError {
    /// Classifies an [`ApiError`] raised while performing `action`.
    #[must_use]
    pub fn from_api(action: &str, err: ApiError) -> Self {
        let operation = action.to_owned();
        match err {
            ApiError::Unauthorized { body } => Self::Authentication {
                operation,
                message: body,
            },
            ApiError::NotFound { body } => Self::ProviderRejected {
                operation,
                status: 404,
                body,
            },
            ApiError::Rejected { status, body } => Self::ProviderRejected {
                operation,
                status,
                body,
            },
            ApiError::Transport { message } => Self::Transport { operation, message },
            ApiError::Decode { message } | ApiError::InvalidRequest { message } => {
                Self::Decode { operation, message }
            }
        }
    }

    /// Combines the error that triggered a rollback with the rollback's own
    /// outcome.
    #[must_use]
    pub fn with_rollback_failure(self, rollback: Option<Self>) -> Self {
        match rollback {
            Some(failure) => Self::RollbackFailed {
                cause: Box::new(self),
                rollback: Box::new(failure),
            },
            None => self,
        }
    }
}
