//! Core library for the pbmachine ProfitBricks machine driver.
//!
//! The crate provisions a Docker host on ProfitBricks (IP block, datacenter,
//! LAN, server, volume, NIC), gates every step on the provider's job status,
//! rolls back partial runs, and tears machines down again. Provider access
//! goes through the [`CloudApi`] trait so the orchestration can run against
//! the HTTP adapter or the in-memory double in [`test_support`].

pub mod api;
pub mod command;
pub mod config;
pub mod driver;
pub mod error;
pub mod image;
pub mod machine;
pub mod poller;
pub mod provision;
pub mod ssh;
pub mod state;
pub mod steps;
pub mod store;
pub mod teardown;
pub mod test_support;

pub use api::{ApiError, CloudApi, Credentials, DEFAULT_ENDPOINT, HttpCloudApi};
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, ProfitBricksConfig};
pub use driver::{DOCKER_PORT, Driver, MachineDriver};
pub use error::DriverError;
pub use machine::{DatacenterOrigin, Machine, MachineSpec, ServerStrategy};
pub use poller::{JobPoller, PollSettings, Sleeper, ThreadSleeper};
pub use provision::{Provisioner, RunLedger};
pub use ssh::{KeyProvider, SshKeygen};
pub use state::{CanonicalState, map_state};
pub use store::{MachineStore, StoreError};
pub use teardown::Teardown;
