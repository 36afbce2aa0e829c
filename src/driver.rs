//! Machine driver: the lifecycle capability set exposed to the host.

use tracing::info;

use crate::api::{ApiError, CloudApi, Credentials, ImageRef};
use crate::error::DriverError;
use crate::image::resolve_image;
use crate::machine::{Machine, MachineSpec};
use crate::poller::{JobPoller, PollSettings, Sleeper, ThreadSleeper};
use crate::provision::Provisioner;
use crate::ssh::KeyProvider;
use crate::state::{CanonicalState, map_state};
use crate::steps::ResourceSteps;
use crate::teardown::Teardown;

/// Port the Docker daemon listens on.
pub const DOCKER_PORT: u16 = 2376;

/// Operations the host lifecycle manager invokes on a machine.
///
/// Callers must not run two operations on the same machine concurrently.
pub trait MachineDriver {
    /// Checks credentials, the existing datacenter (if any), and the image
    /// before anything is created.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Validation`], [`DriverError::ImageNotFound`], or
    /// the classified provider error.
    fn pre_create_check(&self, spec: &MachineSpec) -> Result<(), DriverError>;

    /// Provisions the machine, committing its resources to `machine`.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error after rolling back.
    fn create(&self, machine: &mut Machine, spec: &MachineSpec) -> Result<(), DriverError>;

    /// Powers the machine on unless it is already running.
    ///
    /// # Errors
    ///
    /// Returns the state query or provider error.
    fn start(&self, machine: &Machine) -> Result<(), DriverError>;

    /// Powers the machine off unless it is already stopped.
    ///
    /// # Errors
    ///
    /// Returns the state query or provider error.
    fn stop(&self, machine: &Machine) -> Result<(), DriverError>;

    /// Reboots the machine.
    ///
    /// # Errors
    ///
    /// Returns the provider error.
    fn restart(&self, machine: &Machine) -> Result<(), DriverError>;

    /// Forces the machine off unless it is already stopped.
    ///
    /// # Errors
    ///
    /// Returns the state query or provider error.
    fn kill(&self, machine: &Machine) -> Result<(), DriverError>;

    /// Deletes the machine's provider resources and clears their identifiers.
    ///
    /// # Errors
    ///
    /// Returns the first failing delete.
    fn remove(&self, machine: &mut Machine) -> Result<(), DriverError>;

    /// Returns the machine's public address, refreshing the record.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MissingIp`] when no address is bound.
    fn get_ip(&self, machine: &mut Machine) -> Result<String, DriverError>;

    /// Returns the canonical state of the machine.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Authentication`] or [`DriverError::Query`] when
    /// the server cannot be read.
    fn get_state(&self, machine: &Machine) -> Result<CanonicalState, DriverError>;

    /// Returns the Docker endpoint URL of a running machine.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotRunning`] when the machine is not running.
    fn get_url(&self, machine: &mut Machine) -> Result<String, DriverError>;
}

/// [`MachineDriver`] over a [`CloudApi`], a [`KeyProvider`], and a poll
/// [`Sleeper`].
pub struct Driver<A, K, S = ThreadSleeper> {
    api: A,
    credentials: Credentials,
    keys: K,
    poller: JobPoller<S>,
}

impl<A: CloudApi, K: KeyProvider> Driver<A, K, ThreadSleeper> {
    /// Creates a driver that sleeps the calling thread between polls.
    #[must_use]
    pub fn new(api: A, credentials: Credentials, keys: K) -> Self {
        Self::with_poller(
            api,
            credentials,
            keys,
            JobPoller::new(PollSettings::default(), ThreadSleeper),
        )
    }
}

impl<A: CloudApi, K: KeyProvider, S: Sleeper> Driver<A, K, S> {
    /// Creates a driver with an explicit poller.
    #[must_use]
    pub const fn with_poller(
        api: A,
        credentials: Credentials,
        keys: K,
        poller: JobPoller<S>,
    ) -> Self {
        Self {
            api,
            credentials,
            keys,
            poller,
        }
    }

    /// Provider the driver talks to.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    fn steps(&self) -> ResourceSteps<'_, A, S> {
        ResourceSteps::new(&self.api, &self.poller)
    }

    fn check_credentials(&self) -> Result<(), DriverError> {
        if self.credentials.username.trim().is_empty() {
            return Err(DriverError::Validation(String::from("username")));
        }
        if self.credentials.password.trim().is_empty() {
            return Err(DriverError::Validation(String::from("password")));
        }
        Ok(())
    }

    fn preflight(&self, spec: &MachineSpec) -> Result<ImageRef, DriverError> {
        self.check_credentials()?;
        spec.validate()?;
        if let Some(datacenter) = &spec.datacenter_id {
            let found = self.steps().fetch_datacenter(datacenter)?;
            info!(
                datacenter = found.id.as_str(),
                name = found.name.as_str(),
                "machine will be created in existing datacenter"
            );
        }
        resolve_image(&self.api, &spec.image, spec.disk_type, &spec.location)
    }
}

impl<A: CloudApi, K: KeyProvider, S: Sleeper> MachineDriver for Driver<A, K, S> {
    fn pre_create_check(&self, spec: &MachineSpec) -> Result<(), DriverError> {
        self.preflight(spec).map(|_| ())
    }

    fn create(&self, machine: &mut Machine, spec: &MachineSpec) -> Result<(), DriverError> {
        let image = self.preflight(spec)?;
        if machine.ssh_public_key.is_none() {
            machine.ssh_public_key = Some(self.keys.public_key(&machine.name)?);
        }
        Provisioner::new(self.steps()).provision(machine, spec, image)
    }

    fn start(&self, machine: &Machine) -> Result<(), DriverError> {
        if self.get_state(machine)? == CanonicalState::Running {
            info!(machine = machine.name.as_str(), "machine is already running");
            return Ok(());
        }
        let (datacenter, server) = machine.server_address()?;
        self.api
            .start_server(datacenter, server)
            .map_err(|err| DriverError::from_api("start server", err))
    }

    fn stop(&self, machine: &Machine) -> Result<(), DriverError> {
        if self.get_state(machine)? == CanonicalState::Stopped {
            info!(machine = machine.name.as_str(), "machine is already stopped");
            return Ok(());
        }
        let (datacenter, server) = machine.server_address()?;
        self.api
            .stop_server(datacenter, server)
            .map_err(|err| DriverError::from_api("stop server", err))
    }

    fn restart(&self, machine: &Machine) -> Result<(), DriverError> {
        let (datacenter, server) = machine.server_address()?;
        self.api
            .reboot_server(datacenter, server)
            .map_err(|err| DriverError::from_api("reboot server", err))
    }

    fn kill(&self, machine: &Machine) -> Result<(), DriverError> {
        self.stop(machine)
    }

    fn remove(&self, machine: &mut Machine) -> Result<(), DriverError> {
        Teardown::new(self.steps()).remove(machine)?;
        machine.clear_resources();
        info!(machine = machine.name.as_str(), "machine removed");
        Ok(())
    }

    fn get_ip(&self, machine: &mut Machine) -> Result<String, DriverError> {
        let (datacenter, server_id) = machine.server_address()?;
        let server = self.steps().fetch_server(datacenter, server_id)?;
        let address = server.primary_ip().ok_or(DriverError::MissingIp)?.to_owned();
        machine.ip_address = Some(address.clone());
        Ok(address)
    }

    fn get_state(&self, machine: &Machine) -> Result<CanonicalState, DriverError> {
        let (datacenter, server_id) = machine.server_address()?;
        match self.api.get_server(datacenter, server_id) {
            Ok(server) => Ok(map_state(&server.status)),
            Err(ApiError::Unauthorized { body }) => Err(DriverError::Authentication {
                operation: String::from("get server"),
                message: body,
            }),
            Err(err) => Err(DriverError::Query {
                message: err.to_string(),
            }),
        }
    }

    fn get_url(&self, machine: &mut Machine) -> Result<String, DriverError> {
        let state = self.get_state(machine)?;
        if state != CanonicalState::Running {
            return Err(DriverError::NotRunning { state });
        }
        let address = self.get_ip(machine)?;
        Ok(format!("tcp://{address}:{DOCKER_PORT}"))
    }
}
