//! Individually callable provisioning and deletion primitives.
//!
//! Create steps return the provider's [`Accepted`] echo as soon as the call
//! is accepted so the caller can record the new identifier before waiting on
//! [`ResourceSteps::complete`]. Every other step submits and waits.

use tracing::info;

use crate::api::{
    Accepted, ApiError, CloudApi, Datacenter, DatacenterId, IpBlock, IpBlockId, JobHandle, Lan,
    LanId, LanRequest, Nic, NicId, NicRequest, Server, ServerId, ServerRequest, Volume, VolumeId,
    VolumeRequest,
};
use crate::error::DriverError;
use crate::poller::{JobPoller, Sleeper};

/// Number of addresses reserved per machine.
pub const IP_BLOCK_SIZE: u32 = 1;

/// Provisioning primitives bound to one provider and poller.
pub struct ResourceSteps<'a, A: ?Sized, S> {
    api: &'a A,
    poller: &'a JobPoller<S>,
}

impl<A: ?Sized, S> Clone for ResourceSteps<'_, A, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ?Sized, S> Copy for ResourceSteps<'_, A, S> {}

fn call<T>(operation: &str, result: Result<T, ApiError>) -> Result<T, DriverError> {
    result.map_err(|err| DriverError::from_api(operation, err))
}

impl<'a, A: CloudApi + ?Sized, S: Sleeper> ResourceSteps<'a, A, S> {
    /// Binds the steps to a provider and poller.
    #[must_use]
    pub const fn new(api: &'a A, poller: &'a JobPoller<S>) -> Self {
        Self { api, poller }
    }

    /// Provider the steps talk to.
    #[must_use]
    pub const fn api(&self) -> &'a A {
        self.api
    }

    /// Waits for an accepted create to finish.
    ///
    /// # Errors
    ///
    /// Returns the poller's error when the job fails or times out.
    pub fn complete<T>(&self, operation: &str, accepted: &Accepted<T>) -> Result<(), DriverError> {
        self.wait(operation, &accepted.job)
    }

    fn wait(&self, operation: &str, job: &JobHandle) -> Result<(), DriverError> {
        self.poller.await_completion(self.api, operation, job)
    }

    /// Reserves a single public address in `location`.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the call is rejected.
    pub fn reserve_ip_block(&self, location: &str) -> Result<Accepted<IpBlock>, DriverError> {
        info!(location, "reserving IP block");
        call(
            "reserve ip block",
            self.api.reserve_ip_block(IP_BLOCK_SIZE, location),
        )
    }

    /// Creates a datacenter named after the machine.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the call is rejected.
    pub fn create_datacenter(
        &self,
        name: &str,
        location: &str,
    ) -> Result<Accepted<Datacenter>, DriverError> {
        info!(name, location, "creating datacenter");
        call(
            "create datacenter",
            self.api.create_datacenter(name, location),
        )
    }

    /// Fetches an existing datacenter.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the datacenter cannot be
    /// read.
    pub fn fetch_datacenter(&self, id: &DatacenterId) -> Result<Datacenter, DriverError> {
        call("get datacenter", self.api.get_datacenter(id))
    }

    /// Creates a public LAN named after the machine.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the call is rejected.
    pub fn create_lan(
        &self,
        datacenter: &DatacenterId,
        name: &str,
    ) -> Result<Accepted<Lan>, DriverError> {
        info!(datacenter = datacenter.as_str(), "creating LAN");
        let request = LanRequest {
            name: name.to_owned(),
            public: true,
        };
        call("create lan", self.api.create_lan(datacenter, &request))
    }

    /// Creates a server, with or without its volume and NIC.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the call is rejected.
    pub fn create_server(
        &self,
        datacenter: &DatacenterId,
        request: &ServerRequest,
    ) -> Result<Accepted<Server>, DriverError> {
        info!(datacenter = datacenter.as_str(), name = request.name.as_str(), "creating server");
        call("create server", self.api.create_server(datacenter, request))
    }

    /// Creates a standalone volume.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the call is rejected.
    pub fn create_volume(
        &self,
        datacenter: &DatacenterId,
        request: &VolumeRequest,
    ) -> Result<Accepted<Volume>, DriverError> {
        info!(datacenter = datacenter.as_str(), "creating volume");
        call("create volume", self.api.create_volume(datacenter, request))
    }

    /// Attaches a volume to a server and waits for the attachment.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error or the poller's error.
    pub fn attach_volume(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        volume: &VolumeId,
    ) -> Result<(), DriverError> {
        info!(server = server.as_str(), volume = volume.as_str(), "attaching volume");
        let job = call(
            "attach volume",
            self.api.attach_volume(datacenter, server, volume),
        )?;
        self.wait("attach volume", &job)
    }

    /// Creates a network interface on a server.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the call is rejected.
    pub fn create_nic(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        request: &NicRequest,
    ) -> Result<Accepted<Nic>, DriverError> {
        info!(server = server.as_str(), "creating NIC");
        call(
            "create nic",
            self.api.create_nic(datacenter, server, request),
        )
    }

    /// Binds a LAN and addresses to an existing NIC and waits for the patch.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error or the poller's error.
    pub fn bind_nic(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        nic: &NicId,
        request: &NicRequest,
    ) -> Result<(), DriverError> {
        info!(server = server.as_str(), nic = nic.as_str(), "binding reserved IP to NIC");
        let job = call(
            "update nic",
            self.api.update_nic(datacenter, server, nic, request),
        )?;
        self.wait("update nic", &job)
    }

    /// Fetches a server with its NICs and volumes.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the server cannot be read.
    pub fn fetch_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<Server, DriverError> {
        call("get server", self.api.get_server(datacenter, server))
    }

    /// Lists the servers of a datacenter.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the list cannot be read.
    pub fn list_servers(&self, datacenter: &DatacenterId) -> Result<Vec<Server>, DriverError> {
        call("list servers", self.api.list_servers(datacenter))
    }

    /// Lists every IP block of the account.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when the list cannot be read.
    pub fn list_ip_blocks(&self) -> Result<Vec<IpBlock>, DriverError> {
        call("list ip blocks", self.api.list_ip_blocks())
    }

    /// Deletes a datacenter and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error or the poller's error.
    pub fn delete_datacenter(&self, id: &DatacenterId) -> Result<(), DriverError> {
        info!(datacenter = id.as_str(), "deleting datacenter");
        let job = call("delete datacenter", self.api.delete_datacenter(id))?;
        self.wait("delete datacenter", &job)
    }

    /// Deletes a server and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error or the poller's error.
    pub fn delete_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<(), DriverError> {
        info!(server = server.as_str(), "deleting server");
        let job = call("delete server", self.api.delete_server(datacenter, server))?;
        self.wait("delete server", &job)
    }

    /// Deletes a volume and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error or the poller's error.
    pub fn delete_volume(
        &self,
        datacenter: &DatacenterId,
        volume: &VolumeId,
    ) -> Result<(), DriverError> {
        info!(volume = volume.as_str(), "deleting volume");
        let job = call("delete volume", self.api.delete_volume(datacenter, volume))?;
        self.wait("delete volume", &job)
    }

    /// Deletes a LAN and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error or the poller's error.
    pub fn delete_lan(&self, datacenter: &DatacenterId, lan: &LanId) -> Result<(), DriverError> {
        info!(lan = lan.as_str(), "deleting LAN");
        let job = call("delete lan", self.api.delete_lan(datacenter, lan))?;
        self.wait("delete lan", &job)
    }

    /// Releases an IP block and waits for completion.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error or the poller's error.
    pub fn release_ip_block(&self, id: &IpBlockId) -> Result<(), DriverError> {
        info!(ip_block = id.as_str(), "releasing IP block");
        let job = call("release ip block", self.api.release_ip_block(id))?;
        self.wait("release ip block", &job)
    }
}
