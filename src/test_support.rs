//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeCloud`] is an in-memory [`CloudApi`] that applies mutations at
//! once, hands out job handles, and records every call so tests can assert
//! on ordering. Faults are injected per call kind.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsString;
use std::rc::Rc;
use std::time::Duration;

use crate::api::{
    Accepted, ApiError, CloudApi, Datacenter, DatacenterId, Image, ImageId, IpBlock, IpBlockId,
    JobHandle, JobState, JobStatus, Lan, LanId, LanRequest, Location, Nic, NicId, NicRequest,
    Server, ServerId, ServerRequest, Volume, VolumeId, VolumeRequest,
};
use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::error::DriverError;
use crate::poller::Sleeper;
use crate::ssh::KeyProvider;

/// Kind of provider call, used to target injected faults.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Call {
    /// [`CloudApi::reserve_ip_block`].
    ReserveIpBlock,
    /// [`CloudApi::list_ip_blocks`].
    ListIpBlocks,
    /// [`CloudApi::release_ip_block`].
    ReleaseIpBlock,
    /// [`CloudApi::create_datacenter`].
    CreateDatacenter,
    /// [`CloudApi::get_datacenter`].
    GetDatacenter,
    /// [`CloudApi::delete_datacenter`].
    DeleteDatacenter,
    /// [`CloudApi::create_lan`].
    CreateLan,
    /// [`CloudApi::delete_lan`].
    DeleteLan,
    /// [`CloudApi::create_server`].
    CreateServer,
    /// [`CloudApi::get_server`].
    GetServer,
    /// [`CloudApi::list_servers`].
    ListServers,
    /// [`CloudApi::delete_server`].
    DeleteServer,
    /// [`CloudApi::create_volume`].
    CreateVolume,
    /// [`CloudApi::attach_volume`].
    AttachVolume,
    /// [`CloudApi::delete_volume`].
    DeleteVolume,
    /// [`CloudApi::create_nic`].
    CreateNic,
    /// [`CloudApi::update_nic`].
    UpdateNic,
    /// [`CloudApi::list_images`].
    ListImages,
    /// [`CloudApi::get_location`].
    GetLocation,
    /// [`CloudApi::start_server`].
    StartServer,
    /// [`CloudApi::stop_server`].
    StopServer,
    /// [`CloudApi::reboot_server`].
    RebootServer,
}

/// A recorded provider call with the identifiers it addressed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Operation {
    /// Kind of call.
    pub call: Call,
    /// Primary identifier or argument the call addressed, if any.
    pub target: Option<String>,
}

#[derive(Debug, Default)]
struct FakeDatacenter {
    datacenter: Option<Datacenter>,
    lans: Vec<Lan>,
    servers: Vec<Server>,
    volumes: Vec<Volume>,
}

#[derive(Debug, Default)]
struct CloudState {
    next_id: u32,
    datacenters: BTreeMap<String, FakeDatacenter>,
    ip_blocks: Vec<IpBlock>,
    reserved_sizes: Vec<u32>,
    images: Vec<Image>,
    locations: BTreeMap<String, Location>,
    calls: Vec<Operation>,
    call_failures: BTreeMap<Call, ApiError>,
    job_failures: BTreeMap<Call, String>,
    stalled_calls: BTreeSet<Call>,
    handle_less_calls: BTreeSet<Call>,
    job_scripts: BTreeMap<String, VecDeque<JobStatus>>,
    stalled_jobs: BTreeSet<String>,
    failed_jobs: BTreeMap<String, String>,
    pending_jobs: BTreeMap<String, u32>,
    status_queries: BTreeMap<String, u32>,
    job_delay: u32,
}

impl CloudState {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn record(&mut self, call: Call, target: Option<String>) -> Result<(), ApiError> {
        self.calls.push(Operation { call, target });
        self.call_failures.get(&call).cloned().map_or(Ok(()), Err)
    }

    fn issue_job(&mut self, call: Call) -> JobHandle {
        if self.handle_less_calls.contains(&call) {
            return JobHandle::default();
        }
        let handle = self.next("job");
        if let Some(message) = self.job_failures.get(&call).cloned() {
            self.failed_jobs.insert(handle.clone(), message);
        } else if self.stalled_calls.contains(&call) {
            self.stalled_jobs.insert(handle.clone());
        } else if self.job_delay > 0 {
            self.pending_jobs.insert(handle.clone(), self.job_delay);
        }
        JobHandle::from(handle)
    }

    fn datacenter_mut(&mut self, id: &DatacenterId) -> Result<&mut FakeDatacenter, ApiError> {
        self.datacenters
            .get_mut(id.as_str())
            .ok_or_else(|| not_found("datacenter", id.as_str()))
    }

    fn datacenter(&self, id: &DatacenterId) -> Result<&FakeDatacenter, ApiError> {
        self.datacenters
            .get(id.as_str())
            .ok_or_else(|| not_found("datacenter", id.as_str()))
    }
}

fn not_found(kind: &str, id: &str) -> ApiError {
    ApiError::NotFound {
        body: format!("{kind} {id} not found"),
    }
}

fn server_mut<'s>(
    datacenter: &'s mut FakeDatacenter,
    id: &ServerId,
) -> Result<&'s mut Server, ApiError> {
    datacenter
        .servers
        .iter_mut()
        .find(|server| server.id == *id)
        .ok_or_else(|| not_found("server", id.as_str()))
}

fn lan_number(lan: Option<&LanId>) -> Option<u32> {
    lan.and_then(|id| id.as_str().parse().ok())
}

/// In-memory [`CloudApi`] with fault injection and call recording.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Rc<RefCell<CloudState>>,
}

impl FakeCloud {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a location and its image aliases.
    pub fn seed_location(&self, id: &str, aliases: &[&str]) {
        self.state.borrow_mut().locations.insert(
            id.to_owned(),
            Location {
                id: id.to_owned(),
                image_aliases: aliases.iter().map(|alias| (*alias).to_owned()).collect(),
            },
        );
    }

    /// Adds an image to the catalog.
    pub fn seed_image(&self, id: &str, name: &str, image_type: &str, location: &str) {
        self.state.borrow_mut().images.push(Image {
            id: ImageId::from(id),
            name: name.to_owned(),
            image_type: image_type.to_owned(),
            location: location.to_owned(),
        });
    }

    /// Adds an existing datacenter.
    pub fn seed_datacenter(&self, id: &str, name: &str, location: &str) {
        let datacenter = Datacenter {
            id: DatacenterId::from(id),
            name: name.to_owned(),
            location: location.to_owned(),
        };
        self.state.borrow_mut().datacenters.insert(
            id.to_owned(),
            FakeDatacenter {
                datacenter: Some(datacenter),
                ..FakeDatacenter::default()
            },
        );
    }

    /// Adds a server with one volume and one NIC to an existing datacenter.
    pub fn seed_server(&self, datacenter: &str, id: &str, status: &str, ip: &str) {
        let volume = Volume {
            id: VolumeId::from(format!("{id}-volume")),
            name: id.to_owned(),
            size_gb: 50,
        };
        let server = Server {
            id: ServerId::from(id),
            name: id.to_owned(),
            status: status.to_owned(),
            nics: vec![Nic {
                id: NicId::from(format!("{id}-nic")),
                name: id.to_owned(),
                lan: Some(1),
                ips: vec![ip.to_owned()],
                dhcp: true,
            }],
            volumes: vec![volume.clone()],
        };
        let mut state = self.state.borrow_mut();
        let entry = state.datacenters.entry(datacenter.to_owned()).or_default();
        entry.volumes.push(volume);
        entry.servers.push(server);
    }

    /// Adds a LAN to an existing datacenter.
    pub fn seed_lan(&self, datacenter: &str, id: &str) {
        let mut state = self.state.borrow_mut();
        let entry = state.datacenters.entry(datacenter.to_owned()).or_default();
        entry.lans.push(Lan {
            id: LanId::from(id),
            name: id.to_owned(),
            public: true,
        });
    }

    /// Adds a reserved IP block holding `ips`.
    pub fn seed_ip_block(&self, id: &str, location: &str, ips: &[&str]) {
        self.state.borrow_mut().ip_blocks.push(IpBlock {
            id: IpBlockId::from(id),
            location: location.to_owned(),
            size: u32::try_from(ips.len()).unwrap_or(u32::MAX),
            ips: ips.iter().map(|ip| (*ip).to_owned()).collect(),
        });
    }

    /// Overrides the provider status reported for a server.
    pub fn set_server_status(&self, datacenter: &DatacenterId, server: &ServerId, status: &str) {
        let mut state = self.state.borrow_mut();
        if let Ok(found) = state
            .datacenter_mut(datacenter)
            .and_then(|entry| server_mut(entry, server))
        {
            found.status = status.to_owned();
        }
    }

    /// Makes every invocation of `call` fail with `error`.
    pub fn fail_call(&self, call: Call, error: ApiError) {
        self.state.borrow_mut().call_failures.insert(call, error);
    }

    /// Makes jobs issued by `call` report FAILED with `message`.
    pub fn fail_job(&self, call: Call, message: &str) {
        self.state
            .borrow_mut()
            .job_failures
            .insert(call, message.to_owned());
    }

    /// Makes jobs issued by `call` stay pending forever.
    pub fn stall_call(&self, call: Call) {
        self.state.borrow_mut().stalled_calls.insert(call);
    }

    /// Makes `call` return an empty job handle.
    pub fn omit_job_handle(&self, call: Call) {
        self.state.borrow_mut().handle_less_calls.insert(call);
    }

    /// Makes every job issued from now on report pending `rounds` times
    /// before DONE.
    pub fn delay_jobs(&self, rounds: u32) {
        self.state.borrow_mut().job_delay = rounds;
    }

    /// Scripts the statuses returned for `handle`, in order. Once the script
    /// is exhausted the job reports DONE.
    pub fn script_job(&self, handle: &str, statuses: impl IntoIterator<Item = JobStatus>) {
        self.state
            .borrow_mut()
            .job_scripts
            .insert(handle.to_owned(), statuses.into_iter().collect());
    }

    /// Makes `handle` stay pending forever.
    pub fn stall_job(&self, handle: &str) {
        self.state.borrow_mut().stalled_jobs.insert(handle.to_owned());
    }

    /// Every recorded call, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.state.borrow().calls.clone()
    }

    /// Recorded mutating calls (creates, deletes, attach, update, power),
    /// in order.
    #[must_use]
    pub fn mutations(&self) -> Vec<Call> {
        self.operations()
            .into_iter()
            .map(|operation| operation.call)
            .filter(|call| {
                !matches!(
                    call,
                    Call::ListIpBlocks
                        | Call::GetDatacenter
                        | Call::GetServer
                        | Call::ListServers
                        | Call::ListImages
                        | Call::GetLocation
                )
            })
            .collect()
    }

    /// Number of times `call` was made.
    #[must_use]
    pub fn call_count(&self, call: Call) -> usize {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|operation| operation.call == call)
            .count()
    }

    /// Targets of every recorded `call`, in order.
    #[must_use]
    pub fn targets(&self, call: Call) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|operation| operation.call == call)
            .filter_map(|operation| operation.target.clone())
            .collect()
    }

    /// Number of status queries made for `handle`.
    #[must_use]
    pub fn status_queries(&self, handle: &str) -> u32 {
        self.state
            .borrow()
            .status_queries
            .get(handle)
            .copied()
            .unwrap_or(0)
    }

    /// Number of status queries made across all handles.
    #[must_use]
    pub fn total_status_queries(&self) -> u32 {
        self.state.borrow().status_queries.values().sum()
    }

    /// Returns `true` when the datacenter exists.
    #[must_use]
    pub fn has_datacenter(&self, id: &str) -> bool {
        self.state.borrow().datacenters.contains_key(id)
    }

    /// Identifiers of the servers in a datacenter.
    #[must_use]
    pub fn server_ids(&self, datacenter: &str) -> Vec<String> {
        self.state
            .borrow()
            .datacenters
            .get(datacenter)
            .map(|entry| {
                entry
                    .servers
                    .iter()
                    .map(|server| server.id.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Identifiers of the volumes in a datacenter.
    #[must_use]
    pub fn volume_ids(&self, datacenter: &str) -> Vec<String> {
        self.state
            .borrow()
            .datacenters
            .get(datacenter)
            .map(|entry| {
                entry
                    .volumes
                    .iter()
                    .map(|volume| volume.id.to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Identifiers of the LANs in a datacenter.
    #[must_use]
    pub fn lan_ids(&self, datacenter: &str) -> Vec<String> {
        self.state
            .borrow()
            .datacenters
            .get(datacenter)
            .map(|entry| entry.lans.iter().map(|lan| lan.id.to_string()).collect())
            .unwrap_or_default()
    }

    /// Identifiers of the reserved IP blocks.
    #[must_use]
    pub fn ip_block_ids(&self) -> Vec<String> {
        self.state
            .borrow()
            .ip_blocks
            .iter()
            .map(|block| block.id.to_string())
            .collect()
    }

    /// Sizes requested by each accepted IP block reservation, in order.
    #[must_use]
    pub fn reserved_sizes(&self) -> Vec<u32> {
        self.state.borrow().reserved_sizes.clone()
    }

    /// Identifier of the reserved block holding `address`, if any.
    #[must_use]
    pub fn ip_block_holding(&self, address: &str) -> Option<String> {
        self.state
            .borrow()
            .ip_blocks
            .iter()
            .find(|block| block.ips.iter().any(|ip| ip == address))
            .map(|block| block.id.to_string())
    }

    /// Identifiers of every datacenter.
    #[must_use]
    pub fn datacenter_ids(&self) -> Vec<String> {
        self.state.borrow().datacenters.keys().cloned().collect()
    }
}

impl CloudApi for FakeCloud {
    fn reserve_ip_block(&self, size: u32, location: &str) -> Result<Accepted<IpBlock>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::ReserveIpBlock, Some(location.to_owned()))?;
        state.reserved_sizes.push(size);
        let id = state.next("ipblock");
        let ips = (0..size)
            .map(|offset| format!("203.0.113.{}", state.next_id + offset))
            .collect();
        let block = IpBlock {
            id: IpBlockId::from(id),
            location: location.to_owned(),
            size,
            ips,
        };
        state.ip_blocks.push(block.clone());
        let job = state.issue_job(Call::ReserveIpBlock);
        Ok(Accepted {
            job,
            resource: block,
        })
    }

    fn list_ip_blocks(&self) -> Result<Vec<IpBlock>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::ListIpBlocks, None)?;
        Ok(state.ip_blocks.clone())
    }

    fn release_ip_block(&self, id: &IpBlockId) -> Result<JobHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::ReleaseIpBlock, Some(id.to_string()))?;
        let before = state.ip_blocks.len();
        state.ip_blocks.retain(|block| block.id != *id);
        if state.ip_blocks.len() == before {
            return Err(not_found("ip block", id.as_str()));
        }
        Ok(state.issue_job(Call::ReleaseIpBlock))
    }

    fn create_datacenter(
        &self,
        name: &str,
        location: &str,
    ) -> Result<Accepted<Datacenter>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::CreateDatacenter, Some(name.to_owned()))?;
        let id = state.next("dc");
        let datacenter = Datacenter {
            id: DatacenterId::from(id.clone()),
            name: name.to_owned(),
            location: location.to_owned(),
        };
        state.datacenters.insert(
            id,
            FakeDatacenter {
                datacenter: Some(datacenter.clone()),
                ..FakeDatacenter::default()
            },
        );
        let job = state.issue_job(Call::CreateDatacenter);
        Ok(Accepted {
            job,
            resource: datacenter,
        })
    }

    fn get_datacenter(&self, id: &DatacenterId) -> Result<Datacenter, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::GetDatacenter, Some(id.to_string()))?;
        state
            .datacenter(id)?
            .datacenter
            .clone()
            .ok_or_else(|| not_found("datacenter", id.as_str()))
    }

    fn delete_datacenter(&self, id: &DatacenterId) -> Result<JobHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::DeleteDatacenter, Some(id.to_string()))?;
        state
            .datacenters
            .remove(id.as_str())
            .ok_or_else(|| not_found("datacenter", id.as_str()))?;
        Ok(state.issue_job(Call::DeleteDatacenter))
    }

    fn create_lan(
        &self,
        datacenter: &DatacenterId,
        request: &LanRequest,
    ) -> Result<Accepted<Lan>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::CreateLan, Some(datacenter.to_string()))?;
        let number = state.datacenter(datacenter)?.lans.len() + 1;
        let lan = Lan {
            id: LanId::from(number.to_string()),
            name: request.name.clone(),
            public: request.public,
        };
        state.datacenter_mut(datacenter)?.lans.push(lan.clone());
        let job = state.issue_job(Call::CreateLan);
        Ok(Accepted { job, resource: lan })
    }

    fn delete_lan(&self, datacenter: &DatacenterId, lan: &LanId) -> Result<JobHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::DeleteLan, Some(lan.to_string()))?;
        let entry = state.datacenter_mut(datacenter)?;
        let before = entry.lans.len();
        entry.lans.retain(|existing| existing.id != *lan);
        if entry.lans.len() == before {
            return Err(not_found("lan", lan.as_str()));
        }
        Ok(state.issue_job(Call::DeleteLan))
    }

    fn create_server(
        &self,
        datacenter: &DatacenterId,
        request: &ServerRequest,
    ) -> Result<Accepted<Server>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::CreateServer, Some(request.name.clone()))?;
        state.datacenter(datacenter)?;
        let server_id = state.next("srv");
        let volumes: Vec<Volume> = match &request.volume {
            Some(volume) => vec![Volume {
                id: VolumeId::from(state.next("vol")),
                name: volume.name.clone(),
                size_gb: volume.size_gb,
            }],
            None => Vec::new(),
        };
        let nics: Vec<Nic> = match &request.nic {
            Some(nic) => vec![Nic {
                id: NicId::from(state.next("nic")),
                name: nic.name.clone(),
                lan: lan_number(nic.lan.as_ref()),
                ips: nic.ips.clone(),
                dhcp: nic.dhcp,
            }],
            None => Vec::new(),
        };
        let server = Server {
            id: ServerId::from(server_id),
            name: request.name.clone(),
            status: String::from("AVAILABLE"),
            nics,
            volumes,
        };
        let entry = state.datacenter_mut(datacenter)?;
        entry.volumes.extend(server.volumes.iter().cloned());
        entry.servers.push(server.clone());
        let job = state.issue_job(Call::CreateServer);
        Ok(Accepted {
            job,
            resource: server,
        })
    }

    fn get_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<Server, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::GetServer, Some(server.to_string()))?;
        state
            .datacenter(datacenter)?
            .servers
            .iter()
            .find(|existing| existing.id == *server)
            .cloned()
            .ok_or_else(|| not_found("server", server.as_str()))
    }

    fn list_servers(&self, datacenter: &DatacenterId) -> Result<Vec<Server>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::ListServers, Some(datacenter.to_string()))?;
        Ok(state.datacenter(datacenter)?.servers.clone())
    }

    fn delete_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<JobHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::DeleteServer, Some(server.to_string()))?;
        let entry = state.datacenter_mut(datacenter)?;
        let before = entry.servers.len();
        entry.servers.retain(|existing| existing.id != *server);
        if entry.servers.len() == before {
            return Err(not_found("server", server.as_str()));
        }
        Ok(state.issue_job(Call::DeleteServer))
    }

    fn create_volume(
        &self,
        datacenter: &DatacenterId,
        request: &VolumeRequest,
    ) -> Result<Accepted<Volume>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::CreateVolume, Some(request.name.clone()))?;
        state.datacenter(datacenter)?;
        let volume = Volume {
            id: VolumeId::from(state.next("vol")),
            name: request.name.clone(),
            size_gb: request.size_gb,
        };
        state.datacenter_mut(datacenter)?.volumes.push(volume.clone());
        let job = state.issue_job(Call::CreateVolume);
        Ok(Accepted {
            job,
            resource: volume,
        })
    }

    fn attach_volume(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        volume: &VolumeId,
    ) -> Result<JobHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::AttachVolume, Some(volume.to_string()))?;
        let entry = state.datacenter_mut(datacenter)?;
        let found = entry
            .volumes
            .iter()
            .find(|existing| existing.id == *volume)
            .cloned()
            .ok_or_else(|| not_found("volume", volume.as_str()))?;
        server_mut(entry, server)?.volumes.push(found);
        Ok(state.issue_job(Call::AttachVolume))
    }

    fn delete_volume(
        &self,
        datacenter: &DatacenterId,
        volume: &VolumeId,
    ) -> Result<JobHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::DeleteVolume, Some(volume.to_string()))?;
        let entry = state.datacenter_mut(datacenter)?;
        let before = entry.volumes.len();
        entry.volumes.retain(|existing| existing.id != *volume);
        if entry.volumes.len() == before {
            return Err(not_found("volume", volume.as_str()));
        }
        for server in &mut entry.servers {
            server.volumes.retain(|existing| existing.id != *volume);
        }
        Ok(state.issue_job(Call::DeleteVolume))
    }

    fn create_nic(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        request: &NicRequest,
    ) -> Result<Accepted<Nic>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::CreateNic, Some(server.to_string()))?;
        let nic = Nic {
            id: NicId::from(state.next("nic")),
            name: request.name.clone(),
            lan: lan_number(request.lan.as_ref()),
            ips: request.ips.clone(),
            dhcp: request.dhcp,
        };
        let entry = state.datacenter_mut(datacenter)?;
        server_mut(entry, server)?.nics.push(nic.clone());
        let job = state.issue_job(Call::CreateNic);
        Ok(Accepted { job, resource: nic })
    }

    fn update_nic(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
        nic: &NicId,
        request: &NicRequest,
    ) -> Result<JobHandle, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::UpdateNic, Some(nic.to_string()))?;
        let entry = state.datacenter_mut(datacenter)?;
        let target = server_mut(entry, server)?
            .nics
            .iter_mut()
            .find(|existing| existing.id == *nic)
            .ok_or_else(|| not_found("nic", nic.as_str()))?;
        target.lan = lan_number(request.lan.as_ref());
        target.ips.clone_from(&request.ips);
        target.dhcp = request.dhcp;
        Ok(state.issue_job(Call::UpdateNic))
    }

    fn list_images(&self) -> Result<Vec<Image>, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::ListImages, None)?;
        Ok(state.images.clone())
    }

    fn get_location(&self, location: &str) -> Result<Location, ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::GetLocation, Some(location.to_owned()))?;
        state
            .locations
            .get(location)
            .cloned()
            .ok_or_else(|| not_found("location", location))
    }

    fn start_server(&self, datacenter: &DatacenterId, server: &ServerId) -> Result<(), ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::StartServer, Some(server.to_string()))?;
        let entry = state.datacenter_mut(datacenter)?;
        server_mut(entry, server)?.status = String::from("AVAILABLE");
        Ok(())
    }

    fn stop_server(&self, datacenter: &DatacenterId, server: &ServerId) -> Result<(), ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::StopServer, Some(server.to_string()))?;
        let entry = state.datacenter_mut(datacenter)?;
        server_mut(entry, server)?.status = String::from("SHUTOFF");
        Ok(())
    }

    fn reboot_server(
        &self,
        datacenter: &DatacenterId,
        server: &ServerId,
    ) -> Result<(), ApiError> {
        let mut state = self.state.borrow_mut();
        state.record(Call::RebootServer, Some(server.to_string()))?;
        let entry = state.datacenter_mut(datacenter)?;
        server_mut(entry, server)?.status = String::from("AVAILABLE");
        Ok(())
    }

    fn job_status(&self, job: &JobHandle) -> Result<JobStatus, ApiError> {
        let mut state = self.state.borrow_mut();
        let key = job.as_str().to_owned();
        *state.status_queries.entry(key.clone()).or_insert(0) += 1;

        if let Some(script) = state.job_scripts.get_mut(&key) {
            return Ok(script
                .pop_front()
                .unwrap_or_else(|| JobStatus::from_provider("DONE", None)));
        }
        if state.stalled_jobs.contains(&key) {
            return Ok(JobStatus {
                state: JobState::Pending,
                message: None,
            });
        }
        if let Some(message) = state.failed_jobs.get(&key) {
            return Ok(JobStatus {
                state: JobState::Failed,
                message: Some(message.clone()),
            });
        }
        if let Some(remaining) = state.pending_jobs.get_mut(&key)
            && *remaining > 0
        {
            *remaining -= 1;
            return Ok(JobStatus {
                state: JobState::Pending,
                message: None,
            });
        }
        if key.starts_with("job-") {
            return Ok(JobStatus::from_provider("DONE", None));
        }
        Err(not_found("request", &key))
    }
}

/// Sleeper that records requested durations instead of blocking.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded sleeps.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Durations requested so far.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Key provider that returns a fixed key and counts requests.
#[derive(Clone, Debug)]
pub struct StaticKeyProvider {
    key: Option<String>,
    requests: Rc<RefCell<u32>>,
}

impl StaticKeyProvider {
    /// Provider that always returns `key`.
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            key: Some(key.to_owned()),
            requests: Rc::default(),
        }
    }

    /// Provider whose key generation always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            key: None,
            requests: Rc::default(),
        }
    }

    /// Number of keys requested so far.
    #[must_use]
    pub fn requests(&self) -> u32 {
        *self.requests.borrow()
    }
}

impl KeyProvider for StaticKeyProvider {
    fn public_key(&self, machine_name: &str) -> Result<String, DriverError> {
        *self.requests.borrow_mut() += 1;
        self.key.clone().ok_or_else(|| {
            DriverError::Credential(format!("no key available for {machine_name}"))
        })
    }
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}
