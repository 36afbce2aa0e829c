//! Provisioning orchestrator: ordered resource creation with compensating
//! rollback.

use tracing::{info, warn};

use crate::api::{
    CloudApi, DatacenterId, ImageRef, IpBlockId, LanId, NicRequest, ServerId, ServerRequest,
    VolumeId, VolumeRequest,
};
use crate::error::DriverError;
use crate::machine::{DatacenterOrigin, Machine, MachineSpec, ProvisionedResources, ServerStrategy};
use crate::poller::Sleeper;
use crate::steps::ResourceSteps;
use crate::teardown::Teardown;

/// Resources created so far during one create run.
///
/// Identifiers are recorded as soon as the provider accepts a create, before
/// its job is awaited, so rollback also covers resources whose job failed.
/// Blank identifiers are ignored.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunLedger {
    ip_block: Option<IpBlockId>,
    datacenter: Option<(DatacenterId, DatacenterOrigin)>,
    lan: Option<LanId>,
    server: Option<ServerId>,
    volume: Option<VolumeId>,
}

impl RunLedger {
    /// Records the reserved IP block.
    pub fn record_ip_block(&mut self, id: IpBlockId) {
        if !id.is_empty() {
            self.ip_block = Some(id);
        }
    }

    /// Records the datacenter and whether the run created it.
    pub fn record_datacenter(&mut self, id: DatacenterId, origin: DatacenterOrigin) {
        if !id.is_empty() {
            self.datacenter = Some((id, origin));
        }
    }

    /// Records the LAN.
    pub fn record_lan(&mut self, id: LanId) {
        if !id.is_empty() {
            self.lan = Some(id);
        }
    }

    /// Records the server.
    pub fn record_server(&mut self, id: ServerId) {
        if !id.is_empty() {
            self.server = Some(id);
        }
    }

    /// Records the boot volume.
    pub fn record_volume(&mut self, id: VolumeId) {
        if !id.is_empty() {
            self.volume = Some(id);
        }
    }

    /// Reserved IP block, if any.
    #[must_use]
    pub const fn ip_block(&self) -> Option<&IpBlockId> {
        self.ip_block.as_ref()
    }

    /// Datacenter and origin, if any.
    #[must_use]
    pub fn datacenter(&self) -> Option<(&DatacenterId, DatacenterOrigin)> {
        self.datacenter.as_ref().map(|(id, origin)| (id, *origin))
    }

    /// LAN, if any.
    #[must_use]
    pub const fn lan(&self) -> Option<&LanId> {
        self.lan.as_ref()
    }

    /// Server, if any.
    #[must_use]
    pub const fn server(&self) -> Option<&ServerId> {
        self.server.as_ref()
    }

    /// Boot volume, if any.
    #[must_use]
    pub const fn volume(&self) -> Option<&VolumeId> {
        self.volume.as_ref()
    }

    /// Returns `true` when nothing needs compensating.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.ip_block.is_none()
            && self.datacenter.is_none()
            && self.lan.is_none()
            && self.server.is_none()
            && self.volume.is_none()
    }
}

/// Sequences the resource steps of a create run.
pub struct Provisioner<'a, A: ?Sized, S> {
    steps: ResourceSteps<'a, A, S>,
}

struct RunContext<'r> {
    name: &'r str,
    ssh_keys: Vec<String>,
    spec: &'r MachineSpec,
    image: ImageRef,
}

impl<'a, A: CloudApi + ?Sized, S: Sleeper> Provisioner<'a, A, S> {
    /// Builds an orchestrator over the given steps.
    #[must_use]
    pub const fn new(steps: ResourceSteps<'a, A, S>) -> Self {
        Self { steps }
    }

    /// Provisions the IP block, datacenter, LAN, server, volume, and NIC for
    /// `machine`, committing the results to it on success.
    ///
    /// On failure after the IP block is reserved, every recorded resource is
    /// deleted and the block is released before the error is returned. The
    /// machine record is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error, wrapped in
    /// [`DriverError::RollbackFailed`] when the compensating cleanup also
    /// fails.
    pub fn provision(
        &self,
        machine: &mut Machine,
        spec: &MachineSpec,
        image: ImageRef,
    ) -> Result<(), DriverError> {
        let mut ledger = RunLedger::default();
        let context = RunContext {
            name: &machine.name,
            ssh_keys: machine.ssh_public_key.iter().cloned().collect(),
            spec,
            image,
        };
        info!(machine = context.name, strategy = %spec.strategy, "provisioning machine");

        match self.run(context, &mut ledger) {
            Ok(resources) => {
                info!(
                    server = resources.server_id.as_str(),
                    ip = resources.ip_address.as_str(),
                    "machine provisioned"
                );
                machine.commit(resources);
                Ok(())
            }
            Err(err) if ledger.is_empty() => Err(err),
            Err(err) => {
                warn!(error = %err, "provisioning failed");
                let rollback = Teardown::new(self.steps).roll_back(&ledger).err();
                Err(err.with_rollback_failure(rollback))
            }
        }
    }

    fn run(
        &self,
        context: RunContext<'_>,
        ledger: &mut RunLedger,
    ) -> Result<ProvisionedResources, DriverError> {
        let block = self.steps.reserve_ip_block(&context.spec.location)?;
        self.steps.complete("reserve ip block", &block)?;
        ledger.record_ip_block(block.resource.id.clone());
        let address = block
            .resource
            .ips
            .first()
            .cloned()
            .ok_or(DriverError::MissingIp)?;

        let (datacenter, origin) = self.select_datacenter(&context, ledger)?;

        let lan = self.steps.create_lan(&datacenter, context.name)?;
        ledger.record_lan(lan.resource.id.clone());
        self.steps.complete("create lan", &lan)?;

        let nic = NicRequest {
            name: context.name.to_owned(),
            lan: Some(lan.resource.id.clone()),
            ips: vec![address.clone()],
            dhcp: true,
        };
        let server_id = match context.spec.strategy {
            ServerStrategy::Composite => {
                self.create_composite(&datacenter, &context, nic, ledger)?
            }
            ServerStrategy::Stepwise => self.create_stepwise(&datacenter, &context, &nic, ledger)?,
        };

        Ok(ProvisionedResources {
            datacenter_id: datacenter,
            datacenter_origin: origin,
            server_id,
            lan_id: lan.resource.id,
            ip_address: address,
        })
    }

    fn select_datacenter(
        &self,
        context: &RunContext<'_>,
        ledger: &mut RunLedger,
    ) -> Result<(DatacenterId, DatacenterOrigin), DriverError> {
        if let Some(existing) = &context.spec.datacenter_id {
            let datacenter = self.steps.fetch_datacenter(existing)?;
            info!(
                datacenter = datacenter.id.as_str(),
                name = datacenter.name.as_str(),
                "using existing datacenter"
            );
            ledger.record_datacenter(datacenter.id.clone(), DatacenterOrigin::Preexisting);
            return Ok((datacenter.id, DatacenterOrigin::Preexisting));
        }

        let created = self
            .steps
            .create_datacenter(context.name, &context.spec.location)?;
        ledger.record_datacenter(created.resource.id.clone(), DatacenterOrigin::CreatedByRun);
        self.steps.complete("create datacenter", &created)?;
        Ok((created.resource.id, DatacenterOrigin::CreatedByRun))
    }

    fn volume_request(context: &RunContext<'_>) -> VolumeRequest {
        VolumeRequest {
            name: context.name.to_owned(),
            size_gb: context.spec.disk_size_gb,
            disk_type: context.spec.disk_type,
            image: context.image.clone(),
            ssh_keys: context.ssh_keys.clone(),
            availability_zone: context.spec.volume_availability_zone.clone(),
        }
    }

    fn server_request(
        context: &RunContext<'_>,
        volume: Option<VolumeRequest>,
        nic: Option<NicRequest>,
    ) -> ServerRequest {
        ServerRequest {
            name: context.name.to_owned(),
            ram_mb: context.spec.ram_mb,
            cores: context.spec.cores,
            cpu_family: context.spec.cpu_family.clone(),
            availability_zone: context.spec.server_availability_zone.clone(),
            volume,
            nic,
        }
    }

    fn create_composite(
        &self,
        datacenter: &DatacenterId,
        context: &RunContext<'_>,
        nic: NicRequest,
        ledger: &mut RunLedger,
    ) -> Result<ServerId, DriverError> {
        let request =
            Self::server_request(context, Some(Self::volume_request(context)), Some(nic));
        let server = self.steps.create_server(datacenter, &request)?;
        ledger.record_server(server.resource.id.clone());
        if let Some(volume) = server.resource.boot_volume() {
            ledger.record_volume(volume.id.clone());
        }
        self.steps.complete("create server", &server)?;
        Ok(server.resource.id)
    }

    fn create_stepwise(
        &self,
        datacenter: &DatacenterId,
        context: &RunContext<'_>,
        nic: &NicRequest,
        ledger: &mut RunLedger,
    ) -> Result<ServerId, DriverError> {
        let server = self
            .steps
            .create_server(datacenter, &Self::server_request(context, None, None))?;
        ledger.record_server(server.resource.id.clone());
        self.steps.complete("create server", &server)?;
        let server_id = server.resource.id;

        let volume = self
            .steps
            .create_volume(datacenter, &Self::volume_request(context))?;
        ledger.record_volume(volume.resource.id.clone());
        self.steps.complete("create volume", &volume)?;
        self.steps
            .attach_volume(datacenter, &server_id, &volume.resource.id)?;

        let unbound = NicRequest {
            name: nic.name.clone(),
            lan: None,
            ips: Vec::new(),
            dhcp: nic.dhcp,
        };
        let created = self.steps.create_nic(datacenter, &server_id, &unbound)?;
        self.steps.complete("create nic", &created)?;
        self.steps
            .bind_nic(datacenter, &server_id, &created.resource.id, nic)?;
        Ok(server_id)
    }
}
