//! Reverses provisioning: removal of a committed machine and rollback of a
//! failed run.

use tracing::info;

use crate::api::{CloudApi, DatacenterId, LanId, Server, ServerId, VolumeId};
use crate::error::DriverError;
use crate::machine::{DatacenterOrigin, Machine};
use crate::poller::Sleeper;
use crate::provision::RunLedger;
use crate::steps::ResourceSteps;

/// Deletes machine resources in dependency order.
pub struct Teardown<'a, A: ?Sized, S> {
    steps: ResourceSteps<'a, A, S>,
}

/// Rollback may race resources whose create job failed; a 404 means there
/// is nothing left to delete.
fn tolerate_missing(result: Result<(), DriverError>) -> Result<(), DriverError> {
    match result {
        Err(DriverError::ProviderRejected { status: 404, .. }) => Ok(()),
        other => other,
    }
}

impl<'a, A: CloudApi + ?Sized, S: Sleeper> Teardown<'a, A, S> {
    /// Builds a controller over the given steps.
    #[must_use]
    pub const fn new(steps: ResourceSteps<'a, A, S>) -> Self {
        Self { steps }
    }

    /// Removes every provider resource recorded on `machine`.
    ///
    /// A preexisting datacenter is only deleted whole when this machine's
    /// server is its sole resident; otherwise the volume, server, and LAN are
    /// deleted in that order. The IP block holding the machine's address is
    /// released last. The machine record is not modified.
    ///
    /// # Errors
    ///
    /// Returns the first failing delete; nothing is retried.
    pub fn remove(&self, machine: &Machine) -> Result<(), DriverError> {
        if let Some(datacenter) = &machine.datacenter_id {
            match machine.datacenter_origin {
                DatacenterOrigin::CreatedByRun => self.steps.delete_datacenter(datacenter)?,
                DatacenterOrigin::Preexisting => self.remove_from_shared(
                    datacenter,
                    machine.server_id.as_ref(),
                    machine.lan_id.as_ref(),
                )?,
            }
        }

        if let Some(address) = machine.ip_address.as_deref() {
            let released = self.release_blocks_holding(address)?;
            info!(address, released, "released IP blocks");
        }
        Ok(())
    }

    fn remove_from_shared(
        &self,
        datacenter: &DatacenterId,
        server_id: Option<&ServerId>,
        lan: Option<&LanId>,
    ) -> Result<(), DriverError> {
        let servers = self.steps.list_servers(datacenter)?;
        let ours = server_id.and_then(|id| servers.iter().find(|server| server.id == *id));

        if server_id.is_some_and(|id| is_sole_resident(&servers, id)) {
            info!(
                datacenter = datacenter.as_str(),
                "machine is the sole resident; deleting datacenter"
            );
            return self.steps.delete_datacenter(datacenter);
        }

        if let Some(server) = ours {
            if let Some(volume) = server.boot_volume() {
                self.steps.delete_volume(datacenter, &volume.id)?;
            }
            self.steps.delete_server(datacenter, &server.id)?;
        }
        if let Some(lan_id) = lan {
            self.steps.delete_lan(datacenter, lan_id)?;
        }
        Ok(())
    }

    /// Releases every IP block whose addresses include `address`.
    ///
    /// # Errors
    ///
    /// Returns the classified provider error when listing or releasing fails.
    pub fn release_blocks_holding(&self, address: &str) -> Result<usize, DriverError> {
        let blocks = self.steps.list_ip_blocks()?;
        let mut released = 0;
        for block in blocks
            .iter()
            .filter(|block| block.ips.iter().any(|ip| ip == address))
        {
            self.steps.release_ip_block(&block.id)?;
            released += 1;
        }
        Ok(released)
    }

    /// Compensates a failed create using the resources recorded in `ledger`.
    ///
    /// Resources are deleted in the same order as [`Teardown::remove`];
    /// identifiers the run never obtained are skipped. The reserved IP block
    /// is released by identifier even when an earlier delete fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn roll_back(&self, ledger: &RunLedger) -> Result<(), DriverError> {
        info!("rolling back partially provisioned resources");
        let resources = ledger.datacenter().map_or(Ok(()), |(datacenter, origin)| {
            match origin {
                DatacenterOrigin::CreatedByRun => {
                    tolerate_missing(self.steps.delete_datacenter(datacenter))
                }
                DatacenterOrigin::Preexisting => self.roll_back_shared(datacenter, ledger),
            }
        });

        let block = ledger.ip_block().map_or(Ok(()), |id| {
            tolerate_missing(self.steps.release_ip_block(id))
        });

        resources.and(block)
    }

    fn roll_back_shared(
        &self,
        datacenter: &DatacenterId,
        ledger: &RunLedger,
    ) -> Result<(), DriverError> {
        if let Some(volume) = self.rollback_volume(datacenter, ledger)? {
            tolerate_missing(self.steps.delete_volume(datacenter, &volume))?;
        }
        if let Some(server) = ledger.server() {
            tolerate_missing(self.steps.delete_server(datacenter, server))?;
        }
        if let Some(lan) = ledger.lan() {
            tolerate_missing(self.steps.delete_lan(datacenter, lan))?;
        }
        Ok(())
    }

    /// Volume to delete: the recorded one, or the boot volume a composite
    /// create attached to the recorded server.
    fn rollback_volume(
        &self,
        datacenter: &DatacenterId,
        ledger: &RunLedger,
    ) -> Result<Option<VolumeId>, DriverError> {
        if let Some(volume) = ledger.volume() {
            return Ok(Some(volume.clone()));
        }
        let Some(server) = ledger.server() else {
            return Ok(None);
        };
        match self.steps.fetch_server(datacenter, server) {
            Ok(found) => Ok(found.boot_volume().map(|volume| volume.id.clone())),
            Err(DriverError::ProviderRejected { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

fn is_sole_resident(servers: &[Server], server: &ServerId) -> bool {
    matches!(servers, [only] if only.id == *server)
}
