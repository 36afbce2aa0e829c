//! BDD step definitions for machine removal.

use pbmachine::api::ApiError;
use pbmachine::test_support::Call;
use pbmachine::{DriverError, MachineDriver};
use rstest_bdd_macros::{given, then, when};

use super::test_helpers::{RemoveOutcome, TeardownContext};
use crate::driver_fixtures::{LOCATION, SSH_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        Err(StepError::Assertion(message()))
    }
}

#[given("a machine provisioned in its own datacenter")]
fn provisioned_in_own_datacenter(teardown_context: TeardownContext) -> TeardownContext {
    teardown_context.provision(None)
}

#[given("a shared datacenter \"{datacenter}\" hosting server \"{server}\"")]
fn shared_datacenter_with_server(
    teardown_context: TeardownContext,
    datacenter: String,
    server: String,
) -> TeardownContext {
    teardown_context
        .cloud
        .seed_datacenter(&datacenter, "shared", LOCATION);
    teardown_context
        .cloud
        .seed_server(&datacenter, &server, "AVAILABLE", "198.51.100.9");
    teardown_context
}

#[given("an empty shared datacenter \"{datacenter}\"")]
fn empty_shared_datacenter(teardown_context: TeardownContext, datacenter: String) -> TeardownContext {
    teardown_context
        .cloud
        .seed_datacenter(&datacenter, "shared", LOCATION);
    teardown_context
}

#[given("an unrelated IP block \"{block}\" holding \"{address}\"")]
fn unrelated_ip_block(
    teardown_context: TeardownContext,
    block: String,
    address: String,
) -> TeardownContext {
    teardown_context
        .cloud
        .seed_ip_block(&block, LOCATION, &[address.as_str()]);
    teardown_context
}

#[given("a machine provisioned in datacenter \"{datacenter}\"")]
fn provisioned_in_datacenter(
    teardown_context: TeardownContext,
    datacenter: String,
) -> TeardownContext {
    teardown_context.provision(Some(&datacenter))
}

#[given("datacenter deletion is rejected with status \"{status}\"")]
fn datacenter_deletion_rejected(teardown_context: TeardownContext, status: u16) -> TeardownContext {
    teardown_context.cloud.fail_call(
        Call::DeleteDatacenter,
        ApiError::Rejected {
            status,
            body: String::from("internal error"),
        },
    );
    teardown_context
}

#[when("the machine is removed")]
fn remove_machine(teardown_context: TeardownContext) -> TeardownContext {
    let mut machine = teardown_context.machine.clone();
    let outcome = match teardown_context.driver().remove(&mut machine) {
        Ok(()) => RemoveOutcome::Removed,
        Err(err) => RemoveOutcome::Rejected {
            status: match &err {
                DriverError::ProviderRejected { status, .. } => Some(*status),
                _ => None,
            },
            message: err.to_string(),
        },
    };
    TeardownContext {
        machine,
        outcome: Some(outcome),
        ..teardown_context
    }
}

#[then("the machine's datacenter no longer exists")]
fn datacenter_deleted(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let committed = teardown_context.committed();
    let datacenter = committed
        .datacenter_id
        .as_ref()
        .ok_or_else(|| StepError::Assertion(String::from("no datacenter was committed")))?;
    check(!teardown_context.cloud.has_datacenter(datacenter.as_str()), || {
        format!("datacenter {datacenter} should be deleted")
    })
}

#[then("the machine's IP block is released")]
fn ip_block_released(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let address = teardown_context
        .committed()
        .ip_address
        .as_deref()
        .ok_or_else(|| StepError::Assertion(String::from("no IP address was committed")))?;
    let holder = teardown_context.cloud.ip_block_holding(address);
    check(holder.is_none(), || {
        format!("block {holder:?} still holds the machine address {address}")
    })
}

#[then("exactly one IP block release was issued")]
fn single_release(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let released = teardown_context.cloud.targets(Call::ReleaseIpBlock);
    check(released.len() == 1, || {
        format!("expected one release call, found {released:?}")
    })
}

#[then("IP block \"{block}\" still exists")]
fn ip_block_kept(teardown_context: &TeardownContext, block: String) -> Result<(), StepError> {
    let remaining = teardown_context.cloud.ip_block_ids();
    check(remaining.contains(&block), || {
        format!("block {block} should be kept, found {remaining:?}")
    })
}

#[then("the machine record is cleared")]
fn record_cleared(teardown_context: &TeardownContext) -> Result<(), StepError> {
    let machine = &teardown_context.machine;
    check(
        teardown_context.outcome == Some(RemoveOutcome::Removed),
        || format!("expected removal to succeed, got {:?}", teardown_context.outcome),
    )?;
    check(
        machine.server_address().is_err() && machine.ip_address.is_none(),
        || format!("resource identifiers should be cleared: {machine:?}"),
    )?;
    check(machine.ssh_public_key.as_deref() == Some(SSH_KEY), || {
        String::from("the SSH key should survive removal")
    })
}

#[then("datacenter \"{datacenter}\" still exists")]
fn datacenter_still_exists(
    teardown_context: &TeardownContext,
    datacenter: String,
) -> Result<(), StepError> {
    check(teardown_context.cloud.has_datacenter(&datacenter), || {
        format!("datacenter {datacenter} should be kept")
    })
}

#[then("datacenter \"{datacenter}\" only hosts server \"{server}\"")]
fn datacenter_only_hosts(
    teardown_context: &TeardownContext,
    datacenter: String,
    server: String,
) -> Result<(), StepError> {
    let cloud = &teardown_context.cloud;
    let servers = cloud.server_ids(&datacenter);
    check(servers == [server.as_str()], || {
        format!("expected only {server}, found {servers:?}")
    })?;
    let volumes = cloud.volume_ids(&datacenter);
    check(volumes == [format!("{server}-volume")], || {
        format!("expected only the volume of {server}, found {volumes:?}")
    })?;
    let lans = cloud.lan_ids(&datacenter);
    check(lans.is_empty(), || {
        format!("the machine's LAN should be deleted, found {lans:?}")
    })
}

#[then("the removal fails with status \"{status}\"")]
fn removal_fails(teardown_context: &TeardownContext, status: u16) -> Result<(), StepError> {
    match &teardown_context.outcome {
        Some(RemoveOutcome::Rejected {
            status: Some(actual),
            message,
        }) if *actual == status && message.contains(&status.to_string()) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected rejection with status {status}, got {other:?}"
        ))),
    }
}

#[then("the machine record is kept")]
fn record_kept(teardown_context: &TeardownContext) -> Result<(), StepError> {
    check(
        &teardown_context.machine == teardown_context.committed(),
        || format!("record should be unchanged: {:?}", teardown_context.machine),
    )
}
