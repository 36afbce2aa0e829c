//! BDD scenarios for machine removal.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TeardownContext, teardown_context};

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Remove a machine whose datacenter was created for it"
)]
fn scenario_remove_owned_datacenter(teardown_context: TeardownContext) {
    drop(teardown_context);
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Remove a machine from a shared datacenter"
)]
fn scenario_remove_from_shared_datacenter(teardown_context: TeardownContext) {
    drop(teardown_context);
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Remove the last machine from a shared datacenter"
)]
fn scenario_remove_sole_resident(teardown_context: TeardownContext) {
    drop(teardown_context);
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Surface a rejected delete and keep the record"
)]
fn scenario_rejected_delete(teardown_context: TeardownContext) {
    drop(teardown_context);
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Leave IP blocks that do not hold the machine address"
)]
fn scenario_unrelated_ip_block(teardown_context: TeardownContext) {
    drop(teardown_context);
}
