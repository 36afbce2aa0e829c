//! Shared fixtures for machine removal scenarios.

use pbmachine::test_support::{FakeCloud, RecordingSleeper};
use pbmachine::{Machine, MachineDriver, ServerStrategy};
use rstest::fixture;

use crate::driver_fixtures::{TestDriver, driver, seeded_cloud, spec};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemoveOutcome {
    Removed,
    Rejected { status: Option<u16>, message: String },
}

#[derive(Clone, Debug)]
pub struct TeardownContext {
    pub cloud: FakeCloud,
    pub machine: Machine,
    /// Record as committed by create, before removal.
    pub committed: Option<Machine>,
    pub outcome: Option<RemoveOutcome>,
}

impl TeardownContext {
    pub fn driver(&self) -> TestDriver {
        driver(&self.cloud, &RecordingSleeper::new(), 3)
    }

    /// Creates the machine, optionally inside an existing datacenter.
    pub fn provision(mut self, datacenter: Option<&str>) -> Self {
        let mut machine = Machine::new("box");
        self.driver()
            .create(&mut machine, &spec(ServerStrategy::Composite, datacenter))
            .unwrap_or_else(|err| panic!("machine should provision: {err}"));
        self.committed = Some(machine.clone());
        self.machine = machine;
        self
    }

    pub fn committed(&self) -> &Machine {
        self.committed
            .as_ref()
            .unwrap_or_else(|| panic!("scenario should provision a machine first"))
    }
}

#[fixture]
pub fn teardown_context() -> TeardownContext {
    TeardownContext {
        cloud: seeded_cloud(),
        machine: Machine::new("box"),
        committed: None,
        outcome: None,
    }
}
