//! Driver fixtures shared by integration tests.
//!
//! Include with:
//!
//! ```rust
//! #[path = "common/driver_fixtures.rs"]
//! mod driver_fixtures;
//! ```

use std::time::Duration;

use pbmachine::api::DiskType;
use pbmachine::test_support::{FakeCloud, RecordingSleeper, StaticKeyProvider};
use pbmachine::{Credentials, Driver, JobPoller, MachineSpec, PollSettings, ServerStrategy};

/// Location every fixture provisions into.
pub const LOCATION: &str = "us/las";

/// Public key handed out by the fixture key provider.
pub const SSH_KEY: &str = "ssh-rsa AAAAfixture pbmachine";

/// Driver wired to the in-memory provider.
pub type TestDriver = Driver<FakeCloud, StaticKeyProvider, RecordingSleeper>;

/// Provider seeded with a location alias and one HDD catalog image.
pub fn seeded_cloud() -> FakeCloud {
    let cloud = FakeCloud::new();
    cloud.seed_location(LOCATION, &["ubuntu:latest"]);
    cloud.seed_image("img-hdd", "Ubuntu-16.04-20180101", "HDD", LOCATION);
    cloud
}

/// Driver over `cloud` allowing `attempts` status queries per job.
pub fn driver(cloud: &FakeCloud, sleeper: &RecordingSleeper, attempts: u32) -> TestDriver {
    let settings = PollSettings::default()
        .with_max_attempts(attempts)
        .with_interval(Duration::from_secs(1));
    Driver::with_poller(
        cloud.clone(),
        Credentials::new("user@example.com", "secret"),
        StaticKeyProvider::new(SSH_KEY),
        JobPoller::new(settings, sleeper.clone()),
    )
}

/// Valid creation parameters for `strategy`, optionally targeting an
/// existing datacenter.
pub fn spec(strategy: ServerStrategy, datacenter: Option<&str>) -> MachineSpec {
    MachineSpec::builder()
        .location(LOCATION)
        .image("Ubuntu-16.04")
        .disk_type(DiskType::Hdd)
        .disk_size_gb(50)
        .ram_mb(2048)
        .cores(4)
        .cpu_family("AMD_OPTERON")
        .server_availability_zone("AUTO")
        .volume_availability_zone("AUTO")
        .datacenter_id(datacenter.map(str::to_owned))
        .strategy(strategy)
        .build()
        .unwrap_or_else(|err| panic!("fixture spec should build: {err}"))
}
