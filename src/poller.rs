//! Blocking wait for asynchronous provider jobs.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::api::{CloudApi, JobHandle, JobState};
use crate::error::DriverError;

/// Default number of status queries before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Default pause between status queries.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Abstraction over sleeping so tests can observe waits without blocking.
pub trait Sleeper {
    /// Blocks the caller for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by [`std::thread::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Poll budget applied to every job wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    max_attempts: u32,
    interval: Duration,
}

impl PollSettings {
    /// Replaces the attempt budget. Zero is raised to one so every wait
    /// queries at least once.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        self
    }

    /// Replaces the pause between attempts.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Number of status queries allowed per job.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between status queries.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Waits for provider jobs to reach a terminal state.
#[derive(Clone, Debug)]
pub struct JobPoller<S> {
    settings: PollSettings,
    sleeper: S,
}

impl<S: Sleeper> JobPoller<S> {
    /// Creates a poller with the given budget and sleeper.
    #[must_use]
    pub const fn new(settings: PollSettings, sleeper: S) -> Self {
        Self { settings, sleeper }
    }

    /// Budget applied to each wait.
    #[must_use]
    pub const fn settings(&self) -> PollSettings {
        self.settings
    }

    /// Blocks until `job` is DONE.
    ///
    /// `operation` names the call that produced the handle and is only used
    /// to label errors.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::EmptyJobHandle`] for a blank handle,
    /// [`DriverError::JobFailed`] when the job reports FAILED,
    /// [`DriverError::Timeout`] when the budget runs out, and the classified
    /// provider error when the status query itself fails.
    pub fn await_completion<A: CloudApi + ?Sized>(
        &self,
        api: &A,
        operation: &str,
        job: &JobHandle,
    ) -> Result<(), DriverError> {
        if job.is_empty() {
            return Err(DriverError::EmptyJobHandle {
                operation: operation.to_owned(),
            });
        }

        let budget = self.settings.max_attempts;
        for attempt in 1..=budget {
            let status = api
                .job_status(job)
                .map_err(|err| DriverError::from_api(operation, err))?;
            debug!(job = job.as_str(), attempt, state = ?status.state, "polled job status");
            match status.state {
                JobState::Done => {
                    debug!(job = job.as_str(), operation, "job completed");
                    return Ok(());
                }
                JobState::Failed => {
                    return Err(DriverError::JobFailed {
                        job: job.clone(),
                        message: status
                            .message
                            .unwrap_or_else(|| String::from("no message provided")),
                    });
                }
                JobState::Pending if attempt < budget => self.sleeper.sleep(self.settings.interval),
                JobState::Pending => {}
            }
        }

        Err(DriverError::Timeout {
            job: job.clone(),
            attempts: budget,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::JobStatus;
    use crate::test_support::{FakeCloud, RecordingSleeper};
    use rstest::{fixture, rstest};

    #[fixture]
    fn cloud() -> FakeCloud {
        FakeCloud::new()
    }

    fn poller(attempts: u32, sleeper: RecordingSleeper) -> JobPoller<RecordingSleeper> {
        JobPoller::new(
            PollSettings::default()
                .with_max_attempts(attempts)
                .with_interval(Duration::from_millis(5)),
            sleeper,
        )
    }

    #[rstest]
    fn done_on_first_query_does_not_sleep(cloud: FakeCloud) {
        let sleeper = RecordingSleeper::new();
        cloud.script_job("req-1", [JobStatus::from_provider("DONE", None)]);

        poller(5, sleeper.clone())
            .await_completion(&cloud, "create lan", &JobHandle::from("req-1"))
            .unwrap_or_else(|err| panic!("await: {err}"));

        assert!(sleeper.sleeps().is_empty());
        assert_eq!(cloud.status_queries("req-1"), 1);
    }

    #[rstest]
    fn pending_then_done_sleeps_between_queries(cloud: FakeCloud) {
        let sleeper = RecordingSleeper::new();
        cloud.script_job(
            "req-1",
            [
                JobStatus::from_provider("QUEUED", None),
                JobStatus::from_provider("RUNNING", None),
                JobStatus::from_provider("DONE", None),
            ],
        );

        poller(5, sleeper.clone())
            .await_completion(&cloud, "create lan", &JobHandle::from("req-1"))
            .unwrap_or_else(|err| panic!("await: {err}"));

        assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(5); 2]);
        assert_eq!(cloud.status_queries("req-1"), 3);
    }

    #[rstest]
    fn failed_job_stops_polling(cloud: FakeCloud) {
        cloud.script_job(
            "req-1",
            [JobStatus::from_provider(
                "FAILED",
                Some(String::from("quota exceeded")),
            )],
        );

        let err = poller(5, RecordingSleeper::new())
            .await_completion(&cloud, "create server", &JobHandle::from("req-1"))
            .err()
            .unwrap_or_else(|| panic!("failed job should error"));

        let DriverError::JobFailed { message, .. } = err else {
            panic!("expected JobFailed, got {err:?}");
        };
        assert_eq!(message, "quota exceeded");
        assert_eq!(cloud.status_queries("req-1"), 1);
    }

    #[rstest]
    fn budget_exhaustion_times_out_without_trailing_sleep(cloud: FakeCloud) {
        let sleeper = RecordingSleeper::new();
        cloud.stall_job("req-1");

        let err = poller(3, sleeper.clone())
            .await_completion(&cloud, "create server", &JobHandle::from("req-1"))
            .err()
            .unwrap_or_else(|| panic!("stalled job should time out"));

        assert!(matches!(err, DriverError::Timeout { attempts: 3, .. }));
        assert_eq!(cloud.status_queries("req-1"), 3);
        assert_eq!(sleeper.sleeps().len(), 2);
    }

    #[rstest]
    fn empty_handle_is_rejected_without_querying(cloud: FakeCloud) {
        let err = poller(3, RecordingSleeper::new())
            .await_completion(&cloud, "create lan", &JobHandle::default())
            .err()
            .unwrap_or_else(|| panic!("empty handle should error"));

        assert!(matches!(err, DriverError::EmptyJobHandle { .. }));
        assert_eq!(cloud.total_status_queries(), 0);
    }

    #[test]
    fn zero_attempts_is_raised_to_one() {
        let settings = PollSettings::default().with_max_attempts(0);
        assert_eq!(settings.max_attempts(), 1);
    }
}
