// Driver loop: walks every contest × user pair in order, one request at a
// time, and keeps going past individual failures. The loop is written
// against `RegistrationBackend` so it can be exercised without a server.

use crate::action::Action;
use crate::api::ApiClient;
use crate::error::RegistrationError;
use crate::users::UserSpec;
use indicatif::ProgressBar;
use std::fmt;
use tracing::info;

/// Anything that can apply one registration change.
pub trait RegistrationBackend {
    fn apply(&self, contest_id: i64, user: &UserSpec, action: Action)
        -> Result<(), RegistrationError>;
}

impl RegistrationBackend for ApiClient {
    fn apply(
        &self,
        contest_id: i64,
        user: &UserSpec,
        action: Action,
    ) -> Result<(), RegistrationError> {
        self.change_registration(contest_id, user, action).map(|_| ())
    }
}

/// One failed (contest, user) pair.
#[derive(Debug)]
pub struct Failure {
    pub contest_id: i64,
    pub user: String,
    pub error: RegistrationError,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contest {}, user {}: {}", self.contest_id, self.user, self.error)
    }
}

#[derive(Debug, Default)]
pub struct Outcome {
    pub succeeded: usize,
    pub failures: Vec<Failure>,
}

impl Outcome {
    pub fn total(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Apply `action` for every contest (outer) and user (inner). Success
/// lines are logged as they happen; failures are collected for the
/// caller to report.
pub fn run_all<B: RegistrationBackend>(
    backend: &B,
    contests: &[i64],
    users: &[UserSpec],
    action: Action,
    progress: &ProgressBar,
) -> Outcome {
    let mut outcome = Outcome::default();

    for &contest_id in contests {
        for user in users {
            progress.set_message(format!("contest {} {}", contest_id, user));
            match backend.apply(contest_id, user, action) {
                Ok(()) => {
                    outcome.succeeded += 1;
                    progress.suspend(|| {
                        info!("{} user {} for contest {}", action.verb(), user, contest_id)
                    });
                }
                Err(error) => outcome.failures.push(Failure {
                    contest_id,
                    user: user.identifier(),
                    error,
                }),
            }
            progress.inc(1);
        }
    }

    outcome
}
