/// Pre-credential gates
///
/// Both gates run before any password work: the ban evaluator decides
/// whether an administrative suspension is still in force, the lockout
/// guard throttles repeated failed logins.

pub mod ban;
pub mod lockout;

pub use ban::{BanEvaluator, BanStatus};
pub use lockout::{BruteForceGuard, FailureOutcome, LockStatus, LockoutState};

/// Whole minutes until `until`, rounded up
pub(crate) fn minutes_until(until: chrono::DateTime<chrono::Utc>, now: chrono::DateTime<chrono::Utc>) -> i64 {
    let millis = (until - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + 59_999) / 60_000
    }
}
