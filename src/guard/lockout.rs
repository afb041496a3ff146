/// Brute-force lockout guard
///
/// Lock state lives on the account row and is resolved lazily: every read
/// first clears a lock whose `locked_until` has passed, so no background
/// sweep is needed for correctness.
use super::minutes_until;
use crate::{
    account::AccountRepository,
    config::LockoutPolicy,
    error::AuthResult,
    metrics,
};
use chrono::{DateTime, Utc};

/// Failed-login counters stored with each account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockoutState {
    pub failed_attempts: u32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Result of reading the lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    Locked {
        locked_until: DateTime<Utc>,
        minutes_remaining: i64,
    },
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockStatus::Locked { .. })
    }
}

/// Result of recording one failed password check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    pub locked_until: Option<DateTime<Utc>>,
    pub remaining_attempts: u32,
}

impl LockoutState {
    /// Clear an expired lock. Returns the new state and whether it changed.
    pub fn reconcile(self, now: DateTime<Utc>) -> (Self, bool) {
        match self.locked_until {
            Some(until) if until <= now => (Self::default(), true),
            _ => (self, false),
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> LockStatus {
        match self.locked_until {
            Some(until) if until > now => LockStatus::Locked {
                locked_until: until,
                minutes_remaining: minutes_until(until, now),
            },
            _ => LockStatus::Unlocked,
        }
    }

    /// Transition for one failed password check
    pub fn after_failure(self, now: DateTime<Utc>, policy: &LockoutPolicy) -> Self {
        let (state, _) = self.reconcile(now);

        let attempts = match state.last_failed_at {
            Some(last) if now - last > policy.reset_window() => 1,
            _ => state.failed_attempts.saturating_add(1),
        };

        let locked_until = if attempts >= policy.max_attempts {
            Some(now + policy.lockout_duration())
        } else {
            state.locked_until
        };

        Self {
            failed_attempts: attempts,
            last_failed_at: Some(now),
            locked_until,
        }
    }

    pub fn remaining_attempts(&self, policy: &LockoutPolicy) -> u32 {
        policy.max_attempts.saturating_sub(self.failed_attempts)
    }
}

/// Tracks failed logins per account and derives the lock state
#[derive(Clone)]
pub struct BruteForceGuard {
    accounts: AccountRepository,
    policy: LockoutPolicy,
}

impl BruteForceGuard {
    pub fn new(accounts: AccountRepository, policy: LockoutPolicy) -> Self {
        Self { accounts, policy }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Current lock state, clearing an expired lock as a side effect
    pub async fn check(&self, account_id: &str) -> AuthResult<LockStatus> {
        let now = Utc::now();
        Ok(match self.load_reconciled(account_id, now).await? {
            Some(state) => state.status(now),
            None => LockStatus::Unlocked,
        })
    }

    /// Stored state with any expired lock already cleared and persisted
    async fn load_reconciled(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<LockoutState>> {
        let Some(state) = self.accounts.load_lockout(account_id).await? else {
            return Ok(None);
        };

        let (state, changed) = state.reconcile(now);
        if changed {
            tracing::info!(account_id, "Lockout period expired, unlocking account");
            self.accounts.store_lockout(account_id, &state).await?;
        }

        Ok(Some(state))
    }

    /// Record a failed password check and lock the account at the threshold
    pub async fn record_failure(&self, account_id: &str) -> AuthResult<FailureOutcome> {
        let Some(state) = self.accounts.load_lockout(account_id).await? else {
            return Ok(FailureOutcome {
                locked_until: None,
                remaining_attempts: self.policy.max_attempts,
            });
        };

        let now = Utc::now();
        let next = state.after_failure(now, &self.policy);
        self.accounts.store_lockout(account_id, &next).await?;

        let locked_until = next.locked_until.filter(|until| *until > now);
        if locked_until.is_some() && !state.status(now).is_locked() {
            tracing::warn!(
                account_id,
                attempts = next.failed_attempts,
                "Account locked after repeated failed logins"
            );
            metrics::ACCOUNT_LOCKOUTS_TOTAL.inc();
        }

        Ok(FailureOutcome {
            locked_until,
            remaining_attempts: next.remaining_attempts(&self.policy),
        })
    }

    /// Clear all failure counters after a successful login
    pub async fn reset(&self, account_id: &str) -> AuthResult<()> {
        self.accounts
            .store_lockout(account_id, &LockoutState::default())
            .await
    }

    /// Attempts left before the account locks
    pub async fn remaining_attempts(&self, account_id: &str) -> AuthResult<u32> {
        Ok(match self.load_reconciled(account_id, Utc::now()).await? {
            Some(state) => state.remaining_attempts(&self.policy),
            None => self.policy.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::db;
    use chrono::Duration;

    fn policy() -> LockoutPolicy {
        LockoutPolicy::default()
    }

    #[test]
    fn test_fifth_failure_locks() {
        let now = Utc::now();
        let mut state = LockoutState::default();

        for attempt in 1..=4 {
            state = state.after_failure(now, &policy());
            assert_eq!(state.failed_attempts, attempt);
            assert!(!state.status(now).is_locked());
        }
        assert_eq!(state.remaining_attempts(&policy()), 1);

        state = state.after_failure(now, &policy());
        assert_eq!(state.failed_attempts, 5);
        assert_eq!(state.locked_until, Some(now + Duration::minutes(15)));
        assert_eq!(
            state.status(now),
            LockStatus::Locked {
                locked_until: now + Duration::minutes(15),
                minutes_remaining: 15
            }
        );
        assert_eq!(state.remaining_attempts(&policy()), 0);
    }

    #[test]
    fn test_stale_failure_restarts_count() {
        let now = Utc::now();
        let state = LockoutState {
            failed_attempts: 4,
            last_failed_at: Some(now - Duration::minutes(31)),
            locked_until: None,
        };

        let next = state.after_failure(now, &policy());
        assert_eq!(next.failed_attempts, 1);
        assert_eq!(next.last_failed_at, Some(now));
        assert!(next.locked_until.is_none());
    }

    #[test]
    fn test_failure_inside_window_increments() {
        let now = Utc::now();
        let state = LockoutState {
            failed_attempts: 2,
            last_failed_at: Some(now - Duration::minutes(29)),
            locked_until: None,
        };

        assert_eq!(state.after_failure(now, &policy()).failed_attempts, 3);
    }

    #[test]
    fn test_expired_lock_resets_before_counting() {
        let now = Utc::now();
        let state = LockoutState {
            failed_attempts: 5,
            last_failed_at: Some(now - Duration::minutes(16)),
            locked_until: Some(now - Duration::minutes(1)),
        };

        let (reconciled, changed) = state.reconcile(now);
        assert!(changed);
        assert_eq!(reconciled, LockoutState::default());

        let next = state.after_failure(now, &policy());
        assert_eq!(next.failed_attempts, 1);
        assert!(next.locked_until.is_none());
    }

    #[test]
    fn test_minutes_remaining_rounds_up() {
        let now = Utc::now();
        let state = LockoutState {
            failed_attempts: 5,
            last_failed_at: Some(now),
            locked_until: Some(now + Duration::seconds(61)),
        };
        match state.status(now) {
            LockStatus::Locked { minutes_remaining, .. } => assert_eq!(minutes_remaining, 2),
            LockStatus::Unlocked => panic!("expected lock"),
        }
    }

    async fn guard_with_account() -> (BruteForceGuard, AccountRepository, String) {
        let pool = db::create_memory_pool().await.unwrap();
        let accounts = AccountRepository::new(pool);
        let account = accounts
            .create(NewAccount {
                email: "lock@example.com".to_string(),
                username: "lockme".to_string(),
                name: "Lock Me".to_string(),
                avatar: None,
                google_id: None,
                password_hash: Some("hash".to_string()),
                is_verified: true,
            })
            .await
            .unwrap();
        let guard = BruteForceGuard::new(accounts.clone(), LockoutPolicy::default());
        (guard, accounts, account.id)
    }

    #[tokio::test]
    async fn test_guard_locks_and_persists() {
        let (guard, accounts, id) = guard_with_account().await;

        for expected_remaining in (1..=4).rev() {
            let outcome = guard.record_failure(&id).await.unwrap();
            assert!(outcome.locked_until.is_none());
            assert_eq!(outcome.remaining_attempts, expected_remaining);
        }

        let outcome = guard.record_failure(&id).await.unwrap();
        assert!(outcome.locked_until.is_some());
        assert!(guard.check(&id).await.unwrap().is_locked());

        let stored = accounts.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 5);
        assert!(stored.locked_until.is_some());
    }

    #[tokio::test]
    async fn test_guard_success_resets_counter() {
        let (guard, accounts, id) = guard_with_account().await;

        guard.record_failure(&id).await.unwrap();
        guard.record_failure(&id).await.unwrap();
        guard.reset(&id).await.unwrap();

        assert_eq!(guard.remaining_attempts(&id).await.unwrap(), 5);
        let stored = accounts.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.last_failed_login_attempt.is_none());
        assert!(stored.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_guard_clears_expired_lock_on_read() {
        let (guard, accounts, id) = guard_with_account().await;
        let now = Utc::now();
        accounts
            .store_lockout(
                &id,
                &LockoutState {
                    failed_attempts: 5,
                    last_failed_at: Some(now - Duration::minutes(20)),
                    locked_until: Some(now - Duration::minutes(5)),
                },
            )
            .await
            .unwrap();

        assert_eq!(guard.check(&id).await.unwrap(), LockStatus::Unlocked);
        let stored = accounts.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.locked_until.is_none());
    }
    #[tokio::test]
    async fn test_remaining_attempts_after_expired_lock() {
        let (guard, accounts, id) = guard_with_account().await;
        let now = Utc::now();
        accounts
            .store_lockout(
                &id,
                &LockoutState {
                    failed_attempts: 5,
                    last_failed_at: Some(now - Duration::minutes(20)),
                    locked_until: Some(now - Duration::minutes(5)),
                },
            )
            .await
            .unwrap();

        assert_eq!(guard.remaining_attempts(&id).await.unwrap(), 5);
        let stored = accounts.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.locked_until.is_none());
    }
}
