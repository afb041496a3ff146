/// Ban evaluation
///
/// Temporary bans lift themselves: the first evaluation after
/// `banned_until` clears the ban fields on the account.
use super::minutes_until;
use crate::{
    account::AccountRepository,
    db::models::Account,
    error::{AuthError, AuthResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a ban check, shown to clients when the ban is in force
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanStatus {
    pub is_banned: bool,
    pub is_permanent: bool,
    pub banned_until: Option<DateTime<Utc>>,
    pub banned_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    pub minutes_remaining: Option<i64>,
    pub message: String,
}

impl BanStatus {
    pub fn not_banned() -> Self {
        Self {
            is_banned: false,
            is_permanent: false,
            banned_until: None,
            banned_reason: None,
            banned_at: None,
            minutes_remaining: None,
            message: String::new(),
        }
    }
}

/// Pure ban decision for a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanDecision {
    NotBanned,
    /// Temporary ban whose end has passed; the fields must be cleared
    Expired,
    Active(BanStatus),
}

pub fn evaluate(account: &Account, now: DateTime<Utc>) -> BanDecision {
    if !account.is_banned {
        return BanDecision::NotBanned;
    }

    if let Some(until) = account.banned_until {
        if until < now {
            return BanDecision::Expired;
        }
    }

    let reason = account.banned_reason.as_deref().filter(|r| !r.is_empty());
    let (is_permanent, minutes_remaining, message) = match account.banned_until {
        None => {
            let reason = reason.map(|r| format!(" Reason: {}", r)).unwrap_or_default();
            (
                true,
                None,
                format!(
                    "Your account has been permanently banned.{} Please contact support if you believe this is an error.",
                    reason
                ),
            )
        }
        Some(until) => {
            let minutes = minutes_until(until, now);
            let minutes_text = if minutes > 0 {
                format!("{} minute(s)", minutes)
            } else {
                "a few moments".to_string()
            };
            let reason = reason.map(|r| format!(" Reason: {}.", r)).unwrap_or_default();
            (
                false,
                Some(minutes),
                format!(
                    "Your account has been temporarily banned. Please try again in {}.{}",
                    minutes_text, reason
                ),
            )
        }
    };

    BanDecision::Active(BanStatus {
        is_banned: true,
        is_permanent,
        banned_until: account.banned_until,
        banned_reason: account.banned_reason.clone(),
        banned_at: account.banned_at,
        minutes_remaining,
        message,
    })
}

/// Evaluates bans and lifts expired ones
#[derive(Clone)]
pub struct BanEvaluator {
    accounts: AccountRepository,
}

impl BanEvaluator {
    pub fn new(accounts: AccountRepository) -> Self {
        Self { accounts }
    }

    /// Ban status of an account; an expired ban is cleared in storage and
    /// on the passed record
    pub async fn check(&self, account: &mut Account) -> AuthResult<BanStatus> {
        match evaluate(account, Utc::now()) {
            BanDecision::NotBanned => Ok(BanStatus::not_banned()),
            BanDecision::Expired => {
                tracing::info!(account_id = %account.id, "Temporary ban expired, lifting");
                self.accounts.clear_ban(&account.id).await?;
                account.is_banned = false;
                account.banned_at = None;
                account.banned_until = None;
                account.banned_reason = None;
                Ok(BanStatus::not_banned())
            }
            BanDecision::Active(status) => Ok(status),
        }
    }

    /// Fail with the ban status when a ban is in force
    pub async fn ensure_not_banned(&self, account: &mut Account) -> AuthResult<()> {
        let status = self.check(account).await?;
        if status.is_banned {
            return Err(AuthError::AccountBanned(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::db;
    use chrono::Duration;

    async fn setup() -> (BanEvaluator, AccountRepository, Account) {
        let pool = db::create_memory_pool().await.unwrap();
        let accounts = AccountRepository::new(pool);
        let account = accounts
            .create(NewAccount {
                email: "banned@example.com".to_string(),
                username: "banned".to_string(),
                name: "Banned User".to_string(),
                avatar: None,
                google_id: None,
                password_hash: None,
                is_verified: true,
            })
            .await
            .unwrap();
        (BanEvaluator::new(accounts.clone()), accounts, account)
    }

    #[tokio::test]
    async fn test_unbanned_account() {
        let (evaluator, _, mut account) = setup().await;
        let status = evaluator.check(&mut account).await.unwrap();
        assert_eq!(status, BanStatus::not_banned());
    }

    #[tokio::test]
    async fn test_permanent_ban_with_reason() {
        let (evaluator, accounts, account) = setup().await;
        accounts
            .ban(&account.id, None, Some("cheating"))
            .await
            .unwrap();
        let mut account = accounts.find_by_id(&account.id).await.unwrap().unwrap();

        let status = evaluator.check(&mut account).await.unwrap();
        assert!(status.is_banned);
        assert!(status.is_permanent);
        assert!(status.minutes_remaining.is_none());
        assert_eq!(
            status.message,
            "Your account has been permanently banned. Reason: cheating Please contact support if you believe this is an error."
        );

        let err = evaluator.ensure_not_banned(&mut account).await.unwrap_err();
        assert!(matches!(err, AuthError::AccountBanned(_)));
    }

    #[tokio::test]
    async fn test_temporary_ban_reports_minutes() {
        let (evaluator, accounts, account) = setup().await;
        let until = Utc::now() + Duration::minutes(90) - Duration::seconds(30);
        accounts.ban(&account.id, Some(until), None).await.unwrap();
        let mut account = accounts.find_by_id(&account.id).await.unwrap().unwrap();

        let status = evaluator.check(&mut account).await.unwrap();
        assert!(status.is_banned);
        assert!(!status.is_permanent);
        assert_eq!(status.minutes_remaining, Some(90));
        assert_eq!(
            status.message,
            "Your account has been temporarily banned. Please try again in 90 minute(s)."
        );
    }

    #[tokio::test]
    async fn test_expired_ban_is_lifted() {
        let (evaluator, accounts, account) = setup().await;
        let until = Utc::now() - Duration::minutes(1);
        accounts
            .ban(&account.id, Some(until), Some("spam"))
            .await
            .unwrap();
        let mut account = accounts.find_by_id(&account.id).await.unwrap().unwrap();

        let status = evaluator.check(&mut account).await.unwrap();
        assert!(!status.is_banned);
        assert!(!account.is_banned);

        let stored = accounts.find_by_id(&account.id).await.unwrap().unwrap();
        assert!(!stored.is_banned);
        assert!(stored.banned_until.is_none());
        assert!(stored.banned_reason.is_none());
        assert!(stored.banned_at.is_none());
    }
}
