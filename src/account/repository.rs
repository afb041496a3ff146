/// Account persistence using sqlx runtime queries
use crate::{
    db::models::{Account, Role},
    error::{AuthError, AuthResult},
    guard::lockout::LockoutState,
};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, email, username, name, avatar, google_id, password_hash, role, \
     is_active, is_verified, is_banned, banned_at, banned_until, banned_reason, \
     failed_login_attempts, last_failed_login_attempt, locked_until, created_at, updated_at, last_login";

/// Shared by the sign-up pre-check and the UNIQUE constraint on insert
pub const DUPLICATE_ACCOUNT_MESSAGE: &str = "User with this email or username already exists";

/// Fields supplied when creating an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub username: String,
    pub name: String,
    pub avatar: Option<String>,
    pub google_id: Option<String>,
    pub password_hash: Option<String>,
    pub is_verified: bool,
}

/// Account repository
#[derive(Clone)]
pub struct AccountRepository {
    db: SqlitePool,
}

impl AccountRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Insert a new account with role USER
    pub async fn create(&self, new: NewAccount) -> AuthResult<Account> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO account (id, email, username, name, avatar, google_id, password_hash, role,
                                  is_active, is_verified, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?10)",
        )
        .bind(&id)
        .bind(new.email.to_lowercase())
        .bind(&new.username)
        .bind(&new.name)
        .bind(&new.avatar)
        .bind(&new.google_id)
        .bind(&new.password_hash)
        .bind(Role::User)
        .bind(new.is_verified)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AuthError::BadInput(DUPLICATE_ACCOUNT_MESSAGE.to_string())
            }
            other => AuthError::Database(other),
        })?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| AuthError::Internal("Account vanished after insert".to_string()))
    }

    pub async fn find_by_id(&self, id: &str) -> AuthResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE id = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    /// Lookup by email, case-insensitive
    pub async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE email = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    pub async fn find_by_username(&self, username: &str) -> AuthResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE username = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    pub async fn find_by_google_id(&self, google_id: &str) -> AuthResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM account WHERE google_id = ?1",
            ACCOUNT_COLUMNS
        ))
        .bind(google_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(account)
    }

    pub async fn email_exists(&self, email: &str) -> AuthResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE email = ?1")
            .bind(email.trim().to_lowercase())
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    pub async fn username_exists(&self, username: &str) -> AuthResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM account WHERE username = ?1")
            .bind(username)
            .fetch_one(&self.db)
            .await?;

        Ok(count > 0)
    }

    pub async fn update_last_login(&self, id: &str) -> AuthResult<()> {
        let now = Utc::now();
        sqlx::query("UPDATE account SET last_login = ?1, updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Attach a Google identity to an existing account. Google has verified
    /// the address, so the account becomes verified and active.
    pub async fn link_google(
        &self,
        id: &str,
        google_id: &str,
        avatar: Option<&str>,
    ) -> AuthResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE account
             SET google_id = ?1, avatar = COALESCE(?2, avatar), is_verified = 1, is_active = 1,
                 last_login = ?3, updated_at = ?3
             WHERE id = ?4",
        )
        .bind(google_id)
        .bind(avatar)
        .bind(now)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Refresh profile data from a returning Google sign-in
    pub async fn update_google_profile(
        &self,
        id: &str,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> AuthResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE account
             SET name = COALESCE(?1, name), avatar = COALESCE(?2, avatar), is_active = 1,
                 last_login = ?3, updated_at = ?3
             WHERE id = ?4",
        )
        .bind(name)
        .bind(avatar)
        .bind(now)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn set_active(&self, id: &str, active: bool) -> AuthResult<()> {
        sqlx::query("UPDATE account SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn set_role(&self, id: &str, role: Role) -> AuthResult<()> {
        sqlx::query("UPDATE account SET role = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(role)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn mark_verified(&self, id: &str) -> AuthResult<()> {
        sqlx::query("UPDATE account SET is_verified = 1, updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    pub async fn update_password(&self, id: &str, password_hash: &str) -> AuthResult<()> {
        sqlx::query("UPDATE account SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Failed-login counters, None when the account does not exist
    pub async fn load_lockout(&self, id: &str) -> AuthResult<Option<LockoutState>> {
        let row = sqlx::query(
            "SELECT failed_login_attempts, last_failed_login_attempt, locked_until
             FROM account WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|row| LockoutState {
            failed_attempts: u32::try_from(row.get::<i64, _>("failed_login_attempts").max(0))
                .unwrap_or(u32::MAX),
            last_failed_at: row.get("last_failed_login_attempt"),
            locked_until: row.get("locked_until"),
        }))
    }

    pub async fn store_lockout(&self, id: &str, state: &LockoutState) -> AuthResult<()> {
        sqlx::query(
            "UPDATE account
             SET failed_login_attempts = ?1, last_failed_login_attempt = ?2, locked_until = ?3
             WHERE id = ?4",
        )
        .bind(i64::from(state.failed_attempts))
        .bind(state.last_failed_at)
        .bind(state.locked_until)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Ban an account; `until = None` is permanent
    pub async fn ban(
        &self,
        id: &str,
        until: Option<DateTime<Utc>>,
        reason: Option<&str>,
    ) -> AuthResult<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE account
             SET is_banned = 1, banned_at = ?1, banned_until = ?2, banned_reason = ?3, updated_at = ?1
             WHERE id = ?4",
        )
        .bind(now)
        .bind(until)
        .bind(reason)
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn clear_ban(&self, id: &str) -> AuthResult<()> {
        sqlx::query(
            "UPDATE account
             SET is_banned = 0, banned_at = NULL, banned_until = NULL, banned_reason = NULL,
                 updated_at = ?1
             WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
