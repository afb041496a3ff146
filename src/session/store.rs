use super::ClientInfo;
use crate::{
    auth::token::TokenPair,
    db::models::Session,
    error::{AuthError, AuthResult},
    metrics,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

const SESSION_COLUMNS: &str = "id, user_id, access_token, refresh_token, access_token_expires_at, \
     refresh_token_expires_at, is_active, device_info, ip_address, created_at, last_used_at";

/// Persistence of session records keyed by token values
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(
        &self,
        account_id: &str,
        tokens: &TokenPair,
        client: &ClientInfo,
    ) -> AuthResult<Session>;

    /// Active session whose access token has not expired
    async fn find_active_by_access_token(&self, token: &str) -> AuthResult<Option<Session>>;

    /// Active session of an account whose refresh token has not expired
    async fn find_active_by_refresh_token(
        &self,
        account_id: &str,
        token: &str,
    ) -> AuthResult<Option<Session>>;

    async fn touch(&self, session_id: &str) -> AuthResult<()>;

    /// Rotate tokens in place. Returns false when the session no longer holds
    /// `expected_refresh_token`, meaning a concurrent refresh won.
    async fn update_tokens(
        &self,
        session_id: &str,
        expected_refresh_token: &str,
        tokens: &TokenPair,
    ) -> AuthResult<bool>;

    /// Deactivate one session. Returns false when it was already inactive.
    async fn revoke(&self, session_id: &str) -> AuthResult<bool>;

    /// Deactivate every active session of an account, returning the count
    async fn revoke_all(&self, account_id: &str) -> AuthResult<u64>;

    /// Delete sessions that are inactive or past their refresh expiry
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}

/// SQLite-backed session store
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(
        &self,
        account_id: &str,
        tokens: &TokenPair,
        client: &ClientInfo,
    ) -> AuthResult<Session> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: account_id.to_string(),
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            access_token_expires_at: tokens.access_token_expires_at,
            refresh_token_expires_at: tokens.refresh_token_expires_at,
            is_active: true,
            device_info: client.device_info.clone(),
            ip_address: client.ip_address.clone(),
            created_at: Utc::now(),
            last_used_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO session (id, user_id, access_token, refresh_token, access_token_expires_at,
                                  refresh_token_expires_at, is_active, device_info, ip_address,
                                  created_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8, ?9, ?10)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.access_token)
        .bind(&session.refresh_token)
        .bind(session.access_token_expires_at)
        .bind(session.refresh_token_expires_at)
        .bind(&session.device_info)
        .bind(&session.ip_address)
        .bind(session.created_at)
        .bind(session.last_used_at)
        .execute(&self.db)
        .await?;

        tracing::debug!(session_id = %session.id, account_id, "Session created");
        Ok(session)
    }

    async fn find_active_by_access_token(&self, token: &str) -> AuthResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM session WHERE access_token = ?1 AND is_active = 1",
            SESSION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        let now = Utc::now();
        Ok(session.filter(|s| s.access_token_expires_at > now))
    }

    async fn find_active_by_refresh_token(
        &self,
        account_id: &str,
        token: &str,
    ) -> AuthResult<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM session WHERE user_id = ?1 AND refresh_token = ?2 AND is_active = 1",
            SESSION_COLUMNS
        ))
        .bind(account_id)
        .bind(token)
        .fetch_optional(&self.db)
        .await?;

        let now = Utc::now();
        Ok(session.filter(|s| s.refresh_token_expires_at > now))
    }

    async fn touch(&self, session_id: &str) -> AuthResult<()> {
        sqlx::query("UPDATE session SET last_used_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(session_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    async fn update_tokens(
        &self,
        session_id: &str,
        expected_refresh_token: &str,
        tokens: &TokenPair,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE session
             SET access_token = ?1, refresh_token = ?2, access_token_expires_at = ?3,
                 refresh_token_expires_at = ?4, last_used_at = ?5
             WHERE id = ?6 AND refresh_token = ?7 AND is_active = 1",
        )
        .bind(&tokens.access_token)
        .bind(&tokens.refresh_token)
        .bind(tokens.access_token_expires_at)
        .bind(tokens.refresh_token_expires_at)
        .bind(Utc::now())
        .bind(session_id)
        .bind(expected_refresh_token)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke(&self, session_id: &str) -> AuthResult<bool> {
        let result = sqlx::query("UPDATE session SET is_active = 0 WHERE id = ?1 AND is_active = 1")
            .bind(session_id)
            .execute(&self.db)
            .await?;

        let revoked = result.rows_affected() == 1;
        if revoked {
            metrics::SESSIONS_REVOKED_TOTAL.inc();
        }
        Ok(revoked)
    }

    async fn revoke_all(&self, account_id: &str) -> AuthResult<u64> {
        let result =
            sqlx::query("UPDATE session SET is_active = 0 WHERE user_id = ?1 AND is_active = 1")
                .bind(account_id)
                .execute(&self.db)
                .await?;

        let count = result.rows_affected();
        metrics::SESSIONS_REVOKED_TOTAL.inc_by(count);
        tracing::info!(account_id, count, "Revoked all sessions");
        Ok(count)
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let result =
            sqlx::query("DELETE FROM session WHERE is_active = 0 OR refresh_token_expires_at < ?1")
                .bind(Utc::now())
                .execute(&self.db)
                .await
                .map_err(AuthError::Database)?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(deleted, "Cleaned up inactive and expired sessions");
        } else {
            tracing::debug!("Session cleanup: nothing to remove");
        }

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountRepository, NewAccount};
    use crate::db;
    use chrono::Duration;

    async fn setup() -> (SqliteSessionStore, String) {
        let pool = db::create_memory_pool().await.unwrap();
        let account = AccountRepository::new(pool.clone())
            .create(NewAccount {
                email: "s@example.com".to_string(),
                username: "sess".to_string(),
                name: "Session User".to_string(),
                avatar: None,
                google_id: None,
                password_hash: None,
                is_verified: true,
            })
            .await
            .unwrap();
        (SqliteSessionStore::new(pool), account.id)
    }

    fn pair(tag: &str, access_ttl: Duration, refresh_ttl: Duration) -> TokenPair {
        let now = Utc::now();
        TokenPair {
            access_token: format!("access-{}", tag),
            refresh_token: format!("refresh-{}", tag),
            access_token_expires_at: now + access_ttl,
            refresh_token_expires_at: now + refresh_ttl,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let (store, account_id) = setup().await;
        let tokens = pair("a", Duration::minutes(15), Duration::days(7));
        let client = ClientInfo {
            device_info: Some("curl/8".into()),
            ip_address: Some("10.0.0.1".into()),
        };
        let session = store.create(&account_id, &tokens, &client).await.unwrap();

        let found = store
            .find_active_by_access_token("access-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.device_info.as_deref(), Some("curl/8"));

        assert!(store
            .find_active_by_refresh_token(&account_id, "refresh-a")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_active_by_refresh_token("someone-else", "refresh-a")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_access_not_found() {
        let (store, account_id) = setup().await;
        let tokens = pair("old", Duration::minutes(-1), Duration::days(7));
        store
            .create(&account_id, &tokens, &ClientInfo::default())
            .await
            .unwrap();

        assert!(store
            .find_active_by_access_token("access-old")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_active_by_refresh_token(&account_id, "refresh-old")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_rotation_is_conditional() {
        let (store, account_id) = setup().await;
        let first = pair("1", Duration::minutes(15), Duration::days(7));
        let session = store
            .create(&account_id, &first, &ClientInfo::default())
            .await
            .unwrap();

        let second = pair("2", Duration::minutes(15), Duration::days(7));
        assert!(store
            .update_tokens(&session.id, "refresh-1", &second)
            .await
            .unwrap());

        let third = pair("3", Duration::minutes(15), Duration::days(7));
        assert!(!store
            .update_tokens(&session.id, "refresh-1", &third)
            .await
            .unwrap());

        assert!(store
            .find_active_by_refresh_token(&account_id, "refresh-1")
            .await
            .unwrap()
            .is_none());
        let current = store
            .find_active_by_refresh_token(&account_id, "refresh-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.id, session.id);
    }

    #[tokio::test]
    async fn test_revoke_and_cleanup() {
        let (store, account_id) = setup().await;
        let a = store
            .create(
                &account_id,
                &pair("a", Duration::minutes(15), Duration::days(7)),
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        store
            .create(
                &account_id,
                &pair("b", Duration::minutes(15), Duration::days(7)),
                &ClientInfo::default(),
            )
            .await
            .unwrap();
        store
            .create(
                &account_id,
                &pair("c", Duration::minutes(15), Duration::days(7)),
                &ClientInfo::default(),
            )
            .await
            .unwrap();

        assert!(store.revoke(&a.id).await.unwrap());
        assert!(!store.revoke(&a.id).await.unwrap());
        assert!(store
            .find_active_by_access_token("access-a")
            .await
            .unwrap()
            .is_none());

        assert_eq!(store.revoke_all(&account_id).await.unwrap(), 2);
        assert_eq!(store.revoke_all(&account_id).await.unwrap(), 0);
        assert_eq!(store.cleanup_expired().await.unwrap(), 3);
    }
}
