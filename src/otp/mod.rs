/// One-time codes for email verification and password reset
///
/// Codes are six random digits. Issuing a code replaces every earlier code
/// of the same purpose for the account, and consuming one is a single
/// conditional update so a code can succeed at most once.
use crate::{
    db::models::{OtpCode, OtpType},
    error::{AuthError, AuthResult},
};
use chrono::{Duration, Utc};
use rand::Rng;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const MAX_GENERATION_ATTEMPTS: usize = 100;

/// Issues and consumes one-time codes
#[derive(Clone)]
pub struct OtpService {
    db: SqlitePool,
}

impl OtpService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Issue a fresh code valid for `ttl_minutes`
    pub async fn generate(
        &self,
        account_id: &str,
        otp_type: OtpType,
        ttl_minutes: i64,
    ) -> AuthResult<String> {
        sqlx::query("DELETE FROM otp_code WHERE user_id = ?1 AND type = ?2")
            .bind(account_id)
            .bind(otp_type)
            .execute(&self.db)
            .await?;

        let mut code = None;
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = random_code();
            if !self.is_code_live(&candidate).await? {
                code = Some(candidate);
                break;
            }
        }

        let code = code.ok_or_else(|| {
            AuthError::Internal("Failed to generate a unique one-time code".to_string())
        })?;

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO otp_code (id, user_id, code, type, expires_at, is_used, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(&code)
        .bind(otp_type)
        .bind(now + Duration::minutes(ttl_minutes))
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::debug!(account_id, otp_type = %otp_type, "Issued one-time code");
        Ok(code)
    }

    /// Consume a code. True exactly once per issued code, while unexpired.
    pub async fn verify(&self, account_id: &str, code: &str, otp_type: OtpType) -> AuthResult<bool> {
        let record = sqlx::query_as::<_, OtpCode>(
            "SELECT id, user_id, code, type, expires_at, is_used, created_at FROM otp_code
             WHERE user_id = ?1 AND code = ?2 AND type = ?3 AND is_used = 0",
        )
        .bind(account_id)
        .bind(code)
        .bind(otp_type)
        .fetch_optional(&self.db)
        .await?;

        let Some(record) = record else {
            return Ok(false);
        };

        if record.expires_at <= Utc::now() {
            return Ok(false);
        }

        let consumed = sqlx::query("UPDATE otp_code SET is_used = 1 WHERE id = ?1 AND is_used = 0")
            .bind(&record.id)
            .execute(&self.db)
            .await?;

        Ok(consumed.rows_affected() == 1)
    }

    /// Delete used and expired codes
    pub async fn cleanup(&self) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM otp_code WHERE is_used = 1 OR expires_at < ?1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Whether any unused, unexpired code currently has this value
    async fn is_code_live(&self, code: &str) -> AuthResult<bool> {
        let rows = sqlx::query("SELECT expires_at FROM otp_code WHERE code = ?1 AND is_used = 0")
            .bind(code)
            .fetch_all(&self.db)
            .await?;

        let now = Utc::now();
        for row in rows {
            let expires_at: chrono::DateTime<Utc> = row.try_get("expires_at")?;
            if expires_at > now {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn random_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}
