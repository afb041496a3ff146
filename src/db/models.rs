/// Row models for the account database
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account roles, ordered from least to most privileged
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Judge,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Judge => "JUDGE",
            Role::Admin => "ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Position in the hierarchy, USER(1) through SUPER_ADMIN(4)
    pub fn level(&self) -> u8 {
        match self {
            Role::User => 1,
            Role::Judge => 2,
            Role::Admin => 3,
            Role::SuperAdmin => 4,
        }
    }

    /// Check if this role is at least as privileged as another
    pub fn can_act_as(&self, required: Role) -> bool {
        self.level() >= required.level()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purpose of a one-time code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpType {
    EmailVerification,
    PasswordReset,
    TwoFactorAuth,
    LoginVerification,
}

impl OtpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpType::EmailVerification => "EMAIL_VERIFICATION",
            OtpType::PasswordReset => "PASSWORD_RESET",
            OtpType::TwoFactorAuth => "TWO_FACTOR_AUTH",
            OtpType::LoginVerification => "LOGIN_VERIFICATION",
        }
    }
}

impl std::fmt::Display for OtpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub avatar: Option<String>,
    pub google_id: Option<String>,
    /// None for accounts that only sign in through Google
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_banned: bool,
    pub banned_at: Option<DateTime<Utc>>,
    pub banned_until: Option<DateTime<Utc>>,
    pub banned_reason: Option<String>,
    pub failed_login_attempts: i64,
    pub last_failed_login_attempt: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Session record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// One-time code record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OtpCode {
    pub id: String,
    pub user_id: String,
    pub code: String,
    #[sqlx(rename = "type")]
    pub otp_type: OtpType,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}
