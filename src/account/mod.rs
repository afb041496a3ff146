/// Account management
///
/// Account persistence plus the request and response shapes of the
/// public auth operations.

mod repository;

pub use repository::{AccountRepository, NewAccount, DUPLICATE_ACCOUNT_MESSAGE};

use crate::{
    auth::token::TokenPair,
    db::models::{Account, OtpType, Role},
    identity::validation,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Sign-up request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(
        length(min = 8, max = 100, message = "Password must be between 8 and 100 characters"),
        custom(function = "validation::password_strength")
    )]
    pub password: String,
    #[validate(
        length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"),
        custom(function = "validation::letters_and_spaces")
    )]
    pub name: String,
    #[validate(
        length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"),
        custom(function = "validation::alphanumeric")
    )]
    pub username: String,
    #[validate(url(message = "Avatar must be a valid URL"))]
    pub avatar: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Google sign-in request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleAuthRequest {
    pub id_token: String,
}

/// Token refresh request; the cookie is used when the field is absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: Option<String>,
}

/// Email verification request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifyEmailRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validation::six_digit_code"))]
    pub code: String,
}

/// One-time code request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RequestOtpRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[serde(rename = "type")]
    pub otp_type: OtpType,
}

/// Password reset request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validation::six_digit_code"))]
    pub code: String,
    #[validate(
        length(min = 8, max = 100, message = "Password must be between 8 and 100 characters"),
        custom(function = "validation::password_strength")
    )]
    pub new_password: String,
}

/// Public projection of an account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_banned: bool,
    pub has_password: bool,
    pub google_linked: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            email: account.email.clone(),
            username: account.username.clone(),
            name: account.name.clone(),
            avatar: account.avatar.clone(),
            role: account.role,
            is_active: account.is_active,
            is_verified: account.is_verified,
            is_banned: account.is_banned,
            has_password: account.password_hash.is_some(),
            google_linked: account.google_id.is_some(),
            created_at: account.created_at,
            last_login: account.last_login,
        }
    }
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        AccountView::from(&account)
    }
}

/// Sign-up response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpResponse {
    pub account: AccountView,
    pub message: String,
}

/// Response of every operation that ends in a fresh session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub account: AccountView,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub message: String,
}

/// One-time code request response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequestResponse {
    pub message: String,
    pub expires_in_minutes: i64,
}

/// Boolean outcome of logout-style operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}
