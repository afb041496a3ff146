/// Access and refresh token signing
///
/// Both token classes are HS256 JWTs over the same claims, signed with
/// different secrets so a token of one class never verifies as the other.
use crate::{
    config::TokenConfig,
    db::models::{Account, Role},
    error::{AuthError, AuthResult},
};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by both token classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Unique per issuance so two pairs minted in the same second differ
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly issued token pair with absolute expiries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
enum TokenClass {
    Access,
    Refresh,
}

/// Token signing service
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            config,
        }
    }

    /// Mint an access/refresh pair for an account
    pub fn issue(&self, account: &Account) -> AuthResult<TokenPair> {
        let now = Utc::now();
        let access_expires = now + self.config.access_ttl();
        let refresh_expires = now + self.config.refresh_ttl();

        let access_token = self.sign(account, now, access_expires, TokenClass::Access)?;
        let refresh_token = self.sign(account, now, refresh_expires, TokenClass::Refresh)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_expires_at: truncate_to_seconds(access_expires),
            refresh_token_expires_at: truncate_to_seconds(refresh_expires),
        })
    }

    /// Verify an access token, None when invalid or expired
    pub fn try_verify_access(&self, token: &str) -> Option<Claims> {
        self.decode(token, TokenClass::Access).ok()
    }

    /// Verify a refresh token, None when invalid or expired
    pub fn try_verify_refresh(&self, token: &str) -> Option<Claims> {
        self.decode(token, TokenClass::Refresh).ok()
    }

    /// Verify an access token, failing with an authentication error
    pub fn verify_access_or_fail(&self, token: &str) -> AuthResult<Claims> {
        self.decode(token, TokenClass::Access).map_err(|e| {
            tracing::debug!("Access token rejected: {}", e);
            auth_error(&e, "access")
        })
    }

    /// Verify a refresh token, failing with an authentication error
    pub fn verify_refresh_or_fail(&self, token: &str) -> AuthResult<Claims> {
        self.decode(token, TokenClass::Refresh).map_err(|e| {
            tracing::debug!("Refresh token rejected: {}", e);
            auth_error(&e, "refresh")
        })
    }

    fn sign(
        &self,
        account: &Account,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        class: TokenClass,
    ) -> AuthResult<String> {
        let claims = Claims {
            sub: account.id.clone(),
            email: account.email.clone(),
            role: account.role,
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let key = match class {
            TokenClass::Access => &self.access_encoding,
            TokenClass::Refresh => &self.refresh_encoding,
        };

        encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn decode(&self, token: &str, class: TokenClass) -> Result<Claims, jsonwebtoken::errors::Error> {
        let key = match class {
            TokenClass::Access => &self.access_decoding,
            TokenClass::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, key, &validation).map(|data| data.claims)
    }
}

fn auth_error(e: &jsonwebtoken::errors::Error, class: &str) -> AuthError {
    match e.kind() {
        ErrorKind::ExpiredSignature => {
            AuthError::Unauthenticated(format!("The {} token has expired", class))
        }
        _ => AuthError::Unauthenticated(format!("Invalid {} token", class)),
    }
}

/// JWT expiries have second precision; stored expiries match them
fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(at.timestamp(), 0).single().unwrap_or(at)
}
