/// Google ID token verification
///
/// Tokens are RS256 JWTs checked against Google's published JWKS. The key
/// set is cached and refetched when it goes stale or a token names an
/// unknown key id.
use crate::{
    config::GoogleConfig,
    error::{AuthError, AuthResult},
};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Identity asserted by a verified Google ID token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleIdentity {
    pub google_id: String,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
}

/// Verifies an external ID token and extracts the asserted identity
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> AuthResult<GoogleIdentity>;
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifier backed by Google's JWKS endpoint
pub struct GoogleIdTokenVerifier {
    config: GoogleConfig,
    http: reqwest::Client,
    cache: Arc<RwLock<Option<CachedJwks>>>,
}

impl GoogleIdTokenVerifier {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn fetch_jwks(&self) -> AuthResult<JwkSet> {
        let response = self
            .http
            .get(&self.config.jwks_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach Google JWKS endpoint: {}", e);
                AuthError::BadInput("Unable to verify Google token at this time".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(status = %response.status(), "Google JWKS endpoint returned an error");
            return Err(AuthError::BadInput(
                "Unable to verify Google token at this time".to_string(),
            ));
        }

        response.json::<JwkSet>().await.map_err(|e| {
            tracing::error!("Malformed Google JWKS response: {}", e);
            AuthError::BadInput("Unable to verify Google token at this time".to_string())
        })
    }

    /// Decoding key for a key id, refetching the set once on a miss
    async fn key_for(&self, kid: &str) -> AuthResult<DecodingKey> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < JWKS_CACHE_TTL {
                    if let Some(jwk) = cached.keys.find(kid) {
                        return DecodingKey::from_jwk(jwk)
                            .map_err(|_| AuthError::Unauthenticated(invalid_token()));
                    }
                }
            }
        }

        let keys = self.fetch_jwks().await?;
        let key = keys
            .find(kid)
            .map(DecodingKey::from_jwk)
            .transpose()
            .map_err(|_| AuthError::Unauthenticated(invalid_token()))?;

        *self.cache.write().await = Some(CachedJwks {
            keys,
            fetched_at: Instant::now(),
        });

        key.ok_or_else(|| AuthError::Unauthenticated(invalid_token()))
    }
}

fn invalid_token() -> String {
    "Invalid or expired Google token".to_string()
}

#[async_trait]
impl IdTokenVerifier for GoogleIdTokenVerifier {
    async fn verify(&self, id_token: &str) -> AuthResult<GoogleIdentity> {
        let header =
            decode_header(id_token).map_err(|_| AuthError::Unauthenticated(invalid_token()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Unauthenticated(invalid_token()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.client_id.as_str()]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        let claims = decode::<GoogleClaims>(id_token, &key, &validation)
            .map_err(|e| {
                tracing::debug!("Google token rejected: {}", e);
                AuthError::Unauthenticated(invalid_token())
            })?
            .claims;

        identity_from_claims(claims)
    }
}

/// Accounts are linked by email, so only a Google-verified address is accepted
fn identity_from_claims(claims: GoogleClaims) -> AuthResult<GoogleIdentity> {
    if claims.email_verified != Some(true) {
        tracing::info!(sub = %claims.sub, "Google token rejected: email not verified");
        return Err(AuthError::Unauthenticated(invalid_token()));
    }

    let email = claims
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AuthError::Unauthenticated(invalid_token()))?
        .to_lowercase();

    let name = claims
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    Ok(GoogleIdentity {
        google_id: claims.sub,
        email,
        name,
        avatar: claims.picture.filter(|p| !p.is_empty()),
    })
}

/// Verifier used when Google sign-in is not configured
pub struct DisabledVerifier;

#[async_trait]
impl IdTokenVerifier for DisabledVerifier {
    async fn verify(&self, _id_token: &str) -> AuthResult<GoogleIdentity> {
        Err(AuthError::BadInput(
            "Google OAuth is not configured".to_string(),
        ))
    }
}

/// Build the verifier for the configured deployment
pub fn verifier_from_config(config: Option<&GoogleConfig>) -> Arc<dyn IdTokenVerifier> {
    match config {
        Some(google) => {
            tracing::info!("Google sign-in enabled");
            Arc::new(GoogleIdTokenVerifier::new(google.clone()))
        }
        None => {
            tracing::info!("Google sign-in disabled: GOOGLE_CLIENT_ID not set");
            Arc::new(DisabledVerifier)
        }
    }
}
