/// Credential primitives
///
/// Password hashing, token signing and Google ID token verification. None
/// of these touch storage; the orchestrator in `service` composes them.

pub mod google;
pub mod password;
pub mod token;

pub use google::{verifier_from_config, GoogleIdTokenVerifier, GoogleIdentity, IdTokenVerifier};
pub use password::CredentialHasher;
pub use token::{Claims, TokenPair, TokenService};
