/// Server-side session tracking
///
/// A session row is the authority on whether a presented token is still
/// honored; a valid JWT without an active, unexpired row is rejected.

mod store;

pub use store::{SessionStore, SqliteSessionStore};

/// Request metadata recorded with a new session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
}
