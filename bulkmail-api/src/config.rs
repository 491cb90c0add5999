//! HTTP API configuration

use serde::Deserialize;

/// ```ron
/// api: (
///     listen_address: "[::]:3000",
///     user_header: "x-user-id",
/// ),
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Address to bind the API server
    ///
    /// Common values:
    /// - `[::]:3000` (IPv6 any address)
    /// - `127.0.0.1:3000` (localhost only)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Header carrying the caller's user id
    ///
    /// The authentication proxy in front of the API must set this header and
    /// strip it from client requests.
    #[serde(default = "default_user_header")]
    pub user_header: String,

    /// Upper bound on every request except a synchronous batch send
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Largest accepted request body; attachments arrive base64 encoded
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen_address() -> String {
    "[::]:3000".to_string()
}

fn default_user_header() -> String {
    "x-user-id".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            user_header: default_user_header(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
