//! Error types for asnwall.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AsnwallError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or authentication failure talking to Cloudflare
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cloudflare API error (HTTP {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl AsnwallError {
    /// Whether the API reported a missing resource
    pub fn is_not_found(&self) -> bool {
        match self {
            AsnwallError::Api {
                status, message, ..
            } => *status == 404 || message.to_lowercase().contains("not found"),
            _ => false,
        }
    }
}
