use std::fmt::Display;

use tracing::warn;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad credentials or account lockout. Fatal until the credentials change.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network-level failure which outlived the retry budget.
    #[error("transport failure after {attempts} attempt(s)")]
    Transport {
        attempts: u32,

        #[source]
        source: reqwest::Error,
    },

    /// Well-formed error response from the portal.
    #[error("`{operation}` failed on the portal: {message}")]
    Portal { operation: &'static str, message: String },

    /// The response does not satisfy the minimal contract of the operation.
    #[error("failed to decode the `{operation}` response: {reason}")]
    Decode { operation: &'static str, reason: String, payload: String },

    #[error("failed to encode the `{operation}` request")]
    Encode {
        operation: &'static str,

        #[source]
        source: serde_json::Error,
    },

    /// The portal no longer accepts the session.
    ///
    /// Handled inside the client, which logs in again and retries once.
    #[error("the portal rejected the session")]
    SessionRejected,

    #[error("not logged in")]
    NotAuthenticated,

    #[error("there are no supply contracts on the account")]
    NoContracts,
}

impl Error {
    /// Build a decoding error, logging the offending payload.
    pub(super) fn decode(
        operation: &'static str,
        reason: impl Display,
        payload: impl Display,
    ) -> Self {
        let (reason, payload) = (reason.to_string(), payload.to_string());
        warn!(operation, %payload, "failed to decode: {reason}");
        Self::Decode { operation, reason, payload }
    }
}
