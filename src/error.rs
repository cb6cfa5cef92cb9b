// Error types for the event bridge boundary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The signal body did not have the expected arity, types or event code
    #[error("invalid NowPlaying payload: {reason}")]
    InvalidPayload { reason: String },

    /// The submission service rejected or failed to deliver a record
    #[error("scrobble submission failed")]
    Submission(#[source] anyhow::Error),
}

impl BridgeError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }
}
