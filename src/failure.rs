//! Why a stream session ended, and whether another one is worth opening

use thiserror::Error;

use crate::sink::SinkError;

/// Whether opening a new session could succeed where the last one failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Recoverable,
    Terminal,
}

#[derive(Debug, Error)]
pub enum SessionFailure {
    /// Credentials were rejected
    #[error("authentication rejected (status {status}): {message}")]
    Authentication { status: u16, message: String },

    /// Provider throttling
    #[error("rate limited (status {status}): {message}")]
    RateLimited { status: u16, message: String },

    /// Transport-level disconnect, stall, or provider-side outage
    #[error("connection dropped: {reason}")]
    ConnectionDropped { reason: String },

    /// The provider refused the subscription parameters themselves
    #[error("request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request could not be signed
    #[error("failed to sign request: {0}")]
    Signing(String),

    /// Accepted records can no longer be recorded
    #[error("output write failed: {0}")]
    SinkWrite(#[from] SinkError),
}

impl SessionFailure {
    /// Map a non-success HTTP status from the connect call
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Authentication { status, message },
            420 | 429 => Self::RateLimited { status, message },
            400..=499 => Self::Rejected { status, message },
            _ => Self::ConnectionDropped {
                reason: format!("provider returned status {}: {}", status, message),
            },
        }
    }

    /// Map a `disconnect` control message
    pub fn from_disconnect(code: u64, reason: String) -> Self {
        match code {
            // token revoked, admin logout
            6 | 7 => Self::Authentication { status: 401, message: reason },
            _ => Self::ConnectionDropped {
                reason: format!("provider disconnect (code {}): {}", code, reason),
            },
        }
    }

    pub fn dropped(reason: impl Into<String>) -> Self {
        Self::ConnectionDropped { reason: reason.into() }
    }

    pub fn classification(&self) -> Classification {
        match self {
            Self::RateLimited { .. } | Self::ConnectionDropped { .. } => Classification::Recoverable,
            Self::Authentication { .. } | Self::Rejected { .. } | Self::Signing(_) | Self::SinkWrite(_) => {
                Classification::Terminal
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.classification() == Classification::Recoverable
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Failures that end the run under every retry policy
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SinkWrite(_) | Self::Signing(_))
    }
}
