use thiserror::Error;

/// The one error type every component function returns.
///
/// Variants line up 1:1 with the error-handling policy: callers match on
/// kind rather than inspecting message strings, so "is this the tip-reached
/// sentinel" or "was this a protocol violation" never degrades into a
/// string compare at the call site.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("rpc call failed: {0}")]
    Rpc(#[from] reqwest::Error),

    #[error("rpc error: {message}")]
    RpcSemantic { message: String },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("protocol violation: {reason}")]
    Protocol { reason: String },

    #[error("deadline expired")]
    DeadlineExpired,

    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("decode error: {0}")]
    Decode(String),
}

impl IndexerError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        IndexerError::Protocol { reason: reason.into() }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        IndexerError::Decode(reason.into())
    }

    pub fn rpc_semantic(message: impl Into<String>) -> Self {
        IndexerError::RpcSemantic { message: message.into() }
    }

    /// True for the node's "height out of range" response, which the sync
    /// loop treats as "chain tip reached" rather than a failure.
    pub fn is_height_out_of_range(&self) -> bool {
        matches!(self, IndexerError::RpcSemantic { message } if message.contains("height out of range"))
    }

    /// True for the "no rows"/not-found family a store lookup can raise,
    /// which the backfill loop uses to recognise a gap rather than an error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexerError::Store(sqlx::Error::RowNotFound))
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
