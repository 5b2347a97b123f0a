//! Error types for the stakeindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("event {event}: attribute '{attribute}' not found")]
    MissingAttribute { event: String, attribute: String },

    #[error("validator {validator} in block {height} not found in active validators")]
    UnknownValidator { validator: String, height: u64 },

    #[error("block {height} time not found")]
    MissingBlockTime { height: u64 },

    #[error("invalid compressed public key: {0}")]
    InvalidPubkey(String),

    #[error("checkpoint for indexer '{0}' has not been set up")]
    CheckpointMissing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Short label used as the `error_type` metric attribute.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rpc(_) => "rpc",
            Self::Storage(_) => "storage",
            Self::Cache(_) => "cache",
            Self::Decode(_) => "decode",
            Self::MissingAttribute { .. } => "missing_attribute",
            Self::UnknownValidator { .. } => "unknown_validator",
            Self::MissingBlockTime { .. } => "missing_block_time",
            Self::InvalidPubkey(_) => "invalid_pubkey",
            Self::CheckpointMissing(_) => "checkpoint_missing",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }

    /// Returns `true` for failures of the data sources or the store that are
    /// expected to clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Storage(_))
    }

    /// Returns `true` when the chain data itself is inconsistent or not yet
    /// available (missing attribute, unknown validator, missing block row).
    pub fn is_data_inconsistency(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::MissingAttribute { .. }
                | Self::UnknownValidator { .. }
                | Self::MissingBlockTime { .. }
                | Self::InvalidPubkey(_)
        )
    }
}
