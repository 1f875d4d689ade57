//! Error types for the deployment procedure

use ethers::types::H256;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Convenience Result type alias using the deployment error type
pub type Result<T> = std::result::Result<T, DeployError>;

/// Every failure the deployment and contract procedures can surface. None of
/// them is retried.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Artifact for contract '{name}' not found in {} (run the compiler first)", dir.display())]
    ArtifactNotFound { name: String, dir: PathBuf },

    #[error("Invalid artifact {}: {reason}", path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Chain ID mismatch: configured {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("Transaction {tx_hash:?} reverted: {reason}")]
    TransactionReverted { tx_hash: H256, reason: String },

    #[error("Transaction {tx_hash:?} not confirmed within {}s", timeout.as_secs_f64())]
    DeploymentTimeout { tx_hash: H256, timeout: Duration },

    #[error("Contract call failed: {0}")]
    ContractCall(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DeployError {
    pub(crate) fn invalid_artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DeployError::InvalidArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
