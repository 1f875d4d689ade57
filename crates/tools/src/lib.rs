//! NFT Deployment Tools Library
//!
//! Network configuration, artifact resolution, the contract deployment
//! procedure and NFT mint/transfer calls behind the `nft-deploy` command.

pub mod artifact;
pub mod client;
pub mod config;
pub mod deploy;
pub mod error;
pub mod logging;
pub mod nft;

pub use artifact::{Artifact, ArtifactStore};
pub use client::{ChainClient, EthersClient};
pub use config::{Config, ConfigError, Network};
pub use deploy::{DeploymentRecord, Deployer, DEFAULT_CONTRACT};
pub use error::DeployError;
pub use nft::{MintReceipt, NftContract, TransferReceipt};
