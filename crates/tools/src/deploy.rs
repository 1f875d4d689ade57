//! Contract deployment procedure
//!
//! A deployment runs strictly in order and stops at the first failure:
//!
//! 1. resolve the artifact by name (filesystem only)
//! 2. check the node's chain id against the configured one
//! 3. submit the signed contract-creation transaction
//! 4. poll for the receipt until it arrives or the confirmation timeout expires
//! 5. read the deployed address from the receipt
//!
//! Nothing is retried.

use ethers::types::{Address, TransactionReceipt, H256};
use ethers::utils::to_checksum;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::artifact::ArtifactStore;
use crate::client::{ensure_success, wait_for_receipt, ChainClient};
use crate::config::Config;
use crate::error::{DeployError, Result};

/// Contract deployed when no name is given
pub const DEFAULT_CONTRACT: &str = "MyNFT";

/// Outcome of one deployment run. The address is only ever set from a
/// successful receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    contract_name: String,
    network: String,
    chain_id: u64,
    transaction_hash: Option<H256>,
    deployed_address: Option<Address>,
}

impl DeploymentRecord {
    fn pending(contract_name: &str, network: &str, chain_id: u64) -> Self {
        Self {
            contract_name: contract_name.to_string(),
            network: network.to_string(),
            chain_id,
            transaction_hash: None,
            deployed_address: None,
        }
    }

    fn confirm(&mut self, receipt: &TransactionReceipt) -> Result<Address> {
        let tx_hash = receipt.transaction_hash;
        ensure_success(receipt)?;

        let address = receipt
            .contract_address
            .ok_or_else(|| DeployError::TransactionReverted {
                tx_hash,
                reason: "receipt has no contract address".to_string(),
            })?;

        self.deployed_address = Some(address);
        Ok(address)
    }

    pub fn contract_name(&self) -> &str {
        &self.contract_name
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn transaction_hash(&self) -> Option<H256> {
        self.transaction_hash
    }

    pub fn deployed_address(&self) -> Option<Address> {
        self.deployed_address
    }

    pub fn is_confirmed(&self) -> bool {
        self.deployed_address.is_some()
    }
}

impl fmt::Display for DeploymentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.deployed_address {
            Some(address) => write!(
                f,
                "{} deployed to: {}",
                self.contract_name,
                to_checksum(&address, None)
            ),
            None => write!(f, "{} not deployed on {}", self.contract_name, self.network),
        }
    }
}

/// Runs deployments against one configured network
pub struct Deployer<C> {
    client: C,
    artifacts: ArtifactStore,
    network: String,
    chain_id: u64,
    compiler_version: String,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl<C: ChainClient> Deployer<C> {
    pub fn new(config: &Config, client: C) -> Self {
        Self {
            client,
            artifacts: ArtifactStore::new(config.artifacts_dir.clone()),
            network: config.profile.clone(),
            chain_id: config.chain_id,
            compiler_version: config.compiler_version.clone(),
            confirmation_timeout: config.confirmation_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Deploy `contract_name` with the given constructor arguments
    pub async fn deploy(&self, contract_name: &str, args: &[String]) -> Result<DeploymentRecord> {
        let artifact = self.artifacts.resolve(contract_name)?;
        let creation_code = artifact.creation_code(args)?;

        if let Some(built_with) = self.artifacts.compiler_version(&artifact) {
            if built_with != self.compiler_version {
                warn!(
                    contract = contract_name,
                    built_with = %built_with,
                    configured = %self.compiler_version,
                    "Artifact was compiled with a different solc version"
                );
            }
        }

        let mut record =
            DeploymentRecord::pending(&artifact.contract_name, &self.network, self.chain_id);

        let node_chain_id = self.client.chain_id().await?;
        if node_chain_id != self.chain_id {
            return Err(DeployError::ChainIdMismatch {
                expected: self.chain_id,
                actual: node_chain_id,
            });
        }

        info!(
            contract = %artifact.contract_name,
            network = %self.network,
            chain_id = self.chain_id,
            deployer = ?self.client.deployer_address(),
            code_size = creation_code.len(),
            "Deploying contract"
        );

        let tx_hash = self
            .client
            .submit_deployment(creation_code, self.chain_id)
            .await?;
        record.transaction_hash = Some(tx_hash);
        info!(tx_hash = ?tx_hash, "Deployment transaction submitted");

        let started = Instant::now();
        let receipt = wait_for_receipt(
            &self.client,
            tx_hash,
            self.confirmation_timeout,
            self.poll_interval,
        )
        .await?;

        let address = record.confirm(&receipt)?;
        info!(
            contract = %artifact.contract_name,
            address = %to_checksum(&address, None),
            block = ?receipt.block_number,
            gas_used = ?receipt.gas_used,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Contract deployed"
        );

        Ok(record)
    }
}
