//! Minting and transferring tokens on a deployed MyNFT contract
//!
//! Calls are encoded against the contract's compiled ABI, signed by the
//! configured deployer and confirmed the same way a deployment is. The
//! minted token id is read from the ERC-721 `Transfer` event in the receipt.

use ethers::abi::{Function, Token};
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256};
use ethers::utils::{keccak256, to_checksum};
use std::fmt;
use std::time::Duration;
use tracing::info;

use crate::artifact::Artifact;
use crate::client::{ensure_success, wait_for_receipt, ChainClient};
use crate::config::Config;
use crate::error::{DeployError, Result};

pub const MINT_FUNCTION: &str = "mintNFT";
pub const TRANSFER_FUNCTION: &str = "transferFrom";

const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReceipt {
    pub token_id: U256,
    pub recipient: Address,
    pub transaction_hash: H256,
}

impl fmt::Display for MintReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Minted token {} to {} (tx {:?})",
            self.token_id,
            to_checksum(&self.recipient, None),
            self.transaction_hash
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub token_id: U256,
    pub from: Address,
    pub to: Address,
    pub transaction_hash: H256,
}

impl fmt::Display for TransferReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transferred token {} from {} to {} (tx {:?})",
            self.token_id,
            to_checksum(&self.from, None),
            to_checksum(&self.to, None),
            self.transaction_hash
        )
    }
}

/// A deployed NFT contract bound to one network and signer
pub struct NftContract<C> {
    client: C,
    address: Address,
    mint: Function,
    transfer: Function,
    chain_id: u64,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl<C: ChainClient> NftContract<C> {
    /// Bind to the contract at `address`. The artifact must expose both
    /// `mintNFT` and `transferFrom`; nothing is sent to the node here.
    pub fn new(config: &Config, client: C, artifact: &Artifact, address: Address) -> Result<Self> {
        let function = |name: &str| {
            artifact.abi.function(name).cloned().map_err(|_| {
                DeployError::invalid_artifact(
                    &artifact.path,
                    format!("{} has no {name} function", artifact.contract_name),
                )
            })
        };

        Ok(Self {
            mint: function(MINT_FUNCTION)?,
            transfer: function(TRANSFER_FUNCTION)?,
            client,
            address,
            chain_id: config.chain_id,
            confirmation_timeout: config.confirmation_timeout(),
            poll_interval: config.poll_interval(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Mint a new token for `recipient` and return its id
    pub async fn mint(&self, recipient: Address, token_uri: &str) -> Result<MintReceipt> {
        let data = encode(
            &self.mint,
            &[Token::Address(recipient), Token::String(token_uri.to_string())],
        )?;

        info!(
            contract = %to_checksum(&self.address, None),
            recipient = %to_checksum(&recipient, None),
            token_uri = token_uri,
            "Minting token"
        );

        let receipt = self.send(data).await?;
        let token_id = minted_token_id(&receipt, self.address).ok_or_else(|| {
            DeployError::ContractCall(format!(
                "no Transfer event in receipt of {:?}",
                receipt.transaction_hash
            ))
        })?;

        info!(token_id = %token_id, tx_hash = ?receipt.transaction_hash, "Token minted");
        Ok(MintReceipt {
            token_id,
            recipient,
            transaction_hash: receipt.transaction_hash,
        })
    }

    /// Move `token_id` from `from` to `to`. The signer must own or be
    /// approved for the token, otherwise the call reverts.
    pub async fn transfer(&self, from: Address, to: Address, token_id: U256) -> Result<TransferReceipt> {
        let data = encode(
            &self.transfer,
            &[Token::Address(from), Token::Address(to), Token::Uint(token_id)],
        )?;

        info!(
            contract = %to_checksum(&self.address, None),
            token_id = %token_id,
            from = %to_checksum(&from, None),
            to = %to_checksum(&to, None),
            "Transferring token"
        );

        let receipt = self.send(data).await?;
        info!(tx_hash = ?receipt.transaction_hash, "Token transferred");

        Ok(TransferReceipt {
            token_id,
            from,
            to,
            transaction_hash: receipt.transaction_hash,
        })
    }

    async fn send(&self, data: Bytes) -> Result<TransactionReceipt> {
        let node_chain_id = self.client.chain_id().await?;
        if node_chain_id != self.chain_id {
            return Err(DeployError::ChainIdMismatch {
                expected: self.chain_id,
                actual: node_chain_id,
            });
        }

        let tx_hash = self
            .client
            .submit_call(self.address, data, self.chain_id)
            .await?;
        let receipt = wait_for_receipt(
            &self.client,
            tx_hash,
            self.confirmation_timeout,
            self.poll_interval,
        )
        .await?;

        ensure_success(&receipt)?;
        Ok(receipt)
    }
}

fn encode(function: &Function, args: &[Token]) -> Result<Bytes> {
    function
        .encode_input(args)
        .map(Bytes::from)
        .map_err(|e| DeployError::ContractCall(format!("cannot encode {}: {e}", function.name)))
}

/// Token id of the mint emitted by `contract`: the indexed third topic of a
/// `Transfer` whose sender is the zero address
fn minted_token_id(receipt: &TransactionReceipt, contract: Address) -> Option<U256> {
    let topic = H256::from(keccak256(TRANSFER_EVENT));
    receipt
        .logs
        .iter()
        .filter(|log| log.address == contract)
        .filter(|log| log.topics.len() >= 4 && log.topics[0] == topic)
        .find(|log| log.topics[1].is_zero())
        .map(|log| U256::from_big_endian(log.topics[3].as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{Call, MockChain};
    use ethers::abi::Abi;
    use ethers::types::Log;
    use std::path::PathBuf;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    const NFT_ABI: &str = r#"[
        {"type": "function", "name": "mintNFT", "stateMutability": "nonpayable",
         "inputs": [{"name": "recipient", "type": "address"}, {"name": "tokenURI", "type": "string"}],
         "outputs": [{"name": "", "type": "uint256"}]},
        {"type": "function", "name": "transferFrom", "stateMutability": "nonpayable",
         "inputs": [{"name": "from", "type": "address"}, {"name": "to", "type": "address"},
                    {"name": "tokenId", "type": "uint256"}],
         "outputs": []},
        {"type": "event", "name": "Transfer", "anonymous": false,
         "inputs": [{"name": "from", "type": "address", "indexed": true},
                    {"name": "to", "type": "address", "indexed": true},
                    {"name": "tokenId", "type": "uint256", "indexed": true}]}
    ]"#;

    fn config() -> Config {
        Config::resolve(None, None, |key| match key {
            "DEPLOY_PRIVATE_KEYS" => Some(KEY.to_string()),
            "DEPLOY_POLL_INTERVAL_MS" => Some("5".to_string()),
            "DEPLOY_CONFIRMATION_TIMEOUT_SECS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn artifact(abi: &str) -> Artifact {
        Artifact {
            contract_name: "MyNFT".to_string(),
            source_name: Some("contracts/MyNFT.sol".to_string()),
            path: PathBuf::from("artifacts/contracts/MyNFT.sol/MyNFT.json"),
            abi: serde_json::from_str::<Abi>(abi).unwrap(),
            bytecode: Bytes::default(),
        }
    }

    fn contract(chain: MockChain) -> NftContract<MockChain> {
        let address = CONTRACT.parse().unwrap();
        NftContract::new(&config(), chain, &artifact(NFT_ABI), address).unwrap()
    }

    fn recipient() -> Address {
        "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".parse().unwrap()
    }

    #[tokio::test]
    async fn test_mint_reads_token_id_from_transfer_event() {
        let nft = contract(MockChain::new(1337));

        let first = nft.mint(recipient(), "ipfs://token/1").await.unwrap();
        let second = nft.mint(recipient(), "ipfs://token/2").await.unwrap();

        assert_eq!(first.token_id, U256::from(1u64));
        assert_eq!(second.token_id, U256::from(2u64));
        assert_eq!(first.recipient, recipient());
        assert_ne!(first.transaction_hash, second.transaction_hash);
        assert!(first.to_string().starts_with("Minted token 1 to 0x70997970C51812dc3A010C7d01b50e0d17dc79C8"));
    }

    #[tokio::test]
    async fn test_mint_targets_contract_with_configured_chain_id() {
        let nft = contract(MockChain::new(1337));
        nft.mint(recipient(), "ipfs://token/1").await.unwrap();

        let calls = nft.client().calls();
        assert_eq!(calls[0], Call::ChainId);
        assert_eq!(
            calls[1],
            Call::Invoke {
                to: CONTRACT.parse().unwrap(),
                chain_id: 1337
            }
        );
    }

    #[tokio::test]
    async fn test_mint_chain_id_mismatch_sends_nothing() {
        let nft = contract(MockChain::new(31337));

        let result = nft.mint(recipient(), "ipfs://token/1").await;
        assert!(matches!(
            result,
            Err(DeployError::ChainIdMismatch { expected: 1337, actual: 31337 })
        ));
        assert_eq!(nft.client().calls(), vec![Call::ChainId]);
    }

    #[tokio::test]
    async fn test_reverted_mint() {
        let mut chain = MockChain::new(1337);
        chain.status = 0;
        let nft = contract(chain);

        let result = nft.mint(recipient(), "ipfs://token/1").await;
        assert!(matches!(result, Err(DeployError::TransactionReverted { .. })));
    }

    #[tokio::test]
    async fn test_mint_without_transfer_event() {
        let mut chain = MockChain::new(1337);
        chain.emit_events = false;
        let nft = contract(chain);

        let result = nft.mint(recipient(), "ipfs://token/1").await;
        assert!(matches!(result, Err(DeployError::ContractCall(_))));
    }

    #[tokio::test]
    async fn test_transfer_minted_token() {
        let nft = contract(MockChain::new(1337));
        let owner = nft.client().deployer;
        let minted = nft.mint(owner, "ipfs://token/1").await.unwrap();

        let moved = nft.transfer(owner, recipient(), minted.token_id).await.unwrap();

        assert_eq!(moved.token_id, minted.token_id);
        assert_eq!(moved.from, owner);
        assert_eq!(moved.to, recipient());
        assert!(moved.to_string().starts_with("Transferred token 1 from "));
    }

    #[tokio::test]
    async fn test_transfer_timeout() {
        let mut chain = MockChain::new(1337);
        chain.confirm = false;
        let nft = contract(chain);

        let result = nft.transfer(recipient(), recipient(), U256::from(7u64)).await;
        assert!(matches!(result, Err(DeployError::DeploymentTimeout { .. })));
    }

    #[test]
    fn test_abi_without_mint_is_rejected() {
        let abi = r#"[{"type": "function", "name": "transferFrom", "stateMutability": "nonpayable",
            "inputs": [{"name": "from", "type": "address"}, {"name": "to", "type": "address"},
                       {"name": "tokenId", "type": "uint256"}], "outputs": []}]"#;
        let chain = MockChain::new(1337);

        let result = NftContract::new(&config(), chain, &artifact(abi), CONTRACT.parse().unwrap());
        assert!(matches!(result, Err(DeployError::InvalidArtifact { .. })));
    }

    #[test]
    fn test_minted_token_id_ignores_other_contracts() {
        let contract: Address = CONTRACT.parse().unwrap();
        let topic = H256::from(keccak256(TRANSFER_EVENT));
        let mut token = [0u8; 32];
        U256::from(42u64).to_big_endian(&mut token);

        let event = |address: Address| Log {
            address,
            topics: vec![topic, H256::zero(), H256::zero(), H256::from(token)],
            ..Default::default()
        };
        let mut receipt = TransactionReceipt {
            logs: vec![event(Address::repeat_byte(0x11))],
            ..Default::default()
        };
        assert_eq!(minted_token_id(&receipt, contract), None);

        receipt.logs.push(event(contract));
        assert_eq!(minted_token_id(&receipt, contract), Some(U256::from(42u64)));
    }
}
