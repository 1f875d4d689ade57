//! Node access used by the deployment procedure
//!
//! `ChainClient` is the seam between the procedures and the network. The
//! ethers implementation signs with the configured deployer key and talks
//! JSON-RPC over HTTP.

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, TransactionReceipt, TransactionRequest, H256, U256, U64};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{DeployError, Result};

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Account that signs and pays for transactions
    fn deployer_address(&self) -> Address;

    /// Chain identifier reported by the node
    async fn chain_id(&self) -> Result<u64>;

    /// Sign and submit a contract-creation transaction, returning its hash once
    /// the node has accepted it
    async fn submit_deployment(&self, creation_code: Bytes, chain_id: u64) -> Result<H256>;

    /// Sign and submit a call to an existing contract
    async fn submit_call(&self, to: Address, data: Bytes, chain_id: u64) -> Result<H256>;

    /// Receipt of a transaction, `None` while it is still pending
    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>>;
}

/// Poll until the receipt of `tx_hash` arrives or `timeout` expires
pub async fn wait_for_receipt<C>(
    client: &C,
    tx_hash: H256,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<TransactionReceipt>
where
    C: ChainClient + ?Sized,
{
    let poll = async {
        loop {
            if let Some(receipt) = client.transaction_receipt(tx_hash).await? {
                return Ok::<_, DeployError>(receipt);
            }
            debug!(tx_hash = ?tx_hash, "Transaction pending");
            tokio::time::sleep(poll_interval).await;
        }
    };

    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| DeployError::DeploymentTimeout { tx_hash, timeout })?
}

/// Reject receipts whose execution failed
pub fn ensure_success(receipt: &TransactionReceipt) -> Result<()> {
    if receipt.status == Some(U64::zero()) {
        return Err(DeployError::TransactionReverted {
            tx_hash: receipt.transaction_hash,
            reason: "receipt status 0".to_string(),
        });
    }
    Ok(())
}

fn narrow_chain_id(chain_id: U256) -> Result<u64> {
    u64::try_from(chain_id)
        .map_err(|_| DeployError::Network(format!("node reported out-of-range chain id {chain_id}")))
}

/// JSON-RPC client backed by ethers' HTTP provider and a local wallet
pub struct EthersClient {
    inner: SignerMiddleware<Provider<Http>, LocalWallet>,
}

impl EthersClient {
    /// Build a client for the configured network. No request is sent yet.
    pub fn connect(config: &Config) -> Result<Self> {
        let wallet = config.deployer()?.clone();

        let url: Url = config
            .rpc_url
            .parse()
            .map_err(|e| DeployError::Network(format!("invalid RPC URL {}: {e}", config.rpc_url)))?;
        let http = reqwest::Client::builder()
            .timeout(config.rpc_timeout())
            .build()
            .map_err(|e| DeployError::Network(format!("failed to build HTTP client: {e}")))?;

        let provider = Provider::new(Http::new_with_client(url, http))
            .interval(config.poll_interval());

        debug!(
            rpc_url = %config.rpc_url,
            deployer = ?wallet.address(),
            "Created RPC client"
        );

        Ok(Self {
            inner: SignerMiddleware::new(provider, wallet),
        })
    }

    async fn send(&self, tx: TransactionRequest) -> Result<H256> {
        let pending = self
            .inner
            .send_transaction(tx, None)
            .await
            .map_err(|e| DeployError::Network(format!("transaction rejected: {e}")))?;

        Ok(pending.tx_hash())
    }
}

#[async_trait]
impl ChainClient for EthersClient {
    fn deployer_address(&self) -> Address {
        self.inner.address()
    }

    async fn chain_id(&self) -> Result<u64> {
        let chain_id = self
            .inner
            .provider()
            .get_chainid()
            .await
            .map_err(|e| DeployError::Network(format!("failed to query chain id: {e}")))?;

        narrow_chain_id(chain_id)
    }

    async fn submit_deployment(&self, creation_code: Bytes, chain_id: u64) -> Result<H256> {
        let tx = TransactionRequest::new()
            .from(self.inner.address())
            .data(creation_code)
            .chain_id(chain_id);
        self.send(tx).await
    }

    async fn submit_call(&self, to: Address, data: Bytes, chain_id: u64) -> Result<H256> {
        let tx = TransactionRequest::new()
            .from(self.inner.address())
            .to(to)
            .data(data)
            .chain_id(chain_id);
        self.send(tx).await
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        self.inner
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| DeployError::Network(format!("failed to fetch receipt: {e}")))
    }
}

/// In-memory node shared by the procedure tests
#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use ethers::types::Log;
    use ethers::utils::{get_contract_address, id, keccak256};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        ChainId,
        Submit { chain_id: u64 },
        Invoke { to: Address, chain_id: u64 },
        Receipt,
    }

    enum Pending {
        Create(Address),
        Invoke { to: Address, data: Bytes },
    }

    pub(crate) fn transfer_topic() -> H256 {
        H256::from(keccak256("Transfer(address,address,uint256)"))
    }

    fn word(data: &[u8], index: usize) -> &[u8] {
        &data[4 + index * 32..4 + (index + 1) * 32]
    }

    fn address_topic(raw: &[u8]) -> H256 {
        H256::from_slice(raw)
    }

    /// Contract addresses follow the sender nonce and minted token ids count
    /// up from 1, like a real chain running MyNFT
    pub(crate) struct MockChain {
        pub(crate) chain_id: u64,
        pub(crate) reachable: bool,
        pub(crate) status: u64,
        pub(crate) pending_polls: usize,
        pub(crate) confirm: bool,
        pub(crate) emit_events: bool,
        pub(crate) deployer: Address,
        calls: Mutex<Vec<Call>>,
        nonce: Mutex<u64>,
        next_token: Mutex<u64>,
        polls: Mutex<HashMap<H256, usize>>,
        pending: Mutex<HashMap<H256, Pending>>,
    }

    impl MockChain {
        pub(crate) fn new(chain_id: u64) -> Self {
            Self {
                chain_id,
                reachable: true,
                status: 1,
                pending_polls: 0,
                confirm: true,
                emit_events: true,
                deployer: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap(),
                calls: Mutex::new(Vec::new()),
                nonce: Mutex::new(0),
                next_token: Mutex::new(1),
                polls: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
            }
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn check_reachable(&self) -> Result<()> {
            if self.reachable {
                Ok(())
            } else {
                Err(DeployError::Network("connection refused".to_string()))
            }
        }

        fn next_hash(&self, payload: &[u8]) -> (H256, u64) {
            let mut nonce = self.nonce.lock().unwrap();
            let used = *nonce;
            let mut preimage = payload.to_vec();
            preimage.extend_from_slice(&used.to_be_bytes());
            *nonce += 1;
            (H256::from(keccak256(preimage)), used)
        }

        fn events(&self, to: Address, data: &Bytes) -> Vec<Log> {
            if !self.emit_events || data.len() < 4 {
                return Vec::new();
            }

            let topics = if data[..4] == id("mintNFT(address,string)") {
                let mut next = self.next_token.lock().unwrap();
                let mut token = [0u8; 32];
                U256::from(*next).to_big_endian(&mut token);
                *next += 1;
                vec![
                    transfer_topic(),
                    H256::zero(),
                    address_topic(word(data, 0)),
                    H256::from(token),
                ]
            } else if data[..4] == id("transferFrom(address,address,uint256)") {
                vec![
                    transfer_topic(),
                    address_topic(word(data, 0)),
                    address_topic(word(data, 1)),
                    H256::from_slice(word(data, 2)),
                ]
            } else {
                return Vec::new();
            };

            vec![Log {
                address: to,
                topics,
                ..Default::default()
            }]
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        fn deployer_address(&self) -> Address {
            self.deployer
        }

        async fn chain_id(&self) -> Result<u64> {
            self.record(Call::ChainId);
            self.check_reachable()?;
            Ok(self.chain_id)
        }

        async fn submit_deployment(&self, creation_code: Bytes, chain_id: u64) -> Result<H256> {
            self.record(Call::Submit { chain_id });
            self.check_reachable()?;

            let (tx_hash, nonce) = self.next_hash(&creation_code);
            let address = get_contract_address(self.deployer, nonce);
            self.pending
                .lock()
                .unwrap()
                .insert(tx_hash, Pending::Create(address));
            Ok(tx_hash)
        }

        async fn submit_call(&self, to: Address, data: Bytes, chain_id: u64) -> Result<H256> {
            self.record(Call::Invoke { to, chain_id });
            self.check_reachable()?;

            let (tx_hash, _) = self.next_hash(&data);
            self.pending
                .lock()
                .unwrap()
                .insert(tx_hash, Pending::Invoke { to, data });
            Ok(tx_hash)
        }

        async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
            self.record(Call::Receipt);
            self.check_reachable()?;

            let mut polls = self.polls.lock().unwrap();
            let seen = polls.entry(tx_hash).or_insert(0);
            *seen += 1;
            if !self.confirm || *seen <= self.pending_polls {
                return Ok(None);
            }

            let succeeded = self.status == 1;
            let (contract_address, logs) = match self.pending.lock().unwrap().get(&tx_hash) {
                Some(Pending::Create(address)) if succeeded => (Some(*address), Vec::new()),
                Some(Pending::Invoke { to, data }) if succeeded => (None, self.events(*to, data)),
                _ => (None, Vec::new()),
            };

            Ok(Some(TransactionReceipt {
                transaction_hash: tx_hash,
                status: Some(self.status.into()),
                contract_address,
                logs,
                block_number: Some(1u64.into()),
                ..Default::default()
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockChain;
    use super::*;

    const KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn config_with(pairs: &[(&str, &str)]) -> Config {
        let pairs: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::resolve(None, None, move |key| {
            pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
        })
        .unwrap()
    }

    #[test]
    fn test_connect_requires_signing_key() {
        let config = config_with(&[]);
        assert!(matches!(
            EthersClient::connect(&config),
            Err(DeployError::Config(_))
        ));
    }

    #[test]
    fn test_connect_uses_first_key() {
        let config = config_with(&[("DEPLOY_PRIVATE_KEYS", KEY)]);
        let client = EthersClient::connect(&config).unwrap();
        assert_eq!(
            client.deployer_address(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_is_network_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let config = config_with(&[
            ("DEPLOY_PRIVATE_KEYS", KEY),
            ("DEPLOY_RPC_URL", "http://127.0.0.1:9"),
            ("DEPLOY_RPC_TIMEOUT_MS", "2000"),
        ]);
        let client = EthersClient::connect(&config).unwrap();

        assert!(matches!(
            client.chain_id().await,
            Err(DeployError::Network(_))
        ));
    }

    #[test]
    fn test_oversized_chain_id_does_not_fit() {
        let huge = U256::from(u64::MAX) + U256::one();
        assert!(matches!(narrow_chain_id(huge), Err(DeployError::Network(_))));
        assert_eq!(narrow_chain_id(U256::from(1337u64)).unwrap(), 1337);
    }

    #[tokio::test]
    async fn test_wait_for_receipt_polls_until_mined() {
        let mut chain = MockChain::new(1337);
        chain.pending_polls = 2;
        let tx_hash = chain
            .submit_deployment(Bytes::from(vec![0x60, 0x80]), 1337)
            .await
            .unwrap();

        let receipt = wait_for_receipt(
            &chain,
            tx_hash,
            Duration::from_secs(1),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
        assert_eq!(receipt.transaction_hash, tx_hash);
        assert!(ensure_success(&receipt).is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_receipt_times_out() {
        let mut chain = MockChain::new(1337);
        chain.confirm = false;

        let result = wait_for_receipt(
            &chain,
            H256::zero(),
            Duration::from_millis(50),
            Duration::from_millis(5),
        )
        .await;
        assert!(matches!(result, Err(DeployError::DeploymentTimeout { .. })));
    }

    #[test]
    fn test_ensure_success_rejects_status_zero() {
        let receipt = TransactionReceipt {
            status: Some(0u64.into()),
            ..Default::default()
        };
        assert!(matches!(
            ensure_success(&receipt),
            Err(DeployError::TransactionReverted { .. })
        ));
    }
}
