//! Network profile configuration for contract deployment
//!
//! This module provides typed, validated configuration for the target EVM network.
//! Every field is resolved in priority order:
//!
//! 1. Environment variables (DEPLOY_*); the binary loads `.env` into them first
//! 2. The selected profile in deploy.toml
//! 3. Built-in defaults of the known development networks
//!
//! Signing keys are never compiled in. They come from `DEPLOY_PRIVATE_KEYS`
//! or, as a fallback, from the profile's `private_keys` list.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nft_tools::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! println!("Network: {} (chain {})", config.profile, config.chain_id);
//! println!("RPC URL: {}", config.rpc_url);
//! # Ok(())
//! # }
//! ```

use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use ethers::utils::to_checksum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default location of the profile file, relative to the working directory
pub const CONFIG_FILE: &str = "deploy.toml";

/// Profile used when nothing selects one
pub const DEFAULT_NETWORK: &str = "ganache";

/// Solidity compiler version the contracts are built with
pub const DEFAULT_COMPILER_VERSION: &str = "0.8.28";

/// Hardhat writes its artifacts here
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Missing required field: {field} (network '{network}')")]
    MissingField { field: &'static str, network: String },

    #[error("Invalid network name: {0:?}")]
    InvalidNetwork(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Invalid private key at position {0}")]
    InvalidPrivateKey(usize),

    #[error("No signing key configured; set DEPLOY_PRIVATE_KEYS")]
    NoSigningKey,

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Development and public networks known without a profile entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Ganache desktop workspace
    Ganache,
    /// In-process Hardhat node (`npx hardhat node`)
    Hardhat,
    /// Foundry's local node
    Anvil,
    /// Sepolia public testnet
    Sepolia,
    /// Any other profile name; everything comes from deploy.toml or the environment
    Custom,
}

impl Network {
    /// Get network as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ganache => "ganache",
            Network::Hardhat => "hardhat",
            Network::Anvil => "anvil",
            Network::Sepolia => "sepolia",
            Network::Custom => "custom",
        }
    }

    /// Get default RPC URL for this network
    pub fn default_rpc_url(&self) -> Option<&'static str> {
        match self {
            Network::Ganache => Some("http://127.0.0.1:7545"),
            Network::Hardhat | Network::Anvil => Some("http://127.0.0.1:8545"),
            Network::Sepolia | Network::Custom => None,
        }
    }

    /// Get the chain identifier the network's node reports
    pub fn default_chain_id(&self) -> Option<u64> {
        match self {
            Network::Ganache => Some(1337),
            Network::Hardhat | Network::Anvil => Some(31337),
            Network::Sepolia => Some(11_155_111),
            Network::Custom => None,
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidNetwork(s.to_string()));
        }

        Ok(match name.to_lowercase().as_str() {
            "ganache" => Network::Ganache,
            "hardhat" => Network::Hardhat,
            "anvil" => Network::Anvil,
            "sepolia" => Network::Sepolia,
            _ => Network::Custom,
        })
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// TOML profile definition from deploy.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkProfile {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub private_keys: Vec<String>,
    /// Address of an already deployed NFT contract on this network
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Complete deploy.toml contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployToml {
    #[serde(default)]
    pub default: Option<DefaultProfile>,
    #[serde(default)]
    pub profile: HashMap<String, NetworkProfile>,
}

/// Default section, shared by all profiles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultProfile {
    pub network: Option<String>,
    pub solidity: Option<String>,
    pub artifacts_dir: Option<PathBuf>,
}

/// Resolved runtime configuration with all required fields
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the selected profile
    pub profile: String,
    /// Known network the profile maps to
    pub network: Network,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Chain identifier used for signing; never altered after loading
    pub chain_id: u64,
    /// Solidity compiler version
    pub compiler_version: String,
    /// Signing wallets in configured order, already bound to `chain_id`
    pub signers: Vec<LocalWallet>,
    /// Directory holding compiled contract artifacts
    pub artifacts_dir: PathBuf,
    /// Deployed contract used by mint and transfer (optional)
    pub contract_address: Option<Address>,
    pub rpc_timeout_ms: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Config {
    /// Load configuration from the environment and ./deploy.toml
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_FILE), None)
    }

    /// Load configuration using an explicit profile file and optional network override
    ///
    /// # Resolution Order
    ///
    /// 1. Select the network: override, DEPLOY_NETWORK, `[default].network`, ganache
    /// 2. Overlay DEPLOY_* env vars on the profile, then on built-in defaults
    /// 3. Validate every field
    ///
    /// `.env` is not read here; the binary loads it before parsing arguments.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the profile file cannot be parsed, a required
    /// field is missing for a custom network, or any value fails validation.
    pub fn load_from(path: &Path, network: Option<&str>) -> Result<Self, ConfigError> {
        let file = Self::load_toml(path)?;
        Self::resolve(file.as_ref(), network, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from parsed file contents and an environment lookup
    pub fn resolve<F>(
        file: Option<&DeployToml>,
        network_override: Option<&str>,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = file.and_then(|t| t.default.as_ref());

        let profile_name = network_override
            .map(str::to_string)
            .or_else(|| env("DEPLOY_NETWORK"))
            .or_else(|| defaults.and_then(|d| d.network.clone()))
            .unwrap_or_else(|| DEFAULT_NETWORK.to_string());

        let network: Network = profile_name.parse()?;
        let profile_name = profile_name.trim().to_string();

        // TOML keys are case-sensitive; fall back to the lowercase spelling
        let profile = file.and_then(|t| {
            t.profile
                .get(profile_name.as_str())
                .or_else(|| t.profile.get(profile_name.to_lowercase().as_str()))
        });
        if profile.is_none() && network == Network::Custom {
            debug!(network = %profile_name, "No profile entry for custom network");
        }

        let rpc_url = env("DEPLOY_RPC_URL")
            .or_else(|| profile.and_then(|p| p.rpc_url.clone()))
            .or_else(|| network.default_rpc_url().map(str::to_string))
            .ok_or_else(|| ConfigError::MissingField {
                field: "rpc_url",
                network: profile_name.clone(),
            })?;

        let chain_id = match env("DEPLOY_CHAIN_ID") {
            Some(raw) => parse_number("chain_id", &raw)?,
            None => profile
                .and_then(|p| p.chain_id)
                .or_else(|| network.default_chain_id())
                .ok_or_else(|| ConfigError::MissingField {
                    field: "chain_id",
                    network: profile_name.clone(),
                })?,
        };

        let compiler_version = env("DEPLOY_SOLC_VERSION")
            .or_else(|| defaults.and_then(|d| d.solidity.clone()))
            .unwrap_or_else(|| DEFAULT_COMPILER_VERSION.to_string());

        let artifacts_dir = env("DEPLOY_ARTIFACTS_DIR")
            .map(PathBuf::from)
            .or_else(|| defaults.and_then(|d| d.artifacts_dir.clone()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACTS_DIR));

        let raw_keys = match env("DEPLOY_PRIVATE_KEYS") {
            Some(list) => split_keys(&list),
            None => {
                let keys = profile.map(|p| p.private_keys.clone()).unwrap_or_default();
                if !keys.is_empty() {
                    warn!(
                        network = %profile_name,
                        "Private keys read from the profile file; prefer DEPLOY_PRIVATE_KEYS"
                    );
                }
                keys
            }
        };

        let contract_address = env("DEPLOY_CONTRACT_ADDRESS")
            .or_else(|| profile.and_then(|p| p.contract_address.clone()))
            .map(|raw| {
                raw.trim()
                    .parse::<Address>()
                    .map_err(|_| ConfigError::InvalidValue {
                        field: "contract_address",
                        value: raw.clone(),
                    })
            })
            .transpose()?;

        let rpc_timeout_ms = optional_number(&env, "DEPLOY_RPC_TIMEOUT_MS", "rpc_timeout_ms")?
            .unwrap_or(DEFAULT_RPC_TIMEOUT_MS);
        let confirmation_timeout_secs = optional_number(
            &env,
            "DEPLOY_CONFIRMATION_TIMEOUT_SECS",
            "confirmation_timeout_secs",
        )?
        .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS);
        let poll_interval_ms =
            optional_number(&env, "DEPLOY_POLL_INTERVAL_MS", "poll_interval_ms")?
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        Self::validate(&rpc_url, chain_id, &compiler_version)?;
        Self::validate_durations(rpc_timeout_ms, confirmation_timeout_secs, poll_interval_ms)?;
        let signers = Self::parse_signers(&raw_keys, chain_id)?;

        Ok(Config {
            profile: profile_name,
            network,
            rpc_url,
            chain_id,
            compiler_version,
            signers,
            artifacts_dir,
            contract_address,
            rpc_timeout_ms,
            confirmation_timeout_secs,
            poll_interval_ms,
        })
    }

    /// Load deploy.toml if present
    fn load_toml(path: &Path) -> Result<Option<DeployToml>, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "Profile file not found, using defaults");
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&content)?))
    }

    /// Validate configuration values
    fn validate(rpc_url: &str, chain_id: u64, compiler_version: &str) -> Result<(), ConfigError> {
        if rpc_url.is_empty() {
            return Err(ConfigError::ValidationError("rpc_url is empty".to_string()));
        }

        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "RPC URL must start with http:// or https://: {}",
                rpc_url
            )));
        }

        if chain_id == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chain_id",
                value: chain_id.to_string(),
            });
        }

        let parts: Vec<&str> = compiler_version.split('.').collect();
        let well_formed = parts.len() == 3
            && parts
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
        if !well_formed {
            return Err(ConfigError::InvalidValue {
                field: "compiler_version",
                value: compiler_version.to_string(),
            });
        }

        Ok(())
    }

    /// Timeouts and the poll interval must be non-zero
    fn validate_durations(
        rpc_timeout_ms: u64,
        confirmation_timeout_secs: u64,
        poll_interval_ms: u64,
    ) -> Result<(), ConfigError> {
        let fields = [
            ("rpc_timeout_ms", rpc_timeout_ms),
            ("confirmation_timeout_secs", confirmation_timeout_secs),
            ("poll_interval_ms", poll_interval_ms),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    fn parse_signers(keys: &[String], chain_id: u64) -> Result<Vec<LocalWallet>, ConfigError> {
        keys.iter()
            .enumerate()
            .map(|(index, key)| {
                key.parse::<LocalWallet>()
                    .map(|wallet| wallet.with_chain_id(chain_id))
                    .map_err(|_| ConfigError::InvalidPrivateKey(index))
            })
            .collect()
    }

    /// The wallet that signs deployments: the first configured key
    pub fn deployer(&self) -> Result<&LocalWallet, ConfigError> {
        self.signers.first().ok_or(ConfigError::NoSigningKey)
    }

    /// Addresses of all configured signers, in order
    pub fn signer_addresses(&self) -> Vec<Address> {
        self.signers.iter().map(|s| s.address()).collect()
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Print the resolved configuration. Keys are shown as addresses only.
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════════╗");
        println!("║          DEPLOYMENT NETWORK CONFIGURATION RESOLVED             ║");
        println!("╚════════════════════════════════════════════════════════════════╝");
        println!("  Network:             {} ({})", self.profile, self.network);
        println!("  RPC URL:             {}", self.rpc_url);
        println!("  Chain ID:            {}", self.chain_id);
        println!("  Solidity:            {}", self.compiler_version);
        println!("  Artifacts:           {}", self.artifacts_dir.display());

        match self.contract_address {
            Some(address) => println!("  Contract:            {}", to_checksum(&address, None)),
            None => println!("  Contract:            (not configured)"),
        }

        if self.signers.is_empty() {
            println!("  Signers:             (not configured)");
        } else {
            for (index, address) in self.signer_addresses().iter().enumerate() {
                println!("  Signer #{}:           {}", index, to_checksum(address, None));
            }
        }

        println!("  RPC Timeout:         {}ms", self.rpc_timeout_ms);
        println!("  Confirmation Wait:   {}s", self.confirmation_timeout_secs);
        println!("  Poll Interval:       {}ms", self.poll_interval_ms);
        println!("╚════════════════════════════════════════════════════════════════╝");
    }

    /// Get configuration as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// Signers are serialized as addresses so key material never leaves the process
impl Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let signers: Vec<String> = self
            .signer_addresses()
            .iter()
            .map(|a| to_checksum(a, None))
            .collect();

        let contract_address = self.contract_address.map(|a| to_checksum(&a, None));

        let mut map = serializer.serialize_map(Some(11))?;
        map.serialize_entry("profile", &self.profile)?;
        map.serialize_entry("network", &self.network)?;
        map.serialize_entry("rpc_url", &self.rpc_url)?;
        map.serialize_entry("chain_id", &self.chain_id)?;
        map.serialize_entry("compiler_version", &self.compiler_version)?;
        map.serialize_entry("signers", &signers)?;
        map.serialize_entry("artifacts_dir", &self.artifacts_dir)?;
        map.serialize_entry("contract_address", &contract_address)?;
        map.serialize_entry("rpc_timeout_ms", &self.rpc_timeout_ms)?;
        map.serialize_entry("confirmation_timeout_secs", &self.confirmation_timeout_secs)?;
        map.serialize_entry("poll_interval_ms", &self.poll_interval_ms)?;
        map.end()
    }
}

fn split_keys(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_number(field: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: raw.to_string(),
    })
}

fn optional_number<F>(env: &F, key: &str, field: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).map(|raw| parse_number(field, &raw)).transpose()
}
