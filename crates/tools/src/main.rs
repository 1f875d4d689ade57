use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, U256};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};

use nft_tools::config::CONFIG_FILE;
use nft_tools::logging::init_logging;
use nft_tools::{
    ArtifactStore, ChainClient, Config, Deployer, EthersClient, NftContract, DEFAULT_CONTRACT,
};

#[derive(Parser)]
#[command(name = "nft-deploy")]
#[command(about = "Deploy the MyNFT contract, mint and transfer tokens, inspect the configuration")]
#[command(version)]
struct Cli {
    /// Without a subcommand, deploys MyNFT to the configured network
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(global = true, long, env = "DEPLOY_DEBUG")]
    debug: bool,

    /// Network profile file
    #[arg(global = true, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Network profile to use (overrides DEPLOY_NETWORK)
    #[arg(global = true, short, long)]
    network: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy a compiled contract
    Deploy {
        /// Contract name or <source>.sol:<name>
        #[arg(short, long, default_value = DEFAULT_CONTRACT)]
        contract: String,
        /// Constructor argument, repeated in declaration order
        #[arg(long = "arg", value_name = "VALUE")]
        args: Vec<String>,
    },
    /// Show the resolved network configuration
    Config {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List deployable contract artifacts
    Artifacts,
    /// Mint a token on a deployed contract
    Mint {
        /// Recipient address
        #[arg(long)]
        to: String,
        /// Token metadata URI
        #[arg(long)]
        uri: String,
        #[command(flatten)]
        target: Target,
    },
    /// Transfer a token on a deployed contract
    Transfer {
        /// Current owner (defaults to the signing account)
        #[arg(long)]
        from: Option<String>,
        /// New owner
        #[arg(long)]
        to: String,
        /// Decimal token id
        #[arg(long)]
        token_id: String,
        #[command(flatten)]
        target: Target,
    },
}

#[derive(clap::Args)]
struct Target {
    /// Deployed contract address (overrides DEPLOY_CONTRACT_ADDRESS)
    #[arg(long)]
    address: Option<String>,
    /// Artifact whose ABI describes the contract
    #[arg(short, long, default_value = DEFAULT_CONTRACT)]
    contract: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_logging(cli.debug)?;

    let config = Config::load_from(&cli.config, cli.network.as_deref())
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    debug!(network = %config.profile, chain_id = config.chain_id, "Configuration loaded");

    match cli.command {
        None => deploy(&config, DEFAULT_CONTRACT, &[]).await,
        Some(Commands::Deploy { contract, args }) => deploy(&config, &contract, &args).await,
        Some(Commands::Config { json }) => {
            if json {
                println!("{}", config.to_json()?);
            } else {
                config.print_summary();
            }
            Ok(())
        }
        Some(Commands::Artifacts) => {
            let store = ArtifactStore::new(config.artifacts_dir.clone());
            let names = store.list()?;
            if names.is_empty() {
                info!(dir = %store.root().display(), "No deployable artifacts found");
            }
            for name in names {
                println!("{}", name);
            }
            Ok(())
        }
        Some(Commands::Mint { to, uri, target }) => {
            let nft = bind(&config, &target)?;
            let receipt = nft.mint(parse_address("--to", &to)?, &uri).await?;
            println!("{}", receipt);
            Ok(())
        }
        Some(Commands::Transfer {
            from,
            to,
            token_id,
            target,
        }) => {
            let nft = bind(&config, &target)?;
            let from = match from {
                Some(from) => parse_address("--from", &from)?,
                None => nft.client().deployer_address(),
            };
            let token_id = U256::from_dec_str(&token_id)
                .with_context(|| format!("invalid --token-id '{}'", token_id))?;
            let receipt = nft
                .transfer(from, parse_address("--to", &to)?, token_id)
                .await?;
            println!("{}", receipt);
            Ok(())
        }
    }
}

fn parse_address(flag: &str, value: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|e| anyhow!("invalid {} address '{}': {}", flag, value, e))
}

fn bind(config: &Config, target: &Target) -> Result<NftContract<EthersClient>> {
    let address = match &target.address {
        Some(address) => parse_address("--address", address)?,
        None => config
            .contract_address
            .ok_or_else(|| anyhow!("no contract address: pass --address or set DEPLOY_CONTRACT_ADDRESS"))?,
    };

    let artifact = ArtifactStore::new(config.artifacts_dir.clone()).resolve(&target.contract)?;
    let client = EthersClient::connect(config)?;
    Ok(NftContract::new(config, client, &artifact, address)?)
}

async fn deploy(config: &Config, contract: &str, args: &[String]) -> Result<()> {
    info!(contract = contract, network = %config.profile, "Deploying {} contract...", contract);

    let client = EthersClient::connect(config)?;
    let deployer = Deployer::new(config, client);
    let record = deployer.deploy(contract, args).await?;

    println!("{}", record);
    Ok(())
}
