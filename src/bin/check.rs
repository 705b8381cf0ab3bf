use anyhow::Result;
use clap::{Parser, Subcommand};
use pending_orders_monitor::chains::Chain;
use pending_orders_monitor::config::Config;
use pending_orders_monitor::etherscan::EtherscanClient;
use pending_orders_monitor::query::commands::{
    cmd_balances, cmd_block, cmd_config, cmd_pending, cmd_preview, cmd_token_balance,
    cmd_transfers, cmd_wallet,
};
use pending_orders_monitor::query::formatters::OutputFormat;
use pending_orders_monitor::reader::ContractReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "check")]
#[command(about = "Inspect the monitored contract through the Etherscan API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Current pending order count
    Pending {
        /// Also list the order ids
        #[arg(long, default_value = "false")]
        ids: bool,
    },
    /// Run one monitoring cycle and print the messages without sending them
    Preview,
    /// Native balance of an address on several chains
    Balances {
        address: String,

        /// Chain ids, comma separated; defaults to every known chain
        #[arg(long, value_delimiter = ',')]
        chains: Vec<u64>,
    },
    /// Latest block number on the configured chain
    Block {
        #[arg(long)]
        chain: Option<u64>,
    },
    /// Latest ERC-20 transfers of an address
    Transfers {
        address: String,

        /// Only transfers of this token contract
        #[arg(long)]
        token: Option<String>,

        #[arg(long, default_value_t = 10)]
        limit: u32,

        #[arg(long)]
        chain: Option<u64>,
    },
    /// Wallet age and recent token transfers
    Wallet {
        address: String,

        #[arg(long)]
        chain: Option<u64>,
    },
    /// ERC-20 balance of an address
    TokenBalance {
        token: String,
        address: String,

        #[arg(long, default_value_t = 18)]
        decimals: u8,

        #[arg(long)]
        chain: Option<u64>,
    },
    /// Print the configuration with secrets hidden
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;
    let client = EtherscanClient::from_config(&config)?;

    match cli.command {
        Commands::Pending { ids } => {
            let reader = ContractReader::from_config(client, &config);
            cmd_pending(&reader, &config, ids, &format).await?;
        }
        Commands::Preview => {
            let reader = ContractReader::from_config(client, &config);
            cmd_preview(&reader, &config).await?;
        }
        Commands::Balances { address, chains } => {
            let chain_ids = if chains.is_empty() {
                Chain::ALL.iter().map(|c| c.id()).collect()
            } else {
                chains
            };
            cmd_balances(&client, &address, &chain_ids, &format).await?;
        }
        Commands::Block { chain } => {
            cmd_block(&client, chain.unwrap_or(config.chain_id), &format).await?;
        }
        Commands::Transfers {
            address,
            token,
            limit,
            chain,
        } => {
            let chain_id = chain.unwrap_or(config.chain_id);
            cmd_transfers(&client, chain_id, &address, token.as_deref(), limit, &format).await?;
        }
        Commands::Wallet { address, chain } => {
            cmd_wallet(&client, chain.unwrap_or(config.chain_id), &address, &format).await?;
        }
        Commands::TokenBalance {
            token,
            address,
            decimals,
            chain,
        } => {
            let chain_id = chain.unwrap_or(config.chain_id);
            cmd_token_balance(&client, chain_id, &token, &address, decimals, &format).await?;
        }
        Commands::Config => {
            cmd_config(&config)?;
        }
    }

    Ok(())
}
