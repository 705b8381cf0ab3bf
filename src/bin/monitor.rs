use anyhow::Result;
use pending_orders_monitor::config::Config;
use pending_orders_monitor::etherscan::EtherscanClient;
use pending_orders_monitor::messages;
use pending_orders_monitor::monitor::Monitor;
use pending_orders_monitor::notifier::{Notifier, TelegramNotifier};
use pending_orders_monitor::reader::ContractReader;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    info!("Starting Pending Orders Bot...");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Contract address: {}", config.contract_hex());
    info!("API URL: {}", config.redacted_api_url());

    let (token, chat_id) = config.validate_notifier()?;
    let notifier = TelegramNotifier::new(token, chat_id);

    match notifier.get_me().await {
        Ok(bot) => info!(
            "Bot initialized: @{}",
            bot.username.as_deref().unwrap_or("unknown")
        ),
        Err(e) => {
            error!("Failed to initialize bot: {}", e);
            return Err(e.into());
        }
    }

    let client = EtherscanClient::from_config(&config)?;
    let reader = ContractReader::from_config(client, &config);

    let startup = messages::startup_message(
        &config.bot_name,
        config.alert_threshold,
        config.check_interval,
        &config.contract_hex(),
    );
    let _ = notifier.send(&startup).await;

    let mut monitor = Monitor::new(reader, notifier, &config);
    monitor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Bot stopped by user");
        })
        .await;

    let _ = monitor.notifier().send(&messages::stopped_message()).await;

    Ok(())
}
