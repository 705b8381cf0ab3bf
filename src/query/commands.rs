use crate::config::Config;
use crate::engine::{MonitorState, StatusTimer, decide};
use crate::etherscan::{EtherscanClient, Page};
use crate::messages;
use crate::query::formatters::{
    OutputFormat, format_balances, format_block, format_pending, format_token_balance,
    format_transfers, format_wallet,
};
use crate::reader::{ContractReader, PendingOrdersSource};
use crate::wallet::check_wallet;
use alloy_primitives::Address;
use anyhow::Result;
use chrono::Utc;
use std::str::FromStr;

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address.trim())
        .map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))
}

pub async fn cmd_pending(
    reader: &ContractReader,
    config: &Config,
    show_ids: bool,
    format: &OutputFormat,
) -> Result<()> {
    let output = if show_ids {
        let orders = reader.pending_orders().await?;
        format_pending(orders.count, config.alert_threshold, Some(&orders.ids), format)
    } else {
        let count = reader.pending_orders_count().await?;
        format_pending(count, config.alert_threshold, None, format)
    };
    println!("{output}");

    Ok(())
}

/// Runs one monitoring cycle from a fresh state and prints the messages the
/// bot would send, without sending anything.
pub async fn cmd_preview(reader: &ContractReader, config: &Config) -> Result<()> {
    println!("📊 Contract: {}", config.contract_hex());
    println!("🎯 Threshold: {}", config.alert_threshold);
    println!("⏰ Interval: {}s", config.check_interval.as_secs());
    println!();

    let mut state = MonitorState::new();
    let now = Utc::now();
    let count = match reader.pending_orders_count().await {
        Ok(count) => {
            println!("✅ Pending orders: {count}");
            Some(count)
        }
        Err(e) => {
            state.record_failure();
            println!("❌ Failed to get pending orders: {e}");
            None
        }
    };

    let decision = decide(count, &state, config.alert_threshold);
    let observation = state.observe(
        count,
        now,
        config.alert_threshold,
        &config.contract_hex(),
    );
    println!("🚨 Should alert: {}", decision.should_alert);

    if decision.should_alert {
        println!("\n📱 Alert Message:\n{}", "-".repeat(30));
        println!("{}", messages::alert_message(&observation, decision.severity));
    }

    let timer = StatusTimer::new(now, config.check_interval);
    if timer.is_due(now, state.last_check_time) {
        println!("\n📊 Status Message:\n{}", "-".repeat(30));
        println!("{}", messages::status_message(&observation));
    }

    Ok(())
}

pub async fn cmd_balances(
    client: &EtherscanClient,
    address: &str,
    chain_ids: &[u64],
    format: &OutputFormat,
) -> Result<()> {
    let address = parse_address(address)?;

    if chain_ids.is_empty() {
        return Err(anyhow::anyhow!("Please specify at least one chain id"));
    }

    let balances = client.multichain_balances(address, chain_ids).await;
    let output = format_balances(&balances, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_block(client: &EtherscanClient, chain_id: u64, format: &OutputFormat) -> Result<()> {
    let block = client.block_number(chain_id).await?;
    let output = format_block(chain_id, block, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_transfers(
    client: &EtherscanClient,
    chain_id: u64,
    address: &str,
    token: Option<&str>,
    limit: u32,
    format: &OutputFormat,
) -> Result<()> {
    let address = parse_address(address)?;
    let token = token.map(parse_address).transpose()?;
    if limit == 0 {
        return Err(anyhow::anyhow!("--limit must be at least 1"));
    }

    let transfers = client
        .token_transfers(chain_id, address, token, Page::latest(limit))
        .await?;
    let output = format_transfers(&transfers, Utc::now(), format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_wallet(
    client: &EtherscanClient,
    chain_id: u64,
    address: &str,
    format: &OutputFormat,
) -> Result<()> {
    let address = parse_address(address)?;
    let report = check_wallet(client, chain_id, address).await?;
    let output = format_wallet(&report, Utc::now(), format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_token_balance(
    client: &EtherscanClient,
    chain_id: u64,
    token: &str,
    holder: &str,
    decimals: u8,
    format: &OutputFormat,
) -> Result<()> {
    let token = parse_address(token)?;
    let holder = parse_address(holder)?;

    let balance = client.token_balance(chain_id, token, holder).await?;
    let output = format_token_balance(chain_id, token, holder, balance, decimals, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_config(config: &Config) -> Result<()> {
    println!("{config}");
    Ok(())
}
