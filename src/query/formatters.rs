use crate::chains::chain_name;
use crate::engine::format_timestamp;
use crate::etherscan::{ChainBalance, TokenTransfer};
use crate::wallet::{WalletReport, relative_age};
use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

const NATIVE_DECIMALS: u8 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn finish_csv(wtr: Writer<Vec<u8>>) -> String {
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_pending(
    count: U256,
    threshold: u64,
    ids: Option<&[U256]>,
    format: &OutputFormat,
) -> String {
    let above = count > U256::from(threshold);

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value"]);
            table.add_row(vec![Cell::new("Pending Orders"), Cell::new(count)]);
            table.add_row(vec![Cell::new("Threshold"), Cell::new(threshold)]);
            table.add_row(vec![
                Cell::new("Above Threshold"),
                Cell::new(if above { "yes" } else { "no" }),
            ]);
            let mut out = table.to_string();

            if let Some(ids) = ids {
                if ids.is_empty() {
                    out.push_str("\nNo pending order ids returned.");
                } else {
                    let mut id_table = new_table(vec!["#", "Order Id"]);
                    for (i, id) in ids.iter().enumerate() {
                        id_table.add_row(vec![Cell::new(i + 1), Cell::new(id)]);
                    }
                    out.push('\n');
                    out.push_str(&id_table.to_string());
                }
            }
            out
        }
        OutputFormat::Json => {
            let mut value = json!({
                "pending_orders": count.to_string(),
                "threshold": threshold,
                "above_threshold": above,
            });
            if let Some(ids) = ids {
                value["order_ids"] = json!(ids.iter().map(|id| id.to_string()).collect::<Vec<_>>());
            }
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            match ids {
                Some(ids) => {
                    let _ = wtr.write_record(["index", "order_id"]);
                    for (i, id) in ids.iter().enumerate() {
                        let _ = wtr.write_record([(i + 1).to_string(), id.to_string()]);
                    }
                }
                None => {
                    let _ = wtr.write_record(["metric", "value"]);
                    let _ = wtr.write_record(["pending_orders", &count.to_string()]);
                    let _ = wtr.write_record(["threshold", &threshold.to_string()]);
                    let _ = wtr.write_record(["above_threshold", &above.to_string()]);
                }
            }
            finish_csv(wtr)
        }
    }
}

fn format_native(balance: U256) -> String {
    format_units(balance, NATIVE_DECIMALS).unwrap_or_else(|_| balance.to_string())
}

pub fn format_balances(balances: &[ChainBalance], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if balances.is_empty() {
                return "No chains queried.".to_string();
            }

            let mut table = new_table(vec!["Chain", "Chain Id", "Balance", "Balance (Wei)"]);
            for entry in balances {
                let (formatted, wei) = match &entry.balance {
                    Ok(balance) => (format_native(*balance), balance.to_string()),
                    Err(e) => (format!("Error - {e}"), "N/A".to_string()),
                };
                table.add_row(vec![
                    Cell::new(chain_name(entry.chain_id)),
                    Cell::new(entry.chain_id),
                    Cell::new(formatted),
                    Cell::new(wei),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let rows: Vec<_> = balances
                .iter()
                .map(|entry| match &entry.balance {
                    Ok(balance) => json!({
                        "chain_id": entry.chain_id,
                        "chain": chain_name(entry.chain_id),
                        "balance": format_native(*balance),
                        "balance_wei": balance.to_string(),
                        "error": null,
                    }),
                    Err(e) => json!({
                        "chain_id": entry.chain_id,
                        "chain": chain_name(entry.chain_id),
                        "balance": null,
                        "balance_wei": null,
                        "error": e.to_string(),
                    }),
                })
                .collect();
            serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["chain_id", "chain", "balance", "balance_wei", "error"]);
            for entry in balances {
                let record = match &entry.balance {
                    Ok(balance) => [
                        entry.chain_id.to_string(),
                        chain_name(entry.chain_id),
                        format_native(*balance),
                        balance.to_string(),
                        String::new(),
                    ],
                    Err(e) => [
                        entry.chain_id.to_string(),
                        chain_name(entry.chain_id),
                        String::new(),
                        String::new(),
                        e.to_string(),
                    ],
                };
                let _ = wtr.write_record(&record);
            }
            finish_csv(wtr)
        }
    }
}

pub fn format_block(chain_id: u64, block: u64, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Chain", "Latest Block"]);
            table.add_row(vec![Cell::new(chain_name(chain_id)), Cell::new(block)]);
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "chain_id": chain_id,
            "chain": chain_name(chain_id),
            "latest_block": block,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["chain_id", "chain", "latest_block"]);
            let _ = wtr.write_record([chain_id.to_string(), chain_name(chain_id), block.to_string()]);
            finish_csv(wtr)
        }
    }
}

pub fn format_token_balance(
    chain_id: u64,
    token: Address,
    holder: Address,
    balance: U256,
    decimals: u8,
    format: &OutputFormat,
) -> String {
    let scaled = format_units(balance, decimals).unwrap_or_else(|_| balance.to_string());

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Chain", "Token", "Holder", "Balance", "Raw"]);
            table.add_row(vec![
                Cell::new(chain_name(chain_id)),
                Cell::new(format!("{token:?}")),
                Cell::new(format!("{holder:?}")),
                Cell::new(&scaled),
                Cell::new(balance),
            ]);
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "chain_id": chain_id,
            "token": format!("{token:?}"),
            "holder": format!("{holder:?}"),
            "balance": scaled,
            "balance_raw": balance.to_string(),
            "decimals": decimals,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["chain_id", "token", "holder", "balance", "balance_raw"]);
            let _ = wtr.write_record([
                chain_id.to_string(),
                format!("{token:?}"),
                format!("{holder:?}"),
                scaled,
                balance.to_string(),
            ]);
            finish_csv(wtr)
        }
    }
}

fn transfer_time(transfer: &TokenTransfer, now: DateTime<Utc>) -> (String, String) {
    match transfer.timestamp() {
        Some(at) => (format_timestamp(at), relative_age(at, now)),
        None => ("N/A".to_string(), "N/A".to_string()),
    }
}

fn transfers_json(transfers: &[TokenTransfer], now: DateTime<Utc>) -> Vec<serde_json::Value> {
    transfers
        .iter()
        .map(|t| {
            let (time, age) = transfer_time(t, now);
            json!({
                "hash": t.hash,
                "from": t.from,
                "to": t.to,
                "token_name": t.token_name,
                "token_symbol": t.token_symbol,
                "token_address": t.contract_address,
                "value": t.formatted_value(),
                "value_raw": t.value,
                "time": time,
                "age": age,
                "block": t.block_number,
            })
        })
        .collect()
}

fn transfers_table(transfers: &[TokenTransfer], now: DateTime<Utc>) -> Table {
    let mut table = new_table(vec![
        "#", "Token", "Value", "From", "To", "Time", "Age", "Block", "Tx Hash",
    ]);
    for (i, t) in transfers.iter().enumerate() {
        let (time, age) = transfer_time(t, now);
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&t.token_symbol),
            Cell::new(t.formatted_value()),
            Cell::new(&t.from),
            Cell::new(&t.to),
            Cell::new(time),
            Cell::new(age),
            Cell::new(&t.block_number),
            Cell::new(&t.hash),
        ]);
    }
    table
}

pub fn format_transfers(
    transfers: &[TokenTransfer],
    now: DateTime<Utc>,
    format: &OutputFormat,
) -> String {
    match format {
        OutputFormat::Table => {
            if transfers.is_empty() {
                return "No token transfers found.".to_string();
            }
            transfers_table(transfers, now).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&transfers_json(transfers, now))
            .unwrap_or_else(|_| "[]".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "index", "token", "value", "from", "to", "time", "block", "hash",
            ]);
            for (i, t) in transfers.iter().enumerate() {
                let (time, _) = transfer_time(t, now);
                let _ = wtr.write_record([
                    (i + 1).to_string(),
                    t.token_symbol.clone(),
                    t.formatted_value(),
                    t.from.clone(),
                    t.to.clone(),
                    time,
                    t.block_number.clone(),
                    t.hash.clone(),
                ]);
            }
            finish_csv(wtr)
        }
    }
}

pub fn format_wallet(report: &WalletReport, now: DateTime<Utc>, format: &OutputFormat) -> String {
    let address = format!("{:?}", report.address);
    let age = report
        .age_days(now)
        .map(|days| format!("{days} days"))
        .unwrap_or_else(|| "unknown".to_string());
    let first = report
        .first_transaction
        .map(format_timestamp)
        .unwrap_or_else(|| "N/A".to_string());

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Wallet", "Value"]);
            table.add_row(vec![Cell::new("Address"), Cell::new(&address)]);
            table.add_row(vec![Cell::new("Chain"), Cell::new(chain_name(report.chain_id))]);
            table.add_row(vec![Cell::new("Age"), Cell::new(&age)]);
            table.add_row(vec![Cell::new("First Transaction"), Cell::new(&first)]);
            table.add_row(vec![
                Cell::new("Token Transfers"),
                Cell::new(report.transfers_found),
            ]);
            let mut out = table.to_string();

            out.push('\n');
            if report.recent_transfers.is_empty() {
                out.push_str("No token transfers found.");
            } else {
                out.push_str(&transfers_table(&report.recent_transfers, now).to_string());
            }
            out
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "address": address,
            "chain_id": report.chain_id,
            "age_days": report.age_days(now),
            "first_transaction": report.first_transaction.map(format_timestamp),
            "token_transfers": report.transfers_found,
            "recent_transfers": transfers_json(&report.recent_transfers, now),
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["address", &address]);
            let _ = wtr.write_record(["chain_id", &report.chain_id.to_string()]);
            let _ = wtr.write_record(["age", &age]);
            let _ = wtr.write_record(["first_transaction", &first]);
            let _ = wtr.write_record(["token_transfers", &report.transfers_found.to_string()]);
            finish_csv(wtr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    #[test]
    fn unknown_format_falls_back_to_table() {
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("csv"), OutputFormat::Csv);
        assert_eq!(OutputFormat::from("yaml"), OutputFormat::Table);
    }

    #[test]
    fn pending_json_keeps_large_counts_exact() {
        let out = format_pending(U256::MAX, 18, None, &OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["pending_orders"], U256::MAX.to_string());
        assert_eq!(value["above_threshold"], true);
        assert!(value.get("order_ids").is_none());
    }

    #[test]
    fn pending_csv_lists_ids() {
        let ids = [U256::from(7), U256::from(9)];
        let out = format_pending(U256::from(2), 18, Some(&ids), &OutputFormat::Csv);
        assert_eq!(out, "index,order_id\n1,7\n2,9\n");

        let table = format_pending(U256::from(2), 18, Some(&ids), &OutputFormat::Table);
        assert!(table.contains("│ 1 │ 7"));
    }

    #[test]
    fn balances_report_per_chain_errors() {
        let balances = vec![
            ChainBalance {
                chain_id: 1,
                balance: Ok(U256::from(1_500_000_000_000_000_000u128)),
            },
            ChainBalance {
                chain_id: 56,
                balance: Err(FetchError::Api("NOTOK".into())),
            },
        ];

        let out = format_balances(&balances, &OutputFormat::Json);
        let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(rows[0]["chain"], "Ethereum");
        assert_eq!(rows[0]["balance"], "1.500000000000000000");
        assert!(rows[0]["error"].is_null());
        assert_eq!(rows[1]["chain"], "BSC");
        assert_eq!(rows[1]["error"], "API error: NOTOK");

        let table = format_balances(&balances, &OutputFormat::Table);
        assert!(table.contains("Error - API error: NOTOK"));
    }

    #[test]
    fn block_csv() {
        assert_eq!(
            format_block(480, 12345, &OutputFormat::Csv),
            "chain_id,chain,latest_block\n480,World Chain,12345\n"
        );
    }

    fn transfer(symbol: &str, value: &str, decimals: &str) -> TokenTransfer {
        TokenTransfer {
            hash: "0xhash".into(),
            from: "0xfrom".into(),
            to: "0xto".into(),
            value: value.into(),
            token_symbol: symbol.into(),
            token_decimal: decimals.into(),
            time_stamp: "1758097800".into(),
            block_number: "1200".into(),
            ..TokenTransfer::default()
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_758_097_800 + 7_200, 0).unwrap()
    }

    #[test]
    fn transfers_json_scales_values_and_ages() {
        let out = format_transfers(&[transfer("USDC", "2500000", "6")], now(), &OutputFormat::Json);
        let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(rows[0]["value"], "2.500000");
        assert_eq!(rows[0]["value_raw"], "2500000");
        assert_eq!(rows[0]["time"], "2025-09-17 08:30:00 UTC");
        assert_eq!(rows[0]["age"], "2 hours ago");
    }

    #[test]
    fn transfers_csv_is_one_based() {
        let out = format_transfers(
            &[transfer("WLD", "1000000", "6"), transfer("WLD", "2000000", "6")],
            now(),
            &OutputFormat::Csv,
        );
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "index,token,value,from,to,time,block,hash");
        assert!(lines[1].starts_with("1,WLD,1.000000,"));
        assert!(lines[2].starts_with("2,WLD,2.000000,"));
    }

    #[test]
    fn empty_transfer_table() {
        assert_eq!(
            format_transfers(&[], now(), &OutputFormat::Table),
            "No token transfers found."
        );
    }

    #[test]
    fn wallet_without_history_has_unknown_age() {
        let report = WalletReport {
            address: Address::ZERO,
            chain_id: 480,
            transfers_found: 0,
            recent_transfers: vec![],
            first_transaction: None,
        };
        let out = format_wallet(&report, now(), &OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(value["age_days"].is_null());
        assert_eq!(value["token_transfers"], 0);

        let table = format_wallet(&report, now(), &OutputFormat::Table);
        assert!(table.contains("unknown"));
        assert!(table.ends_with("No token transfers found."));
    }

    #[test]
    fn token_balance_csv_scales_by_decimals() {
        let out = format_token_balance(
            480,
            Address::ZERO,
            Address::ZERO,
            U256::from(135_499),
            3,
            &OutputFormat::Csv,
        );
        let zero = format!("{:?}", Address::ZERO);
        assert_eq!(
            out,
            format!("chain_id,token,holder,balance,balance_raw\n480,{zero},{zero},135.499,135499\n")
        );
    }
}
