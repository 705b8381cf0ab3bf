use crate::error::FetchError;
use crate::etherscan::{EtherscanClient, Page, TokenTransfer};
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use tracing::info;

/// Transfers fetched per report; the report keeps the newest few.
const TRANSFER_PAGE: u32 = 10;
pub const RECENT_TRANSFERS: usize = 5;

/// Recent token activity and age of one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletReport {
    pub address: Address,
    pub chain_id: u64,
    /// Transfers on the first page, at most `TRANSFER_PAGE`.
    pub transfers_found: usize,
    pub recent_transfers: Vec<TokenTransfer>,
    pub first_transaction: Option<DateTime<Utc>>,
}

impl WalletReport {
    /// Whole days since the first transaction.
    pub fn age_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.first_transaction.map(|first| (now - first).num_days())
    }
}

pub async fn check_wallet(
    client: &EtherscanClient,
    chain_id: u64,
    address: Address,
) -> Result<WalletReport, FetchError> {
    info!("Checking wallet {:?} on chain {}", address, chain_id);

    let transfers = client
        .token_transfers(chain_id, address, None, Page::latest(TRANSFER_PAGE))
        .await?;
    let first = client
        .transactions(chain_id, address, Page::earliest(1))
        .await?;

    let transfers_found = transfers.len();
    let recent_transfers = transfers.into_iter().take(RECENT_TRANSFERS).collect();
    let first_transaction = first.first().and_then(|tx| tx.timestamp());

    Ok(WalletReport {
        address,
        chain_id,
        transfers_found,
        recent_transfers,
        first_transaction,
    })
}

/// Coarse age such as `"5 minutes ago"`, `"3 hours ago"` or `"2 days ago"`.
pub fn relative_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    if secs < 3_600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86_400 {
        format!("{} hours ago", secs / 3_600)
    } else {
        format!("{} days ago", secs / 86_400)
    }
}
