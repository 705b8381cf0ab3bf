use crate::abi::{self, MalformedPolicy};
use crate::config::Config;
use crate::error::FetchError;
use crate::etherscan::EtherscanClient;
use alloy_primitives::{Address, U256};
use std::future::Future;
use tracing::{error, info, warn};

/// Anything that can report the current number of pending orders.
pub trait PendingOrdersSource {
    fn pending_orders_count(&self) -> impl Future<Output = Result<U256, FetchError>> + Send;
}

/// Count and ids decoded from the same call result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrders {
    pub count: U256,
    pub ids: Vec<U256>,
}

/// Reads the pending-order array of one contract through an `eth_call`.
#[derive(Clone)]
pub struct ContractReader {
    client: EtherscanClient,
    chain_id: u64,
    contract: Address,
    selector: String,
    policy: MalformedPolicy,
}

impl ContractReader {
    pub fn new(
        client: EtherscanClient,
        chain_id: u64,
        contract: Address,
        selector: &str,
        policy: MalformedPolicy,
    ) -> Self {
        ContractReader {
            client,
            chain_id,
            contract,
            selector: selector.to_string(),
            policy,
        }
    }

    pub fn from_config(client: EtherscanClient, config: &Config) -> Self {
        Self::new(
            client,
            config.chain_id,
            config.contract_address,
            &config.function_selector,
            config.malformed_policy,
        )
    }

    async fn call(&self) -> Result<String, FetchError> {
        let raw = self
            .client
            .eth_call(self.chain_id, self.contract, &self.selector)
            .await
            .inspect_err(|e| match e {
                FetchError::Timeout(_) => error!("Timeout while fetching pending orders"),
                other => error!("Error fetching pending orders: {}", other),
            })?;

        if raw.is_empty() || raw == "0x" {
            warn!("No data returned from contract");
        }
        Ok(raw)
    }

    /// Count and ids of the pending orders, in contract order. Both come
    /// from one `eth_call`, so they describe the same block.
    pub async fn pending_orders(&self) -> Result<PendingOrders, FetchError> {
        let raw = self.call().await?;
        let count = abi::decode_array_length(&raw, self.policy)?;
        let ids = abi::decode_array_elements(&raw)?;
        Ok(PendingOrders { count, ids })
    }
}

impl PendingOrdersSource for ContractReader {
    async fn pending_orders_count(&self) -> Result<U256, FetchError> {
        let raw = self.call().await?;
        let count = abi::decode_array_length(&raw, self.policy).inspect_err(|e| {
            error!("Error decoding pending orders: {}", e);
        })?;

        info!("Successfully retrieved pending orders count: {}", count);
        Ok(count)
    }
}
