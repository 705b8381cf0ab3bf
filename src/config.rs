use crate::abi::MalformedPolicy;
use crate::retry::RetryPolicy;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONTRACT_ADDRESS: &str = "0xde605a918c466e74a2a12865efe616d51391312a";
// getPendingOrderIds()
const DEFAULT_FUNCTION_SELECTOR: &str = "0x7465c5e3";
const DEFAULT_API_BASE_URL: &str = "https://api.etherscan.io/v2/api";

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub etherscan_api_key: String,
    pub contract_address: Address,
    pub function_selector: String,
    pub check_interval: Duration,
    pub alert_threshold: u64,
    pub chain_id: u64,
    pub api_base_url: String,
    pub bot_name: String,
    pub log_level: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit_per_second: u32,
    pub malformed_policy: MalformedPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source; `from_env` passes
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let etherscan_api_key =
            var("ETHERSCAN_API_KEY").context("ETHERSCAN_API_KEY must be set in .env")?;

        let contract_address_str =
            var("CONTRACT_ADDRESS").unwrap_or_else(|| DEFAULT_CONTRACT_ADDRESS.to_string());
        let contract_address = Address::from_str(contract_address_str.trim())
            .context("Invalid CONTRACT_ADDRESS format")?;

        let function_selector =
            var("FUNCTION_SELECTOR").unwrap_or_else(|| DEFAULT_FUNCTION_SELECTOR.to_string());
        let selector_re = Regex::new(r"^0x[0-9a-fA-F]{8}$")?;
        if !selector_re.is_match(&function_selector) {
            anyhow::bail!(
                "Invalid FUNCTION_SELECTOR '{}': expected 0x followed by 8 hex characters",
                function_selector
            );
        }

        let check_interval_secs: u64 = parse_or(&var, "CHECK_INTERVAL", 300)?;
        if check_interval_secs == 0 {
            anyhow::bail!("CHECK_INTERVAL must be greater than 0");
        }

        let alert_threshold = parse_or(&var, "ALERT_THRESHOLD", 18)?;
        let chain_id = parse_or(&var, "CHAIN_ID", 480)?;
        let request_timeout_secs: u64 = parse_or(&var, "REQUEST_TIMEOUT", 30)?;
        let max_retries: usize = parse_or(&var, "MAX_RETRIES", 3)?;
        let rate_limit_per_second: u32 = parse_or(&var, "RATE_LIMIT", 5)?;
        if rate_limit_per_second == 0 {
            anyhow::bail!("RATE_LIMIT must be greater than 0");
        }

        let malformed_policy = match var("MALFORMED_POLICY") {
            Some(raw) => raw.parse().context("Invalid MALFORMED_POLICY")?,
            None => MalformedPolicy::default(),
        };

        Ok(Config {
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: var("TELEGRAM_CHAT_ID"),
            etherscan_api_key,
            contract_address,
            function_selector: function_selector.to_lowercase(),
            check_interval: Duration::from_secs(check_interval_secs),
            alert_threshold,
            chain_id,
            api_base_url: var("API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            bot_name: var("BOT_NAME").unwrap_or_else(|| "Pending Orders Monitor".to_string()),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            retry: RetryPolicy::new(max_retries, Duration::from_secs(1)),
            rate_limit_per_second,
            malformed_policy,
        })
    }

    /// Checks the settings only the notifying binary needs, reporting every
    /// missing variable at once.
    pub fn validate_notifier(&self) -> Result<(&str, &str)> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat_id)) => Ok((token.as_str(), chat_id.as_str())),
            (token, chat_id) => {
                let mut missing = Vec::new();
                if token.is_none() {
                    missing.push("TELEGRAM_BOT_TOKEN");
                }
                if chat_id.is_none() {
                    missing.push("TELEGRAM_CHAT_ID");
                }
                anyhow::bail!(
                    "Missing required environment variables: {}",
                    missing.join(", ")
                )
            }
        }
    }

    /// Lowercase `0x`-prefixed contract address, as shown to users.
    pub fn contract_hex(&self) -> String {
        format!("{:?}", self.contract_address)
    }

    /// The `eth_call` URL for the monitored method with the key masked, for logs.
    pub fn redacted_api_url(&self) -> String {
        format!(
            "{}?chainid={}&module=proxy&action=eth_call&to={}&data={}&tag=latest&apikey=***",
            self.api_base_url,
            self.chain_id,
            self.contract_hex(),
            self.function_selector,
        )
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value '{raw}'")),
        None => Ok(default),
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Config:")?;
        writeln!(f, "  Bot Name: {}", self.bot_name)?;
        writeln!(f, "  Contract: {}", self.contract_hex())?;
        writeln!(f, "  Selector: {}", self.function_selector)?;
        writeln!(f, "  Check Interval: {}s", self.check_interval.as_secs())?;
        writeln!(f, "  Alert Threshold: {}", self.alert_threshold)?;
        writeln!(f, "  Chain ID: {}", self.chain_id)?;
        writeln!(f, "  API URL: {}", self.redacted_api_url())?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout.as_secs())?;
        writeln!(f, "  Max Attempts: {}", self.retry.max_attempts)?;
        writeln!(f, "  Rate Limit: {}/s", self.rate_limit_per_second)?;
        writeln!(f, "  Malformed Payloads: {:?}", self.malformed_policy)?;
        write!(f, "  Log Level: {}", self.log_level)
    }
}
