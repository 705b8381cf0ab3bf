//! Client for the Etherscan v2 multichain API.
//!
//! Every call is a GET with `chainid` and `apikey` query parameters, bounded
//! by a per-request timeout, spaced by a shared [`RateLimiter`] and wrapped in
//! the configured [`RetryPolicy`].

use crate::config::Config;
use crate::error::FetchError;
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, U256};
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Free-tier Etherscan allowance.
pub const DEFAULT_CALLS_PER_SECOND: u32 = 5;
const LAST_BLOCK: &str = "99999999";

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Envelope shared by the proxy module (JSON-RPC style `result`/`error`) and
/// the account module (`status`/`message`/`result`).
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

fn api_error(message: String) -> FetchError {
    if message.to_lowercase().contains("rate limit") {
        FetchError::RateLimited(message)
    } else {
        FetchError::Api(message)
    }
}

impl ApiResponse {
    pub fn into_result(self) -> Result<Value, FetchError> {
        if let Some(error) = self.error {
            let message = error
                .message
                .unwrap_or_else(|| "unknown API error".to_string());
            return Err(api_error(message));
        }

        if self.status.as_deref() == Some("0") {
            let message = match self.result {
                // "No transactions found" is reported as status 0 with an empty list.
                Some(Value::Array(items)) => return Ok(Value::Array(items)),
                Some(Value::String(s)) if !s.is_empty() => s,
                _ => self
                    .message
                    .unwrap_or_else(|| "unknown API error".to_string()),
            };
            return Err(api_error(message));
        }

        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// One page of an account listing. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub offset: u32,
    pub sort: SortOrder,
}

impl Page {
    /// The `offset` most recent records.
    pub fn latest(offset: u32) -> Self {
        Page {
            page: 1,
            offset,
            sort: SortOrder::Desc,
        }
    }

    /// The `offset` oldest records.
    pub fn earliest(offset: u32) -> Self {
        Page {
            page: 1,
            offset,
            sort: SortOrder::Asc,
        }
    }

    fn params(&self) -> [(&'static str, String); 5] {
        [
            ("startblock", "0".to_string()),
            ("endblock", LAST_BLOCK.to_string()),
            ("page", self.page.to_string()),
            ("offset", self.offset.to_string()),
            ("sort", self.sort.as_str().to_string()),
        ]
    }
}

fn unix_time(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// An ERC-20 transfer from `action=tokentx`. Etherscan sends every field as
/// a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenTransfer {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub contract_address: String,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: String,
}

impl TokenTransfer {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        unix_time(&self.time_stamp)
    }

    pub fn decimals(&self) -> u8 {
        self.token_decimal.trim().parse().unwrap_or(18)
    }

    /// Value scaled by the token decimals; the raw value if it is not a number.
    pub fn formatted_value(&self) -> String {
        U256::from_str(self.value.trim())
            .ok()
            .and_then(|v| format_units(v, self.decimals()).ok())
            .unwrap_or_else(|| self.value.clone())
    }
}

/// A normal transaction from `action=txlist`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transaction {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub is_error: String,
}

impl Transaction {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        unix_time(&self.time_stamp)
    }
}

fn parse_list<T: DeserializeOwned>(what: &str, result: Value) -> Result<Vec<T>, FetchError> {
    match result {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => serde_json::from_value(Value::Array(items))
            .map_err(|e| FetchError::Malformed(format!("invalid {what} list: {e}"))),
        other => Err(FetchError::Malformed(format!(
            "expected {what} list, got {other}"
        ))),
    }
}

fn parse_amount(what: &str, result: &Value) -> Result<U256, FetchError> {
    let raw = result
        .as_str()
        .ok_or_else(|| FetchError::Malformed(format!("expected {what} string, got {result}")))?;
    U256::from_str(raw).map_err(|e| FetchError::Malformed(format!("invalid {what} '{raw}': {e}")))
}

/// Native balance of one address on one chain, or why it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBalance {
    pub chain_id: u64,
    pub balance: Result<U256, FetchError>,
}

#[derive(Clone)]
pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    retry: RetryPolicy,
    limiter: RateLimiter,
}

impl EtherscanClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        request_timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(EtherscanClient {
            http,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            request_timeout,
            retry,
            limiter: RateLimiter::per_second(DEFAULT_CALLS_PER_SECOND),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            &config.api_base_url,
            &config.etherscan_api_key,
            config.request_timeout,
            config.retry,
        )?
        .with_rate_limit(config.rate_limit_per_second))
    }

    /// Replaces the request spacing; clones made earlier keep the old one.
    pub fn with_rate_limit(mut self, calls_per_second: u32) -> Self {
        self.limiter = RateLimiter::per_second(calls_per_second);
        self
    }

    async fn get_once(&self, chain_id: u64, params: &[(&str, String)]) -> Result<Value, FetchError> {
        let mut query: Vec<(&str, String)> = vec![("chainid", chain_id.to_string())];
        query.extend(params.iter().cloned());
        query.push(("apikey", self.api_key.clone()));

        self.limiter.acquire().await;
        let request = async {
            let response = self
                .http
                .get(&self.base_url)
                .query(&query)
                .send()
                .await?
                .error_for_status()?;
            let body: ApiResponse = response.json().await?;
            Ok::<_, reqwest::Error>(body)
        };

        match timeout(self.request_timeout, request).await {
            Ok(Ok(body)) => body.into_result(),
            Ok(Err(e)) if e.is_timeout() => Err(self.handle_timeout()),
            Ok(Err(e)) => Err(FetchError::from(e)),
            Err(_) => Err(self.handle_timeout()),
        }
    }

    fn handle_timeout(&self) -> FetchError {
        warn!(
            "Request timeout after {} seconds on {}",
            self.request_timeout.as_secs(),
            self.base_url
        );
        FetchError::Timeout(self.request_timeout)
    }

    async fn get(
        &self,
        what: &str,
        chain_id: u64,
        params: &[(&str, String)],
    ) -> Result<Value, FetchError> {
        self.retry
            .run(what, || self.get_once(chain_id, params))
            .await
    }

    /// Raw hex output of a read-only call at the latest block. A missing or
    /// null `result` is returned as `"0x"`.
    pub async fn eth_call(&self, chain_id: u64, to: Address, data: &str) -> Result<String, FetchError> {
        let params = [
            ("module", "proxy".to_string()),
            ("action", "eth_call".to_string()),
            ("to", format!("{to:?}")),
            ("data", data.to_string()),
            ("tag", "latest".to_string()),
        ];

        match self.get("eth_call", chain_id, &params).await? {
            Value::String(hex) => {
                debug!("eth_call returned {} hex chars", hex.len());
                Ok(hex)
            }
            Value::Null => Ok("0x".to_string()),
            other => Err(FetchError::Malformed(format!(
                "expected hex string result, got {other}"
            ))),
        }
    }

    pub async fn block_number(&self, chain_id: u64) -> Result<u64, FetchError> {
        let params = [
            ("module", "proxy".to_string()),
            ("action", "eth_blockNumber".to_string()),
        ];

        let result = self.get("eth_blockNumber", chain_id, &params).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| FetchError::Malformed(format!("expected block number, got {result}")))?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| FetchError::Malformed(format!("invalid block number '{hex}': {e}")))
    }

    /// Native token balance in wei.
    pub async fn native_balance(&self, chain_id: u64, address: Address) -> Result<U256, FetchError> {
        let params = [
            ("module", "account".to_string()),
            ("action", "balance".to_string()),
            ("address", format!("{address:?}")),
            ("tag", "latest".to_string()),
        ];

        let result = self.get("balance", chain_id, &params).await?;
        parse_amount("balance", &result)
    }

    /// Raw ERC-20 balance of `holder`, not scaled by the token decimals.
    pub async fn token_balance(
        &self,
        chain_id: u64,
        token: Address,
        holder: Address,
    ) -> Result<U256, FetchError> {
        let params = [
            ("module", "account".to_string()),
            ("action", "tokenbalance".to_string()),
            ("contractaddress", format!("{token:?}")),
            ("address", format!("{holder:?}")),
            ("tag", "latest".to_string()),
        ];

        let result = self.get("tokenbalance", chain_id, &params).await?;
        parse_amount("token balance", &result)
    }

    /// ERC-20 transfers in or out of `address`, optionally for one token only.
    pub async fn token_transfers(
        &self,
        chain_id: u64,
        address: Address,
        token: Option<Address>,
        page: Page,
    ) -> Result<Vec<TokenTransfer>, FetchError> {
        let mut params = vec![
            ("module", "account".to_string()),
            ("action", "tokentx".to_string()),
            ("address", format!("{address:?}")),
        ];
        if let Some(token) = token {
            params.push(("contractaddress", format!("{token:?}")));
        }
        params.extend(page.params());

        let result = self.get("tokentx", chain_id, &params).await?;
        parse_list("token transfer", result)
    }

    pub async fn transactions(
        &self,
        chain_id: u64,
        address: Address,
        page: Page,
    ) -> Result<Vec<Transaction>, FetchError> {
        let mut params = vec![
            ("module", "account".to_string()),
            ("action", "txlist".to_string()),
            ("address", format!("{address:?}")),
        ];
        params.extend(page.params());

        let result = self.get("txlist", chain_id, &params).await?;
        parse_list("transaction", result)
    }

    /// Fetches the balance on every chain concurrently. Each chain succeeds or
    /// fails on its own; the output keeps the order of `chain_ids`.
    pub async fn multichain_balances(&self, address: Address, chain_ids: &[u64]) -> Vec<ChainBalance> {
        let fetches = chain_ids.iter().map(|&chain_id| async move {
            let balance = self.native_balance(chain_id, address).await;
            if let Err(e) = &balance {
                warn!(chain_id, error = %e, "Balance fetch failed");
            }
            ChainBalance { chain_id, balance }
        });

        join_all(fetches).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal HTTP/1.1 responder for exercising the client without a network.

    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub enum Reply {
        Json(&'static str),
        Body(String),
        Status(u16),
        Hang,
    }

    pub struct StubServer {
        pub url: String,
        pub requests: Arc<Mutex<Vec<String>>>,
    }

    /// Serves `replies` in order, one per connection, and records each
    /// request line followed by the body, if any.
    pub async fn serve(replies: Vec<Reply>) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v2/api", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            for reply in replies {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };

                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                let header_end = loop {
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break buf.len(),
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                };

                let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
                let body_len = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < header_end + body_len {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
                if let Some(line) = head.lines().next() {
                    let entry = if body.is_empty() {
                        line.to_string()
                    } else {
                        format!("{line}\n{body}")
                    };
                    seen.lock().unwrap().push(entry);
                }

                let response = match reply {
                    Reply::Json(body) => json_response(body),
                    Reply::Body(body) => json_response(&body),
                    Reply::Status(code) => format!(
                        "HTTP/1.1 {code} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    ),
                    Reply::Hang => {
                        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                        continue;
                    }
                };
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        StubServer { url, requests }
    }

    fn json_response(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }
}
