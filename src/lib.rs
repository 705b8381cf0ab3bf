pub mod abi;
pub mod chains;
pub mod config;
pub mod engine;
pub mod error;
pub mod etherscan;
pub mod messages;
pub mod monitor;
pub mod notifier;
pub mod query;
pub mod rate_limit;
pub mod reader;
pub mod retry;
pub mod wallet;
