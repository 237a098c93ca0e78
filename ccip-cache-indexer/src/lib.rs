//! Multi-chain indexer for cross-chain messaging transactions.
//!
//! Scans the protocol contract's `MessageSent` and `Executed` events on
//! every configured chain, classifies the emitting transactions and caches
//! both as Parquet files.

pub mod chains;
pub mod config;
pub mod cursor;
pub mod ingest;
pub mod parquet;
pub mod resilience;
pub mod rpc;
pub mod scanner;
pub mod store;
