//! Core model of the cross-chain messaging indexer.
//!
//! Normalized value types, the raw events emitted by the protocol
//! contract, the [`TxInfo`](tx_info::TxInfo) classification and the
//! calldata [`classifier`] that produces it.

pub mod classifier;
pub mod error;
pub mod event;
pub mod tx_info;
pub mod types;

pub use classifier::{TxContext, classify};
pub use error::{Error, Result, RpcOperation};
pub use event::{EventKind, ExecutedEvent, MessageSentEvent, RawEvent};
pub use tx_info::{TxInfo, TxInfoRecord, TxKind};
pub use types::{
    Balance, BlockNumber, ChainId, ChainSelector, ContractAddress, FunctionSelector, TxHash,
    UtcDateTime, WalletAddress,
};
