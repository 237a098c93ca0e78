//! Raw on-chain events emitted by the protocol contract.

use alloy::primitives::{B256, b256};
use serde::{Deserialize, Serialize};

use crate::types::{BlockNumber, ChainId, TxHash, WalletAddress};

/// `topic0` of the `MessageSent` event.
pub const MESSAGE_SENT_TOPIC: B256 =
    b256!("af3488626caa53f1d25b5a3850e43280695530019d11e81740d16209391587da");

/// `topic0` of the `Executed` event.
pub const EXECUTED_TOPIC: B256 =
    b256!("164339a296eae5d2a4502454bf4bfcd3a03e70fc5b9116b91eb4b055e22a5aa5");

/// Discriminant of a [`RawEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A cross-chain message was sent.
    MessageSent,
    /// A relayed call was executed.
    Executed,
}

impl EventKind {
    /// Both event kinds, in scan order.
    pub const ALL: [Self; 2] = [Self::MessageSent, Self::Executed];

    /// The `topic0` value identifying this event.
    #[must_use]
    pub const fn topic(self) -> B256 {
        match self {
            Self::MessageSent => MESSAGE_SENT_TOPIC,
            Self::Executed => EXECUTED_TOPIC,
        }
    }

    /// Short stable name, used for file names and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MessageSent => "message_sent",
            Self::Executed => "executed",
        }
    }
}

/// A `MessageSent` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSentEvent {
    /// Chain the log was observed on.
    pub chain_id: ChainId,
    /// Emitting transaction.
    pub tx_hash: TxHash,
    /// Block containing the transaction.
    pub block_number: BlockNumber,
    /// Message identifier (`topics[1]`).
    pub message_id: B256,
    /// Sender of the message (`topics[2]`).
    pub caller: WalletAddress,
}

/// An `Executed` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedEvent {
    /// Chain the log was observed on.
    pub chain_id: ChainId,
    /// Emitting transaction.
    pub tx_hash: TxHash,
    /// Block containing the transaction.
    pub block_number: BlockNumber,
    /// Wallet the call was executed for (`topics[1]`).
    pub caller: WalletAddress,
}

/// An event observed on chain. Immutable once mined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawEvent {
    /// See [`MessageSentEvent`].
    MessageSent(MessageSentEvent),
    /// See [`ExecutedEvent`].
    Executed(ExecutedEvent),
}

impl RawEvent {
    /// The event discriminant.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::MessageSent(_) => EventKind::MessageSent,
            Self::Executed(_) => EventKind::Executed,
        }
    }

    /// Chain the event belongs to.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        match self {
            Self::MessageSent(e) => e.chain_id,
            Self::Executed(e) => e.chain_id,
        }
    }

    /// Transaction that emitted the event.
    #[must_use]
    pub const fn tx_hash(&self) -> TxHash {
        match self {
            Self::MessageSent(e) => e.tx_hash,
            Self::Executed(e) => e.tx_hash,
        }
    }

    /// Block containing the emitting transaction.
    #[must_use]
    pub const fn block_number(&self) -> BlockNumber {
        match self {
            Self::MessageSent(e) => e.block_number,
            Self::Executed(e) => e.block_number,
        }
    }

    /// Wallet named by the event.
    #[must_use]
    pub const fn caller(&self) -> WalletAddress {
        match self {
            Self::MessageSent(e) => e.caller,
            Self::Executed(e) => e.caller,
        }
    }
}
