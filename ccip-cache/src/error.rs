//! Error taxonomy shared by the scanner, classifier and orchestrator.

use std::fmt;

use crate::types::{ChainId, FunctionSelector};

/// RPC operation whose result could not be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcOperation {
    /// `eth_blockNumber`.
    BlockNumber,
    /// `eth_getLogs`.
    FilterLogs,
    /// `eth_getTransactionByHash`.
    Transaction,
    /// `eth_getBlockByNumber`.
    Block,
}

impl fmt::Display for RpcOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BlockNumber => "cannot fetch block number",
            Self::FilterLogs => "cannot fetch filter logs",
            Self::Transaction => "cannot fetch transaction",
            Self::Block => "cannot fetch block",
        })
    }
}

/// Errors produced by the indexing core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An RPC call failed twice (initial attempt plus one delayed retry).
    #[error("chain {chain_id}: {operation}")]
    RpcUnavailable {
        /// Chain the call was routed to.
        chain_id: ChainId,
        /// The operation that failed.
        operation: RpcOperation,
    },

    /// The provider returned a log without the fields the event requires.
    #[error("chain {chain_id}: malformed log: {reason}")]
    MalformedLog {
        /// Chain the log came from.
        chain_id: ChainId,
        /// Which field was missing or invalid.
        reason: String,
    },

    /// A known selector matched but its arguments did not decode.
    #[error("cannot decode arguments of {selector}")]
    AbiDecodeFailed {
        /// Selector of the call whose arguments failed to decode.
        selector: FunctionSelector,
        /// Decoder error.
        #[source]
        source: alloy::sol_types::Error,
    },

    /// The chain is not present in configuration.
    #[error("chain {0} is not supported")]
    UnsupportedChain(ChainId),

    /// A value could not be normalized into its wrapper type.
    #[error("invalid {kind}: {value:?}")]
    InvalidValue {
        /// Name of the wrapper type.
        kind: &'static str,
        /// The offending input.
        value: String,
    },
}

impl Error {
    pub(crate) fn invalid(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            value: value.into(),
        }
    }
}

/// Result alias for [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_unavailable_names_the_operation() {
        let err = Error::RpcUnavailable {
            chain_id: ChainId::new(137),
            operation: RpcOperation::FilterLogs,
        };
        assert_eq!(
            err.to_string(),
            "chain 137: cannot fetch filter logs",
            "message should carry chain and operation"
        );
    }
}
