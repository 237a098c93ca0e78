//! Blockchain transport seam.
//!
//! [`ChainClient`] is the narrow set of JSON-RPC reads the indexer needs,
//! returned as plain structs so the scanner and orchestrator can be driven
//! by an in-process fake. [`AlloyClient`] is the production implementation.

use std::future::Future;

use alloy::consensus::Transaction as _;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use anyhow::{Context, Result};
use ccip_cache::{BlockNumber, ChainId, ContractAddress, TxHash};

/// Target network of an operation, optionally with a one-off RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    /// Chain ID.
    pub chain_id: ChainId,
    /// RPC endpoint replacing the configured one.
    pub rpc_override: Option<String>,
}

impl ChainSpec {
    /// Target `chain_id` through its configured endpoint.
    #[must_use]
    pub const fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            rpc_override: None,
        }
    }

    /// Route through `rpc_url` instead of the configured endpoint.
    #[must_use]
    pub fn with_rpc(mut self, rpc_url: impl Into<String>) -> Self {
        self.rpc_override = Some(rpc_url.into());
        self
    }
}

/// One `eth_getLogs` request: a single contract and a single `topic0` over
/// an inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    /// Emitting contract.
    pub address: ContractAddress,
    /// Event signature hash.
    pub topic: B256,
    /// First block, inclusive.
    pub from: BlockNumber,
    /// Last block, inclusive.
    pub to: BlockNumber,
}

/// Log entry as returned by the provider. Fields the provider may omit
/// stay optional; the scanner decides whether the log is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    /// Emitting transaction.
    pub tx_hash: Option<B256>,
    /// Containing block.
    pub block_number: Option<u64>,
    /// Indexed topics, `topic0` first.
    pub topics: Vec<B256>,
}

/// The parts of a transaction the classifier needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    /// Calldata.
    pub input: Bytes,
    /// Containing block; `None` while pending.
    pub block_number: Option<u64>,
    /// Sender.
    pub from: Address,
    /// Native value.
    pub value: U256,
}

/// Read-only JSON-RPC operations used by the indexer.
///
/// Errors are transport faults or provider errors; the caller decides how
/// to retry them.
pub trait ChainClient {
    /// `eth_blockNumber`.
    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// `eth_getLogs` for one contract and topic.
    fn logs(&self, query: LogQuery) -> impl Future<Output = Result<Vec<RawLog>>> + Send;

    /// `eth_getTransactionByHash`; `None` if the node does not know it.
    fn transaction(&self, hash: TxHash)
    -> impl Future<Output = Result<Option<RawTransaction>>> + Send;

    /// Timestamp (epoch seconds) of a block; `None` if the node does not know it.
    fn block_timestamp(
        &self,
        number: BlockNumber,
    ) -> impl Future<Output = Result<Option<u64>>> + Send;
}

/// [`ChainClient`] over an alloy HTTP provider.
#[derive(Debug, Clone)]
pub struct AlloyClient {
    provider: DynProvider,
}

impl AlloyClient {
    /// Connect to an HTTP JSON-RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if `rpc_url` is not a valid URL.
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let url = rpc_url
            .parse()
            .with_context(|| format!("invalid RPC URL: {rpc_url}"))?;
        Ok(Self {
            provider: ProviderBuilder::new().connect_http(url).erased(),
        })
    }
}

impl ChainClient for AlloyClient {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn logs(&self, query: LogQuery) -> Result<Vec<RawLog>> {
        let filter = Filter::new()
            .address(query.address.address())
            .event_signature(query.topic)
            .from_block(query.from.value())
            .to_block(query.to.value());

        let logs = self.provider.get_logs(&filter).await?;
        Ok(logs
            .into_iter()
            .map(|log| RawLog {
                tx_hash: log.transaction_hash,
                block_number: log.block_number,
                topics: log.topics().to_vec(),
            })
            .collect())
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<RawTransaction>> {
        let tx = self.provider.get_transaction_by_hash(hash.hash()).await?;
        Ok(tx.map(|tx| RawTransaction {
            input: tx.input().clone(),
            block_number: tx.block_number,
            from: tx.inner.signer(),
            value: tx.value(),
        }))
    }

    async fn block_timestamp(&self, number: BlockNumber) -> Result<Option<u64>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number.value()))
            .await?;
        Ok(block.map(|b| b.header.timestamp))
    }
}
