//! Event scanning over provider-sized block ranges.
//!
//! A scan fetches the chain head once, splits `[from, head]` into batches
//! of at most [`BATCH_BLOCK_LIMIT`] blocks whose endpoints are shared by
//! neighbours, and issues one `eth_getLogs` per batch and event kind.
//! Logs re-observed on a shared endpoint are deduplicated by the store.

use ccip_cache::{
    BlockNumber, ChainId, ContractAddress, Error, EventKind, ExecutedEvent, MessageSentEvent,
    RawEvent, RpcOperation, TxHash, WalletAddress,
};

use crate::resilience::Resilience;
use crate::rpc::{ChainClient, LogQuery, RawLog};

/// Provider-imposed upper bound on blocks per log query.
pub const BATCH_BLOCK_LIMIT: u64 = 10_000;

/// Events found by a scan and the checkpoint to persist afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Decoded events, all `MessageSent` first, then all `Executed`.
    pub events: Vec<RawEvent>,
    /// Chain head observed at the start of the scan, never below `from`.
    pub checkpoint: BlockNumber,
}

/// Ascending batch boundaries from `from` to `head`.
///
/// Steps by `limit` from `from` and always ends at `head`, with adjacent
/// duplicates removed. Empty when `head < from`.
#[must_use]
pub fn batch_boundaries(from: u64, head: u64, limit: u64) -> Vec<u64> {
    if head < from {
        return Vec::new();
    }
    let step = usize::try_from(limit.max(1)).unwrap_or(usize::MAX);
    let mut boundaries: Vec<u64> = (from..=head).step_by(step).collect();
    boundaries.push(head);
    boundaries.dedup();
    boundaries
}

/// Inclusive `(from, to)` ranges between consecutive boundaries.
#[must_use]
pub fn batch_ranges(from: u64, head: u64, limit: u64) -> Vec<(u64, u64)> {
    let boundaries = batch_boundaries(from, head, limit);
    boundaries
        .iter()
        .zip(boundaries.iter().skip(1))
        .map(|(&start, &end)| (start, end))
        .collect()
}

/// Scans one contract for protocol events.
#[derive(Debug, Clone, Copy)]
pub struct Scanner {
    batch_limit: u64,
    resilience: Resilience,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(BATCH_BLOCK_LIMIT, Resilience::default())
    }
}

impl Scanner {
    /// Scanner with a custom batch limit and retry policy.
    #[must_use]
    pub const fn new(batch_limit: u64, resilience: Resilience) -> Self {
        Self {
            batch_limit,
            resilience,
        }
    }

    /// Collect every `MessageSent` and `Executed` event emitted by
    /// `contract` from `from` up to the current head.
    ///
    /// Reads only; nothing is persisted.
    ///
    /// # Errors
    ///
    /// - [`Error::RpcUnavailable`] if the head or a batch of logs cannot be
    ///   fetched after one retry.
    /// - [`Error::MalformedLog`] if a log lacks a field its event needs.
    pub async fn scan<C: ChainClient>(
        &self,
        client: &C,
        chain_id: ChainId,
        contract: ContractAddress,
        from: BlockNumber,
    ) -> Result<ScanOutcome, Error> {
        let head = self
            .resilience
            .fetch(chain_id, RpcOperation::BlockNumber, || client.block_number())
            .await?;

        let ranges = batch_ranges(from.value(), head, self.batch_limit);
        tracing::debug!(
            %chain_id,
            from = from.value(),
            to = head,
            batches = ranges.len(),
            "scanning block range"
        );

        let mut events = Vec::new();
        for kind in EventKind::ALL {
            for &(start, end) in &ranges {
                let query = LogQuery {
                    address: contract,
                    topic: kind.topic(),
                    from: BlockNumber::new(start),
                    to: BlockNumber::new(end),
                };
                let logs = self
                    .resilience
                    .fetch(chain_id, RpcOperation::FilterLogs, || client.logs(query))
                    .await?;

                tracing::debug!(
                    %chain_id,
                    event = kind.as_str(),
                    from = start,
                    to = end,
                    logs = logs.len(),
                    "fetched logs"
                );
                for log in &logs {
                    events.push(to_event(chain_id, kind, log)?);
                }
            }
        }

        Ok(ScanOutcome {
            events,
            checkpoint: BlockNumber::new(head.max(from.value())),
        })
    }
}

fn to_event(chain_id: ChainId, kind: EventKind, log: &RawLog) -> Result<RawEvent, Error> {
    let malformed = |reason: &str| Error::MalformedLog {
        chain_id,
        reason: format!("{} log {reason}", kind.as_str()),
    };
    let tx_hash = TxHash::from(log.tx_hash.ok_or_else(|| malformed("without transaction hash"))?);
    let block_number = BlockNumber::new(
        log.block_number
            .ok_or_else(|| malformed("without block number"))?,
    );
    let topic = |index: usize| {
        log.topics
            .get(index)
            .copied()
            .ok_or_else(|| malformed(&format!("without topic {index} in {tx_hash}")))
    };

    Ok(match kind {
        EventKind::MessageSent => RawEvent::MessageSent(MessageSentEvent {
            chain_id,
            tx_hash,
            block_number,
            message_id: topic(1)?,
            caller: WalletAddress::from_topic(topic(2)?),
        }),
        EventKind::Executed => RawEvent::Executed(ExecutedEvent {
            chain_id,
            tx_hash,
            block_number,
            caller: WalletAddress::from_topic(topic(1)?),
        }),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use alloy::primitives::{Address, B256};
    use anyhow::{Result, anyhow};
    use ccip_cache::event::{EXECUTED_TOPIC, MESSAGE_SENT_TOPIC};

    use super::*;
    use crate::rpc::RawTransaction;

    #[test]
    fn boundaries_for_example_range() {
        assert_eq!(
            batch_ranges(0, 25_000, 10_000),
            vec![(0, 10_000), (10_000, 20_000), (20_000, 25_000)],
            "three batches sharing endpoints"
        );
    }

    #[test]
    fn head_on_a_step_is_not_duplicated() {
        assert_eq!(batch_boundaries(0, 20_000, 10_000), vec![0, 10_000, 20_000], "dedup");
    }

    #[test]
    fn empty_or_inverted_range_has_no_batches() {
        assert!(batch_ranges(500, 500, 10_000).is_empty(), "from == head");
        assert!(batch_ranges(600, 500, 10_000).is_empty(), "head behind from");
    }

    #[test]
    fn ranges_cover_without_gaps() {
        for (from, head) in [(0u64, 1u64), (3, 10_002), (7, 30_007), (123, 99_999), (1, 40_000)] {
            let ranges = batch_ranges(from, head, 10_000);
            assert_eq!(
                ranges.len() as u64,
                (head - from).div_ceil(10_000),
                "query count for [{from}, {head}]"
            );
            assert_eq!(ranges.first().map(|r| r.0), Some(from), "starts at from");
            assert_eq!(ranges.last().map(|r| r.1), Some(head), "ends at head");
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].1, pair[1].0, "contiguous with shared boundary");
            }
            assert!(ranges.iter().all(|(a, b)| b - a <= 10_000), "within limit");
        }
    }

    #[derive(Clone, Default)]
    struct FakeChain {
        head: u64,
        logs: Vec<(B256, RawLog)>,
        queries: Arc<Mutex<Vec<LogQuery>>>,
    }

    impl ChainClient for FakeChain {
        async fn block_number(&self) -> Result<u64> {
            Ok(self.head)
        }

        async fn logs(&self, query: LogQuery) -> Result<Vec<RawLog>> {
            self.queries.lock().unwrap().push(query);
            Ok(self
                .logs
                .iter()
                .filter(|(topic, log)| {
                    let block = log.block_number.unwrap_or_default();
                    *topic == query.topic
                        && (query.from.value()..=query.to.value()).contains(&block)
                })
                .map(|(_, log)| log.clone())
                .collect())
        }

        async fn transaction(&self, _hash: TxHash) -> Result<Option<RawTransaction>> {
            Err(anyhow!("not used"))
        }

        async fn block_timestamp(&self, _number: BlockNumber) -> Result<Option<u64>> {
            Err(anyhow!("not used"))
        }
    }

    fn contract() -> ContractAddress {
        ContractAddress::from(Address::repeat_byte(0xcc))
    }

    fn log(tx: u8, block: u64, topics: Vec<B256>) -> RawLog {
        RawLog {
            tx_hash: Some(B256::repeat_byte(tx)),
            block_number: Some(block),
            topics,
        }
    }

    #[tokio::test]
    async fn scans_every_batch_for_each_event_kind() {
        let caller = Address::repeat_byte(0x0a).into_word();
        let chain = FakeChain {
            head: 25_000,
            logs: vec![
                (
                    MESSAGE_SENT_TOPIC,
                    log(1, 12_000, vec![MESSAGE_SENT_TOPIC, B256::repeat_byte(0x77), caller]),
                ),
                (EXECUTED_TOPIC, log(2, 24_000, vec![EXECUTED_TOPIC, caller])),
            ],
            ..FakeChain::default()
        };

        let outcome = Scanner::default()
            .scan(&chain, ChainId::new(137), contract(), BlockNumber::new(0))
            .await
            .unwrap();

        assert_eq!(outcome.checkpoint, BlockNumber::new(25_000), "checkpoint is the head");
        assert_eq!(outcome.events.len(), 2, "one event of each kind");
        let RawEvent::MessageSent(sent) = &outcome.events[0] else {
            panic!("expected MessageSent first");
        };
        assert_eq!(sent.message_id, B256::repeat_byte(0x77), "message id from topic 1");
        assert_eq!(
            sent.caller,
            WalletAddress::from(Address::repeat_byte(0x0a)),
            "caller from topic 2"
        );
        assert_eq!(outcome.events[1].kind(), EventKind::Executed, "then Executed");

        let queries = chain.queries.lock().unwrap();
        let ranges: Vec<_> = queries
            .iter()
            .filter(|q| q.topic == MESSAGE_SENT_TOPIC)
            .map(|q| (q.from.value(), q.to.value()))
            .collect();
        assert_eq!(
            ranges,
            vec![(0, 10_000), (10_000, 20_000), (20_000, 25_000)],
            "batched MessageSent queries"
        );
        assert_eq!(queries.len(), 6, "three batches per event kind");
        assert!(queries.iter().all(|q| q.address == contract()), "scoped to contract");
    }

    #[tokio::test]
    async fn checkpoint_is_returned_without_events() {
        let chain = FakeChain {
            head: 900,
            ..FakeChain::default()
        };
        let outcome = Scanner::default()
            .scan(&chain, ChainId::new(1), contract(), BlockNumber::new(100))
            .await
            .unwrap();
        assert!(outcome.events.is_empty(), "no events");
        assert_eq!(outcome.checkpoint, BlockNumber::new(900), "head still returned");
    }

    #[tokio::test]
    async fn lagging_head_does_not_move_checkpoint_back() {
        let chain = FakeChain {
            head: 90,
            ..FakeChain::default()
        };
        let outcome = Scanner::default()
            .scan(&chain, ChainId::new(1), contract(), BlockNumber::new(100))
            .await
            .unwrap();
        assert_eq!(outcome.checkpoint, BlockNumber::new(100), "never below start");
        assert!(chain.queries.lock().unwrap().is_empty(), "no log queries");
    }

    #[tokio::test]
    async fn log_without_caller_topic_is_malformed() {
        let chain = FakeChain {
            head: 10,
            logs: vec![(EXECUTED_TOPIC, log(3, 5, vec![EXECUTED_TOPIC]))],
            ..FakeChain::default()
        };
        let err = Scanner::default()
            .scan(&chain, ChainId::new(1), contract(), BlockNumber::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedLog { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn log_without_tx_hash_is_malformed() {
        let mut bad = log(4, 5, vec![EXECUTED_TOPIC, B256::ZERO]);
        bad.tx_hash = None;
        let chain = FakeChain {
            head: 10,
            logs: vec![(EXECUTED_TOPIC, bad)],
            ..FakeChain::default()
        };
        let err = Scanner::default()
            .scan(&chain, ChainId::new(1), contract(), BlockNumber::new(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedLog { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn log_without_block_number_is_malformed() {
        let mut bad = log(5, 5, vec![EXECUTED_TOPIC, B256::ZERO]);
        bad.block_number = None;
        let chain = FakeChain {
            head: 10,
            logs: vec![(EXECUTED_TOPIC, bad)],
            ..FakeChain::default()
        };
        let err = Scanner::default()
            .scan(&chain, ChainId::new(1), contract(), BlockNumber::new(0))
            .await
            .unwrap_err();
        let Error::MalformedLog { reason, .. } = &err else {
            panic!("got {err:?}");
        };
        assert_eq!(reason, "executed log without block number", "reason names the field");
    }

    #[tokio::test]
    async fn message_sent_without_caller_is_malformed() {
        let chain = FakeChain {
            head: 10,
            logs: vec![(
                MESSAGE_SENT_TOPIC,
                log(6, 5, vec![MESSAGE_SENT_TOPIC, B256::repeat_byte(0x77)]),
            )],
            ..FakeChain::default()
        };
        let err = Scanner::default()
            .scan(&chain, ChainId::new(1), contract(), BlockNumber::new(0))
            .await
            .unwrap_err();
        let Error::MalformedLog { reason, .. } = &err else {
            panic!("got {err:?}");
        };
        assert!(reason.contains("without topic 2"), "got {reason}");
    }
}
