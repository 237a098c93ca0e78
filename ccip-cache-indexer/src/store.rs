//! Storage seam for checkpoints, raw events and classifications.
//!
//! Events are insert-or-ignore keyed by `(chain, kind, tx hash)`;
//! classifications are write-once keyed by `(chain, tx hash)`. The
//! classification backlog of a chain is every tx hash with an event but
//! without a classification.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use ccip_cache::{
    BlockNumber, ChainId, EventKind, FunctionSelector, RawEvent, TxHash, TxInfo, WalletAddress,
};

/// Persistence used by the ingestion orchestrator and the history query.
pub trait Store {
    /// Last persisted checkpoint of `chain_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn checkpoint(&self, chain_id: ChainId) -> Result<Option<BlockNumber>>;

    /// Set the checkpoint of `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn upsert_checkpoint(&self, chain_id: ChainId, block: BlockNumber) -> Result<()>;

    /// Insert events, ignoring ones already stored. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn insert_events(&self, events: &[RawEvent]) -> Result<usize>;

    /// Tx hashes of `chain_id` that have an event but no classification.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn tx_hashes_without_info(&self, chain_id: ChainId) -> Result<BTreeSet<TxHash>>;

    /// Store classifications, skipping any whose chain and hash are already
    /// classified. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn insert_tx_infos(&self, infos: &[TxInfo]) -> Result<usize>;

    /// Tx hashes, on any chain, of events whose caller is `wallet`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn tx_hashes_by_caller(&self, wallet: WalletAddress) -> Result<BTreeSet<TxHash>>;

    /// Classifications of `hashes`, skipping `excluded` selectors, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn tx_infos(
        &self,
        hashes: &BTreeSet<TxHash>,
        excluded: &[FunctionSelector],
    ) -> Result<Vec<TxInfo>>;
}

/// Keep classifications of `hashes` whose selector is not excluded, ordered
/// by transaction date descending.
pub(crate) fn select_tx_infos<'a>(
    infos: impl IntoIterator<Item = &'a TxInfo>,
    hashes: &BTreeSet<TxHash>,
    excluded: &[FunctionSelector],
) -> Vec<TxInfo> {
    let mut selected: Vec<TxInfo> = infos
        .into_iter()
        .filter(|info| {
            let header = info.header();
            hashes.contains(&header.tx_hash) && !excluded.contains(&header.selector)
        })
        .cloned()
        .collect();
    selected.sort_by_key(|info| {
        let header = info.header();
        (Reverse(header.tx_date), header.chain_id, header.tx_hash)
    });
    selected
}

#[derive(Debug, Default)]
struct Tables {
    checkpoints: HashMap<ChainId, BlockNumber>,
    events: HashMap<(ChainId, EventKind, TxHash), RawEvent>,
    tx_infos: HashMap<(ChainId, TxHash), TxInfo>,
}

/// In-process [`Store`] behind a mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Number of stored events of `kind` on `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn event_count(&self, chain_id: ChainId, kind: EventKind) -> Result<usize> {
        Ok(self
            .tables()?
            .events
            .keys()
            .filter(|(chain, k, _)| *chain == chain_id && *k == kind)
            .count())
    }

    /// Stored classification of `tx_hash` on `chain_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn tx_info(&self, chain_id: ChainId, tx_hash: TxHash) -> Result<Option<TxInfo>> {
        Ok(self.tables()?.tx_infos.get(&(chain_id, tx_hash)).cloned())
    }
}

impl Store for MemoryStore {
    fn checkpoint(&self, chain_id: ChainId) -> Result<Option<BlockNumber>> {
        Ok(self.tables()?.checkpoints.get(&chain_id).copied())
    }

    fn upsert_checkpoint(&self, chain_id: ChainId, block: BlockNumber) -> Result<()> {
        self.tables()?.checkpoints.insert(chain_id, block);
        Ok(())
    }

    fn insert_events(&self, events: &[RawEvent]) -> Result<usize> {
        let mut tables = self.tables()?;
        let mut inserted = 0;
        for event in events {
            let key = (event.chain_id(), event.kind(), event.tx_hash());
            if !tables.events.contains_key(&key) {
                tables.events.insert(key, event.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn tx_hashes_without_info(&self, chain_id: ChainId) -> Result<BTreeSet<TxHash>> {
        let tables = self.tables()?;
        Ok(tables
            .events
            .keys()
            .filter(|(chain, _, hash)| {
                *chain == chain_id && !tables.tx_infos.contains_key(&(chain_id, *hash))
            })
            .map(|(_, _, hash)| *hash)
            .collect())
    }

    fn insert_tx_infos(&self, infos: &[TxInfo]) -> Result<usize> {
        let mut tables = self.tables()?;
        let mut inserted = 0;
        for info in infos {
            let header = info.header();
            let key = (header.chain_id, header.tx_hash);
            if !tables.tx_infos.contains_key(&key) {
                tables.tx_infos.insert(key, info.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn tx_hashes_by_caller(&self, wallet: WalletAddress) -> Result<BTreeSet<TxHash>> {
        Ok(self
            .tables()?
            .events
            .values()
            .filter(|event| event.caller() == wallet)
            .map(RawEvent::tx_hash)
            .collect())
    }

    fn tx_infos(
        &self,
        hashes: &BTreeSet<TxHash>,
        excluded: &[FunctionSelector],
    ) -> Result<Vec<TxInfo>> {
        Ok(select_tx_infos(
            self.tables()?.tx_infos.values(),
            hashes,
            excluded,
        ))
    }
}
