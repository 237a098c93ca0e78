//! Periodic ingestion across every configured chain.
//!
//! One cycle visits the chains in order. For each chain it scans from the
//! stored checkpoint (or the configured start block), stores the events,
//! advances the checkpoint, then classifies every backlog transaction. A
//! chain that fails is logged and skipped until the next cycle; the others
//! are unaffected.

use std::time::Duration;

use anyhow::{Context, Result};
use ccip_cache::{
    Balance, BlockNumber, ChainId, ContractAddress, Error, RpcOperation, TxContext, TxHash, TxInfo,
    UtcDateTime, WalletAddress, classify,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::ChainSettings;
use crate::resilience::Resilience;
use crate::rpc::ChainClient;
use crate::scanner::Scanner;
use crate::store::Store;

/// A configured chain together with its RPC client.
#[derive(Debug, Clone)]
pub struct ChainHandle<C> {
    /// Resolved configuration.
    pub settings: ChainSettings,
    /// Client bound to `settings.rpc_url`.
    pub client: C,
}

/// What one chain's cycle accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReport {
    /// Events stored for the first time.
    pub new_events: usize,
    /// Checkpoint persisted after the scan.
    pub checkpoint: BlockNumber,
    /// Backlog transactions classified and stored.
    pub classified: usize,
    /// Backlog transactions left for the next cycle after a decode failure.
    pub skipped: usize,
}

/// Outcome of one cycle over all chains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Chains whose cycle completed.
    pub succeeded: Vec<ChainId>,
    /// Chains whose cycle failed.
    pub failed: Vec<ChainId>,
}

impl CycleReport {
    /// `true` if no chain failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives scanning, storage and classification for a set of chains.
#[derive(Debug)]
pub struct Ingestor<C, S> {
    contract: ContractAddress,
    chains: Vec<ChainHandle<C>>,
    store: S,
    scanner: Scanner,
    resilience: Resilience,
}

impl<C: ChainClient, S: Store> Ingestor<C, S> {
    /// Ingestor with the default batch limit and retry policy.
    #[must_use]
    pub fn new(contract: ContractAddress, chains: Vec<ChainHandle<C>>, store: S) -> Self {
        Self {
            contract,
            chains,
            store,
            scanner: Scanner::default(),
            resilience: Resilience::default(),
        }
    }

    /// Replace the scanner and the retry policy used for transaction fetches.
    #[must_use]
    pub fn with_policy(mut self, scanner: Scanner, resilience: Resilience) -> Self {
        self.scanner = scanner;
        self.resilience = resilience;
        self
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Run cycles every `period` until `shutdown` turns `true`.
    ///
    /// The first cycle starts immediately. A shutdown request stops
    /// scheduling and lets the chain in progress finish.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle(&shutdown).await;
            tracing::info!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                next_in = ?period,
                "cycle finished"
            );
        }
        tracing::info!("ingestion stopped");
    }

    /// Process every chain once, isolating failures per chain.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleReport {
        let mut report = CycleReport::default();
        for chain in &self.chains {
            if *shutdown.borrow() {
                tracing::info!("shutdown requested, ending cycle early");
                break;
            }

            let chain_id = chain.settings.chain_id;
            match self.process_chain(chain).await {
                Ok(r) => {
                    tracing::info!(
                        %chain_id,
                        chain = %chain.settings.name,
                        new_events = r.new_events,
                        checkpoint = r.checkpoint.value(),
                        classified = r.classified,
                        skipped = r.skipped,
                        "chain processed"
                    );
                    report.succeeded.push(chain_id);
                }
                Err(e) => {
                    tracing::error!(
                        %chain_id,
                        chain = %chain.settings.name,
                        error = %format_args!("{e:#}"),
                        "chain cycle failed"
                    );
                    report.failed.push(chain_id);
                }
            }
        }
        report
    }

    /// One chain's cycle: scan, store events, advance the checkpoint, then
    /// classify the backlog.
    ///
    /// # Errors
    ///
    /// Returns the first scan, RPC or storage failure. Decode failures of
    /// single transactions are logged and counted in
    /// [`ChainReport::skipped`] instead.
    pub async fn process_chain(&self, chain: &ChainHandle<C>) -> Result<ChainReport> {
        let chain_id = chain.settings.chain_id;
        let from = self
            .store
            .checkpoint(chain_id)
            .context("reading checkpoint")?
            .unwrap_or(chain.settings.start_block);

        let outcome = self
            .scanner
            .scan(&chain.client, chain_id, self.contract, from)
            .await?;
        let new_events = self
            .store
            .insert_events(&outcome.events)
            .context("storing events")?;
        self.store
            .upsert_checkpoint(chain_id, outcome.checkpoint)
            .context("storing checkpoint")?;

        let backlog = self
            .store
            .tx_hashes_without_info(chain_id)
            .context("reading backlog")?;
        tracing::debug!(%chain_id, backlog = backlog.len(), "classifying backlog");

        let mut infos = Vec::with_capacity(backlog.len());
        let mut skipped = 0;
        let mut failure = None;
        for tx_hash in backlog {
            match self.classify_tx(chain, tx_hash).await {
                Ok(info) => infos.push(info),
                Err(e @ Error::AbiDecodeFailed { .. }) => {
                    tracing::warn!(
                        %chain_id,
                        %tx_hash,
                        error = %e,
                        "skipping undecodable transaction"
                    );
                    skipped += 1;
                }
                Err(e) => {
                    failure = Some(anyhow::Error::new(e).context(format!("classifying {tx_hash}")));
                    break;
                }
            }
        }

        // Classifications made before a failure are kept.
        let classified = self
            .store
            .insert_tx_infos(&infos)
            .context("storing tx infos")?;
        if let Some(e) = failure {
            return Err(e);
        }

        Ok(ChainReport {
            new_events,
            checkpoint: outcome.checkpoint,
            classified,
            skipped,
        })
    }

    async fn classify_tx(&self, chain: &ChainHandle<C>, tx_hash: TxHash) -> Result<TxInfo, Error> {
        let chain_id = chain.settings.chain_id;
        let client = &chain.client;

        let (tx, block_number) = self
            .resilience
            .fetch(chain_id, RpcOperation::Transaction, || async move {
                let tx = client
                    .transaction(tx_hash)
                    .await?
                    .with_context(|| format!("transaction {tx_hash} not found"))?;
                let block = tx
                    .block_number
                    .with_context(|| format!("transaction {tx_hash} is pending"))?;
                Ok((tx, BlockNumber::new(block)))
            })
            .await?;

        let timestamp = self
            .resilience
            .fetch(chain_id, RpcOperation::Block, || async move {
                client
                    .block_timestamp(block_number)
                    .await?
                    .with_context(|| format!("block {block_number} not found"))
            })
            .await?;

        let ctx = TxContext {
            chain_id,
            tx_hash,
            block_number,
            from: WalletAddress::from(tx.from),
            value: Balance::new(tx.value),
            date: UtcDateTime::from_epoch_seconds(timestamp)?,
        };
        classify(&ctx, &tx.input)
    }
}
