//! Parquet-backed [`Store`].
//!
//! Layout under the data directory:
//!
//! ```text
//! <data_dir>/<chain_id>/cursor.json
//! <data_dir>/<chain_id>/message_sent.parquet
//! <data_dir>/<chain_id>/executed.parquet
//! <data_dir>/<chain_id>/tx_info.parquet
//! ```
//!
//! Every insert rewrites the affected file through a temp file and rename.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use alloy::primitives::B256;
use anyhow::{Context, Result, anyhow};
use arrow_array::{Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use ccip_cache::{
    BlockNumber, ChainId, ContractAddress, EventKind, ExecutedEvent, FunctionSelector,
    MessageSentEvent, RawEvent, TxHash, TxInfo, TxInfoRecord, WalletAddress,
};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::cursor::Cursor;
use crate::store::{Store, select_tx_infos};

const TX_INFO_FILE: &str = "tx_info.parquet";

/// Columns of `message_sent.parquet` and `executed.parquet`.
static EVENT_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("block_number", DataType::UInt64, false),
        Field::new("tx_hash", DataType::Utf8, false),
        Field::new("caller", DataType::Utf8, false),
        Field::new("message_id", DataType::Utf8, true),
    ]))
});

/// Columns of `tx_info.parquet`, one per [`TxInfoRecord`] field.
static TX_INFO_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new("tx_type", DataType::Utf8, false),
        Field::new("chain_id", DataType::UInt64, false),
        Field::new("tx_hash", DataType::Utf8, false),
        Field::new("fn_selector", DataType::Utf8, false),
        Field::new("block_number", DataType::UInt64, false),
        Field::new("controller_wallet", DataType::Utf8, false),
        Field::new("tx_date", DataType::Utf8, false),
        Field::new("tx_value", DataType::Utf8, false),
        Field::new("dest_chains", DataType::Utf8, true),
        Field::new("salt", DataType::Utf8, true),
        Field::new("token_address", DataType::Utf8, true),
        Field::new("token_receiver", DataType::Utf8, true),
        Field::new("token_amount", DataType::Utf8, true),
    ]))
});

/// A single Parquet file holding rows of one domain type.
///
/// `load` and `save` always move the whole file; the store never hands
/// record batches across this boundary.
trait Table {
    type Row;

    fn path(&self) -> &Path;

    fn encode(&self, rows: &[Self::Row]) -> Result<RecordBatch>;

    fn decode(&self, batch: &RecordBatch) -> Result<Vec<Self::Row>>;

    /// Every row in the file, or none if it does not exist yet.
    fn load(&self) -> Result<Vec<Self::Row>> {
        let path = self.path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file =
            std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet header: {}", path.display()))?
            .build()
            .with_context(|| format!("building parquet reader: {}", path.display()))?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch.with_context(|| format!("reading batch from {}", path.display()))?;
            rows.extend(
                self.decode(&batch)
                    .with_context(|| format!("decoding {}", path.display()))?,
            );
        }
        Ok(rows)
    }

    /// Replace the file with `rows` (temp file + rename).
    fn save(&self, rows: &[Self::Row]) -> Result<()> {
        let path = self.path();
        let batch = self.encode(rows)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("parquet.tmp");
        let file =
            std::fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()?))?;
        writer.write(&batch)?;
        writer.close()?;

        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))
    }
}

fn writer_properties() -> Result<WriterProperties> {
    Ok(WriterProperties::builder()
        .set_compression(Compression::ZSTD(
            ZstdLevel::try_new(3).context("invalid zstd level")?,
        ))
        .build())
}

/// `message_sent.parquet` or `executed.parquet` of one chain.
struct EventTable {
    path: PathBuf,
    chain_id: ChainId,
    kind: EventKind,
}

impl Table for EventTable {
    type Row = RawEvent;

    fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, events: &[RawEvent]) -> Result<RecordBatch> {
        let cap = events.len();
        let mut block_numbers = Vec::with_capacity(cap);
        let mut tx_hashes = Vec::with_capacity(cap);
        let mut callers = Vec::with_capacity(cap);
        let mut message_ids: Vec<Option<String>> = Vec::with_capacity(cap);

        for event in events {
            block_numbers.push(event.block_number().value());
            tx_hashes.push(event.tx_hash().to_string());
            callers.push(event.caller().to_string());
            message_ids.push(match event {
                RawEvent::MessageSent(e) => Some(format!("{:#x}", e.message_id)),
                RawEvent::Executed(_) => None,
            });
        }

        Ok(RecordBatch::try_new(
            Arc::clone(&EVENT_SCHEMA),
            vec![
                Arc::new(UInt64Array::from(block_numbers)),
                Arc::new(StringArray::from(tx_hashes)),
                Arc::new(StringArray::from(callers)),
                Arc::new(StringArray::from(message_ids)),
            ],
        )?)
    }

    fn decode(&self, batch: &RecordBatch) -> Result<Vec<RawEvent>> {
        let block_numbers = column::<UInt64Array>(batch, "block_number")?;
        let tx_hashes = column::<StringArray>(batch, "tx_hash")?;
        let callers = column::<StringArray>(batch, "caller")?;
        let message_ids = column::<StringArray>(batch, "message_id")?;
        let chain_id = self.chain_id;

        (0..batch.num_rows())
            .map(|row| {
                let tx_hash = TxHash::parse(tx_hashes.value(row))?;
                let block_number = BlockNumber::new(block_numbers.value(row));
                let caller = WalletAddress::parse(callers.value(row))?;
                Ok(match self.kind {
                    EventKind::MessageSent => {
                        let message_id: B256 = nullable(message_ids, row)
                            .context("message_sent row without message_id")?
                            .parse()?;
                        RawEvent::MessageSent(MessageSentEvent {
                            chain_id,
                            tx_hash,
                            block_number,
                            message_id,
                            caller,
                        })
                    }
                    EventKind::Executed => RawEvent::Executed(ExecutedEvent {
                        chain_id,
                        tx_hash,
                        block_number,
                        caller,
                    }),
                })
            })
            .collect()
    }
}

/// `tx_info.parquet` of one chain.
struct TxInfoTable {
    path: PathBuf,
}

impl Table for TxInfoTable {
    type Row = TxInfo;

    fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, infos: &[TxInfo]) -> Result<RecordBatch> {
        let records: Vec<TxInfoRecord> = infos.iter().map(TxInfoRecord::from).collect();
        let strings = |f: fn(&TxInfoRecord) -> String| -> StringArray {
            StringArray::from(records.iter().map(f).collect::<Vec<_>>())
        };
        let optional = |f: fn(&TxInfoRecord) -> Option<String>| -> StringArray {
            StringArray::from(records.iter().map(f).collect::<Vec<_>>())
        };
        let numbers = |f: fn(&TxInfoRecord) -> u64| -> UInt64Array {
            UInt64Array::from(records.iter().map(f).collect::<Vec<_>>())
        };

        Ok(RecordBatch::try_new(
            Arc::clone(&TX_INFO_SCHEMA),
            vec![
                Arc::new(strings(|r| r.tx_type.to_string())),
                Arc::new(numbers(|r| r.chain_id.value())),
                Arc::new(strings(|r| r.tx_hash.to_string())),
                Arc::new(strings(|r| r.fn_selector.to_string())),
                Arc::new(numbers(|r| r.block_number.value())),
                Arc::new(strings(|r| r.controller_wallet.to_string())),
                Arc::new(strings(|r| r.tx_date.clone())),
                Arc::new(strings(|r| r.tx_value.clone())),
                Arc::new(optional(|r| r.dest_chains.as_ref().map(|d| d.join(",")))),
                Arc::new(optional(|r| r.salt.clone())),
                Arc::new(optional(|r| r.token_address.map(|a| a.to_string()))),
                Arc::new(optional(|r| r.token_receiver.map(|a| a.to_string()))),
                Arc::new(optional(|r| r.token_amount.clone())),
            ],
        )?)
    }

    fn decode(&self, batch: &RecordBatch) -> Result<Vec<TxInfo>> {
        let tx_types = column::<StringArray>(batch, "tx_type")?;
        let chain_ids = column::<UInt64Array>(batch, "chain_id")?;
        let tx_hashes = column::<StringArray>(batch, "tx_hash")?;
        let selectors = column::<StringArray>(batch, "fn_selector")?;
        let block_numbers = column::<UInt64Array>(batch, "block_number")?;
        let wallets = column::<StringArray>(batch, "controller_wallet")?;
        let dates = column::<StringArray>(batch, "tx_date")?;
        let values = column::<StringArray>(batch, "tx_value")?;
        let dest_chains = column::<StringArray>(batch, "dest_chains")?;
        let salts = column::<StringArray>(batch, "salt")?;
        let token_addresses = column::<StringArray>(batch, "token_address")?;
        let token_receivers = column::<StringArray>(batch, "token_receiver")?;
        let token_amounts = column::<StringArray>(batch, "token_amount")?;

        (0..batch.num_rows())
            .map(|row| {
                let record = TxInfoRecord {
                    tx_type: tx_types.value(row).parse()?,
                    chain_id: ChainId::new(chain_ids.value(row)),
                    tx_hash: TxHash::parse(tx_hashes.value(row))?,
                    fn_selector: FunctionSelector::parse(selectors.value(row))?,
                    block_number: BlockNumber::new(block_numbers.value(row)),
                    controller_wallet: WalletAddress::parse(wallets.value(row))?,
                    tx_date: dates.value(row).to_owned(),
                    tx_value: values.value(row).to_owned(),
                    dest_chains: nullable(dest_chains, row).map(|joined| {
                        joined
                            .split(',')
                            .filter(|s| !s.is_empty())
                            .map(str::to_owned)
                            .collect()
                    }),
                    salt: nullable(salts, row).map(str::to_owned),
                    token_address: nullable(token_addresses, row)
                        .map(ContractAddress::parse)
                        .transpose()?,
                    token_receiver: nullable(token_receivers, row)
                        .map(WalletAddress::parse)
                        .transpose()?,
                    token_amount: nullable(token_amounts, row).map(str::to_owned),
                };
                Ok(TxInfo::try_from(record)?)
            })
            .collect()
    }
}

/// [`Store`] persisting each chain to its own directory of Parquet files.
#[derive(Debug)]
pub struct ParquetStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl ParquetStore {
    /// Store rooted at `root`. Directories are created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn chain_dir(&self, chain_id: ChainId) -> PathBuf {
        self.root.join(chain_id.to_string())
    }

    fn event_table(&self, chain_id: ChainId, kind: EventKind) -> EventTable {
        EventTable {
            path: self
                .chain_dir(chain_id)
                .join(format!("{}.parquet", kind.as_str())),
            chain_id,
            kind,
        }
    }

    fn tx_info_table(&self, chain_id: ChainId) -> TxInfoTable {
        TxInfoTable {
            path: self.chain_dir(chain_id).join(TX_INFO_FILE),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| anyhow!("parquet store lock poisoned"))
    }

    /// Chains that have a directory under the root.
    fn chains(&self) -> Result<Vec<ChainId>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut chains = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("listing {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(chain_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<ChainId>().ok())
            {
                chains.push(chain_id);
            }
        }
        chains.sort();
        Ok(chains)
    }
}

impl Store for ParquetStore {
    fn checkpoint(&self, chain_id: ChainId) -> Result<Option<BlockNumber>> {
        Ok(Cursor::load(&self.chain_dir(chain_id))?.map(|c| c.last_block))
    }

    fn upsert_checkpoint(&self, chain_id: ChainId, block: BlockNumber) -> Result<()> {
        let _guard = self.lock()?;
        Cursor::now(block).save(&self.chain_dir(chain_id))
    }

    fn insert_events(&self, events: &[RawEvent]) -> Result<usize> {
        let _guard = self.lock()?;
        let groups: BTreeSet<(ChainId, EventKind)> =
            events.iter().map(|e| (e.chain_id(), e.kind())).collect();

        let mut inserted = 0;
        for (chain_id, kind) in groups {
            let table = self.event_table(chain_id, kind);
            let mut rows = table.load()?;
            let mut seen: BTreeSet<TxHash> = rows.iter().map(RawEvent::tx_hash).collect();

            let before = rows.len();
            rows.extend(
                events
                    .iter()
                    .filter(|e| e.chain_id() == chain_id && e.kind() == kind)
                    .filter(|e| seen.insert(e.tx_hash()))
                    .cloned(),
            );
            let fresh = rows.len() - before;
            if fresh == 0 {
                continue;
            }

            table.save(&rows)?;
            inserted += fresh;
            tracing::debug!(%chain_id, event = kind.as_str(), new = fresh, "stored events");
        }
        Ok(inserted)
    }

    fn tx_hashes_without_info(&self, chain_id: ChainId) -> Result<BTreeSet<TxHash>> {
        let classified: BTreeSet<TxHash> = self
            .tx_info_table(chain_id)
            .load()?
            .iter()
            .map(|info| info.header().tx_hash)
            .collect();
        let mut backlog = BTreeSet::new();
        for kind in EventKind::ALL {
            backlog.extend(
                self.event_table(chain_id, kind)
                    .load()?
                    .iter()
                    .map(RawEvent::tx_hash)
                    .filter(|hash| !classified.contains(hash)),
            );
        }
        Ok(backlog)
    }

    fn insert_tx_infos(&self, infos: &[TxInfo]) -> Result<usize> {
        let _guard = self.lock()?;
        let chains: BTreeSet<ChainId> = infos.iter().map(|i| i.header().chain_id).collect();

        let mut inserted = 0;
        for chain_id in chains {
            let table = self.tx_info_table(chain_id);
            let mut rows = table.load()?;
            let mut seen: BTreeSet<TxHash> = rows.iter().map(|i| i.header().tx_hash).collect();

            let before = rows.len();
            rows.extend(
                infos
                    .iter()
                    .filter(|i| i.header().chain_id == chain_id)
                    .filter(|i| seen.insert(i.header().tx_hash))
                    .cloned(),
            );
            let fresh = rows.len() - before;
            if fresh == 0 {
                continue;
            }

            table.save(&rows)?;
            inserted += fresh;
            tracing::debug!(%chain_id, new = fresh, "stored tx infos");
        }
        Ok(inserted)
    }

    fn tx_hashes_by_caller(&self, wallet: WalletAddress) -> Result<BTreeSet<TxHash>> {
        let mut hashes = BTreeSet::new();
        for chain_id in self.chains()? {
            for kind in EventKind::ALL {
                hashes.extend(
                    self.event_table(chain_id, kind)
                        .load()?
                        .iter()
                        .filter(|e| e.caller() == wallet)
                        .map(RawEvent::tx_hash),
                );
            }
        }
        Ok(hashes)
    }

    fn tx_infos(
        &self,
        hashes: &BTreeSet<TxHash>,
        excluded: &[FunctionSelector],
    ) -> Result<Vec<TxInfo>> {
        let mut infos = Vec::new();
        for chain_id in self.chains()? {
            infos.extend(self.tx_info_table(chain_id).load()?);
        }
        Ok(select_tx_infos(&infos, hashes, excluded))
    }
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<T>())
        .with_context(|| format!("missing or mistyped column {name}"))
}

fn nullable(col: &StringArray, row: usize) -> Option<&str> {
    col.is_valid(row).then(|| col.value(row))
}
