//! Runtime configuration loaded from `config.toml`.
//!
//! ```toml
//! contract_address = "0x..."
//! poll_period_secs = 300
//! data_dir = "data"
//! excluded_selectors = ["0xb1dc65a4"]
//!
//! [chains.137]
//! start_block = 12345678
//! rpc_url = "https://polygon-rpc.com"   # optional, see crate::chains
//! ```
//!
//! Every problem with the file is reported at load time; nothing here is
//! re-validated while the indexer runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use ccip_cache::{BlockNumber, ChainId, ContractAddress, Error, FunctionSelector};
use serde::Deserialize;

use crate::chains;
use crate::rpc::ChainSpec;
use crate::scanner::BATCH_BLOCK_LIMIT;

/// `transmit(...)` of the protocol's off-chain reporting contract.
const TRANSMIT_SELECTOR: &str = "0xb1dc65a4";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Protocol contract whose events are scanned on every chain.
    pub contract_address: ContractAddress,
    /// Seconds between the start of two ingestion cycles.
    #[serde(default = "default_poll_period")]
    pub poll_period_secs: u64,
    /// Root directory of the Parquet store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Upper bound on blocks covered by one log query.
    #[serde(default = "default_batch_limit")]
    pub batch_block_limit: u64,
    /// Selectors hidden from history queries. Classification is unaffected.
    #[serde(default = "default_excluded_selectors")]
    pub excluded_selectors: Vec<FunctionSelector>,
    /// Per-chain settings keyed by chain ID.
    #[serde(default)]
    pub chains: BTreeMap<String, ChainProperties>,
}

/// Configuration entry for one chain.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainProperties {
    /// Block to start scanning from when no checkpoint exists.
    pub start_block: u64,
    /// RPC endpoint; defaults to the known public endpoint.
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Display name; defaults to the known chain name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Fully resolved settings for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSettings {
    /// Chain ID.
    pub chain_id: ChainId,
    /// Display name.
    pub name: String,
    /// RPC endpoint.
    pub rpc_url: String,
    /// Scan start for a chain without a checkpoint.
    pub start_block: BlockNumber,
}

const fn default_poll_period() -> u64 {
    300
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

const fn default_batch_limit() -> u64 {
    BATCH_BLOCK_LIMIT
}

fn default_excluded_selectors() -> Vec<FunctionSelector> {
    FunctionSelector::parse(TRANSMIT_SELECTOR).into_iter().collect()
}

impl Config {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or invalid settings.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_period_secs == 0 {
            bail!("poll_period_secs must be positive");
        }
        if self.batch_block_limit == 0 {
            bail!("batch_block_limit must be positive");
        }
        if self.chains.is_empty() {
            bail!("no chains configured");
        }
        self.chain_settings().map(drop)
    }

    /// Poll period as a [`Duration`].
    #[must_use]
    pub const fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_period_secs)
    }

    /// Resolve every configured chain, in chain ID order.
    ///
    /// # Errors
    ///
    /// Returns an error if a chain key is not a number or a chain has no
    /// RPC endpoint (neither configured nor known).
    pub fn chain_settings(&self) -> Result<Vec<ChainSettings>> {
        let mut settings = self
            .chains
            .iter()
            .map(|(key, props)| {
                let chain_id: ChainId = key.parse()?;
                resolve(chain_id, props)
            })
            .collect::<Result<Vec<_>>>()?;
        settings.sort_by_key(|s| s.chain_id);
        Ok(settings)
    }

    /// Resolve the single chain named by `spec`, applying its RPC override.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedChain`] if the chain is not configured.
    pub fn select(&self, spec: &ChainSpec) -> Result<ChainSettings> {
        let mut settings = self
            .chain_settings()?
            .into_iter()
            .find(|s| s.chain_id == spec.chain_id)
            .ok_or(Error::UnsupportedChain(spec.chain_id))?;
        if let Some(rpc) = &spec.rpc_override {
            settings.rpc_url.clone_from(rpc);
        }
        Ok(settings)
    }
}

fn resolve(chain_id: ChainId, props: &ChainProperties) -> Result<ChainSettings> {
    let known = chains::by_chain_id(chain_id);
    let rpc_url = props
        .rpc_url
        .clone()
        .or_else(|| known.map(|k| k.default_rpc.to_owned()))
        .with_context(|| format!("chain {chain_id}: no rpc_url and no known default"))?;
    let name = props
        .name
        .clone()
        .or_else(|| known.map(|k| k.name.to_owned()))
        .unwrap_or_else(|| format!("chain-{chain_id}"));
    Ok(ChainSettings {
        chain_id,
        name,
        rpc_url,
        start_block: BlockNumber::new(props.start_block),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        contract_address = "0x00000000000000000000000000000000000000AA"
        poll_period_secs = 60

        [chains.137]
        start_block = 100

        [chains.31337]
        start_block = 0
        rpc_url = "http://localhost:8545"
    "#;

    #[test]
    fn defaults_are_applied() {
        let config = Config::from_toml(CONFIG).unwrap();
        assert_eq!(config.batch_block_limit, 10_000, "default batch limit");
        assert_eq!(config.data_dir, PathBuf::from("data"), "default data dir");
        assert_eq!(
            config.excluded_selectors,
            vec![FunctionSelector::parse("0xb1dc65a4").unwrap()],
            "transmit is excluded by default"
        );
        assert_eq!(
            config.contract_address.to_string(),
            "0x00000000000000000000000000000000000000aa",
            "address normalized"
        );
    }

    #[test]
    fn chains_fall_back_to_known_defaults() {
        let settings = Config::from_toml(CONFIG).unwrap().chain_settings().unwrap();
        assert_eq!(settings.len(), 2, "two chains");
        assert_eq!(settings[0].name, "polygon", "known name");
        assert_eq!(settings[0].rpc_url, "https://polygon-rpc.com", "known rpc");
        assert_eq!(settings[0].start_block, BlockNumber::new(100), "start block");
        assert_eq!(settings[1].name, "chain-31337", "generated name");
    }

    #[test]
    fn unknown_chain_without_rpc_is_rejected() {
        let text = r#"
            contract_address = "0x00000000000000000000000000000000000000aa"
            [chains.31337]
            start_block = 0
        "#;
        assert!(Config::from_toml(text).is_err(), "no rpc for unknown chain");
    }

    #[test]
    fn empty_chain_map_is_rejected() {
        let text = r#"contract_address = "0x00000000000000000000000000000000000000aa""#;
        assert!(Config::from_toml(text).is_err(), "at least one chain is required");
    }

    #[test]
    fn select_applies_override_and_rejects_unknown_chain() {
        let config = Config::from_toml(CONFIG).unwrap();
        let spec = ChainSpec::new(ChainId::new(137)).with_rpc("http://override");
        assert_eq!(config.select(&spec).unwrap().rpc_url, "http://override", "override");

        let err = config.select(&ChainSpec::new(ChainId::new(1))).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<Error>(),
                Some(Error::UnsupportedChain(id)) if id.value() == 1
            ),
            "got {err:?}"
        );
    }
}
