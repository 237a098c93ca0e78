//! Classified transactions.
//!
//! [`TxInfo`] is a closed sum type; [`TxInfoRecord`] is its flat form used
//! for storage rows and JSON output. Conversions between the two match
//! exhaustively so a new variant cannot be forgotten by either side.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{
    Balance, BlockNumber, ChainId, ChainSelector, ContractAddress, FunctionSelector, TxHash,
    UtcDateTime, WalletAddress,
};

/// Fields every classification carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHeader {
    /// Chain the transaction was mined on.
    pub chain_id: ChainId,
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Selector of the outermost calldata.
    pub selector: FunctionSelector,
    /// Block containing the transaction.
    pub block_number: BlockNumber,
    /// Transaction sender.
    pub controller_wallet: WalletAddress,
    /// Timestamp of the containing block.
    pub tx_date: UtcDateTime,
}

/// Cross-chain intent decoded from the protocol's execute call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossChain {
    /// Destination chain selectors, deduplicated.
    pub dest_chains: BTreeSet<ChainSelector>,
    /// Wallet salt.
    pub salt: String,
}

/// A transaction that does not go through the protocol's execute call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicInfo {
    /// Common fields.
    pub header: TxHeader,
    /// Native value attached to the transaction itself.
    pub tx_value: Balance,
}

/// An execute call with zero value and no token transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletCreateInfo {
    /// Common fields.
    pub header: TxHeader,
    /// Decoded cross-chain intent.
    pub cross_chain: CrossChain,
}

/// An execute call wrapping an ERC-20 `transfer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Erc20TransferInfo {
    /// Common fields.
    pub header: TxHeader,
    /// Value of the execute call.
    pub tx_value: Balance,
    /// Decoded cross-chain intent.
    pub cross_chain: CrossChain,
    /// Token contract (the execute call's destination).
    pub token_address: ContractAddress,
    /// Recipient of the transfer.
    pub token_receiver: WalletAddress,
    /// Transferred amount.
    pub token_amount: Balance,
}

/// An execute call moving a non-zero native value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeTransferInfo {
    /// Common fields.
    pub header: TxHeader,
    /// Value of the execute call.
    pub tx_value: Balance,
    /// Decoded cross-chain intent.
    pub cross_chain: CrossChain,
}

/// Write-once classification of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxInfo {
    /// See [`BasicInfo`].
    Basic(BasicInfo),
    /// See [`WalletCreateInfo`].
    WalletCreate(WalletCreateInfo),
    /// See [`Erc20TransferInfo`].
    Erc20Transfer(Erc20TransferInfo),
    /// See [`NativeTransferInfo`].
    NativeTransfer(NativeTransferInfo),
}

impl TxInfo {
    /// Common fields of any variant.
    #[must_use]
    pub const fn header(&self) -> &TxHeader {
        match self {
            Self::Basic(i) => &i.header,
            Self::WalletCreate(i) => &i.header,
            Self::Erc20Transfer(i) => &i.header,
            Self::NativeTransfer(i) => &i.header,
        }
    }

    /// Discriminant of this classification.
    #[must_use]
    pub const fn kind(&self) -> TxKind {
        match self {
            Self::Basic(_) => TxKind::Other,
            Self::WalletCreate(_) => TxKind::WalletCreate,
            Self::Erc20Transfer(_) => TxKind::Erc20Transfer,
            Self::NativeTransfer(_) => TxKind::NativeTransfer,
        }
    }

    /// Transaction value. Always zero for wallet creation.
    #[must_use]
    pub const fn tx_value(&self) -> Balance {
        match self {
            Self::Basic(i) => i.tx_value,
            Self::WalletCreate(_) => Balance::ZERO,
            Self::Erc20Transfer(i) => i.tx_value,
            Self::NativeTransfer(i) => i.tx_value,
        }
    }

    /// Cross-chain intent, absent for [`TxInfo::Basic`].
    #[must_use]
    pub const fn cross_chain(&self) -> Option<&CrossChain> {
        match self {
            Self::Basic(_) => None,
            Self::WalletCreate(i) => Some(&i.cross_chain),
            Self::Erc20Transfer(i) => Some(&i.cross_chain),
            Self::NativeTransfer(i) => Some(&i.cross_chain),
        }
    }
}

/// Stored discriminant of a [`TxInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    /// [`TxInfo::Basic`].
    Other,
    /// [`TxInfo::WalletCreate`].
    WalletCreate,
    /// [`TxInfo::Erc20Transfer`].
    Erc20Transfer,
    /// [`TxInfo::NativeTransfer`].
    NativeTransfer,
}

impl TxKind {
    /// Stable storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Other => "OTHER",
            Self::WalletCreate => "WALLET_CREATE",
            Self::Erc20Transfer => "ERC20_TRANSFER",
            Self::NativeTransfer => "NATIVE_TRANSFER",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OTHER" => Ok(Self::Other),
            "WALLET_CREATE" => Ok(Self::WalletCreate),
            "ERC20_TRANSFER" => Ok(Self::Erc20Transfer),
            "NATIVE_TRANSFER" => Ok(Self::NativeTransfer),
            _ => Err(Error::invalid("tx kind", s)),
        }
    }
}

/// Flat row form of a [`TxInfo`].
///
/// Amounts and chain selectors are decimal strings; the date is RFC 3339 UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfoRecord {
    /// Variant tag.
    pub tx_type: TxKind,
    /// Chain ID.
    pub chain_id: ChainId,
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Outermost function selector.
    pub fn_selector: FunctionSelector,
    /// Containing block.
    pub block_number: BlockNumber,
    /// Transaction sender.
    pub controller_wallet: WalletAddress,
    /// Block timestamp.
    pub tx_date: String,
    /// Transaction value.
    pub tx_value: String,
    /// Destination chain selectors.
    pub dest_chains: Option<Vec<String>>,
    /// Wallet salt.
    pub salt: Option<String>,
    /// ERC-20 token contract.
    pub token_address: Option<ContractAddress>,
    /// ERC-20 recipient.
    pub token_receiver: Option<WalletAddress>,
    /// ERC-20 amount.
    pub token_amount: Option<String>,
}

impl From<&TxInfo> for TxInfoRecord {
    fn from(info: &TxInfo) -> Self {
        let header = info.header();
        let mut record = Self {
            tx_type: info.kind(),
            chain_id: header.chain_id,
            tx_hash: header.tx_hash,
            fn_selector: header.selector,
            block_number: header.block_number,
            controller_wallet: header.controller_wallet,
            tx_date: header.tx_date.to_string(),
            tx_value: info.tx_value().to_string(),
            dest_chains: None,
            salt: None,
            token_address: None,
            token_receiver: None,
            token_amount: None,
        };
        if let Some(cc) = info.cross_chain() {
            record.dest_chains = Some(cc.dest_chains.iter().map(ToString::to_string).collect());
            record.salt = Some(cc.salt.clone());
        }
        if let TxInfo::Erc20Transfer(t) = info {
            record.token_address = Some(t.token_address);
            record.token_receiver = Some(t.token_receiver);
            record.token_amount = Some(t.token_amount.to_string());
        }
        record
    }
}

fn required<T>(field: Option<T>, name: &'static str) -> Result<T> {
    field.ok_or_else(|| Error::invalid("tx info record", format!("missing {name}")))
}

impl TryFrom<TxInfoRecord> for TxInfo {
    type Error = Error;

    fn try_from(record: TxInfoRecord) -> Result<Self> {
        let header = TxHeader {
            chain_id: record.chain_id,
            tx_hash: record.tx_hash,
            selector: record.fn_selector,
            block_number: record.block_number,
            controller_wallet: record.controller_wallet,
            tx_date: UtcDateTime::parse(&record.tx_date)?,
        };
        let tx_value: Balance = record.tx_value.parse()?;

        let cross_chain = || -> Result<CrossChain> {
            let dest_chains = required(record.dest_chains.as_ref(), "dest_chains")?
                .iter()
                .map(|s| s.parse())
                .collect::<Result<BTreeSet<ChainSelector>>>()?;
            Ok(CrossChain {
                dest_chains,
                salt: required(record.salt.clone(), "salt")?,
            })
        };

        Ok(match record.tx_type {
            TxKind::Other => Self::Basic(BasicInfo { header, tx_value }),
            TxKind::WalletCreate => Self::WalletCreate(WalletCreateInfo {
                header,
                cross_chain: cross_chain()?,
            }),
            TxKind::Erc20Transfer => Self::Erc20Transfer(Erc20TransferInfo {
                cross_chain: cross_chain()?,
                header,
                tx_value,
                token_address: required(record.token_address, "token_address")?,
                token_receiver: required(record.token_receiver, "token_receiver")?,
                token_amount: required(record.token_amount.as_deref(), "token_amount")?
                    .parse()?,
            }),
            TxKind::NativeTransfer => Self::NativeTransfer(NativeTransferInfo {
                header,
                tx_value,
                cross_chain: cross_chain()?,
            }),
        })
    }
}
