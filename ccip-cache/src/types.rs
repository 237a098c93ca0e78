//! Normalized value and identifier types.
//!
//! Every wrapper is built through a constructor that validates and
//! normalizes its input (lower-case `0x` hex for addresses, hashes and
//! selectors; UTC for dates). None of them exposes a way to smuggle in an
//! unnormalized string.

use std::fmt;
use std::str::FromStr;

use alloy::hex;
use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// EIP-155 chain ID used for RPC routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(u64);

impl ChainId {
    /// Wrap a raw chain ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw chain ID.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChainId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| Error::invalid("chain id", s))
    }
}

/// Block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockNumber(u64);

impl BlockNumber {
    /// Wrap a raw block height.
    #[must_use]
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    /// The raw block height.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

macro_rules! address_type {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Address);

        impl $name {
            /// Parse a hex address in any letter case.
            ///
            /// # Errors
            ///
            /// Returns [`Error::InvalidValue`] if `s` is not a 20-byte hex string.
            pub fn parse(s: &str) -> Result<Self> {
                Address::from_str(s.trim())
                    .map(Self)
                    .map_err(|_| Error::invalid($kind, s))
            }

            /// Recover an address from a 32-byte left-padded log topic.
            #[must_use]
            pub fn from_topic(topic: B256) -> Self {
                Self(Address::from_word(topic))
            }

            /// The underlying address.
            #[must_use]
            pub const fn address(self) -> Address {
                self.0
            }
        }

        impl From<Address> for $name {
            fn from(address: Address) -> Self {
                Self(address)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(s: String) -> Result<Self> {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_string()
            }
        }
    };
}

address_type!(
    /// Externally-owned or smart-wallet address.
    WalletAddress,
    "wallet address"
);

address_type!(
    /// Deployed contract address.
    ContractAddress,
    "contract address"
);

impl From<WalletAddress> for ContractAddress {
    fn from(wallet: WalletAddress) -> Self {
        Self(wallet.0)
    }
}

/// Transaction hash, rendered as lower-case `0x` hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TxHash(B256);

impl TxHash {
    /// Parse a 32-byte hex hash, with or without the `0x` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if `s` is not 32 bytes of hex.
    pub fn parse(s: &str) -> Result<Self> {
        B256::from_str(s.trim())
            .map(Self)
            .map_err(|_| Error::invalid("transaction hash", s))
    }

    /// The underlying hash.
    #[must_use]
    pub const fn hash(self) -> B256 {
        self.0
    }
}

impl From<B256> for TxHash {
    fn from(hash: B256) -> Self {
        Self(hash)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for TxHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TxHash {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<TxHash> for String {
    fn from(value: TxHash) -> Self {
        value.to_string()
    }
}

/// Leading bytes of calldata identifying the called function.
///
/// Calldata shorter than four bytes yields a shorter selector (empty input
/// renders as `0x`); no padding is ever added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FunctionSelector {
    bytes: [u8; 4],
    len: u8,
}

impl FunctionSelector {
    /// A full four-byte selector.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self { bytes, len: 4 }
    }

    /// Take the selector from the first (up to) four bytes of `calldata`.
    #[must_use]
    pub fn from_calldata(calldata: &[u8]) -> Self {
        let mut bytes = [0u8; 4];
        let mut len = 0;
        for (slot, byte) in bytes.iter_mut().zip(calldata) {
            *slot = *byte;
            len += 1;
        }
        Self { bytes, len }
    }

    /// Parse `0x`-prefixed (or bare) hex of at most four bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] on non-hex input or more than four bytes.
    pub fn parse(s: &str) -> Result<Self> {
        let decoded = hex::decode(s.trim()).map_err(|_| Error::invalid("function selector", s))?;
        if decoded.len() > 4 {
            return Err(Error::invalid("function selector", s));
        }
        Ok(Self::from_calldata(&decoded))
    }

    /// The selector bytes (up to four).
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.bytes
            .get(..usize::from(self.len))
            .unwrap_or(&self.bytes)
    }
}

impl fmt::Display for FunctionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.as_slice()))
    }
}

impl FromStr for FunctionSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FunctionSelector {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<FunctionSelector> for String {
    fn from(value: FunctionSelector) -> Self {
        value.to_string()
    }
}

/// Native or token amount in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Balance(U256);

impl Balance {
    /// Zero amount.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Wrap a raw amount.
    #[must_use]
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// The raw amount.
    #[must_use]
    pub const fn value(self) -> U256 {
        self.0
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Balance {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        U256::from_str_radix(s.trim(), 10)
            .map(Self)
            .map_err(|_| Error::invalid("balance", s))
    }
}

/// Protocol-level identifier of a destination chain.
///
/// Distinct from [`ChainId`]: selectors name chains inside cross-chain
/// messages and are never used for RPC routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainSelector(U256);

impl ChainSelector {
    /// Wrap a raw selector.
    #[must_use]
    pub const fn new(value: U256) -> Self {
        Self(value)
    }

    /// The raw selector.
    #[must_use]
    pub const fn value(self) -> U256 {
        self.0
    }
}

impl fmt::Display for ChainSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ChainSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        U256::from_str_radix(s.trim(), 10)
            .map(Self)
            .map_err(|_| Error::invalid("chain selector", s))
    }
}

/// Instant in UTC, rendered as RFC 3339 with a `Z` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(DateTime<Utc>);

impl UtcDateTime {
    /// Convert a block timestamp (seconds since the Unix epoch).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if the timestamp is out of range.
    pub fn from_epoch_seconds(seconds: u64) -> Result<Self> {
        i64::try_from(seconds)
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .map(Self)
            .ok_or_else(|| Error::invalid("epoch seconds", seconds.to_string()))
    }

    /// Parse an RFC 3339 timestamp in any offset, normalizing to UTC.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidValue`] if `s` is not RFC 3339.
    pub fn parse(s: &str) -> Result<Self> {
        DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|_| Error::invalid("date time", s))
    }

    /// The underlying instant.
    #[must_use]
    pub const fn instant(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for UtcDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}
