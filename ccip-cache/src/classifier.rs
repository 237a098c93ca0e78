//! Calldata classification.
//!
//! A transaction is classified by peeling at most [`MAX_UNWRAP_DEPTH`]
//! call layers:
//!
//! 1. an optional smart-account relay (`execTransaction`), whose `data`
//!    argument becomes the calldata of the next layer;
//! 2. the protocol's `execute` call, whose inner `data` is checked for an
//!    ERC-20 `transfer`.
//!
//! Anything else, including a relay inside a relay, is [`TxInfo::Basic`].
//! Selectors are matched on raw bytes; they are protocol constants.

use std::collections::BTreeSet;

use alloy::primitives::{Bytes, hex};
use alloy::sol_types::SolCall;

use crate::error::{Error, Result};
use crate::tx_info::{
    BasicInfo, CrossChain, Erc20TransferInfo, NativeTransferInfo, TxHeader, TxInfo,
    WalletCreateInfo,
};
use crate::types::{
    Balance, BlockNumber, ChainId, ChainSelector, ContractAddress, FunctionSelector, TxHash,
    UtcDateTime, WalletAddress,
};

/// Smart-account relay wrapper (`execTransaction`).
pub const RELAY_SELECTOR: [u8; 4] = hex!("6a761202");

/// Protocol execute wrapper.
pub const EXECUTE_SELECTOR: [u8; 4] = hex!("e6114eb4");

/// ERC-20 `transfer(address,uint256)`.
pub const TRANSFER_SELECTOR: [u8; 4] = hex!("a9059cbb");

/// Maximum number of call layers unwrapped before giving up.
pub const MAX_UNWRAP_DEPTH: usize = 2;

pub(crate) mod calls {
    #![allow(missing_docs, unreachable_pub)]

    alloy::sol! {
        function execTransaction(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes signatures
        ) external payable returns (bool success);

        function execute(
            uint256[] chainSelectors,
            string salt,
            address destination,
            uint256 value,
            bytes data,
            uint256 gasLimit,
            bytes32 extraData
        ) external payable;

        function transfer(address to, uint256 amount) external returns (bool);
    }
}

use calls::{execTransactionCall, executeCall, transferCall};

/// Facts about a transaction that do not come from its calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxContext {
    /// Chain the transaction was fetched from.
    pub chain_id: ChainId,
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Containing block.
    pub block_number: BlockNumber,
    /// Transaction sender.
    pub from: WalletAddress,
    /// Native value attached to the transaction.
    pub value: Balance,
    /// Timestamp of the containing block.
    pub date: UtcDateTime,
}

impl TxContext {
    fn header(&self, selector: FunctionSelector) -> TxHeader {
        TxHeader {
            chain_id: self.chain_id,
            tx_hash: self.tx_hash,
            selector,
            block_number: self.block_number,
            controller_wallet: self.from,
            tx_date: self.date,
        }
    }
}

/// Classify a transaction from its calldata.
///
/// The recorded selector is always that of the outermost calldata.
///
/// # Errors
///
/// Returns [`Error::AbiDecodeFailed`] if a known selector matches but its
/// arguments cannot be decoded. The error concerns this transaction only.
pub fn classify(ctx: &TxContext, calldata: &[u8]) -> Result<TxInfo> {
    let header = ctx.header(FunctionSelector::from_calldata(calldata));

    let Some(execute) = unwrap_execute(calldata)? else {
        return Ok(TxInfo::Basic(BasicInfo {
            header,
            tx_value: ctx.value,
        }));
    };

    let tx_value = Balance::new(execute.value);
    let cross_chain = CrossChain {
        dest_chains: execute
            .chainSelectors
            .iter()
            .copied()
            .map(ChainSelector::new)
            .collect::<BTreeSet<_>>(),
        salt: execute.salt,
    };

    if let Some(args) = execute.data.strip_prefix(&TRANSFER_SELECTOR) {
        let transfer = decode::<transferCall>(TRANSFER_SELECTOR, args)?;
        return Ok(TxInfo::Erc20Transfer(Erc20TransferInfo {
            header,
            tx_value,
            cross_chain,
            token_address: ContractAddress::from(execute.destination),
            token_receiver: WalletAddress::from(transfer.to),
            token_amount: Balance::new(transfer.amount),
        }));
    }

    if tx_value.is_zero() {
        Ok(TxInfo::WalletCreate(WalletCreateInfo {
            header,
            cross_chain,
        }))
    } else {
        Ok(TxInfo::NativeTransfer(NativeTransferInfo {
            header,
            tx_value,
            cross_chain,
        }))
    }
}

/// Peel call layers until the execute call is found.
///
/// Only the outermost layer may be a relay; anything unrecognized, or a
/// relay below the first layer, yields `None`.
fn unwrap_execute(calldata: &[u8]) -> Result<Option<executeCall>> {
    let mut payload = Bytes::copy_from_slice(calldata);

    for depth in 0..MAX_UNWRAP_DEPTH {
        let Some((selector, args)) = payload.split_first_chunk::<4>() else {
            return Ok(None);
        };
        match *selector {
            EXECUTE_SELECTOR => return decode::<executeCall>(EXECUTE_SELECTOR, args).map(Some),
            RELAY_SELECTOR if depth == 0 => {
                payload = decode::<execTransactionCall>(RELAY_SELECTOR, args)?.data;
            }
            _ => return Ok(None),
        }
    }

    Ok(None)
}

fn decode<C: SolCall>(selector: [u8; 4], args: &[u8]) -> Result<C> {
    C::abi_decode_raw(args).map_err(|source| Error::AbiDecodeFailed {
        selector: FunctionSelector::from_bytes(selector),
        source,
    })
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, B256, U256};

    use super::*;

    fn ctx(value: u64) -> TxContext {
        TxContext {
            chain_id: ChainId::new(137),
            tx_hash: TxHash::parse(&"ab".repeat(32)).unwrap(),
            block_number: BlockNumber::new(1_000),
            from: WalletAddress::from(Address::repeat_byte(0x01)),
            value: Balance::new(U256::from(value)),
            date: UtcDateTime::from_epoch_seconds(1_700_000_000).unwrap(),
        }
    }

    fn encode<C: SolCall>(selector: [u8; 4], call: &C) -> Vec<u8> {
        let mut out = selector.to_vec();
        call.abi_encode_raw(&mut out);
        out
    }

    fn execute(value: u64, data: Vec<u8>, selectors: &[u64]) -> Vec<u8> {
        encode(
            EXECUTE_SELECTOR,
            &executeCall {
                chainSelectors: selectors.iter().map(|s| U256::from(*s)).collect(),
                salt: "my-salt".to_owned(),
                destination: Address::repeat_byte(0x70),
                value: U256::from(value),
                data: data.into(),
                gasLimit: U256::from(200_000u64),
                extraData: B256::ZERO,
            },
        )
    }

    fn relay(inner: Vec<u8>) -> Vec<u8> {
        encode(
            RELAY_SELECTOR,
            &execTransactionCall {
                to: Address::repeat_byte(0x50),
                value: U256::ZERO,
                data: inner.into(),
                operation: 0,
                safeTxGas: U256::ZERO,
                baseGas: U256::ZERO,
                gasPrice: U256::ZERO,
                gasToken: Address::ZERO,
                refundReceiver: Address::ZERO,
                signatures: vec![0xde, 0xad].into(),
            },
        )
    }

    fn transfer(to: Address, amount: u64) -> Vec<u8> {
        encode(
            TRANSFER_SELECTOR,
            &transferCall {
                to,
                amount: U256::from(amount),
            },
        )
    }

    /// Selector reported by a decode failure.
    fn failed_selector(err: &Error) -> Option<String> {
        match err {
            Error::AbiDecodeFailed { selector, .. } => Some(selector.to_string()),
            _ => None,
        }
    }

    #[test]
    fn selectors_match_their_signatures() {
        assert_eq!(transferCall::SELECTOR, TRANSFER_SELECTOR, "transfer selector");
        assert_eq!(execTransactionCall::SELECTOR, RELAY_SELECTOR, "relay selector");
        assert_eq!(hex::encode(EXECUTE_SELECTOR), "e6114eb4", "deployed execute selector");
        assert_ne!(
            executeCall::SELECTOR,
            EXECUTE_SELECTOR,
            "execute is matched on the deployed selector, not the local signature"
        );
    }

    #[test]
    fn execute_wrapping_transfer_is_erc20_transfer() {
        let receiver = Address::repeat_byte(0x99);
        let calldata = execute(3, transfer(receiver, 5_000), &[7, 7, 9]);

        let TxInfo::Erc20Transfer(info) = classify(&ctx(0), &calldata).unwrap() else {
            panic!("expected an ERC-20 transfer");
        };
        assert_eq!(
            info.token_address,
            ContractAddress::from(Address::repeat_byte(0x70)),
            "token is the execute destination"
        );
        assert_eq!(info.token_receiver, WalletAddress::from(receiver), "receiver");
        assert_eq!(info.token_amount, Balance::new(U256::from(5_000u64)), "amount");
        assert_eq!(info.tx_value, Balance::new(U256::from(3u64)), "value of execute call");
        assert_eq!(info.cross_chain.dest_chains.len(), 2, "selectors deduplicated");
        assert_eq!(info.cross_chain.salt, "my-salt", "salt");
        assert_eq!(info.header.selector.to_string(), "0xe6114eb4", "outer selector");
    }

    #[test]
    fn relayed_zero_value_execute_is_wallet_create() {
        let calldata = relay(execute(0, vec![0x12, 0x34, 0x56, 0x78], &[1]));

        let info = classify(&ctx(0), &calldata).unwrap();
        assert!(matches!(info, TxInfo::WalletCreate(_)), "got {info:?}");
        assert_eq!(
            info.header().selector.to_string(),
            "0x6a761202",
            "selector of the outermost call is recorded"
        );
    }

    #[test]
    fn execute_with_value_is_native_transfer() {
        let info = classify(&ctx(0), &execute(10, Vec::new(), &[4])).unwrap();
        let TxInfo::NativeTransfer(native) = info else {
            panic!("expected a native transfer");
        };
        assert_eq!(native.tx_value, Balance::new(U256::from(10u64)), "execute value");
    }

    #[test]
    fn unknown_selector_is_basic_with_transaction_value() {
        let info = classify(&ctx(77), &[0xde, 0xad, 0xbe, 0xef, 0x00]).unwrap();
        let TxInfo::Basic(basic) = info else {
            panic!("expected basic info");
        };
        assert_eq!(basic.tx_value, Balance::new(U256::from(77u64)), "raw tx value");
        assert_eq!(basic.header.selector.to_string(), "0xdeadbeef", "raw selector");
    }

    #[test]
    fn empty_calldata_is_basic() {
        let info = classify(&ctx(1), &[]).unwrap();
        assert_eq!(info.header().selector.to_string(), "0x", "no selector bytes");
        assert!(matches!(info, TxInfo::Basic(_)), "plain value transfer");
    }

    #[test]
    fn relay_of_non_execute_is_basic() {
        let info = classify(&ctx(5), &relay(transfer(Address::ZERO, 1))).unwrap();
        assert!(matches!(info, TxInfo::Basic(_)), "got {info:?}");
    }

    #[test]
    fn relay_inside_relay_is_not_unwrapped() {
        let calldata = relay(relay(execute(0, Vec::new(), &[1])));
        let info = classify(&ctx(0), &calldata).unwrap();
        assert!(matches!(info, TxInfo::Basic(_)), "third level is unrecognized");
    }

    #[test]
    fn truncated_execute_fails_to_decode() {
        let err = classify(&ctx(0), &[0xe6, 0x11, 0x4e, 0xb4, 0x00, 0x01]).unwrap_err();
        assert_eq!(failed_selector(&err).as_deref(), Some("0xe6114eb4"), "got {err:?}");
    }

    #[test]
    fn truncated_transfer_inside_execute_fails_to_decode() {
        let calldata = execute(0, vec![0xa9, 0x05, 0x9c, 0xbb, 0x01], &[1]);
        let err = classify(&ctx(0), &calldata).unwrap_err();
        assert_eq!(failed_selector(&err).as_deref(), Some("0xa9059cbb"), "got {err:?}");
    }

    #[test]
    fn truncated_relay_fails_to_decode() {
        let mut calldata = relay(execute(0, Vec::new(), &[1]));
        calldata.truncate(4 + 32 * 3);
        let err = classify(&ctx(0), &calldata).unwrap_err();
        assert_eq!(failed_selector(&err).as_deref(), Some("0x6a761202"), "got {err:?}");
    }

    #[test]
    fn relay_with_out_of_range_offset_fails_to_decode() {
        let mut calldata = relay(execute(0, Vec::new(), &[1]));
        // Third head word is the offset of `data`.
        let offset = 4 + 32 * 2;
        calldata.get_mut(offset..offset + 32).unwrap().fill(0xff);
        let err = classify(&ctx(0), &calldata).unwrap_err();
        assert_eq!(failed_selector(&err).as_deref(), Some("0x6a761202"), "got {err:?}");
    }

    #[test]
    fn relay_selector_alone_fails_to_decode() {
        let err = classify(&ctx(0), &RELAY_SELECTOR).unwrap_err();
        assert_eq!(failed_selector(&err).as_deref(), Some("0x6a761202"), "got {err:?}");
    }

    #[test]
    fn relayed_truncated_execute_reports_execute_selector() {
        let calldata = relay(vec![0xe6, 0x11, 0x4e, 0xb4, 0xff]);
        let err = classify(&ctx(0), &calldata).unwrap_err();
        assert_eq!(failed_selector(&err).as_deref(), Some("0xe6114eb4"), "got {err:?}");
    }
}
