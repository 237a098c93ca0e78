//! Static table of networks the protocol is deployed on.
//!
//! Supplies a display name and a default public RPC endpoint for chains
//! whose configuration entry omits them. Scan start blocks are never
//! defaulted; they always come from configuration.

use ccip_cache::ChainId;

/// Operational metadata for a known network.
#[derive(Debug, Clone, Copy)]
pub struct KnownChain {
    /// EIP-155 chain ID.
    pub chain_id: ChainId,
    /// Short human-readable name.
    pub name: &'static str,
    /// Suggested public RPC endpoint.
    pub default_rpc: &'static str,
    /// Whether this is a testnet.
    pub is_testnet: bool,
}

const fn chain(
    id: u64,
    name: &'static str,
    default_rpc: &'static str,
    is_testnet: bool,
) -> KnownChain {
    KnownChain {
        chain_id: ChainId::new(id),
        name,
        default_rpc,
        is_testnet,
    }
}

/// All known networks.
pub const ALL: &[KnownChain] = &[
    // Mainnets
    chain(1, "ethereum", "https://ethereum-rpc.publicnode.com", false),
    chain(10, "optimism", "https://mainnet.optimism.io", false),
    chain(56, "bsc", "https://bsc-rpc.publicnode.com", false),
    chain(100, "gnosis", "https://rpc.gnosischain.com", false),
    chain(137, "polygon", "https://polygon-rpc.com", false),
    chain(8453, "base", "https://mainnet.base.org", false),
    chain(42161, "arbitrum", "https://arb1.arbitrum.io/rpc", false),
    chain(43114, "avalanche", "https://api.avax.network/ext/bc/C/rpc", false),
    // Testnets
    chain(80002, "polygon-amoy", "https://rpc-amoy.polygon.technology", true),
    chain(84532, "base-sepolia", "https://sepolia.base.org", true),
    chain(421_614, "arbitrum-sepolia", "https://sepolia-rollup.arbitrum.io/rpc", true),
    chain(11_155_111, "sepolia", "https://ethereum-sepolia-rpc.publicnode.com", true),
    chain(11_155_420, "optimism-sepolia", "https://sepolia.optimism.io", true),
];

/// Look up a [`KnownChain`] by chain ID.
#[must_use]
pub fn by_chain_id(chain_id: ChainId) -> Option<&'static KnownChain> {
    ALL.iter().find(|c| c.chain_id == chain_id)
}
