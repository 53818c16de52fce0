//! Immutable network parameters.
//!
//! Parameters are selected at construction time and passed by reference into
//! every component that needs them. Nothing here is mutated at runtime.

use crate::types::{BlockHeader, Hash256};

/// The networks a Lode node can operate on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    /// The production network.
    Mainnet,
    /// The public test network.
    Testnet,
    /// The private simulation network used by tests.
    Simnet,
}

/// Immutable parameters describing one network.
#[derive(Clone, Debug)]
pub struct Params {
    /// Which network these parameters describe.
    pub network: Network,
    /// The genesis block header. Height 0 is implicit everywhere: header
    /// files never store it and stores answer height-0 queries from here.
    pub genesis_header: BlockHeader,
    /// The regular compact-filter header of the genesis block.
    pub genesis_filter_header: Hash256,
}

impl Params {
    /// Parameters for the given network.
    pub fn new(network: Network) -> Self {
        match network {
            Network::Mainnet => Self {
                network,
                genesis_header: BlockHeader {
                    version: 1,
                    prev_block: Hash256::ZERO,
                    merkle_root: Hash256([
                        0x5f, 0x8f, 0x4a, 0xb1, 0x72, 0x09, 0xc1, 0xf2, 0x44, 0xe1, 0x22, 0x33,
                        0x9b, 0x1c, 0xd8, 0xa7, 0x6e, 0x03, 0x55, 0xc1, 0x8a, 0xde, 0x41, 0x69,
                        0xab, 0x5d, 0x27, 0xc4, 0x61, 0x10, 0x38, 0x91,
                    ]),
                    timestamp: 1_496_275_200,
                    bits: 0x1e0f_ffff,
                    nonce: 3_715_206,
                },
                genesis_filter_header: Hash256([
                    0x21, 0x58, 0x4e, 0x06, 0x9f, 0x3f, 0x8a, 0x9a, 0x50, 0x67, 0xcd, 0x1a,
                    0x2f, 0x66, 0x6b, 0x43, 0x8b, 0x90, 0x20, 0x89, 0x04, 0x74, 0xdc, 0xae,
                    0xb7, 0x32, 0xf0, 0x91, 0x63, 0xa1, 0x4d, 0x7c,
                ]),
            },
            Network::Testnet => Self {
                network,
                genesis_header: BlockHeader {
                    version: 1,
                    prev_block: Hash256::ZERO,
                    merkle_root: Hash256([
                        0x5f, 0x8f, 0x4a, 0xb1, 0x72, 0x09, 0xc1, 0xf2, 0x44, 0xe1, 0x22, 0x33,
                        0x9b, 0x1c, 0xd8, 0xa7, 0x6e, 0x03, 0x55, 0xc1, 0x8a, 0xde, 0x41, 0x69,
                        0xab, 0x5d, 0x27, 0xc4, 0x61, 0x10, 0x38, 0x91,
                    ]),
                    timestamp: 1_496_275_201,
                    bits: 0x1e0f_ffff,
                    nonce: 414_098,
                },
                genesis_filter_header: Hash256([
                    0x6b, 0x0c, 0x9a, 0x84, 0xe1, 0x05, 0x5c, 0xc1, 0x2c, 0xc7, 0x1f, 0xf0,
                    0x3e, 0xd9, 0x7f, 0x62, 0x83, 0x70, 0x47, 0x5e, 0xbc, 0xd8, 0x39, 0x91,
                    0x1d, 0x5a, 0x43, 0x80, 0xf1, 0x27, 0x4a, 0x02,
                ]),
            },
            Network::Simnet => Self {
                network,
                genesis_header: BlockHeader {
                    version: 1,
                    prev_block: Hash256::ZERO,
                    merkle_root: Hash256([
                        0x5f, 0x8f, 0x4a, 0xb1, 0x72, 0x09, 0xc1, 0xf2, 0x44, 0xe1, 0x22, 0x33,
                        0x9b, 0x1c, 0xd8, 0xa7, 0x6e, 0x03, 0x55, 0xc1, 0x8a, 0xde, 0x41, 0x69,
                        0xab, 0x5d, 0x27, 0xc4, 0x61, 0x10, 0x38, 0x91,
                    ]),
                    timestamp: 1_401_292_357,
                    bits: 0x207f_ffff,
                    nonce: 2,
                },
                genesis_filter_header: Hash256([
                    0x91, 0x5c, 0x88, 0x7a, 0x2d, 0x9e, 0xc3, 0xce, 0xa6, 0x8e, 0x64, 0x92,
                    0x2d, 0x7a, 0x8c, 0xb3, 0x0e, 0x2b, 0x23, 0xc1, 0xc6, 0x1e, 0x0a, 0x4f,
                    0x72, 0x99, 0xd1, 0x54, 0xa6, 0x79, 0x1b, 0x35,
                ]),
            },
        }
    }

    /// The hash of this network's genesis block header.
    pub fn genesis_hash(&self) -> Hash256 {
        self.genesis_header.block_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_have_distinct_genesis_hashes() {
        let mainnet = Params::new(Network::Mainnet).genesis_hash();
        let testnet = Params::new(Network::Testnet).genesis_hash();
        let simnet = Params::new(Network::Simnet).genesis_hash();
        assert_ne!(mainnet, testnet);
        assert_ne!(mainnet, simnet);
        assert_ne!(testnet, simnet);
    }

    #[test]
    fn genesis_prev_block_is_zero() {
        for network in [Network::Mainnet, Network::Testnet, Network::Simnet] {
            assert!(Params::new(network).genesis_header.prev_block.is_zero());
        }
    }
}
