//! Protocol-wide monetary constants.
//!
//! All monetary values are in grains (1 LODE = 10^8 grains).

/// Number of grains in one LODE.
pub const COIN: u64 = 100_000_000;

/// Maximum amount of money that can ever exist, in grains.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;
