//! Confirmation-tracking fee estimator.
//!
//! The estimator watches transactions enter the mempool, then records how
//! many blocks each one waited before being mined. Mined transactions land
//! in one of 25 bins keyed by that confirmation distance; the estimate for a
//! target of N blocks is the median fee rate of the cumulative bin range
//! covering distances 1..=N over all rates sorted high to low.
//!
//! Bins are bounded: once full, a uniformly random resident outside the
//! slots claimed by the current block is replaced, and the victim is pushed
//! onto a bounded rollback stack so a reorg can restore it.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

use lode_core::codec::{ByteReader, ByteWriter};
use lode_core::Hash256;

use crate::error::FeeEstimatorError;

/// The maximum confirmation distance tracked, in blocks.
pub const ESTIMATE_FEE_DEPTH: usize = 25;

/// Default capacity of each confirmation bin.
pub const DEFAULT_BIN_SIZE: i32 = 100;

/// Default cap on replacements per bin made by a single block.
pub const DEFAULT_MAX_REPLACEMENTS: i32 = 10;

/// Default number of registered blocks that can be rolled back.
pub const DEFAULT_MAX_ROLLBACK: u32 = 2;

/// Default number of blocks that must be registered before estimates are
/// returned.
pub const DEFAULT_MIN_REGISTERED_BLOCKS: u32 = 3;

/// Height marker for a transaction not yet seen in a block.
pub const UNMINED_HEIGHT: i32 = i32::MAX;

/// Key under which the saved estimator state is stored in the node database.
pub const FEE_DATABASE_KEY: &[u8] = b"estimatefee";

/// Version prefix of the saved state blob.
const SAVE_VERSION: u32 = 1;

const BYTES_PER_KB: f64 = 1000.0;
const LODE_PER_GRAIN: f64 = 1e-8;

/// A fee rate in grains per byte.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct FeePerByte(pub f64);

impl FeePerByte {
    /// Rate from an absolute fee and a transaction size.
    pub fn new(fee: u64, size: u32) -> Self {
        Self(fee as f64 / size as f64)
    }

    /// The fee this rate implies for a transaction of `size` bytes.
    pub fn fee(self, size: u32) -> f64 {
        self.0 * size as f64
    }

    /// Convert to whole-coin units per kilobyte.
    pub fn to_per_kilobyte(self) -> FeePerKilobyte {
        FeePerKilobyte(self.0 * BYTES_PER_KB * LODE_PER_GRAIN)
    }
}

/// A fee rate in LODE per kilobyte.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct FeePerKilobyte(pub f64);

/// A mempool transaction as reported to the estimator.
#[derive(Clone, Copy, Debug)]
pub struct TxObservation {
    /// Transaction hash.
    pub hash: Hash256,
    /// Absolute fee in grains.
    pub fee: u64,
    /// Serialized size in bytes.
    pub size: u32,
    /// Chain height when the transaction entered the mempool.
    pub height: i32,
}

/// A mined block as reported to the estimator: its hash, height, and the
/// hashes of the transactions it confirmed.
#[derive(Clone, Debug)]
pub struct MinedBlock {
    pub hash: Hash256,
    pub height: i32,
    pub tx_hashes: Vec<Hash256>,
}

/// Tunables for a new estimator.
#[derive(Clone, Copy, Debug)]
pub struct FeeEstimatorConfig {
    /// Depth of the reorg-undo stack.
    pub max_rollback: u32,
    /// Per-depth bin capacity.
    pub bin_size: i32,
    /// Per-block per-bin replacement cap.
    pub max_replacements: i32,
    /// Blocks required before estimates are returned.
    pub min_registered_blocks: u32,
    /// Initial chain height. Until the first block is registered, an
    /// estimator started at [`UNMINED_HEIGHT`] ignores observations.
    pub start_height: i32,
}

impl Default for FeeEstimatorConfig {
    fn default() -> Self {
        Self {
            max_rollback: DEFAULT_MAX_ROLLBACK,
            bin_size: DEFAULT_BIN_SIZE,
            max_replacements: DEFAULT_MAX_REPLACEMENTS,
            min_registered_blocks: DEFAULT_MIN_REGISTERED_BLOCKS,
            start_height: UNMINED_HEIGHT,
        }
    }
}

#[derive(Clone, Debug)]
struct ObservedTx {
    hash: Hash256,
    fee_rate: f64,
    observed: i32,
    mined: i32,
}

#[derive(Clone, Debug)]
struct DroppedBlock {
    hash: Hash256,
    /// Bin residents replaced out by this block's transactions, in drop
    /// order.
    dropped: Vec<Hash256>,
}

#[derive(Debug)]
struct EstimatorState {
    max_rollback: u32,
    bin_size: i32,
    max_replacements: i32,
    min_registered_blocks: u32,
    last_known_height: i32,
    num_blocks_registered: u32,
    observed: HashMap<Hash256, ObservedTx>,
    bins: [Vec<Hash256>; ESTIMATE_FEE_DEPTH],
    /// Cached per-depth estimates, invalidated by every register and
    /// rollback.
    cached: Option<Vec<f64>>,
    /// Stack of recently registered blocks, bounded by `max_rollback`.
    dropped: Vec<DroppedBlock>,
}

/// Tracks observed mempool transactions across mined blocks to estimate the
/// fee rate needed for an N-block confirmation target. Safe for concurrent
/// use.
#[derive(Debug)]
pub struct FeeEstimator {
    state: Mutex<EstimatorState>,
}

impl FeeEstimator {
    /// Create an empty estimator with the given tunables.
    pub fn new(config: FeeEstimatorConfig) -> Self {
        Self {
            state: Mutex::new(EstimatorState {
                max_rollback: config.max_rollback,
                bin_size: config.bin_size,
                max_replacements: config.max_replacements,
                min_registered_blocks: config.min_registered_blocks,
                last_known_height: config.start_height,
                num_blocks_registered: 0,
                observed: HashMap::new(),
                bins: Default::default(),
                cached: None,
                dropped: Vec::new(),
            }),
        }
    }

    /// Record a transaction newly seen in the mempool. A duplicate
    /// observation is a no-op, and observations made before any block is
    /// known are ignored.
    pub fn observe_transaction(&self, tx: &TxObservation) {
        let mut state = self.state.lock();
        if state.last_known_height == UNMINED_HEIGHT {
            return;
        }
        if state.observed.contains_key(&tx.hash) {
            return;
        }
        state.observed.insert(
            tx.hash,
            ObservedTx {
                hash: tx.hash,
                fee_rate: FeePerByte::new(tx.fee, tx.size).0,
                observed: tx.height,
                mined: UNMINED_HEIGHT,
            },
        );
    }

    /// Height of the last registered block.
    pub fn last_known_height(&self) -> i32 {
        self.state.lock().last_known_height
    }

    /// Account for a newly mined block. The block must directly extend the
    /// last known height unless this is the first registration.
    pub fn register_block(&self, block: &MinedBlock) -> Result<(), FeeEstimatorError> {
        let mut state = self.state.lock();
        let state = &mut *state;
        // The previous sorted estimate set is invalid.
        state.cached = None;

        let height = block.height;
        if state.last_known_height != UNMINED_HEIGHT && height != state.last_known_height + 1 {
            return Err(FeeEstimatorError::IntermediateBlockNotRecorded {
                current: state.last_known_height,
                new: height,
            });
        }
        state.last_known_height = height;
        state.num_blocks_registered += 1;

        // Cap how many bin residents a single block may replace per bin.
        let mut replacement_counts = [0i32; ESTIMATE_FEE_DEPTH];
        let mut dropped = DroppedBlock {
            hash: block.hash,
            dropped: Vec::new(),
        };
        let mut rng = rand::thread_rng();

        for tx_hash in &block.tx_hashes {
            let observed = match state.observed.get_mut(tx_hash) {
                Some(o) => o,
                None => continue,
            };
            if observed.mined != UNMINED_HEIGHT {
                return Err(FeeEstimatorError::AlreadyMined(tx_hash.to_string()));
            }
            let blocks_to_confirm = height - observed.observed - 1;
            if !(0..ESTIMATE_FEE_DEPTH as i32).contains(&blocks_to_confirm) {
                continue;
            }
            let depth = blocks_to_confirm as usize;
            if replacement_counts[depth] == state.max_replacements {
                continue;
            }
            observed.mined = height;
            replacement_counts[depth] += 1;

            let bin = &mut state.bins[depth];
            if bin.len() == state.bin_size as usize {
                // Replace a random resident, sparing the tail slots already
                // claimed by this block.
                let live = (state.bin_size - replacement_counts[depth]) as usize;
                let drop_idx = rng.gen_range(0..live);
                dropped.dropped.push(bin[drop_idx]);
                bin[drop_idx] = bin[live - 1];
                bin[live - 1] = *tx_hash;
            } else {
                bin.push(*tx_hash);
            }
        }

        // Forget unmined transactions the window has passed by.
        state
            .observed
            .retain(|_, o| !(o.mined == UNMINED_HEIGHT && height - o.observed >= ESTIMATE_FEE_DEPTH as i32));

        if state.max_rollback == 0 {
            return Ok(());
        }
        if state.dropped.len() == state.max_rollback as usize {
            state.dropped.remove(0);
        }
        state.dropped.push(dropped);
        Ok(())
    }

    /// Estimate the fee rate for confirmation within `num_blocks` blocks.
    pub fn estimate_fee(&self, num_blocks: u32) -> Result<FeePerKilobyte, FeeEstimatorError> {
        let mut state = self.state.lock();
        if state.num_blocks_registered < state.min_registered_blocks {
            return Err(FeeEstimatorError::NotEnoughBlocks);
        }
        if num_blocks == 0 || num_blocks > ESTIMATE_FEE_DEPTH as u32 {
            return Err(FeeEstimatorError::DepthOutOfRange(num_blocks));
        }
        if state.cached.is_none() {
            let estimates = state.estimates();
            state.cached = Some(estimates);
        }
        let rate = state.cached.as_ref().unwrap()[num_blocks as usize - 1];
        Ok(FeePerByte(rate).to_per_kilobyte())
    }

    /// Unregister recently registered blocks down to and including the one
    /// with the given hash, reversing their effect on the bins.
    pub fn rollback(&self, hash: &Hash256) -> Result<(), FeeEstimatorError> {
        let mut state = self.state.lock();
        let position = state
            .dropped
            .iter()
            .rev()
            .position(|block| block.hash == *hash)
            .ok_or(FeeEstimatorError::UnknownBlock)?;
        for _ in 0..=position {
            state.rollback_last();
        }
        debug!(blocks = position + 1, "rolled back fee estimator");
        Ok(())
    }

    /// Serialize the estimator state to an opaque byte blob.
    pub fn save(&self) -> Vec<u8> {
        let state = self.state.lock();
        let mut w = ByteWriter::with_capacity(64 + state.observed.len() * 48);
        w.write_u32_be(SAVE_VERSION);
        w.write_u32_be(state.max_rollback);
        w.write_i32_be(state.bin_size);
        w.write_i32_be(state.max_replacements);
        w.write_u32_be(state.min_registered_blocks);
        w.write_i32_be(state.last_known_height);
        w.write_u32_be(state.num_blocks_registered);

        // Observed transactions go out sorted by hash so identical states
        // always serialize to identical bytes.
        let mut sorted: Vec<&ObservedTx> = state.observed.values().collect();
        sorted.sort_by(|a, b| a.hash.cmp(&b.hash));
        let mut index: HashMap<Hash256, u32> = HashMap::with_capacity(sorted.len());
        w.write_u32_be(sorted.len() as u32);
        for (i, tx) in sorted.iter().enumerate() {
            w.write_hash(&tx.hash);
            w.write_f64_be(tx.fee_rate);
            w.write_i32_be(tx.observed);
            w.write_i32_be(tx.mined);
            index.insert(tx.hash, i as u32);
        }

        let tx_index = |hash: &Hash256| -> u32 {
            *index
                .get(hash)
                .expect("illegal state: bin references unknown transaction")
        };
        for bin in &state.bins {
            w.write_u32_be(bin.len() as u32);
            for hash in bin {
                w.write_u32_be(tx_index(hash));
            }
        }

        w.write_u32_be(state.dropped.len() as u32);
        for block in &state.dropped {
            w.write_hash(&block.hash);
            w.write_u32_be(block.dropped.len() as u32);
            for hash in &block.dropped {
                w.write_u32_be(tx_index(hash));
            }
        }
        w.into_bytes()
    }

    /// Restore an estimator from a blob previously produced by [`save`].
    ///
    /// [`save`]: FeeEstimator::save
    pub fn restore(data: &[u8]) -> Result<Self, FeeEstimatorError> {
        let mut r = ByteReader::new(data);
        let version = r.read_u32_be("version")?;
        if version != SAVE_VERSION {
            return Err(FeeEstimatorError::BadVersion {
                expected: SAVE_VERSION,
                found: version,
            });
        }
        let max_rollback = r.read_u32_be("max_rollback")?;
        let bin_size = r.read_i32_be("bin_size")?;
        let max_replacements = r.read_i32_be("max_replacements")?;
        let min_registered_blocks = r.read_u32_be("min_registered_blocks")?;
        let last_known_height = r.read_i32_be("last_known_height")?;
        let num_blocks_registered = r.read_u32_be("num_blocks_registered")?;

        let tx_count = r.read_u32_be("observed count")?;
        let mut by_index = Vec::with_capacity(tx_count as usize);
        let mut observed = HashMap::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            let tx = ObservedTx {
                hash: r.read_hash("observed hash")?,
                fee_rate: r.read_f64_be("observed fee rate")?,
                observed: r.read_i32_be("observed height")?,
                mined: r.read_i32_be("mined height")?,
            };
            by_index.push(tx.hash);
            observed.insert(tx.hash, tx);
        }
        let lookup = |idx: u32| -> Result<Hash256, FeeEstimatorError> {
            by_index
                .get(idx as usize)
                .copied()
                .ok_or(FeeEstimatorError::InvalidTxReference(idx))
        };

        let mut bins: [Vec<Hash256>; ESTIMATE_FEE_DEPTH] = Default::default();
        for bin in bins.iter_mut() {
            let n = r.read_u32_be("bin length")?;
            bin.reserve(n as usize);
            for _ in 0..n {
                bin.push(lookup(r.read_u32_be("bin entry")?)?);
            }
        }

        let dropped_count = r.read_u32_be("dropped count")?;
        let mut dropped = Vec::with_capacity(dropped_count as usize);
        for _ in 0..dropped_count {
            let hash = r.read_hash("dropped block hash")?;
            let n = r.read_u32_be("dropped length")?;
            let mut txs = Vec::with_capacity(n as usize);
            for _ in 0..n {
                txs.push(lookup(r.read_u32_be("dropped entry")?)?);
            }
            dropped.push(DroppedBlock { hash, dropped: txs });
        }
        r.expect_end()?;

        Ok(Self {
            state: Mutex::new(EstimatorState {
                max_rollback,
                bin_size,
                max_replacements,
                min_registered_blocks,
                last_known_height,
                num_blocks_registered,
                observed,
                bins,
                cached: None,
                dropped,
            }),
        })
    }
}

impl EstimatorState {
    /// All 25 per-depth estimates, in grains per byte.
    fn estimates(&self) -> Vec<f64> {
        // Gather every binned rate, sorted high to low, together with the
        // per-depth bin counts.
        let mut rates = Vec::new();
        let mut counts = [0u32; ESTIMATE_FEE_DEPTH];
        for (depth, bin) in self.bins.iter().enumerate() {
            counts[depth] = bin.len() as u32;
            for hash in bin {
                let tx = self
                    .observed
                    .get(hash)
                    .expect("illegal state: bin references unknown transaction");
                rates.push(tx.fee_rate);
            }
        }
        rates.sort_by(|a, b| b.total_cmp(a));

        (1..=ESTIMATE_FEE_DEPTH)
            .map(|confirmations| {
                if rates.is_empty() {
                    return 0.0;
                }
                let min: usize = counts[..confirmations - 1]
                    .iter()
                    .map(|&c| c as usize)
                    .sum();
                let mut max = min + counts[confirmations - 1] as usize;
                max = max.saturating_sub(1).max(min);
                let mut fee_index = (min + max) / 2;
                if fee_index >= rates.len() {
                    fee_index = rates.len() - 1;
                }
                rates[fee_index]
            })
            .collect()
    }

    /// Reverse the effect of the most recently registered block.
    fn rollback_last(&mut self) {
        self.cached = None;
        let block = match self.dropped.pop() {
            Some(block) => block,
            // The caller only rolls back blocks known to be in the stack.
            None => return,
        };

        // Restore each replaced resident into the slot of a transaction the
        // rolled-back block added, resuming the scan of each bin where the
        // previous restore left off.
        let mut replacement_counters = [0usize; ESTIMATE_FEE_DEPTH];
        for victim_hash in &block.dropped {
            let victim = self
                .observed
                .get(victim_hash)
                .expect("illegal state: cannot rollback dropped transaction");
            let depth = (victim.mined - victim.observed - 1) as usize;
            let bin = &mut self.bins[depth];
            let mut counter = replacement_counters[depth];
            loop {
                assert!(
                    counter < bin.len(),
                    "illegal state: cannot rollback dropped transaction"
                );
                let resident = bin[counter];
                let resident_tx = self
                    .observed
                    .get_mut(&resident)
                    .expect("illegal state: bin references unknown transaction");
                if resident_tx.mined == self.last_known_height {
                    resident_tx.mined = UNMINED_HEIGHT;
                    bin[counter] = *victim_hash;
                    counter += 1;
                    break;
                }
                counter += 1;
            }
            replacement_counters[depth] = counter;
        }

        // Remove the block's remaining additions, the ones that didn't
        // replace anything.
        for (depth, counter) in replacement_counters.iter().enumerate() {
            let mut j = *counter;
            while j < self.bins[depth].len() {
                let resident = self.bins[depth][j];
                let resident_tx = self
                    .observed
                    .get_mut(&resident)
                    .expect("illegal state: bin references unknown transaction");
                if resident_tx.mined == self.last_known_height {
                    resident_tx.mined = UNMINED_HEIGHT;
                    self.bins[depth].remove(j);
                } else {
                    j += 1;
                }
            }
        }

        self.num_blocks_registered -= 1;
        self.last_known_height -= 1;
    }
}
