//! Shared helpers for the integration tests.

pub mod helpers {
    use std::collections::HashSet;
    use std::sync::Arc;

    use lode_chain::IndexedBlockHeader;
    use lode_core::{BlockHeader, Hash256, Params};
    use lode_mempool::{FeeEstimator, MinedBlock, TxObservation, ESTIMATE_FEE_DEPTH};
    use lode_store::KvStore;

    /// Open a key/value store in a fresh temp directory.
    pub fn temp_kv() -> (Arc<KvStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(KvStore::open(dir.path().join("kv")).unwrap());
        (store, dir)
    }

    /// Build a connected synthetic header chain on top of the network's
    /// genesis, one minute per block.
    pub fn block_header_chain(params: &Params, count: u32) -> Vec<IndexedBlockHeader> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut headers = Vec::with_capacity(count as usize);
        let mut prev_hash = params.genesis_hash();
        let mut timestamp = params.genesis_header.timestamp;
        for height in 1..=count {
            timestamp += 60;
            let header = BlockHeader {
                version: 1,
                prev_block: prev_hash,
                merkle_root: Hash256(rng.gen()),
                timestamp,
                bits: rng.gen(),
                nonce: rng.gen(),
            };
            prev_hash = header.block_hash();
            headers.push(IndexedBlockHeader { header, height });
        }
        headers
    }

    /// Drives a [`FeeEstimator`] while tracking the expected mempool and
    /// chain state, so tests can advance blocks, roll them back, and
    /// snapshot estimates.
    pub struct FeeTester {
        pub ef: FeeEstimator,
        pub height: i32,
        tx_counter: u64,
        /// Every transaction ever observed, in order.
        observed: Vec<TxObservation>,
        /// Hashes mined by blocks still on the test chain.
        mined: HashSet<Hash256>,
        /// Registered blocks, newest last.
        blocks: Vec<MinedBlock>,
    }

    impl FeeTester {
        pub fn new(ef: FeeEstimator) -> Self {
            Self {
                ef,
                height: 0,
                tx_counter: 0,
                observed: Vec::new(),
                mined: HashSet::new(),
                blocks: Vec::new(),
            }
        }

        /// Observe one transaction with the given fee at the current height.
        pub fn observe(&mut self, fee: u64) -> TxObservation {
            self.tx_counter += 1;
            let mut hash = [0u8; 32];
            hash[..8].copy_from_slice(&self.tx_counter.to_le_bytes());
            let tx = TxObservation {
                hash: Hash256(hash),
                fee,
                size: 250,
                height: self.height,
            };
            self.ef.observe_transaction(&tx);
            self.observed.push(tx);
            tx
        }

        /// Mine the next block containing up to `max_txs` not-yet-mined
        /// observed transactions.
        pub fn next_block(&mut self, max_txs: usize) {
            let tx_hashes: Vec<Hash256> = self
                .observed
                .iter()
                .filter(|tx| !self.mined.contains(&tx.hash))
                // Only transactions the estimator can still know about.
                .filter(|tx| self.height - tx.height < ESTIMATE_FEE_DEPTH as i32)
                .take(max_txs)
                .map(|tx| tx.hash)
                .collect();
            self.height += 1;
            let mut hash = [0u8; 32];
            hash[..4].copy_from_slice(&(self.height as u32).to_le_bytes());
            hash[31] = 0xB1;
            let block = MinedBlock {
                hash: Hash256(hash),
                height: self.height,
                tx_hashes,
            };
            self.ef.register_block(&block).unwrap();
            for tx_hash in &block.tx_hashes {
                self.mined.insert(*tx_hash);
            }
            self.blocks.push(block);
        }

        /// Roll the most recent block back.
        pub fn rollback(&mut self) {
            let block = self.blocks.pop().expect("no block to roll back");
            self.ef.rollback(&block.hash).unwrap();
            for tx_hash in &block.tx_hashes {
                self.mined.remove(tx_hash);
            }
            self.height -= 1;
        }

        /// Estimates for every confirmation target, checking they never
        /// increase with depth.
        pub fn estimates(&self) -> [f64; ESTIMATE_FEE_DEPTH] {
            let mut out = [0.0; ESTIMATE_FEE_DEPTH];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = self.ef.estimate_fee(i as u32 + 1).unwrap().0;
            }
            for window in out.windows(2) {
                assert!(
                    window[1] <= window[0],
                    "estimates must be non-increasing: {out:?}"
                );
            }
            out
        }
    }
}
