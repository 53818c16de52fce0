//! End-to-end exercises of the block and filter header stores: bulk writes,
//! lookup by hash and height, connectivity, rollback, ancestor ranges, and
//! crash recovery from a partial batch write.

use std::sync::Arc;

use lode_chain::{BlockHeaderStore, FilterHeader, FilterHeaderStore, HeaderStoreError};
use lode_core::{sha256, Hash256, Network, Params};
use lode_store::KvStore;
use lode_tests::helpers::{block_header_chain, temp_kv};

#[test]
fn block_store_write_query_rollback() {
    let (kv, dir) = temp_kv();
    let params = Params::new(Network::Simnet);
    let store = BlockHeaderStore::new(dir.path(), kv, &params).unwrap();

    let headers = block_header_chain(&params, 100);
    store.write_headers(&headers).unwrap();

    let (tip_header, tip_height) = store.chain_tip().unwrap();
    assert_eq!(tip_height, 100);
    assert_eq!(tip_header, headers[99].header);

    store.check_connectivity().unwrap();

    for indexed in &headers {
        let by_height = store.fetch_header_by_height(indexed.height).unwrap();
        assert_eq!(by_height, indexed.header);
        let (by_hash, height) = store.fetch_header(&indexed.header.block_hash()).unwrap();
        assert_eq!(by_hash, indexed.header);
        assert_eq!(height, indexed.height);
    }

    // Roll back one block: the stamp names the 99th header, and height 100
    // is gone.
    let stamp = store.rollback_last_block().unwrap();
    assert_eq!(stamp.height, 99);
    assert_eq!(stamp.hash, headers[98].header.block_hash());

    let (tip_header, tip_height) = store.chain_tip().unwrap();
    assert_eq!(tip_height, 99);
    assert_eq!(tip_header, headers[98].header);
    assert!(matches!(
        store.fetch_header_by_height(100).unwrap_err(),
        HeaderStoreError::OutOfRange { height: 100, .. }
    ));
}

#[test]
fn block_store_partial_write_recovery() {
    let (kv, dir) = temp_kv();
    let params = Params::new(Network::Simnet);
    let headers = block_header_chain(&params, 10);

    {
        let store = BlockHeaderStore::new(dir.path(), Arc::clone(&kv), &params).unwrap();
        store.write_headers(&headers).unwrap();
        // Wind the index back 5 blocks, as if the process died after the
        // file was extended but before the index committed.
        for i in 0..5 {
            let new_tip = headers[headers.len() - i - 1].header.prev_block;
            store.truncate_index(&new_tip).unwrap();
        }
    }

    // Reopening triggers recovery: the file is truncated to the index tip.
    let store = BlockHeaderStore::new(dir.path(), kv, &params).unwrap();
    let (tip_header, tip_height) = store.chain_tip().unwrap();
    assert_eq!(tip_height, 5);
    assert_eq!(tip_header, headers[4].header);
    assert_eq!(
        std::fs::metadata(dir.path().join("block_headers.bin"))
            .unwrap()
            .len(),
        5 * 80
    );
}

#[test]
fn block_store_repeated_rollback_restores_initial_state() {
    let (kv, dir) = temp_kv();
    let params = Params::new(Network::Simnet);
    let store = BlockHeaderStore::new(dir.path(), kv, &params).unwrap();

    let headers = block_header_chain(&params, 12);
    store.write_headers(&headers).unwrap();
    for _ in 0..12 {
        store.rollback_last_block().unwrap();
    }

    let (tip_header, tip_height) = store.chain_tip().unwrap();
    assert_eq!(tip_height, 0);
    assert_eq!(tip_header, params.genesis_header);
    assert_eq!(
        std::fs::metadata(dir.path().join("block_headers.bin"))
            .unwrap()
            .len(),
        0
    );
    assert!(matches!(
        store.rollback_last_block().unwrap_err(),
        HeaderStoreError::RollbackGenesis
    ));
}

#[test]
fn block_store_fetch_header_ancestors() {
    let (kv, dir) = temp_kv();
    let params = Params::new(Network::Simnet);
    let store = BlockHeaderStore::new(dir.path(), kv, &params).unwrap();

    let headers = block_header_chain(&params, 100);
    store.write_headers(&headers).unwrap();

    // Query the full range: the start clamps to height 1 and genesis is
    // never included.
    let stop_hash = headers[99].header.block_hash();
    let (fetched, start_height) = store.fetch_header_ancestors(100, &stop_hash, 100).unwrap();
    assert_eq!(start_height, 1);
    assert_eq!(fetched.len(), 100);
    for (i, header) in fetched.iter().enumerate() {
        assert_eq!(*header, headers[i].header);
    }

    // A partial range ends exactly at the stop hash.
    let (fetched, start_height) = store.fetch_header_ancestors(100, &stop_hash, 10).unwrap();
    assert_eq!(start_height, 91);
    assert_eq!(fetched.len(), 10);
    assert_eq!(fetched[9], headers[99].header);
}

fn filter_header_chain(headers: &[lode_chain::IndexedBlockHeader]) -> Vec<FilterHeader> {
    headers
        .iter()
        .map(|h| FilterHeader {
            header_hash: h.header.block_hash(),
            filter_hash: sha256(&h.height.to_le_bytes()),
            height: h.height,
        })
        .collect()
}

#[test]
fn filter_store_write_query_rollback() {
    let (kv, dir) = temp_kv();
    let params = Params::new(Network::Simnet);
    let store = FilterHeaderStore::new(dir.path(), kv, &params).unwrap();

    let blocks = block_header_chain(&params, 100);
    let filters = filter_header_chain(&blocks);

    // Block headers land before filter headers: preload the block index.
    let entries: Vec<(Hash256, u32)> =
        filters.iter().map(|f| (f.header_hash, f.height)).collect();
    store.index_block_headers(&entries).unwrap();
    store.write_headers(&filters).unwrap();

    let (tip, tip_height) = store.chain_tip().unwrap();
    assert_eq!(tip_height, 100);
    assert_eq!(tip, filters[99].filter_hash);

    for filter in &filters {
        assert_eq!(
            store.fetch_header_by_height(filter.height).unwrap(),
            filter.filter_hash
        );
        assert_eq!(
            store.fetch_header(&filter.header_hash).unwrap(),
            filter.filter_hash
        );
    }

    let stamp = store
        .rollback_last_block(&filters[98].header_hash)
        .unwrap();
    assert_eq!(stamp.height, 99);
    assert_eq!(stamp.hash, filters[98].filter_hash);

    let (tip, tip_height) = store.chain_tip().unwrap();
    assert_eq!(tip_height, 99);
    assert_eq!(tip, filters[98].filter_hash);
}

#[test]
fn filter_store_partial_write_recovery() {
    let (kv, dir) = temp_kv();
    let params = Params::new(Network::Simnet);
    let blocks = block_header_chain(&params, 10);
    let filters = filter_header_chain(&blocks);

    {
        let store = FilterHeaderStore::new(dir.path(), Arc::clone(&kv), &params).unwrap();
        let entries: Vec<(Hash256, u32)> =
            filters.iter().map(|f| (f.header_hash, f.height)).collect();
        store.index_block_headers(&entries).unwrap();
        store.write_headers(&filters).unwrap();
        for i in 0..5 {
            let new_tip = filters[filters.len() - i - 2].header_hash;
            store.truncate_index(&new_tip).unwrap();
        }
    }

    let store = FilterHeaderStore::new(dir.path(), kv, &params).unwrap();
    let (tip, tip_height) = store.chain_tip().unwrap();
    assert_eq!(tip_height, 5);
    assert_eq!(tip, filters[4].filter_hash);
    assert_eq!(
        std::fs::metadata(dir.path().join("reg_filter_headers.bin"))
            .unwrap()
            .len(),
        5 * 32
    );
}

#[test]
fn stores_share_one_database() {
    // Both stores index into the same key/value database without clashing.
    let (kv, dir) = temp_kv();
    let params = Params::new(Network::Simnet);
    let blocks = BlockHeaderStore::new(dir.path(), Arc::clone(&kv), &params).unwrap();
    let filters = FilterHeaderStore::new(dir.path(), kv, &params).unwrap();

    let chain = block_header_chain(&params, 20);
    blocks.write_headers(&chain).unwrap();

    let filter_chain = filter_header_chain(&chain);
    let entries: Vec<(Hash256, u32)> = filter_chain
        .iter()
        .map(|f| (f.header_hash, f.height))
        .collect();
    filters.index_block_headers(&entries).unwrap();
    filters.write_headers(&filter_chain).unwrap();

    assert_eq!(blocks.chain_tip().unwrap().1, 20);
    assert_eq!(filters.chain_tip().unwrap().1, 20);

    // Rolling back one store leaves the other untouched.
    blocks.rollback_last_block().unwrap();
    assert_eq!(blocks.chain_tip().unwrap().1, 19);
    assert_eq!(filters.chain_tip().unwrap().1, 20);
}
