//! Adversarial decoding: the row and state-blob codecs must reject hostile
//! input with typed errors and never panic, whatever the bytes.

use proptest::prelude::*;

use lode_mempool::FeeEstimator;
use lode_wallet::rows::{
    deserialize_address_row, serialize_address_row, AddressPayload, AddressRow,
};
use lode_wallet::series::deserialize_series_row;
use lode_wallet::SyncStatus;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Arbitrary bytes never panic the address row decoder.
    #[test]
    fn address_row_decoder_total(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = deserialize_address_row(&bytes);
    }

    /// Arbitrary bytes never panic the series row decoder.
    #[test]
    fn series_row_decoder_total(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = deserialize_series_row(&bytes);
    }

    /// Arbitrary bytes never panic the estimator state restorer.
    #[test]
    fn estimator_restore_total(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = FeeEstimator::restore(&bytes);
    }

    /// Truncating a valid address row always fails cleanly.
    #[test]
    fn truncated_address_rows_error(cut in 0usize..26) {
        let row = AddressRow {
            account: 3,
            added_secs: 1_600_000_000,
            sync_status: SyncStatus::Full,
            payload: AddressPayload::Chained { branch: 1, index: 9 },
        };
        let bytes = serialize_address_row(&row);
        prop_assume!(cut < bytes.len());
        prop_assert!(deserialize_address_row(&bytes[..cut]).is_err());
    }

    /// Address rows round-trip for arbitrary field values.
    #[test]
    fn imported_rows_roundtrip(
        account in any::<u32>(),
        added in any::<u64>(),
        pub_key in proptest::collection::vec(any::<u8>(), 1..80),
        priv_key in proptest::collection::vec(any::<u8>(), 0..80),
    ) {
        let row = AddressRow {
            account,
            added_secs: added,
            sync_status: SyncStatus::None,
            payload: AddressPayload::Imported {
                enc_pub_key: pub_key,
                enc_priv_key: priv_key,
            },
        };
        let bytes = serialize_address_row(&row);
        prop_assert_eq!(deserialize_address_row(&bytes).unwrap(), row);
    }
}
