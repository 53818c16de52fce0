//! # lode-mempool
//! Mempool-side fee machinery: the confirmation-tracking fee estimator and
//! the relay fee rules transaction authors follow for quick acceptance.

pub mod error;
pub mod estimator;
pub mod rules;

pub use error::{FeeEstimatorError, RulesError};
pub use estimator::{
    FeeEstimator, FeeEstimatorConfig, FeePerKilobyte, FeePerByte, MinedBlock, TxObservation,
    ESTIMATE_FEE_DEPTH, FEE_DATABASE_KEY, UNMINED_HEIGHT,
};
pub use rules::DEFAULT_RELAY_FEE_PER_KB;
