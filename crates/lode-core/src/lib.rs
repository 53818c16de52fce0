//! # lode-core
//! Foundation types and chain parameters for the Lode protocol.

pub mod codec;
pub mod constants;
pub mod error;
pub mod params;
pub mod shutdown;
pub mod types;

// Re-exports for convenient access
pub use error::CodecError;
pub use params::{Network, Params};
pub use shutdown::ShutdownToken;
pub use types::{double_sha256, sha256, BlockHeader, BlockStamp, Hash256};
