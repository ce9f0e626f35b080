//! Object identity for the reftable backend.
//!
//! Provides the `ObjectId` type and the hash-algorithm bindings records and
//! log entries carry around, plus hex encode/decode helpers. Computing hashes
//! from object content is outside this crate's concern; it only identifies,
//! compares and serializes hashes already produced elsewhere.

mod error;
pub mod hex;
mod algorithm;
mod oid;

pub use algorithm::HashAlgorithm;
pub use error::HashError;
pub use oid::ObjectId;
