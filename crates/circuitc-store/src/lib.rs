//! Fact store for circuitc: the circuit-JSON record model and the typed
//! CRUD store every render pass reads and writes.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum
//! - [`record`]: CircuitRecord and the per-kind record structs
//! - [`traits`]: FactStore trait definition
//! - [`memory`]: InMemoryStore implementation
//! - [`remap`]: id remapping and translation of record snapshots
//! - [`hash`]: blake3 content digests

pub mod error;
pub mod hash;
pub mod memory;
pub mod record;
pub mod remap;
pub mod traits;

// Re-export key types for ergonomic use.
pub use error::StorageError;
pub use hash::{hash_records, hash_value, short_digest};
pub use memory::InMemoryStore;
pub use record::{CircuitRecord, Side, RECORD_KINDS};
pub use remap::{remap_ids, transform_records};
pub use traits::FactStore;
