//! Core types for configstore
//!
//! This crate defines the foundational types shared by the replica engine
//! and the client facade:
//! - EntityKey: Hierarchical, partition-scoped entity identity
//! - Entity: Trait implemented by every replicated record type
//! - ChangeEvent: Created / Updated / Deleted notification for one entity
//! - Timestamp: Seconds + nanos timestamp field type
//! - hash: Stable FNV-1a index hashes (32/64-bit, single and pair)
//! - ReplicationConfig: TOML-backed configuration
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod entity;
pub mod error;
pub mod hash;
pub mod key;
pub mod timestamp;

pub use config::ReplicationConfig;
pub use entity::{ChangeEvent, ChangeKind, Entity};
pub use error::{Error, Result};
pub use key::{EntityKey, PartitionId, PathElement};
pub use timestamp::Timestamp;
