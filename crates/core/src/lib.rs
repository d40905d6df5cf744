//! Core domain types and shared logic for the Darkroom storage engine.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Storage keys and reference normalization
//! - Usage-ledger event types
//! - Configuration for storage, metadata, and GC

pub mod config;
pub mod error;
pub mod key;
pub mod usage;

pub use config::{GcConfig, MetadataConfig, StorageConfig};
pub use error::{Error, Result};
pub use key::{KeyScope, Normalizer, StorageKey};
pub use usage::{UsageEvent, UsageOp, UsageTotals};
