//! Aggregator orchestrator with clean module layout.
//!
//! This module provides:
//! - `core`: Aggregator struct and business logic (testable "*_once" functions)
//! - `tasks`: Async task orchestration with tokio::spawn
//! - `tests`: Unit tests for business logic

pub mod core;
pub mod tasks;

// Re-export main types and structs
pub use self::core::{
    batch_identifier, Aggregator, MAX_SENT_TX_RETRIES, MIN_SIGNATURE_COLLECTION_WINDOW,
    QUORUM_NUMBER, QUORUM_THRESHOLD_PERCENTAGE,
};
