//! In-memory task registry: the bidirectional map between a batch's
//! content-addressed identifier and its dense internal index.
//!
//! The BLS aggregation service addresses tasks by small dense integers
//! while the chain addresses them by identifier hash; this registry is the
//! adapter between the two. All five per-task maps are mutated together,
//! so a task is either fully tracked or not tracked at all. On a reboot
//! the registry legitimately starts empty with `next_index` back at zero.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{info, warn};

use crate::types::{BatchData, BatchIdentifier, BatchIndex};

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// The batch is now tracked under the returned index.
    Admitted(BatchIndex),
    /// The batch identifier was already tracked; nothing changed.
    Duplicate,
}

/// Value snapshot of one tracked task, copied out under the registry lock
/// so callers never hold the lock past the call.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub identifier: BatchIdentifier,
    pub data: BatchData,
    pub created_block: u64,
    pub start_time: Instant,
}

/// Counts reported by one eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictStats {
    pub evicted: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    /// Reverse lookup, used for duplicate detection and by the garbage
    /// collector to resolve the chain-reported identifier hash.
    idx_by_hash: HashMap<BatchIdentifier, BatchIndex>,
    /// Forward lookup, used when the BLS service responds by index.
    hash_by_idx: HashMap<BatchIndex, BatchIdentifier>,
    /// Payload for on-chain submission.
    data_by_hash: HashMap<BatchIdentifier, BatchData>,
    /// Block each task was announced in; submissions wait one extra block.
    created_block_by_idx: HashMap<BatchIndex, u64>,
    /// Admission time, for the quorum-reached latency metric.
    start_time_by_idx: HashMap<BatchIndex, Instant>,
    /// Next index to assign. Strictly monotonic, never reused.
    next_index: BatchIndex,
    /// Eviction watermark. `None` until the first sweep, so index 0 is
    /// reclaimable like any other.
    last_evicted: Option<BatchIndex>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new batch. Inserts into all five maps atomically and bumps
    /// `next_index`; a duplicate identifier is a no-op.
    pub fn admit(
        &mut self,
        identifier: BatchIdentifier,
        data: BatchData,
        created_block: u64,
    ) -> AdmitOutcome {
        if self.idx_by_hash.contains_key(&identifier) {
            return AdmitOutcome::Duplicate;
        }

        let index = self.next_index;
        self.idx_by_hash.insert(identifier, index);
        self.hash_by_idx.insert(index, identifier);
        self.data_by_hash.insert(identifier, data);
        self.created_block_by_idx.insert(index, created_block);
        self.start_time_by_idx.insert(index, Instant::now());
        self.next_index += 1;

        AdmitOutcome::Admitted(index)
    }

    /// Snapshot the per-index values for `index`, or `None` if the index
    /// was never admitted or has been evicted.
    pub fn lookup(&self, index: BatchIndex) -> Option<TaskSnapshot> {
        let identifier = *self.hash_by_idx.get(&index)?;
        let data = *self.data_by_hash.get(&identifier)?;
        let created_block = *self.created_block_by_idx.get(&index)?;
        let start_time = *self.start_time_by_idx.get(&index)?;
        Some(TaskSnapshot {
            identifier,
            data,
            created_block,
            start_time,
        })
    }

    /// Resolve a batch identifier back to its index.
    pub fn index_of(&self, identifier: &BatchIdentifier) -> Option<BatchIndex> {
        self.idx_by_hash.get(identifier).copied()
    }

    /// Delete every live index between the watermark and `up_to`
    /// (inclusive) from all five maps. Indices assigned in intake order may
    /// finalize on-chain out of order, so `up_to` acts as an upper-bound
    /// watermark and everything at or below it is reclaimed eagerly.
    /// The watermark is advanced to `up_to` unconditionally.
    pub fn evict(&mut self, up_to: BatchIndex) -> EvictStats {
        let start = self.last_evicted.map_or(0, |last| last.saturating_add(1));
        let mut stats = EvictStats::default();

        for index in start..=up_to {
            match self.hash_by_idx.remove(&index) {
                Some(identifier) => {
                    self.idx_by_hash.remove(&identifier);
                    self.data_by_hash.remove(&identifier);
                    self.created_block_by_idx.remove(&index);
                    self.start_time_by_idx.remove(&index);
                    info!(task_index = index, "cleaned up finalized task");
                    stats.evicted += 1;
                }
                None => {
                    warn!(task_index = index, "task not found in registry, skipping");
                    stats.skipped += 1;
                }
            }
        }

        self.last_evicted = Some(up_to);
        stats
    }

    /// Number of live tracked tasks.
    pub fn len(&self) -> usize {
        self.hash_by_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash_by_idx.is_empty()
    }

    /// Next index to be assigned; equals the total number of
    /// non-duplicate admissions since startup.
    pub fn next_index(&self) -> BatchIndex {
        self.next_index
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{Address, B256};

    use super::*;

    fn test_identifier(id: u8) -> BatchIdentifier {
        let mut hash = [0u8; 32];
        hash[0] = id;
        B256::from(hash)
    }

    fn test_data(id: u8) -> BatchData {
        let mut root = [0u8; 32];
        root[0] = id;
        BatchData {
            merkle_root: B256::from(root),
            sender_address: Address::repeat_byte(id),
        }
    }

    fn admit_n(registry: &mut TaskRegistry, n: u8) {
        for i in 0..n {
            let outcome = registry.admit(test_identifier(i), test_data(i), 100 + i as u64);
            assert_eq!(outcome, AdmitOutcome::Admitted(i as u32));
        }
    }

    /// For every live entry the two index maps must mirror each other.
    fn assert_bidirectional(registry: &TaskRegistry) {
        for index in 0..registry.next_index() {
            if let Some(snapshot) = registry.lookup(index) {
                assert_eq!(
                    registry.index_of(&snapshot.identifier),
                    Some(index),
                    "idx_by_hash and hash_by_idx disagree for index {index}"
                );
            }
        }
    }

    #[test]
    fn test_admit_assigns_sequential_indices() {
        let mut registry = TaskRegistry::new();
        admit_n(&mut registry, 5);

        assert_eq!(registry.next_index(), 5);
        assert_eq!(registry.len(), 5);
        assert_bidirectional(&registry);
    }

    #[test]
    fn test_admit_duplicate_is_noop() {
        let mut registry = TaskRegistry::new();

        assert_eq!(
            registry.admit(test_identifier(1), test_data(1), 100),
            AdmitOutcome::Admitted(0)
        );
        assert_eq!(
            registry.admit(test_identifier(1), test_data(1), 200),
            AdmitOutcome::Duplicate
        );

        // Exactly one live entry, next_index advanced exactly once, and the
        // original created_block untouched.
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.next_index(), 1);
        let snapshot = registry.lookup(0).expect("entry should be live");
        assert_eq!(snapshot.created_block, 100);
    }

    #[test]
    fn test_lookup_unknown_index() {
        let registry = TaskRegistry::new();
        assert!(registry.lookup(0).is_none());
        assert!(registry.lookup(42).is_none());
    }

    #[test]
    fn test_lookup_snapshot_values() {
        let mut registry = TaskRegistry::new();
        registry.admit(test_identifier(7), test_data(7), 777);

        let snapshot = registry.lookup(0).expect("entry should be live");
        assert_eq!(snapshot.identifier, test_identifier(7));
        assert_eq!(snapshot.data, test_data(7));
        assert_eq!(snapshot.created_block, 777);
    }

    #[test]
    fn test_evict_reclaims_all_maps() {
        let mut registry = TaskRegistry::new();
        admit_n(&mut registry, 10);

        let stats = registry.evict(6);
        assert_eq!(stats.evicted, 7, "indices 0..=6 should be reclaimed");
        assert_eq!(stats.skipped, 0);

        for index in 0..=6u32 {
            assert!(registry.lookup(index).is_none());
        }
        for index in 7..10u32 {
            assert!(registry.lookup(index).is_some(), "index {index} should survive");
        }
        for i in 0..=6u8 {
            assert!(registry.index_of(&test_identifier(i)).is_none());
        }
        assert_eq!(registry.len(), 3);
        assert_bidirectional(&registry);
    }

    #[test]
    fn test_evict_is_idempotent() {
        let mut registry = TaskRegistry::new();
        admit_n(&mut registry, 10);

        registry.evict(6);
        let stats = registry.evict(6);

        assert_eq!(stats.evicted, 0);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_evict_watermark_advances_unconditionally() {
        let mut registry = TaskRegistry::new();
        admit_n(&mut registry, 3);

        registry.evict(2);
        assert!(registry.is_empty());

        // A lower watermark is still taken as-is; the next sweep re-walks
        // the already-evicted index and skips it instead of double-counting.
        registry.evict(0);
        let stats = registry.evict(2);
        assert_eq!(stats.evicted, 0);
        assert_eq!(stats.skipped, 2);
    }

    #[test]
    fn test_evict_past_next_index() {
        let mut registry = TaskRegistry::new();
        admit_n(&mut registry, 3);

        let stats = registry.evict(8);
        assert_eq!(stats.evicted, 3);
        assert_eq!(stats.skipped, 6, "unassigned indices are logged and skipped");
        assert!(registry.is_empty());

        // Indices are never reused after eviction.
        let outcome = registry.admit(test_identifier(100), test_data(100), 1);
        assert_eq!(outcome, AdmitOutcome::Admitted(3));
    }

    #[test]
    fn test_admit_evict_interleaving_holds_invariants() {
        let mut registry = TaskRegistry::new();
        admit_n(&mut registry, 4);
        registry.evict(1);

        for i in 4..8u8 {
            registry.admit(test_identifier(i), test_data(i), 100 + i as u64);
        }
        registry.evict(5);

        assert_eq!(registry.next_index(), 8);
        assert_eq!(registry.len(), 2);
        for index in 0..=5u32 {
            assert!(registry.lookup(index).is_none());
        }
        for index in 6..8u32 {
            assert!(registry.lookup(index).is_some());
        }
        assert_bidirectional(&registry);
    }
}
