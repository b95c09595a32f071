use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Canonical key for a batch: `keccak256(merkle_root ‖ sender_address)`.
pub type BatchIdentifier = B256;

/// Internal monotonic task number. Only used to address the BLS
/// aggregation service, which references tasks by dense integer indices.
pub type BatchIndex = u32;

/// Operator identity within the quorum registry.
pub type OperatorId = B256;

/// New-batch announcement observed on-chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatchEvent {
    pub merkle_root: B256,
    pub sender_address: Address,
    pub task_created_block: u32,
}

/// Payload data of a tracked batch. Immutable once admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchData {
    pub merkle_root: B256,
    pub sender_address: Address,
}

/// BN254 G1 point in the on-chain affine representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct G1Point {
    pub x: U256,
    pub y: U256,
}

/// BN254 G2 point in the on-chain affine representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct G2Point {
    pub x: [U256; 2],
    pub y: [U256; 2],
}

/// Witness payload submitted on-chain alongside the aggregate signature.
///
/// The index arrays are opaque chain-state-snapshot positions the verifier
/// contract uses to reconstruct stake weights at the task's block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonSignerStakesAndSignature {
    pub non_signer_pubkeys: Vec<G1Point>,
    pub quorum_apks: Vec<G1Point>,
    pub apk_g2: G2Point,
    pub sigma: G1Point,
    pub non_signer_quorum_bitmap_indices: Vec<u32>,
    pub quorum_apk_indices: Vec<u32>,
    pub total_stake_indices: Vec<u32>,
    pub non_signer_stake_indices: Vec<Vec<u32>>,
}

/// Receipt for a mined aggregated-response transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub effective_gas_price: U256,
}

/// Quorum attestation emitted by the BLS aggregation service once the
/// stake threshold is met within the collection window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumAttestation {
    pub non_signers_pubkeys_g1: Vec<G1Point>,
    pub quorum_apks_g1: Vec<G1Point>,
    pub signers_apk_g2: G2Point,
    pub signers_agg_sig_g1: G1Point,
    pub non_signer_quorum_bitmap_indices: Vec<u32>,
    pub quorum_apk_indices: Vec<u32>,
    pub total_stake_indices: Vec<u32>,
    pub non_signer_stake_indices: Vec<Vec<u32>>,
}

/// Terminal failure reported by the BLS aggregation service for a task.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BlsServiceError {
    #[error("quorum not reached before the task expired")]
    TaskExpired,
    #[error("signature aggregation failed: {0}")]
    Aggregation(String),
}

/// Terminal outcome delivered on the BLS service response stream,
/// exactly one per initialized task.
#[derive(Debug, Clone)]
pub struct BlsServiceResponse {
    pub task_index: BatchIndex,
    pub outcome: Result<QuorumAttestation, BlsServiceError>,
}

/// A signed response submitted by an operator over RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTaskResponse {
    pub task_index: BatchIndex,
    pub operator_id: OperatorId,
    pub signature: G1Point,
}

/// Gas escalation policy applied by the chain writer while a sent
/// transaction is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasBumpParams {
    /// Bump applied on the first escalation, in percent.
    pub base_bump_percentage: u32,
    /// Additional bump applied on each subsequent escalation, in percent.
    pub incremental_bump_percentage: u32,
    /// Ceiling on the total bump, in percent.
    pub bump_percentage_limit: u32,
    /// How long to wait for inclusion before each escalation.
    pub time_to_wait_before_bump: Duration,
}
