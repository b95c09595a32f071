// Library exports for testing and external use

pub mod aggregator;
pub mod bls;
pub mod chain;
pub mod config;
pub mod metrics;
pub mod registry;
pub mod rpc;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export commonly used types and traits
pub use aggregator::{
    Aggregator, MAX_SENT_TX_RETRIES, MIN_SIGNATURE_COLLECTION_WINDOW, QUORUM_NUMBER,
    QUORUM_THRESHOLD_PERCENTAGE,
};
pub use config::AggregatorConfig;
pub use registry::{AdmitOutcome, EvictStats, TaskRegistry, TaskSnapshot};
pub use traits::{BlsAggregationService, ChainReader, ChainSubscriber, ChainWriter};
pub use types::{
    BatchData, BatchIdentifier, BatchIndex, BlsServiceError, BlsServiceResponse, G1Point, G2Point,
    NewBatchEvent, NonSignerStakesAndSignature, OperatorId, QuorumAttestation, SignedTaskResponse,
    TxReceipt,
};

// Re-export variant enums for convenience
pub use bls::{BlsServiceVariant, MockBlsService, NoopBlsService};
pub use chain::{
    ChainReaderVariant, ChainSubscriberVariant, ChainWriterVariant, MockChainReader,
    MockChainSubscriber, MockChainWriter,
};

use thiserror::Error;

/// Errors surfaced by the aggregator core.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// The BLS service rejected a task registration; the batch would stay
    /// tracked locally but never complete, so the process must abort.
    #[error("BLS aggregation service error when initializing task {0}: {1}")]
    BlsServiceInit(u32, String),
    #[error("no registry entry for task index {0}")]
    UnknownTaskIndex(u32),
    #[error("failed to send aggregated response: {0}")]
    TransactionSend(String),
}
