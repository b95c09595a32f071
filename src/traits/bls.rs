use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use kanal::AsyncReceiver;

use crate::types::{BatchIndex, BlsServiceResponse, G1Point, OperatorId};

/// Trait for the external BLS aggregation service.
///
/// The service runs on its own clock: a task is initialized once, operator
/// signatures are fed in as they arrive, and exactly one terminal
/// `BlsServiceResponse` per task is emitted on the shared delivery stream,
/// either when the stake threshold is met or when the task expires.
#[async_trait]
pub trait BlsAggregationService: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    /// Register a new task for signature collection. `window_duration` is
    /// the minimum collection window once quorum is reached;
    /// `time_to_expiry` is the overall deadline.
    async fn initialize_new_task_with_window(
        &self,
        task_index: BatchIndex,
        task_created_block: u32,
        quorum_numbers: Vec<u8>,
        quorum_threshold_percentages: Vec<u8>,
        time_to_expiry: Duration,
        window_duration: Duration,
    ) -> Result<()>;

    /// Feed one operator signature into the running aggregation for
    /// `task_index`. Invoked by the operator RPC boundary.
    async fn process_signature(
        &self,
        task_index: BatchIndex,
        operator_id: OperatorId,
        signature: G1Point,
    ) -> Result<()>;

    /// The single delivery stream of terminal task outcomes.
    fn response_channel(&self) -> AsyncReceiver<BlsServiceResponse>;
}
