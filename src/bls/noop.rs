use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use kanal::{unbounded_async, AsyncReceiver, AsyncSender};

use crate::traits::BlsAggregationService;
use crate::types::{BatchIndex, BlsServiceResponse, G1Point, OperatorId};

/// Noop BLS aggregation service for demonstration purposes: accepts every
/// task and signature but never produces a response. The sender end is
/// held so the response stream stays open.
pub struct NoopBlsService {
    _response_tx: AsyncSender<BlsServiceResponse>,
    response_rx: AsyncReceiver<BlsServiceResponse>,
}

impl NoopBlsService {
    pub fn new() -> Self {
        let (_response_tx, response_rx) = unbounded_async();
        Self {
            _response_tx,
            response_rx,
        }
    }
}

impl Default for NoopBlsService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlsAggregationService for NoopBlsService {
    fn name(&self) -> &'static str {
        "noop-bls-service"
    }

    async fn initialize_new_task_with_window(
        &self,
        task_index: BatchIndex,
        _task_created_block: u32,
        _quorum_numbers: Vec<u8>,
        _quorum_threshold_percentages: Vec<u8>,
        _time_to_expiry: Duration,
        _window_duration: Duration,
    ) -> Result<()> {
        tracing::info!("NoopBlsService: task {} initialized, no aggregation will run", task_index);
        Ok(())
    }

    async fn process_signature(
        &self,
        _task_index: BatchIndex,
        _operator_id: OperatorId,
        _signature: G1Point,
    ) -> Result<()> {
        Ok(())
    }

    fn response_channel(&self) -> AsyncReceiver<BlsServiceResponse> {
        self.response_rx.clone()
    }
}
