use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use kanal::{unbounded_async, AsyncReceiver, AsyncSender};

use crate::traits::BlsAggregationService;
use crate::types::{BatchIndex, BlsServiceResponse, G1Point, OperatorId};

/// One recorded task initialization, for assertions.
#[derive(Debug, Clone)]
pub struct InitializedTask {
    pub task_index: BatchIndex,
    pub task_created_block: u32,
    pub quorum_numbers: Vec<u8>,
    pub quorum_threshold_percentages: Vec<u8>,
    pub time_to_expiry: Duration,
    pub window_duration: Duration,
}

/// Mock BLS aggregation service for testing. Records initializations and
/// signatures; tests inject terminal outcomes with [`push_response`].
///
/// [`push_response`]: MockBlsService::push_response
#[derive(Clone)]
pub struct MockBlsService {
    initialized: Arc<Mutex<Vec<InitializedTask>>>,
    signatures: Arc<Mutex<Vec<(BatchIndex, OperatorId, G1Point)>>>,
    response_tx: AsyncSender<BlsServiceResponse>,
    response_rx: AsyncReceiver<BlsServiceResponse>,
    /// When set, task initialization fails (the aggregator treats this as
    /// fatal).
    pub fail_init: bool,
}

impl MockBlsService {
    pub fn new() -> Self {
        let (response_tx, response_rx) = unbounded_async();
        Self {
            initialized: Arc::new(Mutex::new(Vec::new())),
            signatures: Arc::new(Mutex::new(Vec::new())),
            response_tx,
            response_rx,
            fail_init: false,
        }
    }

    pub fn get_initialized(&self) -> Vec<InitializedTask> {
        self.initialized.lock().unwrap().clone()
    }

    pub fn get_signatures(&self) -> Vec<(BatchIndex, OperatorId, G1Point)> {
        self.signatures.lock().unwrap().clone()
    }

    /// Deliver a terminal outcome on the response stream.
    pub async fn push_response(&self, response: BlsServiceResponse) -> Result<()> {
        self.response_tx
            .send(response)
            .await
            .map_err(|e| anyhow!("failed to push mock BLS response: {e}"))
    }

    /// Sender end of the response stream, for tests that outlive the mock.
    pub fn response_sender(&self) -> AsyncSender<BlsServiceResponse> {
        self.response_tx.clone()
    }
}

impl Default for MockBlsService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlsAggregationService for MockBlsService {
    fn name(&self) -> &'static str {
        "mock-bls-service"
    }

    async fn initialize_new_task_with_window(
        &self,
        task_index: BatchIndex,
        task_created_block: u32,
        quorum_numbers: Vec<u8>,
        quorum_threshold_percentages: Vec<u8>,
        time_to_expiry: Duration,
        window_duration: Duration,
    ) -> Result<()> {
        if self.fail_init {
            return Err(anyhow!("mock BLS service rejected task {task_index}"));
        }
        self.initialized.lock().unwrap().push(InitializedTask {
            task_index,
            task_created_block,
            quorum_numbers,
            quorum_threshold_percentages,
            time_to_expiry,
            window_duration,
        });
        Ok(())
    }

    async fn process_signature(
        &self,
        task_index: BatchIndex,
        operator_id: OperatorId,
        signature: G1Point,
    ) -> Result<()> {
        self.signatures
            .lock()
            .unwrap()
            .push((task_index, operator_id, signature));
        Ok(())
    }

    fn response_channel(&self) -> AsyncReceiver<BlsServiceResponse> {
        self.response_rx.clone()
    }
}
