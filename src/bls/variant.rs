use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use kanal::AsyncReceiver;

use super::mock::MockBlsService;
use super::noop::NoopBlsService;
use crate::traits::BlsAggregationService;
use crate::types::{BatchIndex, BlsServiceResponse, G1Point, OperatorId};

/// Enum representing all possible BLS aggregation service implementations.
pub enum BlsServiceVariant {
    Noop(NoopBlsService),
    Mock(MockBlsService),
}

#[async_trait]
impl BlsAggregationService for BlsServiceVariant {
    fn name(&self) -> &'static str {
        match self {
            BlsServiceVariant::Noop(inner) => inner.name(),
            BlsServiceVariant::Mock(inner) => inner.name(),
        }
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
        match self {
            BlsServiceVariant::Noop(inner) => {
                inner
                    .initialize_new_task_with_window(
                        task_index,
                        task_created_block,
                        quorum_numbers,
                        quorum_threshold_percentages,
                        time_to_expiry,
                        window_duration,
                    )
                    .await
            }
            BlsServiceVariant::Mock(inner) => {
                inner
                    .initialize_new_task_with_window(
                        task_index,
                        task_created_block,
                        quorum_numbers,
                        quorum_threshold_percentages,
                        time_to_expiry,
                        window_duration,
                    )
                    .await
            }
        }
    }

    async fn process_signature(
        &self,
        task_index: BatchIndex,
        operator_id: OperatorId,
        signature: G1Point,
    ) -> Result<()> {
        match self {
            BlsServiceVariant::Noop(inner) => {
                inner.process_signature(task_index, operator_id, signature).await
            }
            BlsServiceVariant::Mock(inner) => {
                inner.process_signature(task_index, operator_id, signature).await
            }
        }
    }

    fn response_channel(&self) -> AsyncReceiver<BlsServiceResponse> {
        match self {
            BlsServiceVariant::Noop(inner) => inner.response_channel(),
            BlsServiceVariant::Mock(inner) => inner.response_channel(),
        }
    }
}
