use std::time::Duration;

use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use kanal::AsyncSender;

use super::mock::{MockChainReader, MockChainSubscriber, MockChainWriter};
use super::noop::{NoopChainReader, NoopChainSubscriber, NoopChainWriter};
use crate::traits::{ChainReader, ChainSubscriber, ChainWriter, OnSetGasPrice};
use crate::types::{
    BatchIdentifier, GasBumpParams, NewBatchEvent, NonSignerStakesAndSignature, TxReceipt,
};

/// Enum representing all possible chain subscriber implementations.
pub enum ChainSubscriberVariant {
    Noop(NoopChainSubscriber),
    Mock(MockChainSubscriber),
}

#[async_trait]
impl ChainSubscriber for ChainSubscriberVariant {
    fn name(&self) -> &'static str {
        match self {
            ChainSubscriberVariant::Noop(inner) => inner.name(),
            ChainSubscriberVariant::Mock(inner) => inner.name(),
        }
    }

    async fn subscribe_new_batches(&self, tx: AsyncSender<NewBatchEvent>) -> Result<()> {
        match self {
            ChainSubscriberVariant::Noop(inner) => inner.subscribe_new_batches(tx).await,
            ChainSubscriberVariant::Mock(inner) => inner.subscribe_new_batches(tx).await,
        }
    }

    async fn wait_for_one_block(&self, from_block: u64) -> Result<()> {
        match self {
            ChainSubscriberVariant::Noop(inner) => inner.wait_for_one_block(from_block).await,
            ChainSubscriberVariant::Mock(inner) => inner.wait_for_one_block(from_block).await,
        }
    }
}

/// Enum representing all possible chain reader implementations.
pub enum ChainReaderVariant {
    Noop(NoopChainReader),
    Mock(MockChainReader),
}

#[async_trait]
impl ChainReader for ChainReaderVariant {
    fn name(&self) -> &'static str {
        match self {
            ChainReaderVariant::Noop(inner) => inner.name(),
            ChainReaderVariant::Mock(inner) => inner.name(),
        }
    }

    async fn get_old_task_hash(
        &self,
        max_age: Duration,
        scan_interval: u64,
    ) -> Result<Option<B256>> {
        match self {
            ChainReaderVariant::Noop(inner) => inner.get_old_task_hash(max_age, scan_interval).await,
            ChainReaderVariant::Mock(inner) => inner.get_old_task_hash(max_age, scan_interval).await,
        }
    }
}

/// Enum representing all possible chain writer implementations.
pub enum ChainWriterVariant {
    Noop(NoopChainWriter),
    Mock(MockChainWriter),
}

#[async_trait]
impl ChainWriter for ChainWriterVariant {
    fn name(&self) -> &'static str {
        match self {
            ChainWriterVariant::Noop(inner) => inner.name(),
            ChainWriterVariant::Mock(inner) => inner.name(),
        }
    }

    async fn send_aggregated_response(
        &self,
        batch_identifier: BatchIdentifier,
        merkle_root: B256,
        sender_address: Address,
        payload: &NonSignerStakesAndSignature,
        bump_params: &GasBumpParams,
        on_set_gas_price: OnSetGasPrice<'_>,
    ) -> Result<Option<TxReceipt>> {
        match self {
            ChainWriterVariant::Noop(inner) => {
                inner
                    .send_aggregated_response(
                        batch_identifier,
                        merkle_root,
                        sender_address,
                        payload,
                        bump_params,
                        on_set_gas_price,
                    )
                    .await
            }
            ChainWriterVariant::Mock(inner) => {
                inner
                    .send_aggregated_response(
                        batch_identifier,
                        merkle_root,
                        sender_address,
                        payload,
                        bump_params,
                        on_set_gas_price,
                    )
                    .await
            }
        }
    }
}
