use std::time::Duration;

use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use kanal::AsyncSender;

use crate::traits::{ChainReader, ChainSubscriber, ChainWriter, OnSetGasPrice};
use crate::types::{
    BatchIdentifier, GasBumpParams, NewBatchEvent, NonSignerStakesAndSignature, TxReceipt,
};

/// Noop chain subscriber for demonstration purposes. The subscription
/// stays open and never produces an event.
pub struct NoopChainSubscriber;

#[async_trait]
impl ChainSubscriber for NoopChainSubscriber {
    fn name(&self) -> &'static str {
        "noop-chain-subscriber"
    }

    async fn subscribe_new_batches(&self, _tx: AsyncSender<NewBatchEvent>) -> Result<()> {
        tracing::info!("NoopChainSubscriber: subscription opened, no events will be produced");
        futures_util::future::pending::<()>().await;
        Ok(())
    }

    async fn wait_for_one_block(&self, _from_block: u64) -> Result<()> {
        Ok(())
    }
}

/// Noop chain reader: reports that no old tasks exist.
pub struct NoopChainReader;

#[async_trait]
impl ChainReader for NoopChainReader {
    fn name(&self) -> &'static str {
        "noop-chain-reader"
    }

    async fn get_old_task_hash(
        &self,
        _max_age: Duration,
        _scan_interval: u64,
    ) -> Result<Option<B256>> {
        Ok(None)
    }
}

/// Noop chain writer: accepts every submission without producing a receipt.
pub struct NoopChainWriter;

#[async_trait]
impl ChainWriter for NoopChainWriter {
    fn name(&self) -> &'static str {
        "noop-chain-writer"
    }

    async fn send_aggregated_response(
        &self,
        batch_identifier: BatchIdentifier,
        _merkle_root: B256,
        _sender_address: Address,
        _payload: &NonSignerStakesAndSignature,
        _bump_params: &GasBumpParams,
        _on_set_gas_price: OnSetGasPrice<'_>,
    ) -> Result<Option<TxReceipt>> {
        tracing::info!(
            "NoopChainWriter: dropping aggregated response for batch {}",
            batch_identifier
        );
        Ok(None)
    }
}
