use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use kanal::AsyncSender;

use crate::types::{
    BatchIdentifier, GasBumpParams, NewBatchEvent, NonSignerStakesAndSignature, TxReceipt,
};

/// Callback invoked by the chain writer each time it escalates the gas
/// price of a pending aggregated-response transaction.
pub type OnSetGasPrice<'a> = &'a (dyn Fn(U256) + Send + Sync);

/// Trait for the chain event subscription (new-batch announcements).
///
/// Implementations are responsible for producing `NewBatchEvent`s into the
/// aggregator's intake pipeline. The subscription ends when the underlying
/// stream terminates; the aggregator does not re-drive it.
#[async_trait]
pub trait ChainSubscriber: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &'static str;

    /// Open the subscription, forwarding every announcement into `tx`.
    async fn subscribe_new_batches(&self, tx: AsyncSender<NewBatchEvent>) -> Result<()>;

    /// Wait until the chain has advanced at least one block past
    /// `from_block`.
    async fn wait_for_one_block(&self, from_block: u64) -> Result<()>;
}

/// Trait for read-only chain queries used by the garbage collector.
#[async_trait]
pub trait ChainReader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Identifier hash of the oldest finalized task whose age exceeds
    /// `max_age`, scanning at most `scan_interval` blocks back. `None`
    /// when no such task exists in the window.
    async fn get_old_task_hash(
        &self,
        max_age: Duration,
        scan_interval: u64,
    ) -> Result<Option<B256>>;
}

/// Trait for submitting aggregated responses on-chain.
///
/// The writer owns the sending wallet; callers serialize access to it so
/// transactions never race for nonces.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submit the aggregated response, escalating gas internally per
    /// `bump_params` until inclusion or until the retry ladder is
    /// exhausted. Returns the receipt when one could be retrieved;
    /// `Ok(None)` when the send went through but the receipt could not be
    /// fetched.
    async fn send_aggregated_response(
        &self,
        batch_identifier: BatchIdentifier,
        merkle_root: B256,
        sender_address: Address,
        payload: &NonSignerStakesAndSignature,
        bump_params: &GasBumpParams,
        on_set_gas_price: OnSetGasPrice<'_>,
    ) -> Result<Option<TxReceipt>>;
}
