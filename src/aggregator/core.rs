//! Core business logic for the aggregator - testable functions without tokio::spawn.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::{keccak256, Address, B256};
use anyhow::Result;
use tracing::{error, info, warn};

use crate::bls::{BlsServiceVariant, NoopBlsService};
use crate::chain::{
    ChainReaderVariant, ChainSubscriberVariant, ChainWriterVariant, NoopChainReader,
    NoopChainSubscriber, NoopChainWriter,
};
use crate::config::AggregatorConfig;
use crate::metrics::Metrics;
use crate::registry::{AdmitOutcome, EvictStats, TaskRegistry, TaskSnapshot};
use crate::telemetry::Telemetry;
use crate::traits::{BlsAggregationService, ChainReader, ChainSubscriber, ChainWriter};
use crate::types::{
    BatchData, BatchIdentifier, BatchIndex, BlsServiceResponse, NewBatchEvent,
    NonSignerStakesAndSignature, QuorumAttestation, TxReceipt,
};
use crate::AggregatorError;

/// Quorum this aggregator serves.
pub const QUORUM_NUMBER: u8 = 0;
/// Stake-weighted signing threshold, in percent.
pub const QUORUM_THRESHOLD_PERCENTAGE: u8 = 67;
/// Minimum signature-collection window granted to every task; the
/// configured BLS task timeout is the maximum.
pub const MIN_SIGNATURE_COLLECTION_WINDOW: Duration = Duration::from_secs(15);
/// Gas escalations the chain writer attempts internally before a send is
/// surfaced as failed.
pub const MAX_SENT_TX_RETRIES: u32 = 5;

/// Compute the canonical identifier for a batch announcement:
/// `keccak256(merkle_root ‖ sender_address)`.
pub fn batch_identifier(merkle_root: B256, sender_address: Address) -> BatchIdentifier {
    let mut preimage = [0u8; 52];
    preimage[..32].copy_from_slice(merkle_root.as_slice());
    preimage[32..].copy_from_slice(sender_address.as_slice());
    keccak256(preimage)
}

type SharedRegistry = Arc<tokio::sync::Mutex<TaskRegistry>>;
type SharedWriter = Arc<tokio::sync::Mutex<ChainWriterVariant>>;

/// Main aggregator orchestrator.
///
/// The registry mutex serializes admissions, response snapshots and
/// eviction sweeps; the writer mutex serializes wallet access so on-chain
/// submissions never race for nonces. Lock order is registry before
/// writer, and the registry lock is always released before the writer
/// lock is taken.
pub struct Aggregator {
    /// New-batch subscription plus block waits.
    pub subscriber: Arc<ChainSubscriberVariant>,

    /// Read-only chain queries for the garbage collector.
    pub reader: Arc<ChainReaderVariant>,

    /// On-chain submitter, behind the wallet mutex.
    pub writer: SharedWriter,

    /// External BLS aggregation service.
    pub bls_service: Arc<BlsServiceVariant>,

    /// In-memory task registry, behind the task mutex.
    pub registry: SharedRegistry,

    /// Global configuration.
    pub config: AggregatorConfig,

    pub metrics: Arc<Metrics>,
    pub telemetry: Arc<Telemetry>,
}

impl Aggregator {
    /// Create a new aggregator wired to the given collaborators.
    pub fn new(
        subscriber: ChainSubscriberVariant,
        reader: ChainReaderVariant,
        writer: ChainWriterVariant,
        bls_service: BlsServiceVariant,
        config: AggregatorConfig,
    ) -> Result<Self> {
        let metrics = Metrics::new(&config.metrics_ip_port_address)?;
        let telemetry = Telemetry::new(&config.telemetry_ip_port_address);

        Ok(Self {
            subscriber: Arc::new(subscriber),
            reader: Arc::new(reader),
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            bls_service: Arc::new(bls_service),
            registry: Arc::new(tokio::sync::Mutex::new(TaskRegistry::new())),
            config,
            metrics: Arc::new(metrics),
            telemetry: Arc::new(telemetry),
        })
    }

    /// Initialize an aggregator with default Noop collaborators.
    pub fn initialize(config: AggregatorConfig) -> Result<Self> {
        Self::new(
            ChainSubscriberVariant::Noop(NoopChainSubscriber),
            ChainReaderVariant::Noop(NoopChainReader),
            ChainWriterVariant::Noop(NoopChainWriter),
            BlsServiceVariant::Noop(NoopBlsService::new()),
            config,
        )
    }

    // ==================== TESTABLE BUSINESS LOGIC ====================

    /// Admit one announced batch and register it with the BLS service.
    ///
    /// Returns `Ok(Some(index))` for a fresh batch, `Ok(None)` for a
    /// duplicate announcement (a normal outcome when the subscriber
    /// delivers an event twice). A BLS initialization failure is returned
    /// as an error and must abort the process: the batch would stay
    /// tracked locally but could never complete.
    pub async fn add_new_task(
        registry: &SharedRegistry,
        bls_service: &BlsServiceVariant,
        telemetry: &Telemetry,
        metrics: &Metrics,
        config: &AggregatorConfig,
        event: &NewBatchEvent,
    ) -> Result<Option<BatchIndex>> {
        telemetry.init_new_trace(event.merkle_root);

        let identifier = batch_identifier(event.merkle_root, event.sender_address);
        info!(
            merkle_root = %event.merkle_root,
            sender_address = %event.sender_address,
            batch_identifier = %identifier,
            "adding new task"
        );

        let outcome = {
            let mut reg = registry.lock().await;
            reg.admit(
                identifier,
                BatchData {
                    merkle_root: event.merkle_root,
                    sender_address: event.sender_address,
                },
                event.task_created_block as u64,
            )
        };

        let batch_index = match outcome {
            AdmitOutcome::Duplicate => {
                warn!(batch_identifier = %identifier, "batch already tracked");
                return Ok(None);
            }
            AdmitOutcome::Admitted(index) => index,
        };

        bls_service
            .initialize_new_task_with_window(
                batch_index,
                event.task_created_block,
                vec![QUORUM_NUMBER],
                vec![QUORUM_THRESHOLD_PERCENTAGE],
                config.bls_service_task_timeout(),
                MIN_SIGNATURE_COLLECTION_WINDOW,
            )
            .await
            .map_err(|e| AggregatorError::BlsServiceInit(batch_index, e.to_string()))?;

        metrics.inc_received_tasks();
        info!(
            batch_index,
            batch_identifier = %identifier,
            "new task added"
        );

        Ok(Some(batch_index))
    }

    /// Handle one terminal outcome from the BLS service response stream.
    ///
    /// Snapshots the registry entry under the task mutex, works on the
    /// copy, and finalizes the task trace on every exit path. A response
    /// for an index the registry no longer tracks is an error; everything
    /// past the snapshot treats the batch as abandoned on failure rather
    /// than retrying.
    pub async fn handle_bls_response(
        registry: &SharedRegistry,
        subscriber: &ChainSubscriberVariant,
        writer: &SharedWriter,
        telemetry: &Telemetry,
        metrics: &Metrics,
        config: &AggregatorConfig,
        response: BlsServiceResponse,
    ) -> Result<()> {
        let snapshot = {
            let reg = registry.lock().await;
            reg.lookup(response.task_index)
        };

        let Some(task) = snapshot else {
            error!(
                task_index = response.task_index,
                "BLS response for unknown task index, dropping"
            );
            return Err(AggregatorError::UnknownTaskIndex(response.task_index).into());
        };

        let result = Self::respond_to_task(
            subscriber,
            writer,
            telemetry,
            metrics,
            config,
            &task,
            response,
        )
        .await;

        // Finish the task trace once the task is processed, successfully or not.
        telemetry.finish_trace(task.data.merkle_root);
        result
    }

    async fn respond_to_task(
        subscriber: &ChainSubscriberVariant,
        writer: &SharedWriter,
        telemetry: &Telemetry,
        metrics: &Metrics,
        config: &AggregatorConfig,
        task: &TaskSnapshot,
        response: BlsServiceResponse,
    ) -> Result<()> {
        let task_index = response.task_index;
        let merkle_root = task.data.merkle_root;

        let attestation: QuorumAttestation = match response.outcome {
            Err(err) => {
                telemetry.log_task_error(merkle_root, &err.to_string());
                error!(
                    task_index,
                    batch_identifier = %task.identifier,
                    "BLS aggregation service response contains an error: {err}"
                );
                return Ok(());
            }
            Ok(attestation) => attestation,
        };

        let payload = NonSignerStakesAndSignature {
            non_signer_pubkeys: attestation.non_signers_pubkeys_g1,
            quorum_apks: attestation.quorum_apks_g1,
            apk_g2: attestation.signers_apk_g2,
            sigma: attestation.signers_agg_sig_g1,
            non_signer_quorum_bitmap_indices: attestation.non_signer_quorum_bitmap_indices,
            quorum_apk_indices: attestation.quorum_apk_indices,
            total_stake_indices: attestation.total_stake_indices,
            non_signer_stake_indices: attestation.non_signer_stake_indices,
        };

        telemetry.log_quorum_reached(merkle_root);
        metrics.observe_task_quorum_reached(task.start_time.elapsed());
        info!(
            task_index,
            batch_identifier = %task.identifier,
            "threshold reached"
        );

        // Give the chain one confirmation block past the announcement
        // before submitting; on failure, send anyway.
        if let Err(e) = subscriber.wait_for_one_block(task.created_block).await {
            error!(
                task_index,
                "error waiting for one block, sending anyway: {e}"
            );
        }

        info!(
            task_index,
            batch_identifier = %task.identifier,
            merkle_root = %merkle_root,
            "sending aggregated response onchain"
        );

        match Self::send_aggregated_response(writer, telemetry, metrics, config, task, &payload)
            .await
        {
            Ok(receipt) => {
                // In some cases the receipt for the transaction cannot be
                // retrieved; the send still counts as a success.
                let (tx_hash, effective_gas_price) = match receipt {
                    Some(TxReceipt {
                        tx_hash,
                        effective_gas_price,
                    }) => (tx_hash.to_string(), effective_gas_price.to_string()),
                    None => ("Unknown".to_string(), "Unknown".to_string()),
                };
                telemetry.task_sent_to_ethereum(merkle_root, &tx_hash, &effective_gas_price);
                info!(
                    task_index,
                    batch_identifier = %task.identifier,
                    tx_hash = %tx_hash,
                    "aggregator successfully responded to task"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    task_index,
                    merkle_root = %merkle_root,
                    sender_address = %task.data.sender_address,
                    batch_identifier = %task.identifier,
                    "aggregator failed to respond to task, this batch will be lost: {e}"
                );
                telemetry.log_task_error(merkle_root, &e.to_string());
                Ok(())
            }
        }
    }

    /// Submit the aggregated response under the wallet mutex and wait for
    /// the transaction receipt. The mutex is held for the whole send so
    /// concurrent response handlers cannot race for wallet nonces, and is
    /// released on every exit path.
    pub async fn send_aggregated_response(
        writer: &SharedWriter,
        telemetry: &Telemetry,
        metrics: &Metrics,
        config: &AggregatorConfig,
        task: &TaskSnapshot,
        payload: &NonSignerStakesAndSignature,
    ) -> Result<Option<TxReceipt>> {
        let wallet = writer.lock().await;
        info!(
            merkle_root = %task.data.merkle_root,
            batch_identifier = %task.identifier,
            "wallet locked, sending aggregated response for batch"
        );

        let merkle_root = task.data.merkle_root;
        let on_set_gas_price = move |gas_price: alloy_primitives::U256| {
            telemetry.task_set_gas_price(merkle_root, &gas_price.to_string());
        };

        let start_time = Instant::now();
        let receipt = wallet
            .send_aggregated_response(
                task.identifier,
                task.data.merkle_root,
                task.data.sender_address,
                payload,
                &config.gas_bump_params(),
                &on_set_gas_price,
            )
            .await
            .map_err(|e| AggregatorError::TransactionSend(e.to_string()))?;

        // Only report the latency of successful submissions.
        metrics.observe_respond_to_task_latency(start_time.elapsed());
        metrics.inc_aggregated_responses();

        Ok(receipt)
    }

    /// Run one garbage-collection sweep: ask the chain for the oldest
    /// finalized task and evict every index at or below it.
    ///
    /// The reported hash is only an upper-bound watermark: indices are
    /// assigned in intake order but finalize on-chain out of order, so the
    /// sweep walks upward from the previous watermark and higher finalized
    /// entries wait for a later tick. Chain errors skip the tick; the next
    /// one retries.
    pub async fn collect_finalized_tasks_once(
        registry: &SharedRegistry,
        reader: &ChainReaderVariant,
        config: &AggregatorConfig,
    ) -> Result<Option<EvictStats>> {
        info!("cleaning finalized tasks from registry");

        let old_task_hash = match reader
            .get_old_task_hash(
                config.garbage_collector_tasks_age(),
                config.garbage_collector_tasks_interval,
            )
            .await
        {
            Ok(hash) => hash,
            Err(e) => {
                error!("error getting old task hash, skipping this garbage collect: {e}");
                return Ok(None);
            }
        };

        let Some(hash) = old_task_hash else {
            warn!("no old tasks found");
            return Ok(None);
        };

        let mut reg = registry.lock().await;
        let Some(index) = reg.index_of(&hash) else {
            warn!(batch_identifier = %hash, "old task hash not tracked, skipping");
            return Ok(None);
        };

        info!(task_index = index, "old task found");
        let stats = reg.evict(index);
        info!(
            evicted = stats.evicted,
            skipped = stats.skipped,
            "done cleaning finalized tasks from registry"
        );

        Ok(Some(stats))
    }
}
