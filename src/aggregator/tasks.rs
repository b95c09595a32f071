//! Async task orchestration with tokio::spawn around the core logic.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::future;
use futures_util::FutureExt;
use kanal::unbounded_async;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, span, Level};

use super::core::Aggregator;
use crate::bls::BlsServiceVariant;
use crate::chain::{ChainSubscriberVariant, ChainWriterVariant};
use crate::config::AggregatorConfig;
use crate::metrics::Metrics;
use crate::registry::TaskRegistry;
use crate::rpc::OperatorServer;
use crate::telemetry::Telemetry;
use crate::traits::{BlsAggregationService, ChainSubscriber};
use crate::types::NewBatchEvent;

// ==================== GENERIC TASK UTILITIES ====================

/// Render a panic payload for logging.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

/// Spawn a one-time task that runs once and completes.
fn spawn_oneshot_task<F, Fut>(name: &'static str, task_fn: F) -> JoinHandle<Result<()>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let span = span!(Level::INFO, "task", name = name);
        let _enter = span.enter();

        task_fn().await
    })
}

/// Spawn an interval task that sleeps `interval` between iterations,
/// starting with a sleep. Panics in one iteration are recovered and the
/// loop continues.
fn spawn_interval_task<F, Fut>(
    name: &'static str,
    interval: Duration,
    task_fn: F,
) -> JoinHandle<Result<()>>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send,
{
    tokio::spawn(async move {
        let span = span!(Level::INFO, "task", name = name);
        let _enter = span.enter();

        info!("running {} every {:?}", name, interval);
        loop {
            tokio::time::sleep(interval).await;

            match AssertUnwindSafe(task_fn()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("error in task {}: {}", name, e);
                }
                Err(payload) => {
                    error!("task {} recovered from panic: {}", name, panic_message(payload));
                }
            }
        }
    })
}

/// Wait on background tasks, surfacing the first failure or panic. Tasks
/// that finish cleanly are dropped from the watch; if every task finishes
/// cleanly this pends forever and shutdown is decided elsewhere.
async fn watch_tasks(mut handles: Vec<JoinHandle<Result<()>>>) -> Result<()> {
    while !handles.is_empty() {
        let (result, _index, rest) = future::select_all(handles).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(anyhow!("background task panicked: {e}")),
        }
        handles = rest;
    }
    future::pending().await
}

// ==================== DISPATCHER ====================

/// Serve the BLS response stream until shutdown.
///
/// Multiplexes the shutdown signal, the metrics server error channel
/// (fatal) and the response stream. Each response is handled in its own
/// task so a slow on-chain submission never stalls the next response; a
/// panicking handler is recovered and logged while the dispatcher keeps
/// serving.
#[allow(clippy::too_many_arguments)]
async fn serve_bls_responses(
    registry: Arc<tokio::sync::Mutex<TaskRegistry>>,
    subscriber: Arc<ChainSubscriberVariant>,
    writer: Arc<tokio::sync::Mutex<ChainWriterVariant>>,
    bls_service: Arc<BlsServiceVariant>,
    telemetry: Arc<Telemetry>,
    metrics: Arc<Metrics>,
    config: AggregatorConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let response_rx = bls_service.response_channel();

    // When metrics are disabled the error channel is a stub whose sender
    // is kept alive here so the select arm never fires.
    let (metrics_err_rx, _metrics_err_guard) = if config.enable_metrics {
        (metrics.start(), None)
    } else {
        let (stub_tx, stub_rx) = kanal::bounded_async::<anyhow::Error>(1);
        (stub_rx, Some(stub_tx))
    };

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("shutdown signal received, stopping response dispatcher");
                return Ok(());
            }
            err = metrics_err_rx.recv() => {
                return match err {
                    Ok(e) => Err(e.context("metrics server failed")),
                    Err(_) => Err(anyhow!("metrics error channel closed unexpectedly")),
                };
            }
            response = response_rx.recv() => {
                let response = match response {
                    Ok(response) => response,
                    Err(_) => {
                        info!("BLS response channel closed, stopping response dispatcher");
                        return Ok(());
                    }
                };

                info!(
                    task_index = response.task_index,
                    "received response from BLS aggregation service"
                );

                let registry = Arc::clone(&registry);
                let subscriber = Arc::clone(&subscriber);
                let writer = Arc::clone(&writer);
                let telemetry = Arc::clone(&telemetry);
                let metrics = Arc::clone(&metrics);
                let config = config.clone();

                tokio::spawn(async move {
                    let handler = Aggregator::handle_bls_response(
                        &registry,
                        &subscriber,
                        &writer,
                        &telemetry,
                        &metrics,
                        &config,
                        response,
                    );
                    match AssertUnwindSafe(handler).catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!("BLS response handler failed: {e:#}");
                        }
                        Err(payload) => {
                            error!(
                                "BLS response handler recovered from panic: {}",
                                panic_message(payload)
                            );
                        }
                    }
                });
            }
        }
    }
}

// ==================== RUN ====================

impl Aggregator {
    /// Run the aggregator: spawn the subscription, intake, garbage
    /// collector and operator server tasks, then serve the BLS response
    /// stream in the foreground until `shutdown_rx` fires or a background
    /// task fails fatally.
    pub async fn run(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        info!("starting aggregator");

        let Aggregator {
            subscriber,
            reader,
            writer,
            bls_service,
            registry,
            config,
            metrics,
            telemetry,
        } = self;

        let (batch_tx, batch_rx) = unbounded_async::<NewBatchEvent>();

        // === Batch subscription: forward chain announcements into the intake channel ===
        let subscription_handle = {
            let subscriber = Arc::clone(&subscriber);

            spawn_oneshot_task("batch_subscription", move || async move {
                info!("starting new-batch subscription: {}", subscriber.name());
                subscriber.subscribe_new_batches(batch_tx).await?;
                info!("new-batch subscription finished");
                Ok(())
            })
        };

        // === Task intake: admit announcements and register them with the BLS service ===
        let intake_handle = {
            let registry = Arc::clone(&registry);
            let bls_service = Arc::clone(&bls_service);
            let telemetry = Arc::clone(&telemetry);
            let metrics = Arc::clone(&metrics);
            let config = config.clone();

            tokio::spawn(async move {
                let span = span!(Level::INFO, "task", name = "task_intake");
                let _enter = span.enter();

                info!("starting task intake");
                while let Ok(event) = batch_rx.recv().await {
                    // A BLS initialization failure aborts the process: the
                    // batch would stay tracked but never complete.
                    Aggregator::add_new_task(
                        &registry,
                        &bls_service,
                        &telemetry,
                        &metrics,
                        &config,
                        &event,
                    )
                    .await?;
                }
                info!("task intake finished (subscription closed)");
                Ok(())
            })
        };

        // === Garbage collector: sweep finalized tasks out of the registry ===
        let gc_handle = {
            let registry = Arc::clone(&registry);
            let reader = Arc::clone(&reader);
            let config_clone = config.clone();

            spawn_interval_task(
                "garbage_collector",
                config.garbage_collector_period(),
                move || {
                    let registry = Arc::clone(&registry);
                    let reader = Arc::clone(&reader);
                    let config_clone = config_clone.clone();

                    async move {
                        Aggregator::collect_finalized_tasks_once(&registry, &reader, &config_clone)
                            .await
                            .map(|_| ())
                    }
                },
            )
        };

        // === Operator server: accept signed responses and forward to the BLS service ===
        let operator_handle = {
            let server = OperatorServer::new(
                config.operator_server_ip_port_address.clone(),
                Arc::clone(&bls_service),
            );

            spawn_oneshot_task("operator_server", move || async move { server.serve().await })
        };

        let background = vec![
            subscription_handle,
            intake_handle,
            gc_handle,
            operator_handle,
        ];

        tokio::select! {
            result = serve_bls_responses(
                registry,
                subscriber,
                writer,
                bls_service,
                telemetry,
                metrics,
                config,
                shutdown_rx,
            ) => result,
            result = watch_tasks(background) => result,
        }
    }
}
