//! Prometheus metrics for the aggregator, served over HTTP.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use kanal::{bounded_async, AsyncReceiver};
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry,
    TextEncoder,
};
use tracing::info;

/// Metric handles plus the registry they are registered on.
pub struct Metrics {
    socket_addr: SocketAddr,
    registry: Registry,
    received_tasks: IntCounter,
    aggregated_responses: IntCounter,
    quorum_reached_latency: Histogram,
    respond_to_task_latency: Histogram,
}

impl Metrics {
    pub fn new(ip_port_address: &str) -> Result<Self> {
        let socket_addr = ip_port_address
            .parse()
            .unwrap_or_else(|_| "127.0.0.1:9091".parse().unwrap());

        let registry = Registry::new();

        let received_tasks = IntCounter::with_opts(Opts::new(
            "sigsmith_received_tasks_total",
            "Total batches admitted by the aggregator.",
        ))?;
        registry.register(Box::new(received_tasks.clone()))?;

        let aggregated_responses = IntCounter::with_opts(Opts::new(
            "sigsmith_aggregated_responses_total",
            "Total aggregated responses submitted on-chain.",
        ))?;
        registry.register(Box::new(aggregated_responses.clone()))?;

        let quorum_reached_latency = Histogram::with_opts(
            HistogramOpts::new(
                "sigsmith_task_quorum_reached_latency_seconds",
                "Time from batch admission until the stake quorum was reached.",
            )
            .buckets(exponential_buckets(0.5, 2.0, 14)?),
        )?;
        registry.register(Box::new(quorum_reached_latency.clone()))?;

        let respond_to_task_latency = Histogram::with_opts(
            HistogramOpts::new(
                "sigsmith_respond_to_task_latency_seconds",
                "Latency of a successful aggregated-response submission.",
            )
            .buckets(exponential_buckets(0.1, 2.0, 14)?),
        )?;
        registry.register(Box::new(respond_to_task_latency.clone()))?;

        Ok(Self {
            socket_addr,
            registry,
            received_tasks,
            aggregated_responses,
            quorum_reached_latency,
            respond_to_task_latency,
        })
    }

    pub fn inc_received_tasks(&self) {
        self.received_tasks.inc();
    }

    pub fn inc_aggregated_responses(&self) {
        self.aggregated_responses.inc();
    }

    pub fn observe_task_quorum_reached(&self, elapsed: Duration) {
        self.quorum_reached_latency.observe(elapsed.as_secs_f64());
    }

    pub fn observe_respond_to_task_latency(&self, elapsed: Duration) {
        self.respond_to_task_latency.observe(elapsed.as_secs_f64());
    }

    /// Counter values, for tests.
    pub fn received_tasks_count(&self) -> u64 {
        self.received_tasks.get()
    }

    pub fn aggregated_responses_count(&self) -> u64 {
        self.aggregated_responses.get()
    }

    /// Start the metrics HTTP server. The returned channel yields exactly
    /// one error if the server dies; the dispatcher treats that as fatal.
    pub fn start(&self) -> AsyncReceiver<anyhow::Error> {
        let (err_tx, err_rx) = bounded_async::<anyhow::Error>(1);
        let addr = self.socket_addr;
        let registry = self.registry.clone();

        tokio::spawn(async move {
            let result = async {
                let make_svc = make_service_fn(move |_conn| {
                    let registry = registry.clone();
                    async move {
                        Ok::<_, Infallible>(service_fn(move |req| {
                            Self::handle_request(req, registry.clone())
                        }))
                    }
                });

                let server = Server::try_bind(&addr)
                    .map_err(|e| anyhow!("failed to bind metrics server on {addr}: {e}"))?
                    .serve(make_svc);
                info!("metrics server listening on http://{}", addr);
                server
                    .await
                    .map_err(|e| anyhow!("metrics server error: {e}"))?;
                Err::<(), _>(anyhow!("metrics server exited unexpectedly"))
            }
            .await;

            if let Err(e) = result {
                let _ = err_tx.send(e).await;
            }
        });

        err_rx
    }

    async fn handle_request(
        req: Request<Body>,
        registry: Registry,
    ) -> Result<Response<Body>, Infallible> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/metrics") => {
                let metric_families = registry.gather();
                let mut buffer = Vec::new();
                let encoder = TextEncoder::new();
                match encoder.encode(&metric_families, &mut buffer) {
                    Ok(_) => Ok(Response::builder()
                        .status(StatusCode::OK)
                        .header("content-type", encoder.format_type())
                        .body(Body::from(buffer))
                        .unwrap()),
                    Err(e) => Ok(Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .body(Body::from(format!("encode error: {e}")))
                        .unwrap()),
                }
            }
            _ => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from(r#"{"error":"not_found"}"#))
                .unwrap()),
        }
    }
}
