//! Tracing initialization and the external task-trace reporter.

use alloy_primitives::B256;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request};
use serde_json::json;
use tracing::{debug, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize telemetry with tracing and logging.
pub fn init() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sigsmith=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Reports task lifecycle events to the external telemetry collector.
///
/// Every event is keyed by the batch merkle root and posted as
/// fire-and-forget JSON; a failed post is logged at warn and otherwise
/// ignored. An empty collector address disables reporting entirely.
pub struct Telemetry {
    endpoint: Option<String>,
    client: Client<HttpConnector>,
}

impl Telemetry {
    pub fn new(ip_port_address: &str) -> Self {
        let endpoint = if ip_port_address.is_empty() {
            None
        } else {
            Some(ip_port_address.to_string())
        };
        Self {
            endpoint,
            client: Client::new(),
        }
    }

    /// Open a trace for a newly observed batch.
    pub fn init_new_trace(&self, merkle_root: B256) {
        self.post(
            "initTaskTrace",
            json!({ "merkle_root": merkle_root.to_string() }),
        );
    }

    /// Mark the batch as having reached its stake quorum.
    pub fn log_quorum_reached(&self, merkle_root: B256) {
        self.post(
            "quorumReached",
            json!({ "merkle_root": merkle_root.to_string() }),
        );
    }

    /// Record a terminal error for the batch.
    pub fn log_task_error(&self, merkle_root: B256, error: &str) {
        self.post(
            "taskError",
            json!({ "merkle_root": merkle_root.to_string(), "error": error }),
        );
    }

    /// Record one step of the adaptive gas curve.
    pub fn task_set_gas_price(&self, merkle_root: B256, gas_price: &str) {
        self.post(
            "taskSetGasPrice",
            json!({ "merkle_root": merkle_root.to_string(), "gas_price": gas_price }),
        );
    }

    /// Record the submitted transaction. A send whose receipt could not be
    /// retrieved reports `"Unknown"` for both fields.
    pub fn task_sent_to_ethereum(&self, merkle_root: B256, tx_hash: &str, effective_gas_price: &str) {
        self.post(
            "taskSentToEthereum",
            json!({
                "merkle_root": merkle_root.to_string(),
                "tx_hash": tx_hash,
                "effective_gas_price": effective_gas_price,
            }),
        );
    }

    /// Close the trace opened by [`init_new_trace`], whatever the outcome.
    ///
    /// [`init_new_trace`]: Telemetry::init_new_trace
    pub fn finish_trace(&self, merkle_root: B256) {
        self.post(
            "finishTaskTrace",
            json!({ "merkle_root": merkle_root.to_string() }),
        );
    }

    fn post(&self, path: &'static str, body: serde_json::Value) {
        let Some(endpoint) = &self.endpoint else {
            debug!("telemetry disabled, dropping {} event", path);
            return;
        };

        let uri = format!("http://{}/api/{}", endpoint, path);
        let client = self.client.clone();

        tokio::spawn(async move {
            let request = Request::builder()
                .method(Method::POST)
                .uri(uri.as_str())
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()));

            let request = match request {
                Ok(req) => req,
                Err(e) => {
                    warn!("failed to build telemetry request for {}: {}", uri, e);
                    return;
                }
            };

            if let Err(e) = client.request(request).await {
                warn!("failed to post telemetry event to {}: {}", uri, e);
            }
        });
    }
}
