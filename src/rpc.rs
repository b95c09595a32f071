//! Operator-facing HTTP server: accepts signed task responses and forwards
//! them to the BLS aggregation service. It never touches the task registry.
//!
//! # Protocol
//! - POST /signature - Accept a single SignedTaskResponse as JSON
//! - GET /health - Health check endpoint

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::bls::BlsServiceVariant;
use crate::traits::BlsAggregationService;
use crate::types::SignedTaskResponse;

pub struct OperatorServer {
    /// Address to bind the HTTP server to (e.g., "127.0.0.1:8090")
    bind_addr: String,
    /// Parsed socket address
    socket_addr: SocketAddr,
    /// Actual bound address (set after server starts)
    actual_addr: Arc<Mutex<Option<SocketAddr>>>,
    /// BLS aggregation service signatures are forwarded to
    bls_service: Arc<BlsServiceVariant>,
}

impl OperatorServer {
    pub fn new(bind_addr: String, bls_service: Arc<BlsServiceVariant>) -> Self {
        let socket_addr = bind_addr
            .parse()
            .unwrap_or_else(|_| "127.0.0.1:8090".parse().unwrap());

        Self {
            bind_addr,
            socket_addr,
            actual_addr: Arc::new(Mutex::new(None)),
            bls_service,
        }
    }

    /// Get the actual bound address (available after the server starts).
    pub async fn actual_addr(&self) -> Option<SocketAddr> {
        *self.actual_addr.lock().await
    }

    /// Bind and serve until the process exits. Bind failures are returned
    /// so the caller can treat them as fatal.
    pub async fn serve(&self) -> Result<()> {
        info!("starting operator server on {}", self.bind_addr);

        let bls_service = Arc::clone(&self.bls_service);
        let make_svc = make_service_fn(move |_conn| {
            let bls_service = Arc::clone(&bls_service);
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    Self::handle_request(req, Arc::clone(&bls_service))
                }))
            }
        });

        let server = Server::try_bind(&self.socket_addr)
            .map_err(|e| anyhow!("failed to bind operator server on {}: {e}", self.bind_addr))?
            .serve(make_svc);
        let addr = server.local_addr();

        {
            let mut actual_addr_guard = self.actual_addr.lock().await;
            *actual_addr_guard = Some(addr);
        }

        info!("operator server listening on http://{}", addr);

        server
            .await
            .map_err(|e| anyhow!("operator server error: {e}"))
    }

    /// Handle incoming HTTP requests.
    async fn handle_request(
        req: Request<Body>,
        bls_service: Arc<BlsServiceVariant>,
    ) -> Result<Response<Body>, Infallible> {
        let method = req.method();
        let path = req.uri().path();

        debug!("operator request: {} {}", method, path);

        match (method, path) {
            (&Method::GET, "/health") => Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Body::from(r#"{"status":"ok"}"#))
                .unwrap()),

            (&Method::POST, "/signature") => Self::handle_submit_signature(req, bls_service).await,

            _ => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(Body::from(r#"{"error":"not_found"}"#))
                .unwrap()),
        }
    }

    /// Forward one signed response to the BLS aggregation service.
    async fn handle_submit_signature(
        req: Request<Body>,
        bls_service: Arc<BlsServiceVariant>,
    ) -> Result<Response<Body>, Infallible> {
        let whole_body = match hyper::body::to_bytes(req.into_body()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to read signature request body: {}", e);
                return Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from(format!(
                        r#"{{"error":"invalid_body","message":"{}"}}"#,
                        e
                    )))
                    .unwrap());
            }
        };

        let signed: SignedTaskResponse = match serde_json::from_slice(&whole_body) {
            Ok(signed) => signed,
            Err(e) => {
                error!("failed to parse SignedTaskResponse: {}", e);
                return Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from(format!(
                        r#"{{"error":"invalid_json","message":"{}"}}"#,
                        e
                    )))
                    .unwrap());
            }
        };

        match bls_service
            .process_signature(signed.task_index, signed.operator_id, signed.signature)
            .await
        {
            Ok(_) => {
                debug!(task_index = signed.task_index, "signature forwarded");
                Ok(Response::builder()
                    .status(StatusCode::OK)
                    .body(Body::from(r#"{"status":"ok"}"#))
                    .unwrap())
            }
            Err(e) => {
                error!(
                    task_index = signed.task_index,
                    "BLS service rejected signature: {}", e
                );
                Ok(Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(Body::from(r#"{"error":"bls_service_error"}"#))
                    .unwrap())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{B256, U256};

    use super::*;
    use crate::bls::MockBlsService;
    use crate::types::G1Point;

    async fn start_test_server(bls_service: Arc<BlsServiceVariant>) -> (Arc<OperatorServer>, SocketAddr) {
        let server = Arc::new(OperatorServer::new(
            "127.0.0.1:0".to_string(),
            bls_service,
        ));

        let serve_handle = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = serve_handle.serve().await {
                error!("test operator server failed: {e}");
            }
        });

        // Give the server time to bind
        for _ in 0..50 {
            if let Some(addr) = server.actual_addr().await {
                return (server, addr);
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("operator server did not bind in time");
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let bls = Arc::new(BlsServiceVariant::Mock(MockBlsService::new()));
        let (_server, addr) = start_test_server(bls).await;

        let client = hyper::Client::new();
        let uri = format!("http://{}/health", addr);
        let response = client.get(uri.parse().unwrap()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_submit_signature_forwards_to_bls() {
        let mock = MockBlsService::new();
        let signatures = mock.get_signatures();
        assert!(signatures.is_empty());

        let bls = Arc::new(BlsServiceVariant::Mock(mock));
        let (_server, addr) = start_test_server(Arc::clone(&bls)).await;

        let signed = SignedTaskResponse {
            task_index: 3,
            operator_id: B256::repeat_byte(0xab),
            signature: G1Point {
                x: U256::from(1),
                y: U256::from(2),
            },
        };

        let client = hyper::Client::new();
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("http://{}/signature", addr))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&signed).unwrap()))
            .unwrap();

        let response = client.request(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let BlsServiceVariant::Mock(mock) = bls.as_ref() else {
            unreachable!()
        };
        let signatures = mock.get_signatures();
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].0, 3);
        assert_eq!(signatures[0].1, B256::repeat_byte(0xab));
    }

    #[tokio::test]
    async fn test_submit_signature_invalid_json() {
        let bls = Arc::new(BlsServiceVariant::Mock(MockBlsService::new()));
        let (_server, addr) = start_test_server(bls).await;

        let client = hyper::Client::new();
        let req = Request::builder()
            .method(Method::POST)
            .uri(format!("http://{}/signature", addr))
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();

        let response = client.request(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let bls = Arc::new(BlsServiceVariant::Mock(MockBlsService::new()));
        let (_server, addr) = start_test_server(bls).await;

        let client = hyper::Client::new();
        let uri = format!("http://{}/nonexistent", addr);
        let response = client.get(uri.parse().unwrap()).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
