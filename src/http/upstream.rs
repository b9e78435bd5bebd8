//! Outbound HTTP client for backend calls.
//!
//! Every call is bounded by the configured upstream timeout; the connector
//! carries its own, shorter connect timeout.

use std::time::Duration;

use axum::{body::Body, http::Request};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::TimeoutConfig;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("connection to backend failed: {0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),
}

impl UpstreamError {
    /// Label used for the upstream failure metric.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Connect(_) => "connect",
            UpstreamError::Timeout(_) => "timeout",
        }
    }
}

/// Shared client for all backend services.
#[derive(Clone, Debug)]
pub struct Upstream {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl Upstream {
    pub fn new(config: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.connect_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            timeout: Duration::from_millis(config.upstream_ms),
        }
    }

    /// Send `request` and wait for the response head within the timeout.
    pub async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Incoming>, UpstreamError> {
        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        }
    }
}
