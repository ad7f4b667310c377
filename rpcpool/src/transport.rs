use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

/// Hard per-call timeout against any upstream.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream unreachable: {0}")]
    Unreachable(String),
}

/// One JSON-RPC POST. The pool owns selection, accounting, and failover;
/// the transport only moves bytes, so tests can script it.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn post(&self, url: &str, body: Value) -> Result<Value, RpcError>;
}

pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, RpcError> {
        let http = Client::builder()
            .timeout(RPC_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self { http })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn post(&self, url: &str, body: Value) -> Result<Value, RpcError> {
        let resp = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json().await?)
    }
}
