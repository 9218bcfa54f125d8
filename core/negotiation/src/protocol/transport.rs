use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::CallbackConfig;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Callback [{address}] is not reachable. {reason}")]
    Request { address: String, reason: String },
}

#[derive(Clone, Debug)]
pub struct CallbackResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl CallbackResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// How protocol messages leave this connector. One implementation speaks
/// HTTP, the test harness routes posts straight into the peer's router.
#[async_trait]
pub trait CallbackTransport: Send + Sync {
    /// Posts `body` to `path` relative to the peer's callback `address`.
    /// A non-2xx answer is a regular response; only not reaching the peer
    /// at all is an error.
    async fn post(
        &self,
        address: &str,
        path: &str,
        body: Value,
    ) -> Result<CallbackResponse, TransportError>;
}

pub struct HttpCallbackTransport {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpCallbackTransport {
    pub fn new(config: &CallbackConfig) -> anyhow::Result<HttpCallbackTransport> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(HttpCallbackTransport {
            client,
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl CallbackTransport for HttpCallbackTransport {
    async fn post(
        &self,
        address: &str,
        path: &str,
        body: Value,
    ) -> Result<CallbackResponse, TransportError> {
        let url = format!("{}/{}", address.trim_end_matches('/'), path);
        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|error| TransportError::Request {
                address: url.clone(),
                reason: error.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await.ok();
        Ok(CallbackResponse { status, body })
    }
}
