//! Health probing over HTTP

use async_trait::async_trait;
use blueprint_orchestrator::{HealthProbe, ProbeError, ProbeResponse};
use reqwest::Client;
use serde_json::Value;

/// [`HealthProbe`] issuing plain GET requests.
///
/// The orchestrator bounds each probe with its own timeout; a reqwest
/// timeout configured on `client` is reported the same way.
pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpHealthProbe {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::Connect(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        // Non-JSON bodies still carry a status worth reporting.
        let body = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or(Value::Null),
            Err(_) => Value::Null,
        };
        Ok(ProbeResponse { status, body })
    }
}
