//! Deployment API over HTTP

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use blueprint_orchestrator::{
    ComponentPayload, Deployer, DeployerError, EnrollRequest, Enrollment, RegisterRequest,
};
use blueprint_types::ComponentKind;
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// [`Deployer`] speaking JSON to a deployment API.
///
/// Retries and per-call deadlines belong to the orchestrator; this client
/// only bounds each request by its own timeout.
pub struct HttpDeployer {
    client: Client,
    base_url: String,
}

impl HttpDeployer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/');
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<T, DeployerError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| DeployerError::transport(format!("unreadable response: {}", e)))
    }
}

/// Path segment for a component kind.
fn kind_segment(kind: ComponentKind) -> &'static str {
    match kind {
        ComponentKind::Ca => "ca",
        ComponentKind::EnrollmentIdentity => "enrollment-identity",
        ComponentKind::Msp => "msp",
        ComponentKind::MspExternal => "msp-external",
        ComponentKind::Orderer => "orderer",
        ComponentKind::Peer => "peer",
    }
}

fn transport(error: reqwest::Error) -> DeployerError {
    if error.is_timeout() {
        DeployerError::transport("request timed out")
    } else {
        DeployerError::transport(error.to_string())
    }
}

async fn check_status(response: Response) -> std::result::Result<Response, DeployerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(DeployerError::status(status.as_u16(), message))
}

#[async_trait]
impl Deployer for HttpDeployer {
    #[instrument(skip_all, fields(ref_id = %payload.ref_id, kind = %payload.kind))]
    async fn provision(&self, payload: &ComponentPayload) -> std::result::Result<Value, DeployerError> {
        self.post(&format!("/components/{}", kind_segment(payload.kind)), &payload.body)
            .await
    }

    #[instrument(skip_all, fields(enroll_id = %request.enroll_id))]
    async fn register_identity(
        &self,
        request: &RegisterRequest,
    ) -> std::result::Result<Value, DeployerError> {
        self.post("/identities/register", request).await
    }

    #[instrument(skip_all, fields(enroll_id = %request.enroll_id))]
    async fn enroll_identity(
        &self,
        request: &EnrollRequest,
    ) -> std::result::Result<Enrollment, DeployerError> {
        self.post("/identities/enroll", request).await
    }

    #[instrument(skip(self))]
    async fn bulk_deprovision(&self, tag: &str) -> std::result::Result<(), DeployerError> {
        let url = format!("{}/components/tags/{}", self.base_url, tag);
        let response = self.client.delete(&url).send().await.map_err(transport)?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_must_be_http() {
        assert!(HttpDeployer::new("ftp://deployer", Duration::from_secs(1)).is_err());
        let deployer = HttpDeployer::new("https://deployer.example.com/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(deployer.base_url(), "https://deployer.example.com/api");
    }

    #[test]
    fn test_kind_segments_are_distinct() {
        let mut segments: Vec<_> = ComponentKind::ALL.into_iter().map(kind_segment).collect();
        segments.sort();
        segments.dedup();
        assert_eq!(segments.len(), ComponentKind::ALL.len());
    }
}
