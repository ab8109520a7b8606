//! Deployment API collaborator

use crate::error::DeployerError;
use async_trait::async_trait;
use blueprint_types::{ComponentKind, RefId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for creating one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentPayload {
    pub kind: ComponentKind,
    pub ref_id: RefId,
    pub body: Value,
}

/// Connection details of the CA an identity is registered or enrolled with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaConnection {
    pub ca_url: String,
    pub ca_name: String,
    pub ca_tls_cert: String,
}

/// Registration of a new identity by a registrar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(flatten)]
    pub ca: CaConnection,
    pub registrar_id: String,
    pub registrar_secret: String,
    pub enroll_id: String,
    pub enroll_secret: String,
    pub identity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_enrollments: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Value>,
}

/// Enrollment of an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollRequest {
    #[serde(flatten)]
    pub ca: CaConnection,
    pub enroll_id: String,
    pub enroll_secret: String,
}

/// Certificate material returned by an enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub cert: String,
    pub private_key: String,
    #[serde(default)]
    pub root_certs: Vec<String>,
}

/// The external service that creates and destroys infrastructure.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Create a component. The response is the provisioned record, or an
    /// array of records for clustered components.
    async fn provision(&self, payload: &ComponentPayload) -> Result<Value, DeployerError>;

    /// Register an identity with its CA.
    async fn register_identity(&self, request: &RegisterRequest) -> Result<Value, DeployerError>;

    /// Enroll an identity and return its certificate material.
    async fn enroll_identity(&self, request: &EnrollRequest) -> Result<Enrollment, DeployerError>;

    /// Delete every component carrying `tag`.
    async fn bulk_deprovision(&self, tag: &str) -> Result<(), DeployerError>;
}
