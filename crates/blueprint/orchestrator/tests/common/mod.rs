//! Scripted collaborators for provisioning tests.

#![allow(dead_code)]

use async_trait::async_trait;
use blueprint_orchestrator::{
    ComponentPayload, Deployer, DeployerError, EngineConfig, EnrollRequest, Enrollment,
    HealthProbe, InMemoryCredentialStore, InMemoryProgressStore, Orchestrator, ProbeError,
    ProbeResponse, RegisterRequest, TemplateService,
};
use blueprint_template::{InMemoryComponentStore, Validator};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Deployer
// ---------------------------------------------------------------------------

/// Answers provision calls per ref id from a script, repeating the last
/// scripted answer. Unscripted components get a record derived from their
/// payload name.
#[derive(Default)]
pub struct MockDeployer {
    scripts: Mutex<HashMap<String, VecDeque<Result<Value, DeployerError>>>>,
    provisioned: Mutex<Vec<ComponentPayload>>,
    registered: Mutex<Vec<RegisterRequest>>,
    enrolled: Mutex<Vec<EnrollRequest>>,
    deprovisioned: Mutex<Vec<String>>,
    rollback: Notify,
}

impl MockDeployer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, ref_id: &str, answers: Vec<Result<Value, DeployerError>>) {
        self.scripts.lock().insert(ref_id.to_string(), answers.into());
    }

    pub fn provisioned(&self) -> Vec<ComponentPayload> {
        self.provisioned.lock().clone()
    }

    /// Provision calls made for one component.
    pub fn calls_for(&self, ref_id: &str) -> usize {
        self.provisioned
            .lock()
            .iter()
            .filter(|p| p.ref_id.as_str() == ref_id)
            .count()
    }

    pub fn payload_for(&self, ref_id: &str) -> Option<Value> {
        self.provisioned
            .lock()
            .iter()
            .rev()
            .find(|p| p.ref_id.as_str() == ref_id)
            .map(|p| p.body.clone())
    }

    pub fn registered(&self) -> Vec<RegisterRequest> {
        self.registered.lock().clone()
    }

    pub fn enrolled(&self) -> Vec<EnrollRequest> {
        self.enrolled.lock().clone()
    }

    pub fn deprovisioned(&self) -> Vec<String> {
        self.deprovisioned.lock().clone()
    }

    /// Wait for the background rollback to reach the deployer.
    pub async fn wait_for_rollback(&self) {
        tokio::time::timeout(Duration::from_secs(60), self.rollback.notified())
            .await
            .expect("rollback was never requested");
    }
}

#[async_trait]
impl Deployer for MockDeployer {
    async fn provision(&self, payload: &ComponentPayload) -> Result<Value, DeployerError> {
        self.provisioned.lock().push(payload.clone());
        let mut scripts = self.scripts.lock();
        if let Some(answers) = scripts.get_mut(payload.ref_id.as_str()) {
            return if answers.len() > 1 {
                answers.pop_front().unwrap()
            } else {
                answers.front().cloned().unwrap()
            };
        }
        let name = payload.body["name"].as_str().unwrap_or("component").to_string();
        Ok(json!({
            "id": name,
            "api_url": format!("https://{name}.example.com:7054"),
            "operations_url": format!("https://{name}.example.com:9443"),
        }))
    }

    async fn register_identity(&self, request: &RegisterRequest) -> Result<Value, DeployerError> {
        self.registered.lock().push(request.clone());
        Ok(json!({"secret": request.enroll_secret}))
    }

    async fn enroll_identity(&self, request: &EnrollRequest) -> Result<Enrollment, DeployerError> {
        self.enrolled.lock().push(request.clone());
        Ok(Enrollment {
            cert: format!("CERT-{}", request.enroll_id),
            private_key: format!("KEY-{}", request.enroll_id),
            root_certs: vec!["ROOT".into()],
        })
    }

    async fn bulk_deprovision(&self, tag: &str) -> Result<(), DeployerError> {
        self.deprovisioned.lock().push(tag.to_string());
        self.rollback.notify_one();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Health probe
// ---------------------------------------------------------------------------

/// Answers by the first registered URL fragment the URL contains. URLs
/// matching nothing answer like a healthy CA.
#[derive(Default)]
pub struct MockProbe {
    routes: Mutex<Vec<(String, Result<ProbeResponse, ProbeError>)>>,
    calls: Mutex<Vec<String>>,
}

impl MockProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(&self, fragment: &str, answer: Result<ProbeResponse, ProbeError>) {
        self.routes.lock().push((fragment.to_string(), answer));
    }

    pub fn chain(&self, fragment: &str, chain: &str) {
        self.route(fragment, Ok(ca_info(chain)));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, fragment: &str) -> usize {
        self.calls.lock().iter().filter(|url| url.contains(fragment)).count()
    }
}

#[async_trait]
impl HealthProbe for MockProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        self.calls.lock().push(url.to_string());
        self.routes
            .lock()
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, answer)| answer.clone())
            .unwrap_or_else(|| Ok(ca_info("CHAIN")))
    }
}

pub fn ca_info(chain: &str) -> ProbeResponse {
    ProbeResponse {
        status: 200,
        body: json!({"result": {"CAChain": chain}}),
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub deployer: Arc<MockDeployer>,
    pub probe: Arc<MockProbe>,
    pub progress: Arc<InMemoryProgressStore>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub existing: Arc<InMemoryComponentStore>,
    pub service: TemplateService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let deployer = MockDeployer::new();
        let probe = MockProbe::new();
        let progress = Arc::new(InMemoryProgressStore::default());
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let existing = Arc::new(InMemoryComponentStore::new());

        let orchestrator = Orchestrator::builder()
            .with_deployer(deployer.clone())
            .with_health_probe(probe.clone())
            .with_progress_store(progress.clone())
            .with_credential_store(credentials.clone())
            .with_config(config)
            .build()
            .expect("all collaborators set");
        let service = TemplateService::new(
            Validator::new(existing.clone()),
            Arc::new(orchestrator),
            progress.clone(),
        );

        Self {
            deployer,
            probe,
            progress,
            credentials,
            existing,
            service,
        }
    }
}

pub fn template(components: Value) -> Value {
    json!({
        "api_version": "v1",
        "display_name": "org1 network",
        "create_components": components,
    })
}
