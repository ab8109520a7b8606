//! Ordered provisioning of a validated template
//!
//! Components are provisioned one at a time in declaration order. Each one
//! goes through `Building -> AwaitingHealth -> Healthy -> Recorded`, stopping
//! at `Failed` or `Unhealthy` when something goes wrong. Whatever the
//! deployer returns is written back into the lookup table before the next
//! component is built, so later references resolve to real values.
//!
//! A failing component aborts the run only when it is strict. On abort the
//! run is marked as failed, a debug record is persisted and, if the template
//! asks for it, every resource tagged with the run tag is deprovisioned in
//! the background.

use crate::cache::CertCache;
use crate::config::EngineConfig;
use crate::deployer::{CaConnection, ComponentPayload, Deployer, EnrollRequest, RegisterRequest};
use crate::error::{DeployerError, ProvisionError, Result};
use crate::probe::{Expectation, HealthProbe, HealthWaiter};
use crate::retry::RetryPolicy;
use crate::store::{CredentialRecord, CredentialStore, ProgressStore};
use blueprint_template::{build_body, resolve, run_tag, ValidationReport};
use blueprint_types::{
    ComponentKind, DebugRecord, EntryId, LookupTable, ProgressUpdate, RefId, RunStatus, TxId,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const DEFAULT_CA_NAME: &str = "ca";
const DEFAULT_TLSCA_NAME: &str = "tlsca";
const DEFAULT_IDENTITY_TYPE: &str = "client";

/// Where a component ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentPhase {
    Pending,
    Building,
    AwaitingHealth,
    Healthy,
    Unhealthy,
    Recorded,
    /// Building or the deployer call failed.
    Failed,
}

/// Result of provisioning one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentOutcome {
    pub ref_id: RefId,
    pub kind: ComponentKind,
    pub name: String,
    /// Id assigned by the deployer.
    pub component_id: Option<String>,
    pub phase: ComponentPhase,
    pub strict: bool,
    pub error: Option<String>,
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub tx_id: TxId,
    pub status: RunStatus,
    pub components: Vec<ComponentOutcome>,
    pub error: Option<String>,
    /// Lookup table as it stood when the run ended.
    pub lookup: Value,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Drives validated templates through the deployer.
pub struct Orchestrator {
    deployer: Arc<dyn Deployer>,
    progress: Arc<dyn ProgressStore>,
    credentials: Arc<dyn CredentialStore>,
    cert_cache: Arc<CertCache>,
    health: HealthWaiter,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Provision every component of a validated template.
    ///
    /// Never returns an error: failures end up in the progress store, the
    /// debug record and the returned report.
    #[instrument(skip_all, fields(tx_id = %report.tx_id))]
    pub async fn run(&self, report: ValidationReport, input: Value) -> RunReport {
        let ValidationReport {
            tx_id,
            template,
            mut table,
            component_ids,
            total_steps,
            ..
        } = report;

        info!(components = component_ids.len(), "Build started");
        self.record(
            &tx_id,
            ProgressUpdate::status(RunStatus::InProgress)
                .with_step(0)
                .with_message(format!("building {} component(s)", component_ids.len()))
                .with_snapshot(table.snapshot()),
        )
        .await;

        let mut outcomes = Vec::with_capacity(component_ids.len());
        let mut step = 0;
        for (spec, id) in template.create_components.iter().zip(component_ids) {
            let (Some(kind), Some(ref_id)) = (spec.kind, spec.ref_id.clone()) else {
                continue;
            };
            let mut outcome = ComponentOutcome {
                ref_id,
                kind,
                name: spec.display_name(),
                component_id: None,
                phase: ComponentPhase::Pending,
                strict: self.config.strictness.resolve(kind, spec.fail_build_on_error),
                error: None,
            };

            let result = self
                .provision(&tx_id, &mut table, id, spec.max_wait, &mut outcome)
                .await;

            step += 1;
            let message = match &result {
                Ok(()) => format!("added a new {}: {}", kind.label(), outcome.name),
                Err(_) => format!("failed to add {}: {}", kind.label(), outcome.name),
            };
            self.record(
                &tx_id,
                ProgressUpdate::default()
                    .with_step(step)
                    .with_message(message)
                    .with_snapshot(table.snapshot()),
            )
            .await;

            match result {
                Ok(()) => {
                    outcome.phase = ComponentPhase::Recorded;
                    outcomes.push(outcome);
                }
                Err(e) => {
                    warn!(
                        ref_id = %outcome.ref_id,
                        strict = outcome.strict,
                        error = %e,
                        "Component failed"
                    );
                    outcome.error = Some(e.to_string());
                    let strict = outcome.strict;
                    outcomes.push(outcome);
                    if strict {
                        return self
                            .fail(tx_id, template.delete_all_on_failure, input, &table, outcomes, e)
                            .await;
                    }
                }
            }
        }

        tokio::time::sleep(self.config.settle_delay()).await;
        self.record(
            &tx_id,
            ProgressUpdate::status(RunStatus::Success)
                .with_step(total_steps)
                .with_message("build complete")
                .with_snapshot(table.snapshot()),
        )
        .await;
        self.save_debug(tx_id, RunStatus::Success, input, &table, None)
            .await;
        info!("Build complete");

        RunReport {
            tx_id,
            status: RunStatus::Success,
            components: outcomes,
            error: None,
            lookup: table.snapshot(),
        }
    }

    #[instrument(skip_all, fields(ref_id = %outcome.ref_id, kind = %outcome.kind))]
    async fn provision(
        &self,
        tx_id: &TxId,
        table: &mut LookupTable,
        id: EntryId,
        budget: Option<Duration>,
        outcome: &mut ComponentOutcome,
    ) -> Result<()> {
        outcome.phase = ComponentPhase::Building;
        let body = build_body(table, id, tx_id).map_err(|e| {
            outcome.phase = ComponentPhase::Failed;
            ProvisionError::from(e)
        })?;
        if let Some(name) = body.get("display_name").and_then(Value::as_str) {
            outcome.name = name.to_string();
        }

        let ref_id = outcome.ref_id.clone();
        if outcome.kind == ComponentKind::EnrollmentIdentity {
            let enroll_id = self
                .enroll(tx_id, table, id, &ref_id, &body)
                .await
                .map_err(|e| {
                    outcome.phase = ComponentPhase::Failed;
                    e
                })?;
            outcome.component_id = Some(enroll_id);
            return Ok(());
        }

        let payload = ComponentPayload {
            kind: outcome.kind,
            ref_id: ref_id.clone(),
            body,
        };
        let response = self
            .deployer_policy()
            .run(|_| self.call(self.deployer.provision(&payload)))
            .await
            .map_err(|e| {
                outcome.phase = ComponentPhase::Failed;
                ProvisionError::from(e)
            })?;
        let component_id = write_back(table, id, &ref_id, response).map_err(|e| {
            outcome.phase = ComponentPhase::Failed;
            e
        })?;
        info!(component_id = %component_id, "Component provisioned");
        outcome.component_id = Some(component_id);

        outcome.phase = ComponentPhase::AwaitingHealth;
        if let Err(e) = self.await_health(table, id, outcome.kind, budget).await {
            outcome.phase = ComponentPhase::Unhealthy;
            return Err(e);
        }
        outcome.phase = ComponentPhase::Healthy;
        Ok(())
    }

    /// Wait for a provisioned component and record what its health
    /// endpoint reports.
    async fn await_health(
        &self,
        table: &mut LookupTable,
        id: EntryId,
        kind: ComponentKind,
        budget: Option<Duration>,
    ) -> Result<()> {
        match kind {
            ComponentKind::Ca => {
                let Some(api_url) = entry_str(table, id, "api_url")? else {
                    return Ok(());
                };
                let ca_name = entry_str(table, id, "ca_name")?
                    .unwrap_or_else(|| DEFAULT_CA_NAME.to_string());
                let tlsca_name = entry_str(table, id, "tlsca_name")?
                    .unwrap_or_else(|| DEFAULT_TLSCA_NAME.to_string());

                for (name, field) in [(ca_name, "root_cert"), (tlsca_name, "tls_root_cert")] {
                    let url = cainfo_url(&api_url, &name);
                    let response = self
                        .health
                        .wait(Some(&url), budget, Expectation::CaChain)
                        .await?;
                    let chain = response.as_ref().and_then(|r| r.ca_chain());
                    if let (Some(chain), Some(entry)) = (chain, table.get_mut(id)) {
                        entry.set_field(field, Value::String(chain.to_string()));
                    }
                }
                Ok(())
            }
            ComponentKind::Orderer | ComponentKind::Peer => {
                let base = match entry_str(table, id, "operations_url")? {
                    Some(url) => Some(url),
                    None => entry_str(table, id, "api_url")?,
                };
                let url = base.map(|base| format!("{}/healthz", base.trim_end_matches('/')));
                self.health
                    .wait(url.as_deref(), budget, Expectation::Reachable)
                    .await?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Register (optionally) and enroll an identity, then store its
    /// credentials. Returns the enroll id.
    async fn enroll(
        &self,
        tx_id: &TxId,
        table: &mut LookupTable,
        id: EntryId,
        ref_id: &RefId,
        body: &Value,
    ) -> Result<String> {
        let required = |field: &'static str| {
            body_str(body, field).ok_or_else(|| ProvisionError::MissingField {
                ref_id: ref_id.to_string(),
                field,
            })
        };
        let ca_url = required("ca_url")?;
        let enroll_id = required("enroll_id")?;
        let enroll_secret = required("enroll_secret")?;
        let ca_name = body_str(body, "ca_name").unwrap_or_else(|| DEFAULT_CA_NAME.to_string());
        let ca_tls_cert = match body_str(body, "ca_tls_cert") {
            Some(cert) => cert,
            None => self.ca_tls_cert(&ca_url, &ca_name).await?,
        };
        let ca = CaConnection {
            ca_url: ca_url.clone(),
            ca_name: ca_name.clone(),
            ca_tls_cert,
        };

        if let Some(register) = body.get("register").filter(|r| r.is_object()) {
            let request = RegisterRequest {
                ca: ca.clone(),
                registrar_id: body_str(register, "registrar_id").ok_or_else(|| {
                    ProvisionError::MissingField {
                        ref_id: ref_id.to_string(),
                        field: "registrar_id",
                    }
                })?,
                registrar_secret: body_str(register, "registrar_secret").ok_or_else(|| {
                    ProvisionError::MissingField {
                        ref_id: ref_id.to_string(),
                        field: "registrar_secret",
                    }
                })?,
                enroll_id: enroll_id.clone(),
                enroll_secret: enroll_secret.clone(),
                identity_type: body_str(register, "identity_type")
                    .unwrap_or_else(|| DEFAULT_IDENTITY_TYPE.to_string()),
                affiliation: body_str(register, "affiliation"),
                max_enrollments: register.get("max_enrollments").and_then(Value::as_i64),
                attrs: register.get("attrs").filter(|a| !a.is_null()).cloned(),
            };
            self.deployer_policy()
                .run(|_| self.call(self.deployer.register_identity(&request)))
                .await?;
            info!(enroll_id = %enroll_id, "Identity registered");
        }

        let request = EnrollRequest {
            ca,
            enroll_id: enroll_id.clone(),
            enroll_secret,
        };
        let enrollment = self
            .deployer_policy()
            .run(|_| self.call(self.deployer.enroll_identity(&request)))
            .await?;

        let display_name = body_str(body, "display_name").unwrap_or_else(|| enroll_id.clone());
        let doc_id = self
            .credentials
            .save(CredentialRecord {
                tx_id: *tx_id,
                ref_id: ref_id.clone(),
                display_name: display_name.clone(),
                enroll_id: enroll_id.clone(),
                ca_url: ca_url.clone(),
                cert: enrollment.cert.clone(),
                private_key: enrollment.private_key.clone(),
                root_certs: enrollment.root_certs.clone(),
                created_at: Utc::now(),
            })
            .await?;
        info!(enroll_id = %enroll_id, doc_id = %doc_id, "Identity enrolled");

        let record = json!({
            "id": enroll_id,
            "display_name": display_name,
            "enroll_id": enroll_id,
            "ca_url": ca_url,
            "ca_name": ca_name,
            "cert": enrollment.cert,
            "private_key": enrollment.private_key,
            "root_certs": enrollment.root_certs,
            "doc_id": doc_id,
        });
        if let Value::Object(record) = record {
            table.merge_record(id, &record);
        }
        Ok(enroll_id)
    }

    /// TLS certificate of a CA, read from `cainfo` once and cached.
    async fn ca_tls_cert(&self, ca_url: &str, ca_name: &str) -> Result<String> {
        let url = cainfo_url(ca_url, ca_name);
        self.cert_cache
            .get_or_fetch(&url, || async {
                let response = self.health.probe_once(&url).await.map_err(|e| {
                    ProvisionError::CaInfo {
                        url: url.clone(),
                        reason: e.to_string(),
                    }
                })?;
                match response.ca_chain() {
                    Some(chain) if response.is_success() => Ok(chain.to_string()),
                    _ => Err(ProvisionError::CaInfo {
                        url: url.clone(),
                        reason: format!("status {} without result.CAChain", response.status),
                    }),
                }
            })
            .await
    }

    fn deployer_policy(&self) -> RetryPolicy {
        RetryPolicy::for_deployer(&self.config.deployer)
    }

    /// Bound a deployer call by the per-call timeout.
    async fn call<T>(
        &self,
        request: impl Future<Output = std::result::Result<T, DeployerError>>,
    ) -> std::result::Result<T, DeployerError> {
        let timeout = self.config.deployer.timeout();
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(DeployerError::transport(format!(
                "no answer within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn fail(
        &self,
        tx_id: TxId,
        delete_all_on_failure: bool,
        input: Value,
        table: &LookupTable,
        outcomes: Vec<ComponentOutcome>,
        cause: ProvisionError,
    ) -> RunReport {
        let message = cause.to_string();
        error!(error = %message, "Build failed");

        if delete_all_on_failure {
            let deployer = self.deployer.clone();
            let tag = run_tag(&tx_id);
            info!(tag = %tag, "Deprovisioning everything built by this run");
            tokio::spawn(async move {
                match deployer.bulk_deprovision(&tag).await {
                    Ok(()) => info!(tag = %tag, "Rollback complete"),
                    Err(e) => warn!(tag = %tag, error = %e, "Rollback failed"),
                }
            });
        }

        self.record(
            &tx_id,
            ProgressUpdate::status(RunStatus::Error)
                .with_message(format!("build failed: {}", message))
                .with_snapshot(table.snapshot()),
        )
        .await;
        self.save_debug(tx_id, RunStatus::Error, input, table, Some(message.clone()))
            .await;

        RunReport {
            tx_id,
            status: RunStatus::Error,
            components: outcomes,
            error: Some(message),
            lookup: table.snapshot(),
        }
    }

    async fn record(&self, tx_id: &TxId, update: ProgressUpdate) {
        if let Err(e) = self.progress.update(tx_id, update).await {
            warn!(error = %e, "Failed to record progress");
        }
    }

    async fn save_debug(
        &self,
        tx_id: TxId,
        outcome: RunStatus,
        input: Value,
        table: &LookupTable,
        error: Option<String>,
    ) {
        let record = DebugRecord {
            tx_id,
            outcome,
            input_template: input,
            lookup: table.snapshot(),
            error,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.progress.save_debug(record).await {
            warn!(error = %e, "Failed to save debug record");
        }
    }
}

/// Builder for [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    deployer: Option<Arc<dyn Deployer>>,
    probe: Option<Arc<dyn HealthProbe>>,
    progress: Option<Arc<dyn ProgressStore>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    cert_cache: Option<Arc<CertCache>>,
    config: Option<EngineConfig>,
}

impl OrchestratorBuilder {
    pub fn with_deployer(mut self, deployer: Arc<dyn Deployer>) -> Self {
        self.deployer = Some(deployer);
        self
    }

    pub fn with_health_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_progress_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.progress = Some(store);
        self
    }

    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Share a certificate cache between orchestrators. A private one is
    /// created from the configuration otherwise.
    pub fn with_cert_cache(mut self, cache: Arc<CertCache>) -> Self {
        self.cert_cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let deployer = self
            .deployer
            .ok_or(ProvisionError::MissingCollaborator("deployer"))?;
        let probe = self
            .probe
            .ok_or(ProvisionError::MissingCollaborator("health probe"))?;
        let progress = self
            .progress
            .ok_or(ProvisionError::MissingCollaborator("progress store"))?;
        let credentials = self
            .credentials
            .ok_or(ProvisionError::MissingCollaborator("credential store"))?;
        let config = self.config.unwrap_or_default();
        let cert_cache = self
            .cert_cache
            .unwrap_or_else(|| Arc::new(CertCache::from_config(&config.cert_cache)));

        Ok(Orchestrator {
            deployer,
            progress,
            credentials,
            cert_cache,
            health: HealthWaiter::new(probe, config.health.clone()),
            config,
        })
    }
}

/// Copy a deployer response into the entry and return the component id.
///
/// An array response (clustered components) is kept under `bulk` and its
/// first element supplies the entry's fields.
pub fn write_back(
    table: &mut LookupTable,
    id: EntryId,
    ref_id: &RefId,
    response: Value,
) -> Result<String> {
    let missing_id = || ProvisionError::MissingId {
        ref_id: ref_id.to_string(),
    };
    let (record, bulk) = match response {
        Value::Array(items) => {
            let first = items.first().and_then(Value::as_object).cloned();
            (first, Some(Value::Array(items)))
        }
        Value::Object(map) => (Some(map), None),
        _ => (None, None),
    };
    let mut record: Map<String, Value> = record.ok_or_else(missing_id)?;
    let component_id = record
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(missing_id)?;

    let endpoint = record
        .get("api_url")
        .and_then(Value::as_str)
        .and_then(split_url);
    if let Some((protocol, host, port)) = endpoint {
        record.entry("api_protocol").or_insert(Value::String(protocol));
        record.entry("api_host").or_insert(Value::String(host));
        record.entry("api_port").or_insert(json!(port));
    }

    table.merge_record(id, &record);
    if let (Some(bulk), Some(entry)) = (bulk, table.get_mut(id)) {
        entry.set_field("bulk", bulk);
    }
    Ok(component_id)
}

/// Split `https://host:7054/path` into protocol, host and port. The port
/// defaults from the protocol when absent.
pub fn split_url(url: &str) -> Option<(String, String, u16)> {
    let (protocol, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?']).next()?;
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (
            authority,
            match protocol {
                "https" | "grpcs" => 443,
                "http" | "grpc" => 80,
                _ => return None,
            },
        ),
    };
    if host.is_empty() {
        return None;
    }
    Some((protocol.to_string(), host.to_string(), port))
}

fn cainfo_url(api_url: &str, ca_name: &str) -> String {
    format!("{}/cainfo?ca={}", api_url.trim_end_matches('/'), ca_name)
}

fn body_str(body: &Value, field: &str) -> Option<String> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A string field of an entry, references followed.
fn entry_str(table: &LookupTable, id: EntryId, field: &str) -> Result<Option<String>> {
    let Some(entry) = table.get(id) else {
        return Ok(None);
    };
    let value = resolve::resolve_field(table, entry, field).map_err(blueprint_template::BuildError::from)?;
    Ok(value.as_str().filter(|s| !s.is_empty()).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use blueprint_types::Entry;
    use std::collections::BTreeMap;

    fn table_with_peer() -> (LookupTable, EntryId) {
        let mut table = LookupTable::new();
        let id = table
            .insert(Entry::declared(
                RefId::new("$p1"),
                Some(ComponentKind::Peer),
                BTreeMap::new(),
            ))
            .unwrap();
        (table, id)
    }

    #[test]
    fn test_split_url() {
        assert_eq!(
            split_url("https://peer1.example.com:7051"),
            Some(("https".into(), "peer1.example.com".into(), 7051))
        );
        assert_eq!(
            split_url("http://ca.example.com/path?x=1"),
            Some(("http".into(), "ca.example.com".into(), 80))
        );
        assert_eq!(split_url("not a url"), None);
        assert_eq!(split_url("https://host:notaport"), None);
    }

    #[test]
    fn test_write_back_derives_endpoint_fields() {
        let (mut table, id) = table_with_peer();
        let response = json!({"id": "peer1", "api_url": "grpcs://peer1.example.com:7051"});
        let component_id = write_back(&mut table, id, &RefId::new("$p1"), response).unwrap();

        assert_eq!(component_id, "peer1");
        let entry = table.get(id).unwrap();
        assert_eq!(entry.literal_str("api_protocol"), Some("grpcs"));
        assert_eq!(entry.literal_str("api_host"), Some("peer1.example.com"));
        assert_eq!(entry.field("api_port").and_then(|v| v.as_literal()), Some(&json!(7051)));
    }

    #[test]
    fn test_write_back_keeps_bulk_response() {
        let (mut table, id) = table_with_peer();
        let response = json!([
            {"id": "os1", "api_url": "grpcs://os1:7050"},
            {"id": "os2", "api_url": "grpcs://os2:7050"},
        ]);
        let component_id = write_back(&mut table, id, &RefId::new("$p1"), response.clone()).unwrap();

        assert_eq!(component_id, "os1");
        let entry = table.get(id).unwrap();
        assert_eq!(entry.literal_str("api_host"), Some("os1"));
        assert_eq!(entry.field("bulk").and_then(|v| v.as_literal()), Some(&response));
    }

    #[test]
    fn test_write_back_requires_string_id() {
        let (mut table, id) = table_with_peer();
        for response in [json!({"id": 7}), json!([]), json!("peer1"), json!({})] {
            let err = write_back(&mut table, id, &RefId::new("$p1"), response).unwrap_err();
            assert!(matches!(err, ProvisionError::MissingId { .. }));
        }
    }
}
