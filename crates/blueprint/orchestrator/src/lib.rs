//! # Blueprint Orchestrator
//!
//! Provisions a validated template against a deployment API.
//!
//! ## Overview
//!
//! Components are built strictly in declaration order. After each one the
//! deployer's answer is written back into the lookup table, the component
//! is polled until healthy (or its wait budget runs out), and progress is
//! reported so clients can follow the run by polling.
//!
//! ## Key Components
//!
//! - [`TemplateService`]: validates a submission and starts the build
//! - [`Orchestrator`]: the provisioning loop, built with [`OrchestratorBuilder`]
//! - [`Deployer`], [`HealthProbe`], [`ProgressStore`], [`CredentialStore`]:
//!   the collaborators it drives
//! - [`RetryPolicy`]: bounded retries for deployer calls and health polls
//! - [`CertCache`]: shared cache of CA TLS certificates
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blueprint_orchestrator::{
//!     Deployer, HealthProbe, InMemoryCredentialStore, InMemoryProgressStore, Orchestrator,
//!     Submission, TemplateService,
//! };
//! use blueprint_template::{InMemoryComponentStore, Validator};
//!
//! # async fn example(deployer: Arc<dyn Deployer>, probe: Arc<dyn HealthProbe>) {
//! let progress = Arc::new(InMemoryProgressStore::default());
//! let orchestrator = Orchestrator::builder()
//!     .with_deployer(deployer)
//!     .with_health_probe(probe)
//!     .with_progress_store(progress.clone())
//!     .with_credential_store(Arc::new(InMemoryCredentialStore::new()))
//!     .build()
//!     .expect("all collaborators set");
//!
//! let service = TemplateService::new(
//!     Validator::new(Arc::new(InMemoryComponentStore::new())),
//!     Arc::new(orchestrator),
//!     progress,
//! );
//!
//! let template = serde_json::json!({ "api_version": "v1", "create_components": [] });
//! if let Ok(Submission::Accepted { poll_url, .. }) = service.submit(template, false).await {
//!     println!("follow the build at {poll_url}");
//! }
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cache;
pub mod config;
pub mod deployer;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod retry;
pub mod service;
pub mod store;

// Re-export main types
pub use cache::CertCache;
pub use config::{CertCacheConfig, DeployerConfig, EngineConfig, HealthConfig, StrictnessDefaults};
pub use deployer::{CaConnection, ComponentPayload, Deployer, EnrollRequest, Enrollment, RegisterRequest};
pub use error::{DeployerError, HealthError, ProbeError, ProvisionError, Result, Retryable};
pub use orchestrator::{
    ComponentOutcome, ComponentPhase, Orchestrator, OrchestratorBuilder, RunReport,
};
pub use probe::{Expectation, HealthProbe, HealthWaiter, ProbeResponse};
pub use retry::{Backoff, RetryPolicy};
pub use service::{Submission, TemplateService};
pub use store::{
    CredentialRecord, CredentialStore, InMemoryCredentialStore, InMemoryProgressStore,
    ProgressStore,
};
