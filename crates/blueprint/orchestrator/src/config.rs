//! Engine configuration
//!
//! Durations are kept as millisecond integers so the configuration loads
//! cleanly from files and environment variables; accessors return
//! [`Duration`]s.

use blueprint_types::ComponentKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for validation-to-provisioning runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deployer call policy
    #[serde(default)]
    pub deployer: DeployerConfig,

    /// Health polling policy
    #[serde(default)]
    pub health: HealthConfig,

    /// CA certificate cache
    #[serde(default)]
    pub cert_cache: CertCacheConfig,

    /// Whether a failed component of each kind aborts the run
    #[serde(default)]
    pub strictness: StrictnessDefaults,

    /// Pause before a successful run is reported complete
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deployer: DeployerConfig::default(),
            health: HealthConfig::default(),
            cert_cache: CertCacheConfig::default(),
            strictness: StrictnessDefaults::default(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

impl EngineConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Upper bound on how long a run may take: every component's wait
    /// budget, the worst-case deployer retry time per component and the
    /// settle delay.
    pub fn estimated_timeout(&self, wait_budget: Duration, components: usize) -> Duration {
        let per_component = self.deployer.worst_case();
        wait_budget + per_component * u32::try_from(components).unwrap_or(u32::MAX) + self.settle_delay()
    }
}

/// Deployer call policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerConfig {
    #[serde(default = "default_deployer_attempts")]
    pub max_attempts: u32,

    /// Delay multiplied by the attempt number before the next try
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound of the random delay added to each backoff
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter_ms: u64,

    /// Timeout of a single deployer request
    #[serde(default = "default_deployer_timeout")]
    pub timeout_ms: u64,
}

impl Default for DeployerConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_deployer_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_jitter_ms: default_backoff_jitter(),
            timeout_ms: default_deployer_timeout(),
        }
    }
}

impl DeployerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Longest time one deployer call can take including every retry.
    pub fn worst_case(&self) -> Duration {
        let attempts = u64::from(self.max_attempts.max(1));
        let backoff: u64 = (1..attempts)
            .map(|attempt| self.backoff_base_ms * attempt + self.backoff_jitter_ms)
            .sum();
        Duration::from_millis(attempts * self.timeout_ms + backoff)
    }
}

/// Health polling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Delay before the second poll
    #[serde(default = "default_health_initial")]
    pub initial_delay_ms: u64,

    /// Added to the delay for every further poll
    #[serde(default = "default_health_step")]
    pub step_ms: u64,

    /// Share of the component budget the poll schedule may use
    #[serde(default = "default_budget_fraction")]
    pub budget_fraction: f64,

    #[serde(default = "default_health_max_attempts")]
    pub max_attempts: u32,

    /// Timeout of a single probe request
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_health_initial(),
            step_ms: default_health_step(),
            budget_fraction: default_budget_fraction(),
            max_attempts: default_health_max_attempts(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// CA certificate cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertCacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_cache_ttl")]
    pub ttl_ms: u64,
}

impl Default for CertCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_ms: default_cache_ttl(),
        }
    }
}

impl CertCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Whether a failure of a component of each kind aborts the run when the
/// component does not set `_fail_build_on_error` itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrictnessDefaults {
    #[serde(default)]
    pub ca: bool,
    #[serde(default)]
    pub enrollment_identity: bool,
    #[serde(default)]
    pub msp: bool,
    #[serde(default)]
    pub msp_external: bool,
    #[serde(default)]
    pub orderer: bool,
    #[serde(default)]
    pub peer: bool,
}

impl StrictnessDefaults {
    pub fn for_kind(&self, kind: ComponentKind) -> bool {
        match kind {
            ComponentKind::Ca => self.ca,
            ComponentKind::EnrollmentIdentity => self.enrollment_identity,
            ComponentKind::Msp => self.msp,
            ComponentKind::MspExternal => self.msp_external,
            ComponentKind::Orderer => self.orderer,
            ComponentKind::Peer => self.peer,
        }
    }

    /// Strictness of a component: its own flag wins over the kind default.
    pub fn resolve(&self, kind: ComponentKind, explicit: Option<bool>) -> bool {
        explicit.unwrap_or_else(|| self.for_kind(kind))
    }
}

// Default value helpers
fn default_settle_delay() -> u64 {
    5_000
}

fn default_deployer_attempts() -> u32 {
    2
}

fn default_backoff_base() -> u64 {
    10_000
}

fn default_backoff_jitter() -> u64 {
    5_000
}

fn default_deployer_timeout() -> u64 {
    90_000
}

fn default_health_initial() -> u64 {
    7_000
}

fn default_health_step() -> u64 {
    3_000
}

fn default_budget_fraction() -> f64 {
    0.8
}

fn default_health_max_attempts() -> u32 {
    100
}

fn default_probe_timeout() -> u64 {
    10_000
}

fn default_cache_capacity() -> usize {
    64
}

fn default_cache_ttl() -> u64 {
    30 * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.deployer.max_attempts, 2);
        assert_eq!(config.health.initial_delay_ms, 7_000);
        assert_eq!(config.settle_delay(), Duration::from_secs(5));
        assert!(ComponentKind::ALL
            .iter()
            .all(|kind| !config.strictness.for_kind(*kind)));
    }

    #[test]
    fn test_explicit_strictness_wins() {
        let defaults = StrictnessDefaults {
            peer: true,
            ..Default::default()
        };
        assert!(defaults.resolve(ComponentKind::Peer, None));
        assert!(!defaults.resolve(ComponentKind::Peer, Some(false)));
        assert!(defaults.resolve(ComponentKind::Ca, Some(true)));
        assert!(!defaults.resolve(ComponentKind::Ca, None));
    }

    #[test]
    fn test_worst_case_deployer_time() {
        let deployer = DeployerConfig {
            max_attempts: 2,
            backoff_base_ms: 10_000,
            backoff_jitter_ms: 5_000,
            timeout_ms: 1_000,
        };
        assert_eq!(deployer.worst_case(), Duration::from_millis(2_000 + 15_000));

        let config = EngineConfig {
            deployer,
            ..Default::default()
        };
        assert_eq!(
            config.estimated_timeout(Duration::from_secs(60), 2),
            Duration::from_millis(60_000 + 2 * 17_000 + 5_000)
        );
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"deployer": {"max_attempts": 3}, "strictness": {"ca": true}}"#)
                .unwrap();
        assert_eq!(config.deployer.max_attempts, 3);
        assert_eq!(config.deployer.backoff_base_ms, 10_000);
        assert!(config.strictness.ca);
        assert_eq!(config.settle_delay_ms, 5_000);
    }
}
