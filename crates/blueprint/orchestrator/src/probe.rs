//! Health probing of provisioned components
//!
//! A [`HealthWaiter`] polls a URL on the stepped schedule of
//! [`RetryPolicy::for_health`] until the answer satisfies an
//! [`Expectation`]. Probe timeouts, connection failures and unhealthy
//! answers all count as a failed poll; the last one is reported when the
//! budget runs out.

use crate::config::HealthConfig;
use crate::error::{HealthError, ProbeError};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Answer to a probe request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status: u16,
    /// Parsed JSON body, `null` when the body is not JSON.
    pub body: Value,
}

impl ProbeResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The base64 certificate chain a CA returns from `cainfo`.
    pub fn ca_chain(&self) -> Option<&str> {
        self.body
            .get("result")
            .and_then(|result| result.get("CAChain"))
            .and_then(Value::as_str)
    }
}

/// Issues health requests.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError>;
}

/// What counts as healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Any HTTP answer.
    Reachable,
    /// A 2xx answer carrying `result.CAChain`.
    CaChain,
}

impl Expectation {
    fn accepts(&self, response: &ProbeResponse) -> bool {
        match self {
            Expectation::Reachable => true,
            Expectation::CaChain => response.is_success() && response.ca_chain().is_some(),
        }
    }
}

/// Polls components until healthy or out of budget.
pub struct HealthWaiter {
    probe: Arc<dyn HealthProbe>,
    config: HealthConfig,
}

impl HealthWaiter {
    pub fn new(probe: Arc<dyn HealthProbe>, config: HealthConfig) -> Self {
        Self { probe, config }
    }

    /// Single probe request bounded by the probe timeout.
    pub async fn probe_once(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        match tokio::time::timeout(self.config.probe_timeout(), self.probe.get(url)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout),
        }
    }

    /// Wait until `url` satisfies `expect`.
    ///
    /// Without a URL or a non-zero budget there is nothing to wait for and
    /// `Ok(None)` is returned immediately.
    #[instrument(skip(self))]
    pub async fn wait(
        &self,
        url: Option<&str>,
        budget: Option<Duration>,
        expect: Expectation,
    ) -> Result<Option<ProbeResponse>, HealthError> {
        let (Some(url), Some(budget)) = (url, budget.filter(|b| !b.is_zero())) else {
            debug!("No health URL or budget, skipping wait");
            return Ok(None);
        };

        let policy = RetryPolicy::for_health(&self.config, budget);
        let response = policy
            .run(|attempt| async move {
                debug!(attempt = attempt, "Polling health");
                let response = self
                    .probe_once(url)
                    .await
                    .map_err(|e| HealthError::from_probe(url, e))?;
                if expect.accepts(&response) {
                    Ok(response)
                } else {
                    Err(HealthError::Unhealthy {
                        url: url.to_string(),
                        status: response.status,
                    })
                }
            })
            .await?;

        info!(status = response.status, "Component healthy");
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;

    /// Replays scripted answers, repeating the last one.
    struct Scripted {
        answers: Mutex<VecDeque<Result<ProbeResponse, ProbeError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<ProbeResponse, ProbeError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl HealthProbe for Scripted {
        async fn get(&self, _url: &str) -> Result<ProbeResponse, ProbeError> {
            *self.calls.lock() += 1;
            let mut answers = self.answers.lock();
            if answers.len() > 1 {
                answers.pop_front().unwrap()
            } else {
                answers.front().cloned().unwrap()
            }
        }
    }

    fn response(status: u16, body: Value) -> Result<ProbeResponse, ProbeError> {
        Ok(ProbeResponse { status, body })
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_url_or_budget_is_a_no_op() {
        let probe = Scripted::new(vec![Err(ProbeError::Timeout)]);
        let waiter = HealthWaiter::new(probe.clone(), HealthConfig::default());

        assert_eq!(waiter.wait(None, Some(Duration::from_secs(60)), Expectation::Reachable).await, Ok(None));
        assert_eq!(waiter.wait(Some("http://p"), None, Expectation::Reachable).await, Ok(None));
        assert_eq!(waiter.wait(Some("http://p"), Some(Duration::ZERO), Expectation::CaChain).await, Ok(None));
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ca_needs_chain_in_success_body() {
        let probe = Scripted::new(vec![
            Err(ProbeError::Connect("refused".into())),
            response(200, json!({"result": {}})),
            response(503, json!({"result": {"CAChain": "TOO-EARLY"}})),
            response(200, json!({"result": {"CAChain": "CHAIN"}})),
        ]);
        let waiter = HealthWaiter::new(probe.clone(), HealthConfig::default());

        let healthy = waiter
            .wait(Some("https://ca/cainfo?ca=ca"), Some(Duration::from_secs(300)), Expectation::CaChain)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(healthy.ca_chain(), Some("CHAIN"));
        assert_eq!(probe.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_is_distinct_from_timeout() {
        let unhealthy = Scripted::new(vec![response(500, Value::Null)]);
        let waiter = HealthWaiter::new(unhealthy, HealthConfig::default());
        let err = waiter
            .wait(Some("https://ca/cainfo"), Some(Duration::from_secs(30)), Expectation::CaChain)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            HealthError::Unhealthy {
                url: "https://ca/cainfo".into(),
                status: 500
            }
        );

        let silent = Scripted::new(vec![Err(ProbeError::Timeout)]);
        let waiter = HealthWaiter::new(silent, HealthConfig::default());
        let err = waiter
            .wait(Some("https://peer/healthz"), Some(Duration::from_secs(30)), Expectation::Reachable)
            .await
            .unwrap_err();
        assert!(matches!(err, HealthError::TimedOut { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_count_follows_budget() {
        let probe = Scripted::new(vec![Err(ProbeError::Connect("refused".into()))]);
        let waiter = HealthWaiter::new(probe.clone(), HealthConfig::default());
        let started = tokio::time::Instant::now();

        let _ = waiter
            .wait(Some("https://peer/healthz"), Some(Duration::from_secs(60)), Expectation::Reachable)
            .await;

        assert_eq!(probe.calls(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(46));
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_answer_is_reachable() {
        let probe = Scripted::new(vec![response(404, Value::Null)]);
        let waiter = HealthWaiter::new(probe, HealthConfig::default());
        let answer = waiter
            .wait(Some("https://peer/healthz"), Some(Duration::from_secs(60)), Expectation::Reachable)
            .await
            .unwrap();
        assert_eq!(answer.map(|r| r.status), Some(404));
    }
}
