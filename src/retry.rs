use serde::Serialize;
use std::time::Duration;

use crate::llm_providers::{GenerationBackend, ProviderError};
use crate::log_provider_attempt;
use crate::prompt::Prompt;

/// Per-provider retry and backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first
    pub max_tries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub busy_wait_cap: Duration,
    /// Wait used when a loading backend gives no estimate
    pub default_busy_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 6,
            base_delay: Duration::from_secs(2),
            multiplier: 1.5,
            busy_wait_cap: Duration::from_secs(10),
            default_busy_wait: Duration::from_secs(6),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    /// Non-retryable failure; stop immediately
    Abort,
    /// Retryable failure but no tries left
    Exhausted,
}

/// Backoff state for one provider within one reading
#[derive(Debug, Clone)]
pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    tries: u32,
    backoff: Duration,
}

impl<'a> RetryState<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            tries: 0,
            backoff: policy.base_delay,
        }
    }

    pub fn tries(&self) -> u32 {
        self.tries
    }

    pub fn record_attempt(&mut self) -> u32 {
        self.tries += 1;
        self.tries
    }

    /// Decide what to do after the latest attempt failed with `error`
    pub fn on_failure(&mut self, error: &ProviderError) -> RetryDecision {
        if matches!(error, ProviderError::NonRetryable { .. }) {
            return RetryDecision::Abort;
        }
        if self.tries >= self.policy.max_tries {
            return RetryDecision::Exhausted;
        }

        match error {
            ProviderError::ServerBusy { wait_hint } => {
                // cold start: wait it out without touching the congestion backoff
                let wait = wait_hint.unwrap_or(self.policy.default_busy_wait);
                RetryDecision::RetryAfter(wait.min(self.policy.busy_wait_cap))
            }
            ProviderError::Transient { .. } | ProviderError::Network(_) => {
                let delay = self.backoff;
                self.backoff =
                    Duration::try_from_secs_f64(self.backoff.as_secs_f64() * self.policy.multiplier)
                        .unwrap_or(Duration::MAX);
                RetryDecision::RetryAfter(delay)
            }
            ProviderError::NonRetryable { .. } => RetryDecision::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptDisposition {
    Success,
    Retry,
    Abort,
    Exhausted,
}

/// One call to one provider, kept so an abandonment can be explained afterwards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub attempt: u32,
    pub outcome: String,
    pub status: Option<u16>,
    pub disposition: AttemptDisposition,
    pub delay_ms: Option<u64>,
}

/// Final word on a provider for one reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum ProviderVerdict {
    Accepted,
    Insufficient { chars: usize, min_chars: usize },
    Rejected { reason: String },
    Exhausted { reason: String },
    NotConfigured,
    DeadlineExceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderReport {
    pub provider: String,
    pub attempts: Vec<ProviderAttempt>,
    pub verdict: ProviderVerdict,
}

impl ProviderReport {
    pub fn skipped(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            attempts: Vec::new(),
            verdict: ProviderVerdict::NotConfigured,
        }
    }
}

fn error_status(error: &ProviderError) -> Option<u16> {
    match error {
        ProviderError::Transient { status } | ProviderError::NonRetryable { status, .. } => {
            Some(*status)
        }
        ProviderError::ServerBusy { .. } => Some(503),
        ProviderError::Network(_) => None,
    }
}

/// Drive one backend under `policy` until it yields text or is given up on.
///
/// Attempts are appended to `attempts` as they happen, so a caller that drops
/// this future mid-flight still holds the history up to that point.
pub async fn run_with_retry(
    backend: &dyn GenerationBackend,
    prompt: &Prompt,
    policy: &RetryPolicy,
    attempts: &mut Vec<ProviderAttempt>,
) -> Result<String, ProviderError> {
    let provider = backend.name().to_string();
    let mut state = RetryState::new(policy);

    loop {
        let attempt = state.record_attempt();
        let error = match backend.generate(prompt).await {
            Ok(text) => {
                log_provider_attempt!(
                    success,
                    provider = provider,
                    attempt = attempt,
                    response_chars = text.chars().count()
                );
                attempts.push(ProviderAttempt {
                    provider: provider.clone(),
                    attempt,
                    outcome: "success".to_string(),
                    status: Some(200),
                    disposition: AttemptDisposition::Success,
                    delay_ms: None,
                });
                return Ok(text);
            }
            Err(error) => error,
        };

        let decision = state.on_failure(&error);
        let (disposition, delay) = match decision {
            RetryDecision::RetryAfter(delay) => (AttemptDisposition::Retry, Some(delay)),
            RetryDecision::Abort => (AttemptDisposition::Abort, None),
            RetryDecision::Exhausted => (AttemptDisposition::Exhausted, None),
        };

        attempts.push(ProviderAttempt {
            provider: provider.clone(),
            attempt,
            outcome: error.kind().to_string(),
            status: error_status(&error),
            disposition,
            delay_ms: delay.map(|d| d.as_millis() as u64),
        });

        match delay {
            Some(delay) => {
                log_provider_attempt!(
                    retry,
                    provider = provider,
                    attempt = attempt,
                    error = error,
                    delay_ms = delay.as_millis() as u64
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                log_provider_attempt!(abandon, provider = provider, attempt = attempt, error = error);
                return Err(error);
            }
        }
    }
}
