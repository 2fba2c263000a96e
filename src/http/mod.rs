//! Blocking HTTP helpers shared by the Ollama and chat-completions clients.


use anyhow::{Result, anyhow};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// `ureq` agent with one deadline covering connect, send and body read.
///
/// Non-2xx statuses come back as `ureq::Error::StatusCode`, which
/// [`RetryPolicy::run`] relies on.
#[inline]
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

enum Verdict {
    Retry,
    Fail,
}

fn judge(error: &ureq::Error) -> Verdict {
    match error {
        ureq::Error::StatusCode(status) if *status >= 500 => Verdict::Retry,
        ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_) => Verdict::Retry,
        _ => Verdict::Fail,
    }
}

fn describe(error: &ureq::Error) -> String {
    match error {
        ureq::Error::StatusCode(status) => format!("HTTP {}", status),
        other => other.to_string(),
    }
}

/// Exponential backoff for server errors and transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Wait before the second attempt; doubles after each further failure
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << doublings)
    }

    /// Calls `send` until it returns a body, fails with a 4xx or another
    /// non-transient error, or runs out of attempts.
    #[inline]
    pub fn run<F>(&self, target: &str, mut send: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut attempt = 1;
        loop {
            let error = match send() {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            if matches!(judge(&error), Verdict::Fail) {
                warn!("{} failed: {}", target, describe(&error));
                return Err(anyhow!("Request to {} failed: {}", target, describe(&error)));
            }
            if attempt >= self.attempts {
                warn!("{} failed after {} attempts: {}", target, attempt, describe(&error));
                return Err(anyhow!(
                    "Request to {} failed after {} attempts: {}",
                    target,
                    attempt,
                    describe(&error)
                ));
            }

            let delay = self.delay_for(attempt);
            debug!(
                "{} attempt {}/{} failed ({}), retrying in {:?}",
                target,
                attempt,
                self.attempts,
                describe(&error),
                delay
            );
            std::thread::sleep(delay);
            attempt += 1;
        }
    }
}
