//! Error classification and exponential backoff around single remote calls.

use crate::error::{Result, TutorError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            initial_delay: DEFAULT_INITIAL_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, initial_delay: Duration) -> Self {
        Self {
            retries,
            initial_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    QuotaExhausted,
    RateLimited,
    Transport,
    Fatal,
}

impl FailureClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, FailureClass::RateLimited | FailureClass::Transport)
    }
}

/// Buckets a failure. Checks run in order: quota, rate limit, transport.
pub fn classify(err: &TutorError) -> FailureClass {
    let text = err.to_string();
    let lower = text.to_lowercase();

    if matches!(err, TutorError::QuotaExceeded(_))
        || text.contains("exceeded quota")
        || text.contains("RESOURCE_EXHAUSTED")
    {
        return FailureClass::QuotaExhausted;
    }

    if matches!(err, TutorError::RateLimited(_))
        || matches!(err, TutorError::Http { status: 429, .. })
        || lower.contains("quota")
        || lower.contains("exhausted")
    {
        return FailureClass::RateLimited;
    }

    match err {
        TutorError::Transport(_) | TutorError::WebSocket(_) => FailureClass::Transport,
        TutorError::Http { status, .. } if *status >= 500 => FailureClass::Transport,
        TutorError::EmptyResponse => FailureClass::Fatal,
        _ if lower.contains("network") || lower.contains("xhr") => FailureClass::Transport,
        _ => FailureClass::Fatal,
    }
}

/// Runs one remote call under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct ResilientInvoker {
    policy: RetryPolicy,
}

impl ResilientInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Invokes `call` until it succeeds, fails terminally, or the retry budget
    /// runs out.
    ///
    /// `Ok(None)` from the call means the transport succeeded but carried no
    /// content; that surfaces as [`TutorError::EmptyResponse`] without retrying.
    /// Quota exhaustion surfaces as [`TutorError::QuotaExceeded`] after the
    /// first attempt. Once the budget is spent the last failure is returned as-is.
    pub async fn invoke<T, F, Fut>(&self, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let mut retries_left = self.policy.retries;
        let mut delay = self.policy.initial_delay;
        let mut attempt: u32 = 1;

        loop {
            let err = match call().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => return Err(TutorError::EmptyResponse),
                Err(err) => err,
            };

            let class = classify(&err);
            if class == FailureClass::QuotaExhausted {
                warn!("[Invoker] Quota exhausted on attempt {}: {}", attempt, err);
                return Err(TutorError::quota_exceeded());
            }
            if !class.is_retryable() || retries_left == 0 {
                debug!(
                    "[Invoker] Giving up after attempt {} ({:?}): {}",
                    attempt, class, err
                );
                return Err(err);
            }

            warn!(
                "[Invoker] Gemini API busy/limited ({:?}). Retrying in {}ms... ({} retries left)",
                class,
                delay.as_millis(),
                retries_left
            );
            tokio::time::sleep(delay).await;
            retries_left -= 1;
            delay = delay.saturating_mul(2);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    fn rate_limited() -> TutorError {
        TutorError::Http {
            status: 429,
            message: "Too Many Requests".to_string(),
        }
    }

    #[test]
    fn classification_order() {
        let quota_429 = TutorError::Http {
            status: 429,
            message: "RESOURCE_EXHAUSTED".to_string(),
        };
        assert_eq!(classify(&quota_429), FailureClass::QuotaExhausted);
        assert_eq!(
            classify(&TutorError::ApiError("You exceeded quota".into())),
            FailureClass::QuotaExhausted
        );
        assert_eq!(classify(&rate_limited()), FailureClass::RateLimited);
        assert_eq!(
            classify(&TutorError::ApiError("tokens exhausted".into())),
            FailureClass::RateLimited
        );
        assert_eq!(
            classify(&TutorError::Transport("connection reset".into())),
            FailureClass::Transport
        );
        assert_eq!(
            classify(&TutorError::Http {
                status: 503,
                message: "unavailable".into()
            }),
            FailureClass::Transport
        );
        assert_eq!(
            classify(&TutorError::Http {
                status: 400,
                message: "bad schema".into()
            }),
            FailureClass::Fatal
        );
        assert_eq!(classify(&TutorError::EmptyResponse), FailureClass::Fatal);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_with_doubling_delay() {
        let attempts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let invoker = ResilientInvoker::new(RetryPolicy::new(3, Duration::from_millis(100)));

        let seen = attempts.clone();
        let result = invoker
            .invoke(move || {
                let seen = seen.clone();
                async move {
                    let mut seen = seen.lock().unwrap();
                    seen.push(Instant::now());
                    if seen.len() <= 2 {
                        Err(rate_limited())
                    } else {
                        Ok(Some("lesson"))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, "lesson");
        let attempts = attempts.lock().unwrap();
        assert_eq!(attempts.len(), 3);
        let first_wait = attempts[1] - attempts[0];
        let second_wait = attempts[2] - attempts[1];
        assert_eq!(first_wait, Duration::from_millis(100));
        assert_eq!(second_wait, Duration::from_millis(200));
        assert!(second_wait > first_wait);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_fails_after_first_attempt() {
        let calls = Arc::new(Mutex::new(0u32));
        let invoker = ResilientInvoker::new(RetryPolicy::new(3, Duration::from_millis(100)));

        let counter = calls.clone();
        let start = Instant::now();
        let result: Result<&str> = invoker
            .invoke(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(TutorError::ApiError("429 RESOURCE_EXHAUSTED".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(TutorError::QuotaExceeded(ref m)) if m.starts_with("API_QUOTA_EXCEEDED")));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(Instant::now() - start, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_surfaces_last_failure_unwrapped() {
        let calls = Arc::new(Mutex::new(0u32));
        let invoker = ResilientInvoker::new(RetryPolicy::new(2, Duration::from_millis(10)));

        let counter = calls.clone();
        let result: Result<()> = invoker
            .invoke(move || {
                let counter = counter.clone();
                async move {
                    let mut n = counter.lock().unwrap();
                    *n += 1;
                    Err(TutorError::Transport(format!("attempt {}", *n)))
                }
            })
            .await;

        assert_eq!(*calls.lock().unwrap(), 3);
        assert!(matches!(result, Err(TutorError::Transport(ref m)) if m == "attempt 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_response_is_not_retried() {
        let calls = Arc::new(Mutex::new(0u32));
        let invoker = ResilientInvoker::default();

        let counter = calls.clone();
        let result: Result<String> = invoker
            .invoke(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Ok(None)
                }
            })
            .await;

        assert!(matches!(result, Err(TutorError::EmptyResponse)));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_failure_surfaces_immediately() {
        let calls = Arc::new(Mutex::new(0u32));
        let invoker = ResilientInvoker::default();

        let counter = calls.clone();
        let result: Result<String> = invoker
            .invoke(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err(TutorError::Http {
                        status: 403,
                        message: "API key not valid".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(TutorError::Http { status: 403, .. })));
        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
