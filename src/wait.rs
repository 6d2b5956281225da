//! Condition polling - block until an observation holds or a budget elapses

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};

/// Default pause between probe evaluations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One evaluation of the condition under wait.
///
/// `state` is a human-readable snapshot of what was seen (a page title, a
/// URL) and is carried into the timeout error so failures report the actual
/// observed value, not just "timed out".
#[derive(Debug, Clone)]
pub struct Observation {
    pub satisfied: bool,
    pub state: String,
}

impl Observation {
    pub fn satisfied(state: impl Into<String>) -> Self {
        Self {
            satisfied: true,
            state: state.into(),
        }
    }

    pub fn pending(state: impl Into<String>) -> Self {
        Self {
            satisfied: false,
            state: state.into(),
        }
    }
}

/// Poll `probe` every `interval` until it reports a satisfied observation,
/// returning the final observed state.
///
/// Probes must be pure observations of session/page state; they are invoked
/// repeatedly with no ordering guarantee beyond "until success or timeout".
/// The probe runs at least once even with a zero budget. A probe error is
/// not retried - it propagates immediately.
pub async fn wait_until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> HarnessResult<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HarnessResult<Observation>>,
{
    let start = Instant::now();
    let mut last = String::from("<nothing observed>");

    loop {
        let obs = probe().await?;
        if obs.satisfied {
            debug!("Condition met for {}: {}", what, obs.state);
            return Ok(obs.state);
        }
        last = obs.state;

        if start.elapsed() >= timeout {
            return Err(HarnessError::WaitTimeout {
                what: what.to_string(),
                waited: timeout,
                last,
            });
        }

        debug!("Still waiting for {}: {}", what, last);
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_immediate_success_returns_state() {
        let state = wait_until(
            "already true",
            Duration::from_secs(1),
            Duration::from_millis(5),
            || async { Ok(Observation::satisfied("ready")) },
        )
        .await
        .unwrap();
        assert_eq!(state, "ready");
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let state = wait_until(
            "third time",
            Duration::from_secs(5),
            Duration::from_millis(2),
            || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n >= 3 {
                    Ok(Observation::satisfied(format!("call {}", n)))
                } else {
                    Ok(Observation::pending(format!("call {}", n)))
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(state, "call 3");
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_timeout_carries_last_observed_state() {
        let err = wait_until(
            "the impossible",
            Duration::from_millis(20),
            Duration::from_millis(5),
            || async { Ok(Observation::pending("still about:blank")) },
        )
        .await
        .unwrap_err();

        match err {
            HarnessError::WaitTimeout { what, last, .. } => {
                assert_eq!(what, "the impossible");
                assert_eq!(last, "still about:blank");
            }
            other => panic!("expected WaitTimeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_probe_error_propagates_without_retry() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let err = wait_until(
            "a broken probe",
            Duration::from_secs(1),
            Duration::from_millis(2),
            || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<Observation, _>(HarnessError::SessionClosed)
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, HarnessError::SessionClosed));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
