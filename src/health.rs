// ABOUTME: Bounded readiness polling for deployment steps
// ABOUTME: Provides wait-until-ready-or-timeout over an async probe

use crate::config::FarmConfig;
use crate::docker::Engine;
use anyhow::{bail, Result};
use std::time::Duration;

/// Attempt budget for one readiness wait
///
/// The wait polls at a fixed interval up to a bounded attempt count; there
/// is no backoff and no retry beyond the loop. Exhausting the budget is a
/// terminal failure for that deployment step.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessBudget {
    pub attempts: u32,
    pub interval: Duration,
}

impl ReadinessBudget {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    pub fn from_config(config: &FarmConfig) -> Self {
        Self {
            attempts: config.readiness.attempts,
            interval: config.readiness_interval(),
        }
    }
}

/// Poll `probe` until it reports ready or the budget is exhausted
///
/// A probe returning `Ok(true)` ends the wait successfully. `Ok(false)` and
/// `Err(_)` both consume one attempt — probe errors are treated as transient
/// (an engine hiccup mid-poll) and logged rather than propagated.
///
/// # Arguments
///
/// * `label` - Human-readable description for log lines and the timeout error
/// * `budget` - Attempt count and fixed sleep interval
/// * `probe` - Async readiness predicate
///
/// # Errors
///
/// Returns an error naming `label` when the attempt budget is exhausted.
pub async fn wait_until_ready<F, Fut>(label: &str, budget: ReadinessBudget, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    for attempt in 1..=budget.attempts {
        match probe().await {
            Ok(true) => {
                tracing::info!("✓ {} ready after {} attempt(s)", label, attempt);
                return Ok(());
            }
            Ok(false) => {
                tracing::debug!(
                    "{} not ready yet (attempt {}/{})",
                    label,
                    attempt,
                    budget.attempts
                );
            }
            Err(e) => {
                tracing::warn!(
                    "Probe for {} failed (attempt {}/{}): {:#}",
                    label,
                    attempt,
                    budget.attempts,
                    e
                );
            }
        }

        if attempt < budget.attempts {
            tokio::time::sleep(budget.interval).await;
        }
    }

    bail!(
        "{} did not become ready within {} attempts ({}s interval)",
        label,
        budget.attempts,
        budget.interval.as_secs()
    )
}

/// Wait for a container to be running, healthy (or healthcheck-free), and —
/// when a marker is given — to expose the marker file
///
/// This is the cross-cutting readiness condition every deployment step uses:
/// a container that is up but still unpacking its application tree is not
/// ready until the marker appears.
pub async fn wait_for_container(
    engine: &Engine,
    container: &str,
    marker_file: Option<&str>,
    budget: ReadinessBudget,
) -> Result<()> {
    let label = format!("container {}", container);
    wait_until_ready(&label, budget, move || async move {
        let state = match engine.container_state(container)? {
            Some(state) => state,
            None => return Ok(false),
        };
        if !state.is_ready() {
            return Ok(false);
        }
        match marker_file {
            Some(marker) => engine.file_exists_in_container(container, marker),
            None => Ok(true),
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn tight_budget(attempts: u32) -> ReadinessBudget {
        ReadinessBudget::new(attempts, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn ready_on_first_attempt() {
        let result = wait_until_ready("thing", tight_budget(3), || async { Ok(true) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn becomes_ready_mid_budget() {
        let calls = AtomicU32::new(0);
        let result = wait_until_ready("thing", tight_budget(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(n >= 3) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_is_terminal() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = wait_until_ready("slow thing", tight_budget(4), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(false) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("slow thing"));
        assert!(msg.contains("4 attempts"));
    }

    #[tokio::test]
    async fn probe_errors_count_as_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = wait_until_ready("flaky thing", tight_budget(3), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { anyhow::bail!("engine hiccup") }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn error_then_ready_recovers() {
        let calls = AtomicU32::new(0);
        let result = wait_until_ready("recovering thing", tight_budget(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    anyhow::bail!("transient")
                } else {
                    Ok(true)
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
