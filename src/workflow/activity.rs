//! Activity execution
//!
//! Wraps each module run with a retry policy, heartbeats and deadlines.
//! Activities are idempotent: deliverables are overwritten on restart and
//! every attempt gets its own audit file, so a heartbeat-triggered restart is
//! always safe.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::json;
use tokio::time::{sleep, timeout, Duration};

use crate::audit::{MetricsStore, ModuleEventLog, ModuleStatus, SessionPaths, WorkflowLog};
use crate::error::{Error, Result};

/// Liveness signal cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
/// Silence after which the activity is restarted from scratch.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
/// Upper bound on a single activity attempt.
pub const START_TO_CLOSE: Duration = Duration::from_secs(2 * 60 * 60);

/// Exponential backoff retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (1-based attempt that just failed).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_backoff.mul_f64(factor)
    }
}

/// Static description of one activity
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub module: &'static str,
    pub phase: &'static str,
    pub retry: RetryPolicy,
    pub heartbeat_timeout: Duration,
    pub start_to_close: Duration,
}

impl ActivityOptions {
    pub fn new(module: &'static str, phase: &'static str) -> Self {
        Self {
            module,
            phase,
            retry: RetryPolicy::default(),
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            start_to_close: START_TO_CLOSE,
        }
    }
}

/// Run one module as a supervised activity.
///
/// `work` is invoked fresh for every attempt; failures classified retryable
/// back off exponentially, non-retryable failures surface immediately.
pub async fn run_activity<T, F, Fut>(
    paths: &SessionPaths,
    metrics: &MetricsStore,
    log: &WorkflowLog,
    options: &ActivityOptions,
    work: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let module = options.module;
    let phase = options.phase;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        if attempt > options.retry.max_attempts {
            let message = format!("{} exhausted {} attempts", module, options.retry.max_attempts);
            fail_module(metrics, log, module, phase, attempt - 1, &message).await;
            return Err(Error::Internal(message));
        }

        metrics
            .update(|m| {
                m.set_module_status(module, phase, ModuleStatus::Running, attempt, None);
            })
            .await?;
        log.module_status(module, "running", &[("attempt", attempt.to_string())])?;

        let mut events = ModuleEventLog::open(paths.module_event_log(module, attempt), module)?;
        events.record("started", json!({ "attempt": attempt }))?;

        let last_beat = Arc::new(Mutex::new(Instant::now()));
        let ticker = spawn_heartbeat(paths, module, attempt, last_beat.clone());

        let outcome = tokio::select! {
            result = timeout(options.start_to_close, work()) => match result {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout(format!(
                    "{} exceeded start-to-close deadline", module
                ))),
            },
            _ = heartbeat_watchdog(last_beat.clone(), options.heartbeat_timeout) => {
                Err(Error::Timeout(format!("{} missed heartbeats", module)))
            }
        };
        ticker.abort();

        match outcome {
            Ok(value) => {
                events.record("completed", json!({ "attempt": attempt }))?;
                metrics
                    .update(|m| {
                        m.set_module_status(module, phase, ModuleStatus::Completed, attempt, None);
                    })
                    .await?;
                log.module_status(module, "completed", &[("attempt", attempt.to_string())])?;
                return Ok(value);
            }
            Err(e) => {
                events.record("failed", json!({ "attempt": attempt, "error": e.to_string() }))?;
                if e.is_terminal() || !e.retryable() {
                    fail_module(metrics, log, module, phase, attempt, &e.to_string()).await;
                    return Err(e);
                }
                if attempt >= options.retry.max_attempts {
                    fail_module(metrics, log, module, phase, attempt, &e.to_string()).await;
                    return Err(e);
                }
                let backoff = options.retry.backoff_after(attempt);
                tracing::warn!(
                    module = module,
                    attempt = attempt,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "activity failed, retrying"
                );
                log.module_status(
                    module,
                    "retrying",
                    &[
                        ("attempt", attempt.to_string()),
                        ("error", e.to_string()),
                    ],
                )?;
                sleep(backoff).await;
            }
        }
    }
}

async fn fail_module(
    metrics: &MetricsStore,
    log: &WorkflowLog,
    module: &str,
    phase: &str,
    attempt: u32,
    error: &str,
) {
    let error_owned = error.to_string();
    let _ = metrics
        .update(|m| {
            m.set_module_status(
                module,
                phase,
                ModuleStatus::Failed,
                attempt,
                Some(error_owned),
            );
        })
        .await;
    let _ = log.module_status(module, "failed", &[("error", error.to_string())]);
}

fn spawn_heartbeat(
    paths: &SessionPaths,
    module: &'static str,
    attempt: u32,
    last_beat: Arc<Mutex<Instant>>,
) -> tokio::task::JoinHandle<()> {
    let log_path = paths.module_event_log(module, attempt);
    tokio::spawn(async move {
        let mut events = match ModuleEventLog::open(&log_path, module) {
            Ok(events) => events,
            Err(_) => return,
        };
        loop {
            sleep(HEARTBEAT_INTERVAL).await;
            if let Ok(mut beat) = last_beat.lock() {
                *beat = Instant::now();
            }
            let _ = events.record("heartbeat", json!({}));
        }
    })
}

async fn heartbeat_watchdog(last_beat: Arc<Mutex<Instant>>, heartbeat_timeout: Duration) {
    loop {
        sleep(Duration::from_secs(1)).await;
        let stale = last_beat
            .lock()
            .map(|beat| beat.elapsed() > heartbeat_timeout)
            .unwrap_or(true);
        if stale {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::SessionPaths;
    use crate::exec::SessionLock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn session() -> (SessionPaths, MetricsStore, WorkflowLog) {
        let root = std::env::temp_dir().join(format!("camaudit_activity_{}", uuid::Uuid::new_v4()));
        let paths = SessionPaths::new(&root);
        paths.ensure().unwrap();
        let lock = SessionLock::new(paths.session_lock_file());
        let metrics = MetricsStore::new(paths.session_file(), lock);
        let log = WorkflowLog::new(paths.workflow_log());
        (paths, metrics, log)
    }

    fn fast_options(module: &'static str) -> ActivityOptions {
        ActivityOptions {
            module,
            phase: "testing",
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(10),
                multiplier: 2.0,
            },
            heartbeat_timeout: Duration::from_secs(60),
            start_to_close: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn success_marks_module_completed() {
        let (paths, metrics, log) = session();
        metrics
            .init(&crate::audit::SessionMetrics::new("s"))
            .await
            .unwrap();

        let value = run_activity(&paths, &metrics, &log, &fast_options("discovery"), || async {
            Ok(42u32)
        })
        .await
        .unwrap();
        assert_eq!(value, 42);

        let m = metrics.read().unwrap();
        assert_eq!(m.modules[0].status, ModuleStatus::Completed);
        assert_eq!(m.modules[0].attempt, 1);
        assert!(paths.module_event_log("discovery", 1).exists());
    }

    #[tokio::test]
    async fn retryable_errors_back_off_then_succeed() {
        let (paths, metrics, log) = session();
        metrics
            .init(&crate::audit::SessionMetrics::new("s"))
            .await
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let value = run_activity(&paths, &metrics, &log, &fast_options("fingerprint"), move || {
            let calls = calls_in.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Network("transient".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let m = metrics.read().unwrap();
        assert_eq!(m.modules[0].status, ModuleStatus::Completed);
        assert_eq!(m.modules[0].attempt, 3);
        // One audit file per attempt.
        assert!(paths.module_event_log("fingerprint", 1).exists());
        assert!(paths.module_event_log("fingerprint", 2).exists());
        assert!(paths.module_event_log("fingerprint", 3).exists());
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let (paths, metrics, log) = session();
        metrics
            .init(&crate::audit::SessionMetrics::new("s"))
            .await
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let result: Result<()> = run_activity(
            &paths,
            &metrics,
            &log,
            &fast_options("discovery"),
            move || {
                let calls = calls_in.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::InvalidTarget("bad".into()))
                }
            },
        )
        .await;

        assert!(matches!(result, Err(Error::InvalidTarget(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let m = metrics.read().unwrap();
        assert_eq!(m.modules[0].status, ModuleStatus::Failed);
    }

    #[tokio::test]
    async fn exhausted_retries_mark_the_module_failed() {
        let (paths, metrics, log) = session();
        metrics
            .init(&crate::audit::SessionMetrics::new("s"))
            .await
            .unwrap();

        let result: Result<()> = run_activity(
            &paths,
            &metrics,
            &log,
            &fast_options("cve-scanner"),
            || async { Err(Error::Timeout("always".into())) },
        )
        .await;

        assert!(result.is_err());
        let m = metrics.read().unwrap();
        assert_eq!(m.modules[0].status, ModuleStatus::Failed);
        assert!(m.modules[0].error.as_deref().unwrap_or("").contains("always"));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_after(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_after(3), Duration::from_secs(4));
    }
}
