//! Backend liveness monitor.
//!
//! A single owned monitor polls `GET {base}/` once at start and then on a fixed
//! interval until it is stopped. Each check is one request with no retry; the
//! most recently resolved check wins.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendStatus {
    Checking,
    Online,
    Offline,
}

impl BackendStatus {
    pub fn label(self) -> &'static str {
        match self {
            BackendStatus::Checking => "CHECKING",
            BackendStatus::Online => "ONLINE",
            BackendStatus::Offline => "OFFLINE",
        }
    }
}

/// One liveness check against the service.
pub trait LivenessProbe: Send + Sync {
    fn check(&self) -> BackendStatus;
}

/// Root endpoint body; only used for diagnostics.
#[derive(Debug, Deserialize)]
struct RootInfo {
    #[serde(default)]
    model_loaded: Option<bool>,
}

pub struct HttpProbe {
    url: String,
    agent: ureq::Agent,
}

impl HttpProbe {
    /// `base_url` must already be normalised (no trailing slash).
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            url: format!("{}/", base_url),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl LivenessProbe for HttpProbe {
    fn check(&self) -> BackendStatus {
        match self.agent.get(&self.url).call() {
            // ureq reports 4xx/5xx as `Error::Status`, so any `Ok` is a success.
            Ok(response) => {
                if let Ok(RootInfo {
                    model_loaded: Some(false),
                }) = response.into_json::<RootInfo>()
                {
                    log::warn!("backend at {} is up but reports no model loaded", self.url);
                }
                BackendStatus::Online
            }
            Err(ureq::Error::Status(code, _)) => {
                log::warn!("backend responded with error: {}", code);
                BackendStatus::Offline
            }
            Err(err) => {
                log::debug!("backend connectivity error at {}: {}", self.url, err);
                BackendStatus::Offline
            }
        }
    }
}

/// Shared, last-write-wins backend status.
#[derive(Clone, Debug)]
pub struct StatusCell {
    inner: Arc<Mutex<BackendStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BackendStatus::Checking)),
        }
    }

    pub fn get(&self) -> BackendStatus {
        match self.inner.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Stores `status` and returns the previous value.
    pub fn set(&self, status: BackendStatus) -> BackendStatus {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *guard, status)
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one check and record it.
pub fn check_now(probe: &dyn LivenessProbe, status: &StatusCell) -> BackendStatus {
    let outcome = probe.check();
    let previous = status.set(outcome);
    if previous != outcome {
        log::info!("backend status {} -> {}", previous.label(), outcome.label());
    }
    outcome
}

pub struct LivenessMonitor {
    probe: Arc<dyn LivenessProbe>,
    interval: Duration,
}

impl LivenessMonitor {
    pub fn new(probe: Arc<dyn LivenessProbe>, interval: Duration) -> Self {
        Self { probe, interval }
    }

    /// Start polling. The first check runs immediately on the monitor thread.
    pub fn spawn(self) -> Result<LivenessHandle> {
        if self.interval.is_zero() {
            return Err(anyhow!("liveness interval must be greater than zero"));
        }
        let status = StatusCell::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        let status_thread = status.clone();
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("liveness".to_string())
            .spawn(move || {
                run_monitor(
                    self.probe.as_ref(),
                    self.interval,
                    &status_thread,
                    &shutdown_thread,
                )
            })?;
        Ok(LivenessHandle {
            status,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_monitor(
    probe: &dyn LivenessProbe,
    interval: Duration,
    status: &StatusCell,
    shutdown: &AtomicBool,
) {
    loop {
        let tick = Instant::now();
        check_now(probe, status);
        while tick.elapsed() < interval {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(SHUTDOWN_POLL.min(interval));
        }
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
    }
}

/// Owner of the polling thread. Dropping the handle stops the monitor.
#[derive(Debug)]
pub struct LivenessHandle {
    status: StatusCell,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl LivenessHandle {
    pub fn status(&self) -> BackendStatus {
        self.status.get()
    }

    pub fn status_cell(&self) -> StatusCell {
        self.status.clone()
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("liveness monitor thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for LivenessHandle {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown_and_join() {
            log::error!("{}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingProbe {
        calls: AtomicUsize,
        answer: BackendStatus,
    }

    impl LivenessProbe for CountingProbe {
        fn check(&self) -> BackendStatus {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    #[test]
    fn status_starts_checking_and_is_last_write_wins() {
        let cell = StatusCell::new();
        assert_eq!(cell.get(), BackendStatus::Checking);
        cell.set(BackendStatus::Offline);
        cell.set(BackendStatus::Online);
        assert_eq!(cell.get(), BackendStatus::Online);
    }

    #[test]
    fn monitor_checks_at_start_and_on_every_interval() -> Result<()> {
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
            answer: BackendStatus::Online,
        });
        let handle = LivenessMonitor::new(probe.clone(), Duration::from_millis(20)).spawn()?;
        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(handle.status(), BackendStatus::Online);
        handle.stop()?;
        let after_stop = probe.calls.load(Ordering::SeqCst);
        assert!(after_stop >= 3, "only {} checks ran", after_stop);

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(probe.calls.load(Ordering::SeqCst), after_stop);
        Ok(())
    }

    #[test]
    fn zero_interval_is_rejected() {
        let probe = Arc::new(CountingProbe {
            calls: AtomicUsize::new(0),
            answer: BackendStatus::Offline,
        });
        assert!(LivenessMonitor::new(probe, Duration::ZERO).spawn().is_err());
    }
}
