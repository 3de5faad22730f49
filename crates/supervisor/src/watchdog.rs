//! Watchdog that revives a dead HTTP server and restarts a stalled camera.
//!
//! Every interval the watchdog checks two things. A stopped HTTP server is
//! recreated on the current capture manager. A capture manager that stays
//! initialized without a ready camera for two consecutive checks, and whose
//! last start is older than the grace window, is disposed and rebuilt.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use camera_capture::CaptureHealth;
use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::WatchdogConfig;
use crate::pipeline::Pipeline;

/// Consecutive stalled checks before a capture restart
pub const STALL_THRESHOLD: u32 = 2;

/// How long `stop` waits for an in-flight restart
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Watchdog lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatchdogState::Idle => "idle",
            WatchdogState::Running => "running",
            WatchdogState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Decides when a stalled capture manager gets restarted
#[derive(Debug, Clone)]
pub struct StallDetector {
    grace: Duration,
    streak: u32,
    last_start: Instant,
}

impl StallDetector {
    /// `started` is when the current manager was started
    pub fn new(grace: Duration, started: Instant) -> Self {
        Self {
            grace,
            streak: 0,
            last_start: started,
        }
    }

    /// Record one health check; true means restart now
    pub fn observe(&mut self, health: CaptureHealth, now: Instant) -> bool {
        if !health.is_stalled() {
            self.streak = 0;
            return false;
        }

        self.streak = self.streak.saturating_add(1);
        self.streak >= STALL_THRESHOLD
            && now.saturating_duration_since(self.last_start) >= self.grace
    }

    /// Forget the streak after a restart at `now`
    pub fn reset(&mut self, now: Instant) {
        self.streak = 0;
        self.last_start = now;
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}

/// Periodic pipeline health check
pub struct Watchdog {
    state: Arc<Mutex<WatchdogState>>,
    restarts: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(WatchdogState::Idle)),
            restarts: Arc::new(AtomicU64::new(0)),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Begin monitoring `pipeline`. Only an idle watchdog can start.
    pub fn start(&self, pipeline: Arc<Pipeline>, config: &WatchdogConfig) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != WatchdogState::Idle {
                warn!("Watchdog start ignored in state {}", state);
                return;
            }
            *state = WatchdogState::Running;
        }

        let task = tokio::spawn(run(
            pipeline,
            config.interval(),
            config.grace(),
            self.shutdown.subscribe(),
            self.restarts.clone(),
        ));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        info!(
            "Watchdog started (interval {:?}, grace {:?})",
            config.interval(),
            config.grace()
        );
    }

    /// Stop monitoring and wait for the task to finish
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == WatchdogState::Stopped {
                return;
            }
            *state = WatchdogState::Stopped;
        }
        self.shutdown.send_replace(true);

        let task = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut task) = task {
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                warn!("Watchdog did not stop within {:?}, aborting", STOP_TIMEOUT);
                task.abort();
            }
        }
        info!("Watchdog stopped");
    }

    pub fn state(&self) -> WatchdogState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Restarts performed so far, HTTP and capture combined
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watchdog")
            .field("state", &self.state())
            .field("restarts", &self.restarts())
            .finish()
    }
}

async fn run(
    pipeline: Arc<Pipeline>,
    interval: Duration,
    grace: Duration,
    mut stop: watch::Receiver<bool>,
    restarts: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut detector = StallDetector::new(grace, Instant::now());

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
                continue;
            }
        }

        if !pipeline.http_running().await {
            warn!("HTTP server not running, restarting it");
            match pipeline.restart_http().await {
                Ok(()) => {
                    restarts.fetch_add(1, Ordering::Relaxed);
                    counter!("securecam_watchdog_restarts_total", "component" => "http")
                        .increment(1);
                }
                Err(e) => error!("HTTP server restart failed: {}", e),
            }
        }

        let health = pipeline.capture_health().await;
        debug!(
            "Watchdog check: initialized={} ready={} streaming={}",
            health.initialized, health.ready, health.streaming
        );

        if detector.observe(health, Instant::now()) {
            warn!(
                "Camera not ready after {} checks, restarting capture",
                detector.streak()
            );
            if let Err(e) = pipeline.restart_capture().await {
                error!("Capture restart failed: {}", e);
            }
            detector.reset(Instant::now());
            restarts.fetch_add(1, Ordering::Relaxed);
            counter!("securecam_watchdog_restarts_total", "component" => "capture").increment(1);
        }
    }

    debug!("Watchdog loop exited");
}
