//! Runtime lag sampling and per-request checkpoint timing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_millis(20);
pub const DEFAULT_WARN_THRESHOLD: Duration = Duration::from_millis(50);

/// Latest scheduling lag of the async runtime.
///
/// A sampler task asks to be woken every period and records how late the
/// wake-up actually was. Blocking work on a runtime thread shows up as lag.
#[derive(Debug, Default)]
pub struct LoopMonitor {
    lag_micros: AtomicU64,
    samples: AtomicU64,
}

impl LoopMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lag(&self) -> Duration {
        Duration::from_micros(self.lag_micros.load(Ordering::Relaxed))
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    fn record(&self, lag: Duration) {
        let micros = u64::try_from(lag.as_micros()).unwrap_or(u64::MAX);
        self.lag_micros.store(micros, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Starts the sampler. Abort the handle at shutdown.
    pub fn spawn(self: &Arc<Self>, period: Duration, warn_at: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let target = Instant::now() + period;
                tokio::time::sleep_until(target).await;
                let lag = Instant::now().saturating_duration_since(target);
                monitor.record(lag);
                if lag >= warn_at {
                    warn!(
                        lag_ms = lag.as_secs_f64() * 1000.0,
                        "Runtime lag spike (a worker thread is likely blocked)"
                    );
                }
            }
        })
    }
}

/// Logs wall time between named checkpoints, plus the current runtime lag.
pub struct CheckTimer<'a> {
    name: &'static str,
    monitor: &'a LoopMonitor,
    start: Instant,
    last: Instant,
}

impl<'a> CheckTimer<'a> {
    pub fn start(name: &'static str, monitor: &'a LoopMonitor) -> Self {
        let now = Instant::now();
        debug!(timer = name, "start");
        Self {
            name,
            monitor,
            start: now,
            last: now,
        }
    }

    /// Records a checkpoint and returns the time since the previous one.
    pub fn cp(&mut self, label: &str) -> Duration {
        let now = Instant::now();
        let segment = now - self.last;
        let total = now - self.start;
        self.last = now;

        debug!(
            timer = self.name,
            checkpoint = label,
            seg_ms = segment.as_secs_f64() * 1000.0,
            total_ms = total.as_secs_f64() * 1000.0,
            loop_lag_ms = self.monitor.lag().as_secs_f64() * 1000.0,
        );
        segment
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
