//! Jittered periodic trigger for synchronisation passes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Errors raised when starting a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SchedulerError {
    /// The base interval is zero.
    #[error("refresh interval must be greater than zero")]
    ZeroInterval,
    /// The jitter factor is outside `[0, 1)`.
    #[error("jitter factor must be in [0, 1), got {0}")]
    InvalidJitter(f64),
}

/// Returns `interval` scaled by a uniform factor in `[1 - jitter, 1 + jitter]`.
///
/// A product that does not fit in a [`Duration`] falls back to `interval`.
#[expect(
    clippy::float_arithmetic,
    reason = "jitter is a fractional scale of the interval"
)]
pub fn jittered_delay(interval: Duration, jitter: f64, rng: &mut impl Rng) -> Duration {
    if jitter <= 0.0 {
        return interval;
    }
    let factor = rng.random_range((1.0 - jitter)..=(1.0 + jitter));
    Duration::try_from_secs_f64(interval.as_secs_f64() * factor).unwrap_or(interval)
}

/// Fires a callback on a jittered interval, never overlapping itself.
///
/// Each tick re-arms with a fresh jittered delay. If the previous callback is
/// still running when a tick fires, that tick is skipped.
pub struct RefreshScheduler {
    cancel: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
    in_flight: Arc<Mutex<()>>,
    fired: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

impl RefreshScheduler {
    /// Starts the timer task.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] for a zero interval or a jitter factor
    /// outside `[0, 1)`.
    pub fn start<F, Fut>(
        interval: Duration,
        jitter: f64,
        on_tick: F,
    ) -> Result<Self, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        if !(0.0..1.0).contains(&jitter) {
            return Err(SchedulerError::InvalidJitter(jitter));
        }

        let cancel = CancellationToken::new();
        let in_flight = Arc::new(Mutex::new(()));
        let fired = Arc::new(AtomicU64::new(0));
        let skipped = Arc::new(AtomicU64::new(0));

        let timer = tokio::spawn(tick_loop(TickLoop {
            interval,
            jitter,
            on_tick,
            cancel: cancel.clone(),
            in_flight: Arc::clone(&in_flight),
            fired: Arc::clone(&fired),
            skipped: Arc::clone(&skipped),
        }));
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        info!(interval_ms, jitter, "refresh scheduler started");

        Ok(Self {
            cancel,
            timer: Mutex::new(Some(timer)),
            in_flight,
            fired,
            skipped,
        })
    }

    /// Cancels the pending timer. An in-flight callback keeps running.
    pub async fn stop(&self) {
        self.cancel.cancel();
        if let Some(timer) = self.timer.lock().await.take()
            && let Err(err) = timer.await
        {
            debug!(error = %err, "refresh timer task ended abnormally");
        }
    }

    /// Waits until no callback is running.
    pub async fn wait_idle(&self) {
        let _idle = self.in_flight.lock().await;
    }

    /// Returns how many ticks started a callback.
    #[must_use]
    pub fn fired_ticks(&self) -> u64 {
        self.fired.load(Ordering::SeqCst)
    }

    /// Returns how many ticks were skipped because a callback was running.
    #[must_use]
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct TickLoop<F> {
    interval: Duration,
    jitter: f64,
    on_tick: F,
    cancel: CancellationToken,
    in_flight: Arc<Mutex<()>>,
    fired: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

async fn tick_loop<F, Fut>(state: TickLoop<F>)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut rng = StdRng::from_os_rng();
    loop {
        let delay = jittered_delay(state.interval, state.jitter, &mut rng);
        tokio::select! {
            () = state.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        if let Ok(guard) = Arc::clone(&state.in_flight).try_lock_owned() {
            state.fired.fetch_add(1, Ordering::SeqCst);
            let pass = (state.on_tick)();
            tokio::spawn(async move {
                pass.await;
                drop(guard);
            });
        } else {
            state.skipped.fetch_add(1, Ordering::SeqCst);
            debug!("previous sync pass still running, skipping tick");
        }
    }
}
