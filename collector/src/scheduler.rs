use chrono::{
    DateTime,
    Utc,
};
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};
use tokio::time::{
    Instant,
    MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

/// Work fired on every tick of a [`Scheduler`].
pub trait TickHandler: Send + Sync + 'static {
    fn on_tick(&self, now: DateTime<Utc>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Delay until the next wall-clock multiple of `period`, zero if `now` is one.
pub fn delay_until_aligned(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_millis = i64::try_from(period.as_millis()).unwrap_or(i64::MAX);
    if period_millis == 0 {
        return Duration::ZERO;
    }
    match now.timestamp_millis().rem_euclid(period_millis) {
        0 => Duration::ZERO,
        elapsed => Duration::from_millis(u64::try_from(period_millis - elapsed).unwrap_or_default()),
    }
}

/// Fires a [`TickHandler`] at a fixed period.
///
/// Every tick runs in its own task. A tick that is still running when the next one is due is not
/// waited for, so slow ticks overlap.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    period: Duration,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Runs until `shutdown` is cancelled. Ticks already started are left to finish on their own.
    pub async fn run<H: TickHandler>(self, handler: Arc<H>, shutdown: CancellationToken) {
        let delay = delay_until_aligned(Utc::now(), self.period);
        info!(period = ?self.period, first_tick_in = ?delay, "Scheduler started");
        let mut ticker = tokio::time::interval_at(Instant::now() + delay, self.period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let running = Arc::new(AtomicUsize::new(0));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    info!("Cron event hit: {now}");
                    let overlapping = running.fetch_add(1, Ordering::SeqCst);
                    if overlapping > 0 {
                        debug!(overlapping, "Previous tick still running");
                    }
                    let handler = handler.clone();
                    let running = running.clone();
                    tokio::spawn(async move {
                        handler.on_tick(now).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_tick_is_aligned_to_the_period() {
        let period = Duration::from_secs(30);
        let at = |second, millis| {
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 7, second).unwrap() + chrono::Duration::milliseconds(millis)
        };
        assert_eq!(delay_until_aligned(at(0, 0), period), Duration::ZERO);
        assert_eq!(delay_until_aligned(at(30, 0), period), Duration::ZERO);
        assert_eq!(delay_until_aligned(at(10, 0), period), Duration::from_secs(20));
        assert_eq!(delay_until_aligned(at(59, 500), period), Duration::from_millis(500));
        assert_eq!(delay_until_aligned(at(10, 0), Duration::ZERO), Duration::ZERO);
    }

    #[derive(Default)]
    struct SlowTick {
        started: AtomicUsize,
        running: AtomicUsize,
        most_running: AtomicUsize,
    }

    impl TickHandler for SlowTick {
        fn on_tick(&self, _now: DateTime<Utc>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
            Box::pin(async move {
                self.started.fetch_add(1, Ordering::SeqCst);
                let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.most_running.fetch_max(running, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(150)).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
            })
        }
    }

    #[tokio::test]
    async fn slow_ticks_overlap_until_shutdown() {
        let handler = Arc::new(SlowTick::default());
        let shutdown = CancellationToken::new();
        let scheduler = tokio::spawn(Scheduler::new(Duration::from_millis(50)).run(handler.clone(), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown.cancel();
        scheduler.await.unwrap();

        let started = handler.started.load(Ordering::SeqCst);
        assert!(started >= 3, "only {started} ticks");
        assert!(handler.most_running.load(Ordering::SeqCst) > 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let settled = handler.started.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(handler.started.load(Ordering::SeqCst), settled);
        assert_eq!(handler.running.load(Ordering::SeqCst), 0);
    }
}
