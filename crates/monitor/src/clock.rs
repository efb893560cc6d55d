//! Tick sources for the monitor scheduler.

use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Produces the repeating ticks that drive a monitor.
pub trait Clock: Send + Sync {
    /// A stream yielding once per `period`, first after one full period.
    fn ticks(&self, period: Duration) -> BoxStream<'static, ()>;
}

/// Ticks from `tokio::time`. Follows tokio's paused clock in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn ticks(&self, period: Duration) -> BoxStream<'static, ()> {
        let period = period.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        // A slow tick pushes the schedule back rather than bursting.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        stream::unfold(interval, |mut interval| async move {
            interval.tick().await;
            Some(((), interval))
        })
        .boxed()
    }
}

/// Ticks only when [`ManualClock::advance`] is called. Every stream sees
/// every advance; the period is ignored.
#[derive(Debug)]
pub struct ManualClock {
    sender: broadcast::Sender<()>,
}

impl ManualClock {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Deliver one tick to every live stream; returns how many received it.
    pub fn advance(&self) -> usize {
        self.sender.send(()).unwrap_or(0)
    }

    /// Number of live tick streams.
    pub fn streams(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn ticks(&self, _period: Duration) -> BoxStream<'static, ()> {
        stream::unfold(self.sender.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return Some(((), rx)),
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_saturates_instead_of_wrapping() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_first_tick_after_one_period() {
        let start = Instant::now();
        let mut ticks = TokioClock.ticks(Duration::from_secs(60));

        ticks.next().await;
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        ticks.next().await;
        assert_eq!(start.elapsed(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn manual_clock_ticks_on_advance() {
        let clock = ManualClock::new();
        let mut ticks = clock.ticks(Duration::from_secs(60));
        assert_eq!(clock.streams(), 1);

        assert_eq!(clock.advance(), 1);
        assert_eq!(ticks.next().await, Some(()));
    }

    #[test]
    fn manual_clock_without_streams() {
        assert_eq!(ManualClock::new().advance(), 0);
    }
}
