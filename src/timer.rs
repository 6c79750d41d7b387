//! Cancellable repeating timer owned by a capture session.

use std::future::pending;
use tokio::time::{interval_at, Duration, Instant, Interval, MissedTickBehavior};

/// A repeating timer that can be started and cancelled at will.
///
/// While inactive, `tick()` never resolves, so it can sit in a `select!`
/// next to other timers. Dropping the ticker cancels it.
#[derive(Debug, Default)]
pub struct Ticker {
    interval: Option<Interval>,
}

impl Ticker {
    pub fn new() -> Self {
        Self { interval: None }
    }

    /// (Re)start with the first tick one `period` from now
    pub fn start(&mut self, period: Duration) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
    }

    pub fn cancel(&mut self) {
        self.interval = None;
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => pending::<()>().await,
        }
    }
}
