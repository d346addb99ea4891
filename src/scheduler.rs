//! Fixed-interval tick scheduling.
//!
//! The pacemaker produces wake-up times `start + interval`, `start + 2 *
//! interval`, ... into a channel of capacity one, independent of how long each
//! pass takes. The sampling worker pulls a tick, waits for the wall clock to
//! reach it and runs the pass. A slow pass makes the worker late for the
//! next tick; it then runs immediately instead of skipping it.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::summary::TIMESTAMP_FORMAT;

/// Delay between scheduler start and the origin of the tick sequence.
pub const START_OFFSET: Duration = Duration::from_secs(1);

/// Strictly increasing sequence of tick times.
#[derive(Debug, Clone)]
pub struct TickSchedule {
    next: DateTime<Local>,
    interval: ChronoDuration,
}

impl TickSchedule {
    /// The first tick is one interval after `start`.
    pub fn new(start: DateTime<Local>, interval: Duration) -> Self {
        let interval = ChronoDuration::from_std(interval).unwrap_or(ChronoDuration::seconds(1));
        Self {
            next: start + interval,
            interval,
        }
    }

    /// Schedule anchored at now plus [`START_OFFSET`].
    pub fn starting_now(interval: Duration) -> Self {
        let start = Local::now()
            + ChronoDuration::from_std(START_OFFSET).unwrap_or(ChronoDuration::zero());
        Self::new(start, interval)
    }
}

impl Iterator for TickSchedule {
    type Item = DateTime<Local>;

    fn next(&mut self) -> Option<Self::Item> {
        let tick = self.next;
        self.next = tick + self.interval;
        Some(tick)
    }
}

/// Feeds ticks into `tx` until the receiver goes away.
pub async fn pacemaker(tx: mpsc::Sender<DateTime<Local>>, schedule: TickSchedule) {
    for tick in schedule {
        trace!("Pacemaker queued tick {}", tick);
        if tx.send(tick).await.is_err() {
            debug!("Tick receiver closed, pacemaker exiting");
            return;
        }
    }
}

/// Blocks until the wall clock reaches `tick`. Returns the time slept, zero
/// when the tick is already due.
pub fn wait_until(tick: DateTime<Local>) -> Duration {
    match (tick - Local::now()).to_std() {
        Ok(wait) => {
            std::thread::sleep(wait);
            wait
        }
        // Negative: the tick is late, run now.
        Err(_) => Duration::ZERO,
    }
}

/// Start of the window ending at `tick`, formatted for output.
pub fn window_timestamp(tick: DateTime<Local>, interval: ChronoDuration) -> String {
    (tick - interval).format(TIMESTAMP_FORMAT).to_string()
}
