use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Source of "now" for date rules (current vs history, future travel dates).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    time: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time: Mutex::new(time) }
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *time += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
