//! Time source.

use chrono::{DateTime, Utc};

/// Port for getting the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current Unix timestamp in seconds.
    fn timestamp(&self) -> i64 {
        self.now().timestamp()
    }
}

/// System clock using the OS time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub struct FixedClock {
    at: std::sync::atomic::AtomicI64,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(timestamp: i64) -> Self {
        Self {
            at: std::sync::atomic::AtomicI64::new(timestamp),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, seconds: i64) {
        self.at
            .fetch_add(seconds, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        let at = self.at.load(std::sync::atomic::Ordering::SeqCst);
        DateTime::from_timestamp(at, 0).unwrap_or_default()
    }
}
