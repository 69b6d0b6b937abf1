use chrono::{DateTime, Utc};

/// Source of "now" for every time-based decision in the core.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant; it only moves when told to.
#[derive(Debug, Default)]
pub struct FixedClock {
    at: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            at: std::sync::Mutex::new(at),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.lock().expect("fixed clock mutex poisoned") = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.at.lock().expect("fixed clock mutex poisoned");
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().expect("fixed clock mutex poisoned")
    }
}

pub fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}
