use chrono::{DateTime, NaiveDate, Utc};

/// Server-authoritative time source. A trait rather than bare `Utc::now()`
/// calls so tests can freeze time at exact boundaries (e.g. "confirmation
/// window plus one second").
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The civil session date, fixed to the server's timezone policy (UTC).
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, for tests that need exact boundary timing.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
