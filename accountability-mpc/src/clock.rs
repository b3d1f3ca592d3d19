use chrono::{DateTime, Utc};

/// A seam over the wall clock so the deterministic-reproducibility
/// invariant in §4.2 and the streak/health date math in §4.5–§4.6 can
/// be unit tested without wall-clock flakiness (see SPEC_FULL.md,
/// "Supplemented" section).
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

#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
