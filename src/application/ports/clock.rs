use chrono::{DateTime, Utc};

/// Time source passed explicitly into every operation that needs "now", so
/// transition logic is deterministically testable without wall-clock
/// coupling.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
