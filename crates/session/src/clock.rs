use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Indirection over wall-clock time so tests can pin `joinedAt`/`leftAt`
/// timestamps and the constant-time passcode property test (spec.md §8,
/// property 7) can measure real elapsed time without the registry itself
/// caring which clock it's handed. Reap scheduling uses `tokio::time`
/// directly (see `crate::room::reap`) rather than this trait: grace periods
/// are realistically short-lived in tests via configuration, not a virtual
/// scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use std::sync::Mutex;

    /// A clock tests can advance deterministically.
    pub struct FixedClock(Mutex<DateTime<Utc>>);

    impl FixedClock {
        pub fn new(at: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(at)))
        }

        pub fn advance(&self, duration: chrono::Duration) {
            let mut guard = self.0.lock().unwrap();
            *guard += duration;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
