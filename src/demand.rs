use std::sync::atomic::{AtomicI64, Ordering};

/// Demand meaning "deliver everything". Pass it to [request](crate::Subscription::request)
/// to switch a subscription into unbounded mode; once reached the counter is never decremented again.
pub const UNBOUNDED: i64 = i64::MAX;

/// Outstanding demand of one subscription. Additions saturate at [UNBOUNDED].
pub(crate) struct Demand(AtomicI64);

impl Demand {
    pub fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    /// Add ```n > 0``` items of demand, return the new value
    pub fn add(&self, n: i64) -> i64 {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current.saturating_add(n);
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Consume one unit of demand. Returns ```false``` when no demand is left.
    pub fn try_take(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return true;
            }
            if current <= 0 {
                return false;
            }
            match self.0.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop all outstanding demand
    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}
