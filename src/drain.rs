use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex, MutexGuard, PoisonError,
};

/// Serializes delivery of signals. The first caller of [run](Drain::run) becomes the owner and keeps
/// running the step while other callers (including re-entrant calls from inside the step) only leave a mark.
/// The owner loops instead of recursing, so the stack depth stays constant whatever the demand is.
pub(crate) struct Drain(AtomicUsize);

impl Drain {
    pub fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    pub fn run(&self, mut step: impl FnMut()) {
        if self.0.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            step();
            missed = self.0.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }
}

/// Lock ignoring poisoning: state behind our mutexes stays consistent even if a subscriber panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
