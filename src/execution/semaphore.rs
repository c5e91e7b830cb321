use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A small, blocking counting semaphore.
///
/// Bounds how many batch items are evaluated at once, independently of the pool size.
pub struct Semaphore {
    permits: Mutex<usize>,
    cv: Condvar,
}

/// A held permit; released on drop, including when the item panics.
pub struct Permit<'a> {
    sem: &'a Semaphore,
}

impl Semaphore {
    /// `permits` must be non-zero or every `acquire` blocks forever.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire one permit, blocking until available.
    ///
    /// Also returns the time spent waiting (zero if no wait was required).
    pub fn acquire(&self) -> (Permit<'_>, Duration) {
        let start = Instant::now();
        let mut waited = false;
        let mut g = self.lock();
        while *g == 0 {
            waited = true;
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        *g -= 1;
        let waited = if waited { start.elapsed() } else { Duration::ZERO };
        (Permit { sem: self }, waited)
    }

    fn release(&self) {
        let mut g = self.lock();
        *g += 1;
        self.cv.notify_one();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::Semaphore;

    #[test]
    fn permit_is_returned_on_drop() {
        let sem = Semaphore::new(1);
        let (permit, waited) = sem.acquire();
        assert_eq!(waited, Duration::ZERO);
        drop(permit);
        let (_again, waited) = sem.acquire();
        assert_eq!(waited, Duration::ZERO);
    }

    #[test]
    fn second_acquire_waits_for_release() {
        let sem = Semaphore::new(1);
        std::thread::scope(|s| {
            let (permit, _) = sem.acquire();
            let h = s.spawn(|| sem.acquire().1);
            std::thread::sleep(Duration::from_millis(20));
            drop(permit);
            assert!(h.join().unwrap() > Duration::ZERO);
        });
    }
}
