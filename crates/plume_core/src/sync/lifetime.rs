//! # Shared Lifetime Counter
//!
//! One atomic word tracks both readers and the writer:
//!
//! ```text
//! 0            free (may be locked for writing)
//! 1..MAX-1     that many readers, contents frozen
//! MAX          write-locked, no readers may enter
//! ```
//!
//! Nothing here blocks. Every acquire either succeeds or reports failure and
//! the caller decides whether to retry.

use std::sync::atomic::{AtomicU32, Ordering};

/// Sentinel value meaning "exclusively locked for writing".
pub const WRITE_LOCKED: u32 = u32::MAX;

/// Atomic read/write reference count.
#[derive(Debug, Default)]
pub struct SharedLifetime {
    count: AtomicU32,
}

impl SharedLifetime {
    /// Creates an unreferenced, unlocked counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
        }
    }

    /// Adds a reader unless the object is write-locked.
    ///
    /// Returns `false` without touching the count if a writer holds the lock.
    #[inline]
    pub fn try_add_read_ref(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current == WRITE_LOCKED {
                return false;
            }
            assert!(current < WRITE_LOCKED - 1, "read reference count overflow");
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Adds a reader.
    ///
    /// # Panics
    ///
    /// Panics if the object is write-locked.
    #[inline]
    pub fn add_read_ref(&self) {
        assert!(
            self.try_add_read_ref(),
            "add_read_ref on a write-locked object"
        );
    }

    /// Drops a reader previously added with [`Self::add_read_ref`] or
    /// [`Self::try_add_read_ref`].
    ///
    /// # Panics
    ///
    /// Panics if there is no reader to release.
    #[inline]
    pub fn release_read_ref(&self) {
        let released = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n != 0 && n != WRITE_LOCKED).then(|| n - 1)
            });
        if let Err(count) = released {
            panic!("unbalanced release_read_ref (count was {count})");
        }
    }

    /// Takes the write lock if there are no readers.
    #[inline]
    pub fn try_lock(&self) -> bool {
        self.count
            .compare_exchange(0, WRITE_LOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the write lock.
    ///
    /// # Panics
    ///
    /// Panics if the object was not write-locked.
    #[inline]
    pub fn unlock(&self) {
        let unlocked = self
            .count
            .compare_exchange(WRITE_LOCKED, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        assert!(unlocked, "unlock on an object that is not write-locked");
    }

    /// Current number of readers (0 while write-locked).
    #[inline]
    #[must_use]
    pub fn read_ref_count(&self) -> u32 {
        match self.count.load(Ordering::Acquire) {
            WRITE_LOCKED => 0,
            n => n,
        }
    }

    /// Whether at least one reader holds the object.
    #[inline]
    #[must_use]
    pub fn is_in_use(&self) -> bool {
        self.read_ref_count() > 0
    }

    /// Whether a writer holds the lock.
    #[inline]
    #[must_use]
    pub fn is_write_locked(&self) -> bool {
        self.count.load(Ordering::Acquire) == WRITE_LOCKED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_in_use_tracks_readers() {
        let lifetime = SharedLifetime::new();
        assert!(!lifetime.is_in_use());

        lifetime.add_read_ref();
        lifetime.add_read_ref();
        assert!(lifetime.is_in_use());
        assert_eq!(lifetime.read_ref_count(), 2);

        lifetime.release_read_ref();
        assert!(lifetime.is_in_use());
        lifetime.release_read_ref();
        assert!(!lifetime.is_in_use());
    }

    #[test]
    fn test_try_lock_only_without_readers() {
        let lifetime = SharedLifetime::new();

        lifetime.add_read_ref();
        assert!(!lifetime.try_lock());
        lifetime.release_read_ref();

        assert!(lifetime.try_lock());
        assert!(lifetime.is_write_locked());
        assert!(!lifetime.try_lock(), "second lock must fail");
        assert!(!lifetime.try_add_read_ref());
        assert!(!lifetime.is_in_use());

        lifetime.unlock();
        assert!(!lifetime.is_write_locked());
        assert!(lifetime.try_add_read_ref());
        lifetime.release_read_ref();
    }

    #[test]
    #[should_panic(expected = "not write-locked")]
    fn test_unlock_without_lock_panics() {
        SharedLifetime::new().unlock();
    }

    #[test]
    #[should_panic(expected = "add_read_ref on a write-locked object")]
    fn test_add_read_ref_while_locked_panics() {
        let lifetime = SharedLifetime::new();
        assert!(lifetime.try_lock());
        lifetime.add_read_ref();
    }

    #[test]
    #[should_panic(expected = "unbalanced release_read_ref")]
    fn test_unbalanced_release_panics() {
        SharedLifetime::new().release_read_ref();
    }

    #[test]
    fn test_concurrent_readers_balance() {
        let lifetime = Arc::new(SharedLifetime::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifetime = Arc::clone(&lifetime);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        lifetime.add_read_ref();
                        lifetime.release_read_ref();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(lifetime.read_ref_count(), 0);
        assert!(lifetime.try_lock());
    }
}
