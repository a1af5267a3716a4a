//! Lock acquisition that survives poisoning.
//!
//! Every guarded value in this crate stays internally consistent between
//! statements, so a panic elsewhere leaves nothing half-written worth refusing.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

fn recover<G>(
    poisoned: PoisonError<G>,
    kind: &'static str,
    target: &'static str,
    op: &'static str,
) -> G {
    warn!(
        op,
        target_module = target,
        lock_kind = kind,
        result = "poisoned_recovered",
        "Recovered from poisoned lock"
    );
    poisoned.into_inner()
}

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, "rwlock.read", target, op))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    target: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, "rwlock.write", target, op))
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    target: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    lock.lock()
        .unwrap_or_else(|poisoned| recover(poisoned, "mutex.lock", target, op))
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    #[test]
    fn mutex_guard_is_recovered_after_panic() {
        let lock = Mutex::new(1_u32);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.lock().expect("first lock succeeds");
            panic!("poison the mutex");
        }));

        assert!(lock.is_poisoned());
        *mutex_lock(&lock, "util::lock", "test") += 1;
        assert_eq!(*mutex_lock(&lock, "util::lock", "test"), 2);
    }

    #[test]
    fn rwlock_guard_is_recovered_after_panic() {
        let lock = RwLock::new(vec![1_u8]);
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = lock.write().expect("first write succeeds");
            panic!("poison the rwlock");
        }));

        rw_write(&lock, "util::lock", "test").push(2);
        assert_eq!(rw_read(&lock, "util::lock", "test").len(), 2);
    }
}
