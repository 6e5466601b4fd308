//! Process-shared locking primitives living inside the arena.
//!
//! Ordinary `std`/`parking_lot` locks are invisible across process
//! boundaries, so every lock guarding arena state is a `pthread_mutex_t`
//! initialized with `PTHREAD_PROCESS_SHARED` and stored in the mapped region.
//!
//! A process that dies while holding one of these locks leaves it held;
//! the mutexes are not robust and that case is not recovered.

use crate::error::{ShmError, ShmResult};
use nix::errno::Errno;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;

/// A `pthread_mutex_t` shared between processes.
///
/// Error-checking type: relocking from the owning thread returns `EDEADLK`
/// instead of hanging.
#[repr(C)]
pub struct ShmMutex {
    raw: UnsafeCell<libc::pthread_mutex_t>,
}

// SAFETY: pthread mutexes are designed for concurrent use; all access goes
// through the pthread API.
unsafe impl Sync for ShmMutex {}
unsafe impl Send for ShmMutex {}

impl ShmMutex {
    /// Initialize the mutex in place.
    ///
    /// # Safety
    ///
    /// Must be called exactly once, on memory no other thread or process is
    /// using yet, before the first `lock`.
    pub(crate) unsafe fn init(&self, name: &'static str) -> ShmResult<()> {
        let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
        unsafe {
            check(name, libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
            let configured = check(
                name,
                libc::pthread_mutexattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED),
            )
            .and_then(|_| {
                check(
                    name,
                    libc::pthread_mutexattr_settype(attr.as_mut_ptr(), libc::PTHREAD_MUTEX_ERRORCHECK),
                )
            })
            .and_then(|_| check(name, libc::pthread_mutex_init(self.raw.get(), attr.as_ptr())));
            libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
            configured
        }
    }

    /// Block until the lock is acquired.
    pub fn lock(&self, name: &'static str) -> ShmResult<ShmMutexGuard<'_>> {
        // SAFETY: the mutex was initialized by the arena creator before the
        // arena was marked ready.
        check(name, unsafe { libc::pthread_mutex_lock(self.raw.get()) })?;
        Ok(ShmMutexGuard {
            mutex: self,
            name,
            _not_send: PhantomData,
        })
    }

    /// Acquire the lock only if it is free right now.
    pub fn try_lock(&self, name: &'static str) -> ShmResult<Option<ShmMutexGuard<'_>>> {
        // SAFETY: see `lock`.
        match unsafe { libc::pthread_mutex_trylock(self.raw.get()) } {
            0 => Ok(Some(ShmMutexGuard {
                mutex: self,
                name,
                _not_send: PhantomData,
            })),
            libc::EBUSY => Ok(None),
            code => Err(ShmError::Lock {
                lock: name,
                source: Errno::from_raw(code),
            }),
        }
    }

    /// Destroy the mutex.
    ///
    /// # Safety
    ///
    /// The mutex must be unlocked and no process may use it afterwards.
    pub(crate) unsafe fn destroy(&self, name: &'static str) {
        let rc = unsafe { libc::pthread_mutex_destroy(self.raw.get()) };
        if rc != 0 {
            tracing::warn!(lock = name, errno = %Errno::from_raw(rc), "mutex destroy failed");
        }
    }
}

/// RAII guard; the lock is released when the guard is dropped.
///
/// Not `Send`: an error-checking mutex must be unlocked by the thread that
/// locked it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ShmMutexGuard<'a> {
    mutex: &'a ShmMutex,
    name: &'static str,
    _not_send: PhantomData<*const ()>,
}

impl ShmMutexGuard<'_> {
    /// Name of the held lock.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Release the lock explicitly.
    pub fn unlock(self) {}
}

impl Drop for ShmMutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard proves this thread holds the lock.
        let rc = unsafe { libc::pthread_mutex_unlock(self.mutex.raw.get()) };
        if rc != 0 {
            tracing::error!(lock = self.name, errno = %Errno::from_raw(rc), "mutex unlock failed");
        }
    }
}

/// Arena-resident value guarded by one of the arena locks.
#[repr(transparent)]
pub(crate) struct ShmCell<T>(UnsafeCell<T>);

// SAFETY: every access goes through `get`, whose callers hold the lock
// guarding the cell.
unsafe impl<T: Send> Sync for ShmCell<T> {}

impl<T> ShmCell<T> {
    /// Raw pointer to the value. Dereference only while holding the lock
    /// that guards this cell.
    pub(crate) fn get(&self) -> *mut T {
        self.0.get()
    }
}

fn check(name: &'static str, rc: libc::c_int) -> ShmResult<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(ShmError::Lock {
            lock: name,
            source: Errno::from_raw(rc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed_mutex() -> Box<ShmMutex> {
        // SAFETY: an all-zero pthread_mutex_t is valid storage to initialize.
        let mutex: Box<ShmMutex> = Box::new(unsafe { std::mem::zeroed() });
        unsafe { mutex.init("test").unwrap() };
        mutex
    }

    #[test]
    fn test_lock_and_try_lock() {
        let mutex = boxed_mutex();
        let guard = mutex.lock("test").unwrap();
        assert_eq!(guard.name(), "test");

        // Same thread relock is reported, not deadlocked.
        assert!(matches!(
            mutex.lock("test"),
            Err(ShmError::Lock { source: Errno::EDEADLK, .. })
        ));
        guard.unlock();

        let guard = mutex.try_lock("test").unwrap();
        assert!(guard.is_some());
        drop(guard);
        unsafe { mutex.destroy("test") };
    }

    #[test]
    fn test_try_lock_busy_from_other_thread() {
        let mutex: &'static ShmMutex = Box::leak(boxed_mutex());
        let guard = mutex.lock("test").unwrap();
        let busy = std::thread::spawn(move || mutex.try_lock("test").map(|g| g.is_none()))
            .join()
            .unwrap()
            .unwrap();
        assert!(busy);
        drop(guard);
    }
}
