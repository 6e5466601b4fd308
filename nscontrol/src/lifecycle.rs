//! Arena lifecycle: create-or-attach, first-time initialization, and
//! reference-counted release.

use crate::arena::{
    Arena, HEAP_START, INIT_READY, INIT_RUNNING, INIT_TORN_DOWN,
    LAYOUT_HASH, min_arena_size, validate_segment_size,
};
use crate::error::{ShmError, ShmResult};
use crate::platform::{
    create_or_open_region, get_current_pid, map_region, remove_region, wait_for_region_len,
};
use crate::queue::destroy_connections;
use crate::ring::{destroy_ring, init_ring};
use crate::store::init_store;
use nscontrol_common::config::SegmentConfig;
use nscontrol_common::shm::layout::ARENA_MAGIC;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How this process came to hold the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// Created and initialized it
    Created,
    /// Attached to an arena another process created
    Opened,
}

/// Result of releasing one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other references remain
    Detached {
        /// References still held
        remaining: u32,
    },
    /// This was the last reference; the arena was torn down and removed
    Destroyed,
    /// This mapping held no reference
    NotAttached,
}

enum Wait {
    Ready,
    Retry,
}

impl Arena {
    /// Create the named arena or attach to the existing one, and take a
    /// reference on it.
    pub fn open(config: &SegmentConfig) -> ShmResult<(Self, Attach)> {
        config.validate()?;
        validate_segment_size(config.capacity)?;
        let path = config.path();
        let timeout = Duration::from_millis(config.attach_timeout_ms);
        let deadline = Instant::now() + timeout;

        loop {
            let region = create_or_open_region(&path, config.capacity)?;
            let attach = if region.created {
                Attach::Created
            } else {
                Attach::Opened
            };
            let len = match attach {
                Attach::Created => config.capacity,
                Attach::Opened => {
                    wait_for_region_len(&path, &region.file, min_arena_size(), timeout)?
                }
            };
            let mmap = match map_region(&region.file, len) {
                Ok(mmap) => mmap,
                Err(e) => {
                    if region.created {
                        let _ = remove_region(&path);
                    }
                    return Err(e);
                }
            };
            let arena = Self::from_mapping(config.name.clone(), path.clone(), region.file, mmap)?;

            match attach {
                Attach::Created => {
                    // SAFETY: we created the file; nobody can be using it
                    // until init_state reaches READY.
                    if let Err(e) = unsafe { arena.initialize() } {
                        let _ = remove_region(&path);
                        return Err(e);
                    }
                    info!(arena = %arena.name(), capacity = len, "arena created");
                }
                Attach::Opened => {
                    if let Wait::Retry = arena.wait_ready(deadline)? {
                        // A region left torn down by a crashed owner never
                        // goes away on its own.
                        if Instant::now() >= deadline {
                            return Err(ShmError::InitTimeout {
                                name: config.name.clone(),
                            });
                        }
                        debug!(arena = %arena.name(), "arena torn down while attaching, retrying");
                        std::thread::sleep(Duration::from_millis(1));
                        continue;
                    }
                    arena.validate_layout()?;
                }
            }

            match arena.acquire()? {
                Some(refs) => {
                    debug!(arena = %arena.name(), refs, ?attach, "arena attached");
                    return Ok((arena, attach));
                }
                None if Instant::now() < deadline => {
                    debug!(arena = %arena.name(), "arena torn down while attaching, retrying");
                    std::thread::sleep(Duration::from_millis(1));
                    continue;
                }
                None => {
                    return Err(ShmError::InitTimeout {
                        name: config.name.clone(),
                    });
                }
            }
        }
    }

    /// Lay out the root, the heap, the ring and the state store.
    ///
    /// # Safety
    ///
    /// Only the creating process may call this, once, before anyone else
    /// can observe the region as ready.
    unsafe fn initialize(&self) -> ShmResult<()> {
        self.init_state().store(INIT_RUNNING, Ordering::Release);

        let root = self.base() as *mut crate::arena::ArenaRoot;
        unsafe {
            let header = std::ptr::addr_of_mut!((*root).header);
            (*header).magic = ARENA_MAGIC;
            (*header).layout_hash = LAYOUT_HASH;
            (*header).capacity = self.len() as u64;
            (*header).creator_pid = get_current_pid();
        }

        let root = self.root();
        for (mutex, name) in root.locks.each() {
            // SAFETY: zero-filled storage, not yet visible to anyone.
            unsafe { mutex.init(name)? };
        }
        unsafe {
            *root.ref_count.get() = 0;
            (*root.heap.get()).init(self.base(), HEAP_START, self.len());
            init_store(&root.store);
        }
        self.with_global("initialize", |g| {
            // SAFETY: still initializing, see above.
            unsafe { init_ring(&root.ring, g) }
        })?;

        self.init_state().store(INIT_READY, Ordering::Release);
        Ok(())
    }

    fn wait_ready(&self, deadline: Instant) -> ShmResult<Wait> {
        loop {
            match self.init_state().load(Ordering::Acquire) {
                INIT_READY => return Ok(Wait::Ready),
                INIT_TORN_DOWN => return Ok(Wait::Retry),
                _ if Instant::now() >= deadline => {
                    return Err(ShmError::InitTimeout {
                        name: self.name().to_string(),
                    });
                }
                _ => std::thread::sleep(Duration::from_millis(1)),
            }
        }
    }

    fn validate_layout(&self) -> ShmResult<()> {
        let header = &self.root().header;
        if header.magic != ARENA_MAGIC {
            return Err(ShmError::LayoutMismatch {
                expected: LAYOUT_HASH,
                found: 0,
            });
        }
        if header.layout_hash != LAYOUT_HASH {
            return Err(ShmError::LayoutMismatch {
                expected: LAYOUT_HASH,
                found: header.layout_hash,
            });
        }
        Ok(())
    }

    /// Take a reference. Returns `None` if the arena is being torn down.
    fn acquire(&self) -> ShmResult<Option<u32>> {
        let acquired = self.with_global("attach", |g| {
            if self.init_state().load(Ordering::Acquire) != INIT_READY {
                return Ok(None);
            }
            *g.ref_count += 1;
            self.mark_attached();
            Ok(Some(*g.ref_count))
        });
        settle_acquire(acquired, self.init_state().load(Ordering::Acquire))
    }

    /// Drop this mapping's reference. The last reference tears the arena
    /// down and removes the named region. Dropping an attached `Arena`
    /// releases it implicitly.
    pub fn release(&self) -> ShmResult<Release> {
        if !self.take_attached() {
            return Ok(Release::NotAttached);
        }
        let root = self.root();
        let remaining = self.with_global("detach", |g| {
            *g.ref_count = g.ref_count.saturating_sub(1);
            if *g.ref_count > 0 {
                return Ok(*g.ref_count);
            }
            self.init_state().store(INIT_TORN_DOWN, Ordering::Release);
            destroy_connections(g);
            // SAFETY: the count is zero, nobody else is attached.
            unsafe { destroy_ring(&root.ring, g) };
            Ok(0)
        })?;

        if remaining > 0 {
            debug!(arena = %self.name(), remaining, "arena detached");
            return Ok(Release::Detached { remaining });
        }

        // Heap, registry and state store die with the region.
        for (mutex, name) in root.locks.each() {
            // SAFETY: unlocked, and no process is attached any more.
            unsafe { mutex.destroy(name) };
        }
        if !remove_region(self.path())? {
            warn!(arena = %self.name(), "arena already removed");
        }
        info!(arena = %self.name(), "arena destroyed");
        Ok(Release::Destroyed)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(arena = %self.name(), error = %e, "arena release failed");
        }
    }
}

/// The last releaser destroys the locks after leaving the global critical
/// section, so an opener blocked on the global lock can see it fail. Once
/// the arena is no longer ready that failure means "retry", not "broken".
fn settle_acquire(acquired: ShmResult<Option<u32>>, init_state: u32) -> ShmResult<Option<u32>> {
    match acquired {
        Err(ShmError::Lock { lock, source }) if init_state != INIT_READY => {
            debug!(lock, errno = %source, "arena lock destroyed during teardown, retrying");
            Ok(None)
        }
        other => other,
    }
}

/// Remove a named arena without attaching to it. For cleaning up after
/// crashed processes; live attachments keep their mapping.
pub fn remove_arena(config: &SegmentConfig) -> ShmResult<bool> {
    config.validate()?;
    let removed = remove_region(&config.path())?;
    if removed {
        warn!(arena = %config.name, "arena forcibly removed");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    fn lock_failure() -> ShmResult<Option<u32>> {
        Err(ShmError::Lock {
            lock: crate::arena::GLOBAL_LOCK,
            source: Errno::EINVAL,
        })
    }

    #[test]
    fn test_lock_failure_during_teardown_retries() {
        assert_eq!(settle_acquire(lock_failure(), INIT_TORN_DOWN).unwrap(), None);
        assert_eq!(settle_acquire(Ok(Some(2)), INIT_READY).unwrap(), Some(2));
        assert_eq!(settle_acquire(Ok(None), INIT_TORN_DOWN).unwrap(), None);
    }

    #[test]
    fn test_lock_failure_on_ready_arena_is_an_error() {
        assert!(matches!(
            settle_acquire(lock_failure(), INIT_READY),
            Err(ShmError::Lock { .. })
        ));
    }

    #[test]
    fn test_open_gives_up_on_stuck_teardown() -> ShmResult<()> {
        let mut config = SegmentConfig::named(format!("nsc_stuck_{}", std::process::id()));
        config.attach_timeout_ms = 100;
        let (owner, attach) = Arena::open(&config)?;
        assert_eq!(attach, Attach::Created);
        // Owner died between marking teardown and removing the region.
        owner.init_state().store(INIT_TORN_DOWN, Ordering::Release);

        let started = Instant::now();
        let result = Arena::open(&config);
        assert!(matches!(result, Err(ShmError::InitTimeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));

        drop(owner);
        assert!(!config.path().exists());
        Ok(())
    }
}
