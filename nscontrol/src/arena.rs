//! Arena layout and the per-process mapping of it.
//!
//! ```text
//! offset 0
//! ┌──────────────────────────────┐
//! │ ArenaHeader (64 B)           │ magic, layout hash, init state
//! │ ArenaLocks                   │ five process-shared mutexes
//! │ ref count, Heap, Registry    │ guarded by the global lock
//! │ RingControl                  │ cursors + gap
//! │ StateStore                   │ write side, read side, shared strings
//! ├──────────────────────────────┤ ALLOC_ALIGN
//! │ heap                         │ command queues, ring nodes, strings
//! └──────────────────────────────┘ capacity
//! ```

use crate::alloc::{ALLOC_ALIGN, Heap, Offset};
use crate::error::{ShmError, ShmResult};
use crate::queue::Registry;
use crate::ring::RingControl;
use crate::store::StateStore;
use crate::sync::{ShmCell, ShmMutex};
use memmap2::MmapMut;
use nscontrol_common::shm::consts::{CACHE_LINE_SIZE, SHM_MAX_SIZE, SHM_MIN_SIZE};
use nscontrol_common::shm::layout::struct_version_hash;
use static_assertions::const_assert_eq;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Name of the lock guarding the registry, heap, ring gap and ref count.
pub const GLOBAL_LOCK: &str = "global";
/// Name of the lock serializing realtime ring readers.
pub const RING_READER_LOCK: &str = "ring_reader";
/// Name of the lock serializing realtime ring writers.
pub const RING_WRITER_LOCK: &str = "ring_writer";
/// Name of the lock guarding the write side of the state store.
pub const STATE_WRITE_LOCK: &str = "state_write";
/// Name of the lock guarding the read side of the state store.
pub const STATE_READ_LOCK: &str = "state_read";

/// `init_state`: the creator is initializing. A zero-filled region reads 0.
pub(crate) const INIT_RUNNING: u32 = 1;
/// `init_state`: ready for use.
pub(crate) const INIT_READY: u32 = 2;
/// `init_state`: the last reference was released; the region is going away.
pub(crate) const INIT_TORN_DOWN: u32 = 3;

/// Arena header with cache-line alignment
#[repr(C, align(64))]
pub(crate) struct ArenaHeader {
    /// Magic number for validation
    pub(crate) magic: [u8; 8],
    /// Layout hash of the build that created the arena
    pub(crate) layout_hash: u32,
    /// One of the `INIT_*` states
    pub(crate) init_state: AtomicU32,
    /// Total mapped size
    pub(crate) capacity: u64,
    /// Process that created the arena
    pub(crate) creator_pid: u32,
    _reserved: [u8; 36],
}

const_assert_eq!(std::mem::size_of::<ArenaHeader>(), CACHE_LINE_SIZE);

/// The five process-shared locks.
#[repr(C)]
pub(crate) struct ArenaLocks {
    pub(crate) global: ShmMutex,
    pub(crate) ring_reader: ShmMutex,
    pub(crate) ring_writer: ShmMutex,
    pub(crate) state_write: ShmMutex,
    pub(crate) state_read: ShmMutex,
}

impl ArenaLocks {
    pub(crate) fn each(&self) -> [(&ShmMutex, &'static str); 5] {
        [
            (&self.global, GLOBAL_LOCK),
            (&self.ring_reader, RING_READER_LOCK),
            (&self.ring_writer, RING_WRITER_LOCK),
            (&self.state_write, STATE_WRITE_LOCK),
            (&self.state_read, STATE_READ_LOCK),
        ]
    }
}

/// Fixed-position singletons at the start of the arena.
#[repr(C)]
pub(crate) struct ArenaRoot {
    pub(crate) header: ArenaHeader,
    pub(crate) locks: ArenaLocks,
    /// Live attachments. Guarded by `global`.
    pub(crate) ref_count: ShmCell<u32>,
    /// Guarded by `global`.
    pub(crate) heap: ShmCell<Heap>,
    /// Guarded by `global`.
    pub(crate) registry: ShmCell<Registry>,
    pub(crate) ring: RingControl,
    pub(crate) store: StateStore,
}

/// Layout hash written by creators and checked by openers.
pub(crate) const LAYOUT_HASH: u32 = struct_version_hash::<ArenaRoot>();

/// Offset where the heap begins.
pub(crate) const HEAP_START: usize =
    (std::mem::size_of::<ArenaRoot>() + ALLOC_ALIGN - 1) & !(ALLOC_ALIGN - 1);

/// Smallest arena able to hold the root plus a useful heap.
pub fn min_arena_size() -> usize {
    let needed = HEAP_START + 256 * 1024;
    needed.div_ceil(SHM_MIN_SIZE) * SHM_MIN_SIZE
}

/// Validate arena size constraints
pub fn validate_segment_size(size: usize) -> ShmResult<()> {
    if size < SHM_MIN_SIZE || size > SHM_MAX_SIZE || size % SHM_MIN_SIZE != 0 {
        return Err(ShmError::InvalidSize { size });
    }
    if size < min_arena_size() {
        return Err(ShmError::InvalidSize { size });
    }
    Ok(())
}

/// Per-process mapping of a named arena.
pub struct Arena {
    name: String,
    path: PathBuf,
    base: NonNull<u8>,
    len: usize,
    attached: AtomicBool,
    _mmap: MmapMut,
    _file: File,
}

// SAFETY: the mapping is owned by this value; all shared mutable state in it
// is behind atomics or process-shared locks.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Wrap a fresh mapping.
    pub(crate) fn from_mapping(
        name: String,
        path: PathBuf,
        file: File,
        mut mmap: MmapMut,
    ) -> ShmResult<Self> {
        let len = mmap.len();
        let base = NonNull::new(mmap.as_mut_ptr()).ok_or(ShmError::InvalidSize { size: len })?;
        let address = base.as_ptr() as usize;
        if address % CACHE_LINE_SIZE != 0 || len < HEAP_START {
            return Err(ShmError::InvalidSize { size: len });
        }
        Ok(Self {
            name,
            path,
            base,
            len,
            attached: AtomicBool::new(false),
            _mmap: mmap,
            _file: file,
        })
    }

    /// Arena name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the named region.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mapped size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; an arena is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    pub(crate) fn root(&self) -> &ArenaRoot {
        // SAFETY: the mapping is at least HEAP_START bytes and cache-line
        // aligned; every field mutated after initialization is interior
        // mutable (atomics, pthread mutexes, ShmCell).
        unsafe { &*(self.base.as_ptr() as *const ArenaRoot) }
    }

    /// Header view usable before initialization has completed.
    pub(crate) fn init_state(&self) -> &AtomicU32 {
        let root = self.base.as_ptr() as *const ArenaRoot;
        // SAFETY: only the atomic is referenced; other header fields may
        // still be written by the creating process.
        unsafe { &*std::ptr::addr_of!((*root).header.init_state) }
    }

    pub(crate) fn locks(&self) -> &ArenaLocks {
        &self.root().locks
    }

    /// Local address of an arena object.
    pub(crate) fn resolve<T>(&self, offset: Offset<T>) -> *mut T {
        debug_assert!(offset.raw() as usize + std::mem::size_of::<T>() <= self.len);
        self.base.as_ptr().wrapping_add(offset.raw() as usize) as *mut T
    }

    /// Record that this mapping holds a reference.
    pub(crate) fn mark_attached(&self) {
        self.attached.store(true, Ordering::Release);
    }

    /// Clear the attached flag; returns whether it was set.
    pub(crate) fn take_attached(&self) -> bool {
        self.attached.swap(false, Ordering::AcqRel)
    }

    /// True while this mapping holds a reference.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Run `f` with the global lock held.
    ///
    /// Errors returned by `f` are logged together with the remaining arena
    /// capacity before the lock is released and the error is passed on.
    pub(crate) fn with_global<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut Global<'_>) -> ShmResult<T>,
    ) -> ShmResult<T> {
        let guard = self.locks().global.lock(GLOBAL_LOCK)?;
        let root = self.root();
        // SAFETY: the global lock is held for the lifetime of `global`.
        let mut global = unsafe {
            Global {
                ref_count: &mut *root.ref_count.get(),
                heap: &mut *root.heap.get(),
                registry: &mut *root.registry.get(),
                gap: &mut *root.ring.gap.get(),
                arena: self,
            }
        };
        let result = f(&mut global);
        if let Err(e) = &result {
            tracing::error!(
                arena = %self.name,
                op,
                free_bytes = global.heap.free_bytes(),
                error = %e,
                "operation failed under global lock"
            );
        }
        drop(global);
        guard.unlock();
        result
    }
}

/// Everything guarded by the global lock, borrowed for one critical section.
pub(crate) struct Global<'a> {
    pub(crate) ref_count: &'a mut u32,
    pub(crate) heap: &'a mut Heap,
    pub(crate) registry: &'a mut Registry,
    pub(crate) gap: &'a mut u32,
    arena: &'a Arena,
}

impl Global<'_> {
    /// Allocate a zero-filled `T`.
    ///
    /// # Safety
    ///
    /// The all-zero bit pattern must be a valid `T`.
    pub(crate) unsafe fn alloc_zeroed<T>(&mut self) -> ShmResult<Offset<T>> {
        const { assert!(std::mem::align_of::<T>() <= ALLOC_ALIGN) };
        let size = std::mem::size_of::<T>();
        let offset = self.alloc_bytes(size)?;
        // SAFETY: the block is `size` bytes, owned by us, and inside the mapping.
        unsafe { std::ptr::write_bytes(self.arena.resolve(offset), 0, size) };
        Ok(offset.cast())
    }

    /// Allocate `len` uninitialized bytes.
    pub(crate) fn alloc_bytes(&mut self, len: usize) -> ShmResult<Offset<u8>> {
        // SAFETY: the heap was initialized against this base and the global
        // lock is held.
        match unsafe { self.heap.alloc(self.arena.base(), len) } {
            Some(raw) => Ok(Offset::from_raw(raw)),
            None => Err(ShmError::OutOfMemory {
                requested: len,
                free: self.heap.free_bytes(),
            }),
        }
    }

    /// Return an allocation to the heap. Null handles are ignored.
    pub(crate) fn free<T>(&mut self, offset: Offset<T>) {
        if offset.is_null() {
            return;
        }
        // SAFETY: see `alloc_bytes`.
        unsafe { self.heap.free(self.arena.base(), offset.raw()) };
    }

    /// Local address of an arena object.
    pub(crate) fn resolve<T>(&self, offset: Offset<T>) -> *mut T {
        self.arena.resolve(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nscontrol_common::shm::consts::ARENA_CAPACITY;
    use nscontrol_common::shm::layout::ARENA_MAGIC;

    #[test]
    fn test_segment_size_validation() {
        assert!(validate_segment_size(ARENA_CAPACITY).is_ok());
        assert!(validate_segment_size(min_arena_size()).is_ok());

        assert!(validate_segment_size(1024).is_err()); // Too small
        assert!(validate_segment_size(ARENA_CAPACITY + 1).is_err()); // Not page-aligned
        assert!(validate_segment_size(2 * 1024 * 1024 * 1024).is_err()); // Too large
        assert!(validate_segment_size(SHM_MIN_SIZE).is_err()); // Cannot hold the root
    }

    #[test]
    fn test_heap_start_is_aligned() {
        assert_eq!(HEAP_START % ALLOC_ALIGN, 0);
        assert!(HEAP_START >= std::mem::size_of::<ArenaRoot>());
        assert!(min_arena_size() < ARENA_CAPACITY);
    }

    #[test]
    fn test_root_alignment() {
        assert_eq!(std::mem::align_of::<ArenaRoot>(), CACHE_LINE_SIZE);
        assert_ne!(LAYOUT_HASH, 0);
        assert_eq!(ARENA_MAGIC.len(), 8);
    }
}
