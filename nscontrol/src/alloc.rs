//! Arena allocator and offset handles.
//!
//! Every process maps the arena at a different base address, so nothing
//! stored inside it may be a pointer. Objects reference each other through
//! [`Offset`] handles (byte distance from the arena base) that are resolved
//! to a local address only at the point of use.
//!
//! Variable-size objects (command queues, ring nodes, shared strings) are
//! carved out of the heap region behind the arena root by a first-fit
//! free-list allocator. Free blocks are kept sorted by address and merged
//! with their neighbours on release.

use static_assertions::const_assert_eq;
use std::fmt;
use std::marker::PhantomData;

/// Alignment of every allocated block and of every payload handed out.
pub const ALLOC_ALIGN: usize = 16;

/// Byte offset of a `T` from the arena base. Offset 0 is the arena header
/// itself and therefore doubles as the null handle.
#[repr(transparent)]
pub struct Offset<T> {
    raw: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Offset<T> {
    /// The null handle.
    pub const NULL: Self = Self::from_raw(0);

    /// Wrap a raw byte offset.
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Raw byte offset.
    pub const fn raw(self) -> u32 {
        self.raw
    }

    /// True for the null handle.
    pub const fn is_null(self) -> bool {
        self.raw == 0
    }

    /// Reinterpret the handle as pointing to a different type.
    pub const fn cast<U>(self) -> Offset<U> {
        Offset::from_raw(self.raw)
    }
}

impl<T> Clone for Offset<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Offset<T> {}

impl<T> PartialEq for Offset<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Offset<T> {}

impl<T> fmt::Debug for Offset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset({:#x})", self.raw)
    }
}

/// Header preceding every heap block, free or used.
#[repr(C)]
struct BlockHeader {
    /// Total block size including this header.
    size: u32,
    /// Next free block (address order); 0 terminates the list.
    next_free: u32,
    /// 1 while allocated.
    used: u32,
    _reserved: u32,
}

const HEADER_SIZE: usize = std::mem::size_of::<BlockHeader>();
const_assert_eq!(HEADER_SIZE, ALLOC_ALIGN);

/// Smallest block worth splitting off as a separate free block.
const MIN_BLOCK: usize = HEADER_SIZE + ALLOC_ALIGN;

/// Allocator bookkeeping, stored in the arena root and guarded by the
/// global lock.
#[repr(C)]
pub(crate) struct Heap {
    start: u32,
    end: u32,
    free_head: u32,
    free_bytes: u32,
    allocations: u32,
    _reserved: u32,
}

impl Heap {
    /// Turn `[start, end)` of the arena into a single free block.
    ///
    /// # Safety
    ///
    /// `base..base + end` must be valid, writable and not in use.
    pub(crate) unsafe fn init(&mut self, base: *mut u8, start: usize, end: usize) {
        let start = align_up(start);
        let end = (end & !(ALLOC_ALIGN - 1)).max(start);
        self.start = start as u32;
        self.end = end as u32;
        self.allocations = 0;

        if end - start < MIN_BLOCK {
            self.free_head = 0;
            self.free_bytes = 0;
            return;
        }

        unsafe {
            block(base, self.start).write(BlockHeader {
                size: (end - start) as u32,
                next_free: 0,
                used: 0,
                _reserved: 0,
            });
        }
        self.free_head = self.start;
        self.free_bytes = (end - start) as u32;
    }

    /// Allocate `size` bytes; returns the payload offset.
    ///
    /// # Safety
    ///
    /// `base` must be the arena base this heap was initialized with and the
    /// caller must hold the lock guarding the heap.
    pub(crate) unsafe fn alloc(&mut self, base: *mut u8, size: usize) -> Option<u32> {
        let needed = align_up(size.max(1).checked_add(HEADER_SIZE)?);
        if needed > (self.end - self.start) as usize {
            return None;
        }

        let mut prev = 0u32;
        let mut cur = self.free_head;
        while cur != 0 {
            let blk = block(base, cur);
            unsafe {
                let block_size = (*blk).size as usize;
                let next = (*blk).next_free;
                if block_size >= needed {
                    if block_size - needed >= MIN_BLOCK {
                        let tail = cur + needed as u32;
                        block(base, tail).write(BlockHeader {
                            size: (block_size - needed) as u32,
                            next_free: next,
                            used: 0,
                            _reserved: 0,
                        });
                        self.link(base, prev, tail);
                        (*blk).size = needed as u32;
                    } else {
                        self.link(base, prev, next);
                    }
                    (*blk).used = 1;
                    (*blk).next_free = 0;
                    self.free_bytes -= (*blk).size;
                    self.allocations += 1;
                    return Some(cur + HEADER_SIZE as u32);
                }
                prev = cur;
                cur = next;
            }
        }
        None
    }

    /// Return a block obtained from `alloc`.
    ///
    /// Offsets that do not name a live allocation are logged and ignored.
    ///
    /// # Safety
    ///
    /// Same as `alloc`.
    pub(crate) unsafe fn free(&mut self, base: *mut u8, offset: u32) {
        let Some(cur) = offset.checked_sub(HEADER_SIZE as u32) else {
            tracing::error!(offset, "free of offset below heap start ignored");
            return;
        };
        if cur < self.start || cur >= self.end || (cur as usize) % ALLOC_ALIGN != 0 {
            tracing::error!(offset, "free of offset outside heap ignored");
            return;
        }

        let blk = block(base, cur);
        unsafe {
            if (*blk).used != 1 {
                tracing::error!(offset, "double free ignored");
                return;
            }
            (*blk).used = 0;
            self.free_bytes += (*blk).size;
            self.allocations -= 1;

            let mut prev = 0u32;
            let mut next = self.free_head;
            while next != 0 && next < cur {
                prev = next;
                next = (*block(base, next)).next_free;
            }
            (*blk).next_free = next;
            self.link(base, prev, cur);

            if next != 0 && cur + (*blk).size == next {
                let nblk = block(base, next);
                (*blk).size += (*nblk).size;
                (*blk).next_free = (*nblk).next_free;
            }
            if prev != 0 {
                let pblk = block(base, prev);
                if prev + (*pblk).size == cur {
                    (*pblk).size += (*blk).size;
                    (*pblk).next_free = (*blk).next_free;
                }
            }
        }
    }

    /// Bytes not currently handed out (including block headers).
    pub(crate) fn free_bytes(&self) -> usize {
        self.free_bytes as usize
    }

    /// Number of live allocations.
    pub(crate) fn allocations(&self) -> usize {
        self.allocations as usize
    }

    unsafe fn link(&mut self, base: *mut u8, prev: u32, to: u32) {
        if prev == 0 {
            self.free_head = to;
        } else {
            unsafe { (*block(base, prev)).next_free = to };
        }
    }
}

fn block(base: *mut u8, offset: u32) -> *mut BlockHeader {
    base.wrapping_add(offset as usize) as *mut BlockHeader
}

const fn align_up(n: usize) -> usize {
    (n + ALLOC_ALIGN - 1) & !(ALLOC_ALIGN - 1)
}
