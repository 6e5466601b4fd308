//! Realtime ring: a fixed cycle of command nodes with separate reader and
//! writer cursors.
//!
//! The gap counter is the distance from the read cursor to the write
//! cursor and lives under the global lock, so a writer and a reader each
//! hold only their own cursor lock and touch the global lock twice per
//! operation. The ring starts with the writer one node ahead (gap 1) and
//! refuses writes at gap N-1; up to N-2 commands can be pending.

use crate::alloc::Offset;
use crate::arena::{Arena, Global, RING_READER_LOCK, RING_WRITER_LOCK};
use crate::error::ShmResult;
use crate::queue::Command;
use crate::sync::ShmCell;
use nscontrol_common::shm::consts::RT_RING_SIZE;
use tracing::trace;

/// Commands that can be pending in the ring at once.
pub const RT_RING_CAPACITY: usize = RT_RING_SIZE - 2;

/// One node of the cycle.
#[repr(C)]
pub(crate) struct RingNode {
    next: Offset<RingNode>,
    _reserved: u32,
    slot: Command,
}

/// Ring cursors and gap, stored in the arena root.
#[repr(C)]
pub(crate) struct RingControl {
    /// Guarded by `ring_writer`.
    pub(crate) write_cursor: ShmCell<Offset<RingNode>>,
    /// Guarded by `ring_reader`.
    pub(crate) read_cursor: ShmCell<Offset<RingNode>>,
    /// Guarded by `global`.
    pub(crate) gap: ShmCell<u32>,
}

/// Allocate the nodes, link them into a cycle and place the cursors.
///
/// # Safety
///
/// Initialization only: nobody else may be using the ring.
pub(crate) unsafe fn init_ring(ring: &RingControl, g: &mut Global<'_>) -> ShmResult<()> {
    let mut nodes = [Offset::<RingNode>::NULL; RT_RING_SIZE];
    for i in 0..RT_RING_SIZE {
        // SAFETY: an all-zero RingNode is an unlinked node with an empty slot.
        match unsafe { g.alloc_zeroed::<RingNode>() } {
            Ok(offset) => nodes[i] = offset,
            Err(e) => {
                nodes[..i].iter().for_each(|&n| g.free(n));
                return Err(e);
            }
        }
    }
    for (i, &node) in nodes.iter().enumerate() {
        // SAFETY: freshly allocated, exclusively ours.
        unsafe { (*g.resolve(node)).next = nodes[(i + 1) % RT_RING_SIZE] };
    }
    unsafe {
        *ring.read_cursor.get() = nodes[0];
        *ring.write_cursor.get() = nodes[1];
    }
    *g.gap = 1;
    Ok(())
}

/// Free every node and null the cursors. Teardown only.
///
/// # Safety
///
/// No other process may be attached.
pub(crate) unsafe fn destroy_ring(ring: &RingControl, g: &mut Global<'_>) {
    let start = unsafe { *ring.read_cursor.get() };
    let mut node = start;
    for _ in 0..RT_RING_SIZE {
        if node.is_null() {
            break;
        }
        // SAFETY: every node of the cycle is a live allocation.
        let next = unsafe { (*g.resolve(node)).next };
        g.free(node);
        node = next;
        if node == start {
            break;
        }
    }
    unsafe {
        *ring.read_cursor.get() = Offset::NULL;
        *ring.write_cursor.get() = Offset::NULL;
    }
    *g.gap = 0;
}

impl Arena {
    /// Enqueue a realtime command. Returns false, dropping the command,
    /// when the ring is full.
    pub(crate) fn write_rt(&self, payload: &[u8]) -> ShmResult<bool> {
        let ring = &self.root().ring;
        let _writer = self.locks().ring_writer.lock(RING_WRITER_LOCK)?;

        let gap = self.with_global("write_rt", |g| Ok(*g.gap))?;
        if gap as usize >= RT_RING_SIZE - 1 {
            trace!(arena = %self.name(), "realtime ring full, command dropped");
            return Ok(false);
        }

        // SAFETY: ring_writer is held; the node under the write cursor is
        // invisible to readers until the gap grows.
        unsafe {
            let cursor = &mut *ring.write_cursor.get();
            let node = &mut *self.resolve(*cursor);
            node.slot.set(payload);
            *cursor = node.next;
        }

        self.with_global("write_rt", |g| {
            *g.gap += 1;
            Ok(())
        })?;
        Ok(true)
    }

    /// Dequeue the oldest realtime command, if any.
    pub(crate) fn read_rt(&self) -> ShmResult<Option<Command>> {
        let ring = &self.root().ring;
        let _reader = self.locks().ring_reader.lock(RING_READER_LOCK)?;

        let gap = self.with_global("read_rt", |g| Ok(*g.gap))?;
        if gap <= 1 {
            return Ok(None);
        }

        // SAFETY: ring_reader is held; the node after the read cursor was
        // published by a writer before the gap grew.
        let command = unsafe {
            let cursor = &mut *ring.read_cursor.get();
            let node = &*self.resolve(*cursor);
            let next = &*self.resolve(node.next);
            *cursor = node.next;
            next.slot
        };

        self.with_global("read_rt", |g| {
            *g.gap -= 1;
            Ok(())
        })?;
        Ok(Some(command))
    }
}

/// Pending ring commands, read inside an existing global critical section.
pub(crate) fn pending_in(g: &Global<'_>) -> usize {
    (*g.gap as usize).saturating_sub(1)
}
