//! Dual state store.
//!
//! Producers merge partial updates into the write side under
//! `state_write`. Consumers copy records out of the read side under
//! `state_read`. `publish` holds both locks (write then read) while it
//! copies the whole write side over the read side, so a reader sees either
//! the previous snapshot or the new one, never a mix.
//!
//! Two variable-length strings (language list, landscape list) live in
//! the arena heap and are guarded by `state_write`.

use crate::alloc::Offset;
use crate::arena::{Arena, STATE_READ_LOCK, STATE_WRITE_LOCK};
use crate::data::{Media, Merge, Objects, Observer, Reference, Script, Settings};
use crate::error::ShmResult;
use crate::sync::ShmCell;
use serde::Serialize;
use tracing::debug;

/// One full set of the six state records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[repr(C)]
pub struct StateSet {
    /// Observer location and time
    pub observer: Observer,
    /// Audio/video playback
    pub media: Media,
    /// Script playback
    pub script: Script,
    /// Reference flags
    pub reference: Reference,
    /// Display tuning values
    pub settings: Settings,
    /// Object visibility
    pub objects: Objects,
}

impl StateSet {
    /// Initial read side: reference flags disabled.
    pub fn initial_read() -> Self {
        Self {
            observer: Observer::default(),
            media: Media::default(),
            script: Script::default(),
            reference: Reference::disabled(),
            settings: Settings::default(),
            objects: Objects::default(),
        }
    }

    /// Initial write side: reference flags unset.
    pub fn initial_write() -> Self {
        Self {
            reference: Reference::unset(),
            ..Self::initial_read()
        }
    }
}

/// Which side of the store to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Pending updates, not yet published
    Write,
    /// Last published snapshot
    Read,
}

/// The two variable-length strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedText {
    /// Available UI/sky languages
    Languages,
    /// Available landscapes
    Landscapes,
}

#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) struct TextRef {
    data: Offset<u8>,
    len: u32,
}

#[repr(C)]
pub(crate) struct SharedStrings {
    languages: TextRef,
    landscapes: TextRef,
}

impl SharedStrings {
    fn slot(&mut self, which: SharedText) -> &mut TextRef {
        match which {
            SharedText::Languages => &mut self.languages,
            SharedText::Landscapes => &mut self.landscapes,
        }
    }
}

/// State store, stored in the arena root.
#[repr(C)]
pub(crate) struct StateStore {
    /// Guarded by `state_write`.
    pub(crate) write: ShmCell<StateSet>,
    /// Guarded by `state_read`.
    pub(crate) read: ShmCell<StateSet>,
    /// Guarded by `state_write`; storage comes from the heap.
    pub(crate) strings: ShmCell<SharedStrings>,
}

/// Write both initial sides and empty strings.
///
/// # Safety
///
/// Initialization only: nobody else may be using the store.
pub(crate) unsafe fn init_store(store: &StateStore) {
    unsafe {
        store.write.get().write(StateSet::initial_write());
        store.read.get().write(StateSet::initial_read());
        store.strings.get().write(SharedStrings {
            languages: TextRef {
                data: Offset::NULL,
                len: 0,
            },
            landscapes: TextRef {
                data: Offset::NULL,
                len: 0,
            },
        });
    }
}

impl Arena {
    /// Merge `delta` into one record of the write side.
    pub(crate) fn update<R: Merge>(
        &self,
        select: fn(&mut StateSet) -> &mut R,
        delta: &R::Delta,
    ) -> ShmResult<usize> {
        let _write = self.locks().state_write.lock(STATE_WRITE_LOCK)?;
        // SAFETY: state_write is held.
        let set = unsafe { &mut *self.root().store.write.get() };
        Ok(select(set).merge(delta))
    }

    /// Copy one record out of the read side.
    pub(crate) fn snapshot<R: Copy>(&self, select: fn(&StateSet) -> &R) -> ShmResult<R> {
        let _read = self.locks().state_read.lock(STATE_READ_LOCK)?;
        // SAFETY: state_read is held.
        let set = unsafe { &*self.root().store.read.get() };
        Ok(*select(set))
    }

    /// Copy a whole side.
    pub(crate) fn state(&self, side: Side) -> ShmResult<StateSet> {
        let store = &self.root().store;
        match side {
            Side::Write => {
                let _write = self.locks().state_write.lock(STATE_WRITE_LOCK)?;
                // SAFETY: state_write is held.
                Ok(unsafe { *store.write.get() })
            }
            Side::Read => {
                let _read = self.locks().state_read.lock(STATE_READ_LOCK)?;
                // SAFETY: state_read is held.
                Ok(unsafe { *store.read.get() })
            }
        }
    }

    /// Copy every category from the write side to the read side.
    pub(crate) fn publish(&self) -> ShmResult<()> {
        let store = &self.root().store;
        let write = self.locks().state_write.lock(STATE_WRITE_LOCK)?;
        let read = self.locks().state_read.lock(STATE_READ_LOCK)?;
        // SAFETY: both state locks are held.
        unsafe { *store.read.get() = *store.write.get() };
        read.unlock();
        write.unlock();
        debug!(arena = %self.name(), "state published");
        Ok(())
    }

    /// Replace one shared string.
    pub(crate) fn set_text(&self, which: SharedText, value: &str) -> ShmResult<()> {
        let _write = self.locks().state_write.lock(STATE_WRITE_LOCK)?;
        // SAFETY: state_write is held.
        let strings = unsafe { &mut *self.root().store.strings.get() };
        let slot = strings.slot(which);
        self.with_global("set_text", |g| {
            let data = if value.is_empty() {
                Offset::NULL
            } else {
                let data = g.alloc_bytes(value.len())?;
                // SAFETY: fresh allocation of `value.len()` bytes.
                unsafe {
                    std::ptr::copy_nonoverlapping(value.as_ptr(), g.resolve(data), value.len())
                };
                data
            };
            g.free(slot.data);
            *slot = TextRef {
                data,
                len: value.len() as u32,
            };
            Ok(())
        })
    }

    /// Copy one shared string out.
    pub(crate) fn text(&self, which: SharedText) -> ShmResult<String> {
        let _write = self.locks().state_write.lock(STATE_WRITE_LOCK)?;
        // SAFETY: state_write is held.
        let strings = unsafe { &mut *self.root().store.strings.get() };
        let slot = *strings.slot(which);
        if slot.data.is_null() {
            return Ok(String::new());
        }
        // SAFETY: the slot points at a live allocation of `len` bytes while
        // state_write is held.
        let bytes =
            unsafe { std::slice::from_raw_parts(self.resolve(slot.data) as *const u8, slot.len as usize) };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
