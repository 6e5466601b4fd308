//! Segment facade and its no-op stand-in.
//!
//! Application code talks to a [`Control`]. [`ShmControl`] is backed by the
//! shared arena; [`NullControl`] accepts every call and never has data. The
//! choice between them is made once at startup by [`connect_or_null`] and
//! the result is passed around as a [`SharedControl`].

use crate::arena::{Arena, GLOBAL_LOCK};
use crate::data::{
    Media, MediaDelta, Objects, ObjectsDelta, Observer, ObserverDelta, Reference, ReferenceDelta,
    Script, ScriptDelta, Settings, SettingsDelta,
};
use crate::error::ShmResult;
use crate::lifecycle::{Attach, Release};
use crate::queue::{ClientId, Command, ConnectionInfo, connection_infos};
use crate::ring::pending_in;
use crate::store::{SharedText, Side, StateSet};
use crate::sync::ShmMutexGuard;
use nscontrol_common::config::SegmentConfig;
use nscontrol_common::shm::layout::ClientType;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Facade handle shared across the process.
pub type SharedControl = Arc<dyn Control>;

/// Held global lock, as returned by [`Control::lock`].
#[must_use = "the lock is released as soon as the guard is dropped"]
pub enum ControlGuard<'a> {
    /// The arena's global lock
    Shm(ShmMutexGuard<'a>),
    /// Nothing held
    Null,
}

impl ControlGuard<'_> {
    /// Release the lock.
    pub fn unlock(self) {}
}

/// Everything application code can do with the shared state layer.
pub trait Control: Send + Sync {
    /// Identity used for the command queue channel.
    fn client_id(&self) -> ClientId;

    /// Client type used for broadcast filtering.
    fn client_type(&self) -> ClientType;

    /// False for the null facade.
    fn is_shared(&self) -> bool;

    /// Register this client's command queue. Idempotent.
    fn connect(&self) -> ShmResult<()>;

    /// Remove this client's command queue. Idempotent.
    fn disconnect(&self) -> ShmResult<()>;

    /// Broadcast `payload` to every connected client of another type.
    /// Returns the number of queues it was delivered to.
    fn write(&self, payload: &[u8]) -> ShmResult<usize>;

    /// Oldest command queued for this client.
    fn read(&self) -> ShmResult<Option<Command>>;

    /// Enqueue on the realtime ring. Returns false if the ring was full and
    /// the command dropped.
    fn write_rt(&self, payload: &[u8]) -> ShmResult<bool>;

    /// Oldest command on the realtime ring.
    fn read_rt(&self) -> ShmResult<Option<Command>>;

    /// Block on the global lock.
    ///
    /// Every channel operation also takes this lock, so on the calling
    /// thread they fail with `EDEADLK` until the guard is released.
    fn lock(&self) -> ShmResult<ControlGuard<'_>>;

    /// Take the global lock if free.
    fn try_lock(&self) -> ShmResult<Option<ControlGuard<'_>>>;

    /// Copy the write side of the state store over the read side.
    fn publish(&self) -> ShmResult<()>;

    /// Merge into the write-side observer record.
    fn set_observer(&self, delta: &ObserverDelta) -> ShmResult<usize>;
    /// Published observer record.
    fn observer(&self) -> ShmResult<Observer>;

    /// Merge into the write-side media record.
    fn set_media(&self, delta: &MediaDelta) -> ShmResult<usize>;
    /// Published media record.
    fn media(&self) -> ShmResult<Media>;

    /// Merge into the write-side script record.
    fn set_script(&self, delta: &ScriptDelta) -> ShmResult<usize>;
    /// Published script record.
    fn script(&self) -> ShmResult<Script>;

    /// Merge into the write-side reference flags.
    fn set_reference(&self, delta: &ReferenceDelta) -> ShmResult<usize>;
    /// Published reference flags.
    fn reference(&self) -> ShmResult<Reference>;

    /// Merge into the write-side settings.
    fn set_settings(&self, delta: &SettingsDelta) -> ShmResult<usize>;
    /// Published settings.
    fn settings(&self) -> ShmResult<Settings>;

    /// Merge into the write-side object flags.
    fn set_objects(&self, delta: &ObjectsDelta) -> ShmResult<usize>;
    /// Published object flags.
    fn objects(&self) -> ShmResult<Objects>;

    /// Replace the newline-separated language list.
    fn set_languages(&self, list: &str) -> ShmResult<()>;
    /// Newline-separated language list.
    fn languages(&self) -> ShmResult<String>;

    /// Replace the newline-separated landscape list.
    fn set_landscapes(&self, list: &str) -> ShmResult<()>;
    /// Newline-separated landscape list.
    fn landscapes(&self) -> ShmResult<String>;
}

/// Arena usage snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ArenaStats {
    /// Arena name
    pub name: String,
    /// Mapped size in bytes
    pub capacity: usize,
    /// Free heap bytes
    pub free_bytes: usize,
    /// Live heap allocations
    pub allocations: usize,
    /// Attached facades across all processes
    pub ref_count: u32,
    /// Registered connections
    pub connections: usize,
    /// Commands pending on the realtime ring
    pub ring_pending: usize,
    /// Per-connection detail
    pub clients: Vec<ConnectionInfo>,
}

/// Facade backed by the shared arena.
pub struct ShmControl {
    arena: Arena,
    attach: Attach,
    client_id: ClientId,
    client_type: ClientType,
    connected: AtomicBool,
}

impl ShmControl {
    /// Attach to (or create) the arena named in `config`.
    ///
    /// Connections left behind by dead processes are pruned on attach.
    pub fn open(config: &SegmentConfig, client_type: ClientType) -> ShmResult<Self> {
        let (arena, attach) = Arena::open(config)?;
        let control = Self {
            arena,
            attach,
            client_id: ClientId::random(),
            client_type,
            connected: AtomicBool::new(false),
        };
        let pruned = control.arena.prune_dead()?;
        info!(
            arena = %control.arena.name(),
            client = %control.client_id,
            %client_type,
            ?attach,
            pruned,
            "shared control attached"
        );
        Ok(control)
    }

    /// Whether this facade created the arena.
    pub fn attach(&self) -> Attach {
        self.attach
    }

    /// The underlying arena.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Disconnect and release the arena reference.
    pub fn close(self) -> ShmResult<Release> {
        self.disconnect()?;
        self.arena.release()
    }

    /// Usage snapshot, for diagnostics.
    ///
    /// Everything is read in one global critical section, so the counts
    /// agree with each other.
    pub fn stats(&self) -> ShmResult<ArenaStats> {
        self.arena.with_global("stats", |g| {
            let clients = connection_infos(g);
            let ring_pending = pending_in(g);
            Ok(ArenaStats {
                name: self.arena.name().to_string(),
                capacity: self.arena.len(),
                free_bytes: g.heap.free_bytes(),
                allocations: g.heap.allocations(),
                ref_count: *g.ref_count,
                connections: g.registry.len(),
                ring_pending,
                clients,
            })
        })
    }

    /// Remove connections whose process has exited.
    pub fn prune_dead(&self) -> ShmResult<usize> {
        self.arena.prune_dead()
    }

    /// Copy a whole side of the state store.
    pub fn state(&self, side: Side) -> ShmResult<StateSet> {
        self.arena.state(side)
    }
}

impl Control for ShmControl {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn client_type(&self) -> ClientType {
        self.client_type
    }

    fn is_shared(&self) -> bool {
        true
    }

    fn connect(&self) -> ShmResult<()> {
        self.arena.connect(self.client_id, self.client_type)?;
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn disconnect(&self) -> ShmResult<()> {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.arena.disconnect(self.client_id)?;
        }
        Ok(())
    }

    fn write(&self, payload: &[u8]) -> ShmResult<usize> {
        self.arena.broadcast(self.client_id, self.client_type, payload)
    }

    fn read(&self) -> ShmResult<Option<Command>> {
        self.arena.receive(self.client_id)
    }

    fn write_rt(&self, payload: &[u8]) -> ShmResult<bool> {
        self.arena.write_rt(payload)
    }

    fn read_rt(&self) -> ShmResult<Option<Command>> {
        self.arena.read_rt()
    }

    fn lock(&self) -> ShmResult<ControlGuard<'_>> {
        Ok(ControlGuard::Shm(self.arena.locks().global.lock(GLOBAL_LOCK)?))
    }

    fn try_lock(&self) -> ShmResult<Option<ControlGuard<'_>>> {
        Ok(self.arena.locks().global.try_lock(GLOBAL_LOCK)?.map(ControlGuard::Shm))
    }

    fn publish(&self) -> ShmResult<()> {
        self.arena.publish()
    }

    fn set_observer(&self, delta: &ObserverDelta) -> ShmResult<usize> {
        self.arena.update(|s| &mut s.observer, delta)
    }

    fn observer(&self) -> ShmResult<Observer> {
        self.arena.snapshot(|s| &s.observer)
    }

    fn set_media(&self, delta: &MediaDelta) -> ShmResult<usize> {
        self.arena.update(|s| &mut s.media, delta)
    }

    fn media(&self) -> ShmResult<Media> {
        self.arena.snapshot(|s| &s.media)
    }

    fn set_script(&self, delta: &ScriptDelta) -> ShmResult<usize> {
        self.arena.update(|s| &mut s.script, delta)
    }

    fn script(&self) -> ShmResult<Script> {
        self.arena.snapshot(|s| &s.script)
    }

    fn set_reference(&self, delta: &ReferenceDelta) -> ShmResult<usize> {
        self.arena.update(|s| &mut s.reference, delta)
    }

    fn reference(&self) -> ShmResult<Reference> {
        self.arena.snapshot(|s| &s.reference)
    }

    fn set_settings(&self, delta: &SettingsDelta) -> ShmResult<usize> {
        self.arena.update(|s| &mut s.settings, delta)
    }

    fn settings(&self) -> ShmResult<Settings> {
        self.arena.snapshot(|s| &s.settings)
    }

    fn set_objects(&self, delta: &ObjectsDelta) -> ShmResult<usize> {
        self.arena.update(|s| &mut s.objects, delta)
    }

    fn objects(&self) -> ShmResult<Objects> {
        self.arena.snapshot(|s| &s.objects)
    }

    fn set_languages(&self, list: &str) -> ShmResult<()> {
        self.arena.set_text(SharedText::Languages, list)
    }

    fn languages(&self) -> ShmResult<String> {
        self.arena.text(SharedText::Languages)
    }

    fn set_landscapes(&self, list: &str) -> ShmResult<()> {
        self.arena.set_text(SharedText::Landscapes, list)
    }

    fn landscapes(&self) -> ShmResult<String> {
        self.arena.text(SharedText::Landscapes)
    }
}

impl Drop for ShmControl {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!(client = %self.client_id, error = %e, "disconnect on drop failed");
        }
        // The arena releases its reference when it is dropped.
    }
}

/// Facade used when the arena is unavailable. Writes are discarded and
/// reads never return data.
#[derive(Debug, Clone, Copy)]
pub struct NullControl {
    client_id: ClientId,
    client_type: ClientType,
}

impl NullControl {
    /// New null facade.
    pub fn new(client_type: ClientType) -> Self {
        Self {
            client_id: ClientId::random(),
            client_type,
        }
    }
}

impl Control for NullControl {
    fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn client_type(&self) -> ClientType {
        self.client_type
    }

    fn is_shared(&self) -> bool {
        false
    }

    fn connect(&self) -> ShmResult<()> {
        Ok(())
    }

    fn disconnect(&self) -> ShmResult<()> {
        Ok(())
    }

    fn write(&self, _payload: &[u8]) -> ShmResult<usize> {
        Ok(0)
    }

    fn read(&self) -> ShmResult<Option<Command>> {
        Ok(None)
    }

    fn write_rt(&self, _payload: &[u8]) -> ShmResult<bool> {
        Ok(false)
    }

    fn read_rt(&self) -> ShmResult<Option<Command>> {
        Ok(None)
    }

    fn lock(&self) -> ShmResult<ControlGuard<'_>> {
        Ok(ControlGuard::Null)
    }

    fn try_lock(&self) -> ShmResult<Option<ControlGuard<'_>>> {
        Ok(Some(ControlGuard::Null))
    }

    fn publish(&self) -> ShmResult<()> {
        Ok(())
    }

    fn set_observer(&self, _delta: &ObserverDelta) -> ShmResult<usize> {
        Ok(0)
    }

    fn observer(&self) -> ShmResult<Observer> {
        Ok(Observer::default())
    }

    fn set_media(&self, _delta: &MediaDelta) -> ShmResult<usize> {
        Ok(0)
    }

    fn media(&self) -> ShmResult<Media> {
        Ok(Media::default())
    }

    fn set_script(&self, _delta: &ScriptDelta) -> ShmResult<usize> {
        Ok(0)
    }

    fn script(&self) -> ShmResult<Script> {
        Ok(Script::default())
    }

    fn set_reference(&self, _delta: &ReferenceDelta) -> ShmResult<usize> {
        Ok(0)
    }

    fn reference(&self) -> ShmResult<Reference> {
        Ok(Reference::disabled())
    }

    fn set_settings(&self, _delta: &SettingsDelta) -> ShmResult<usize> {
        Ok(0)
    }

    fn settings(&self) -> ShmResult<Settings> {
        Ok(Settings::default())
    }

    fn set_objects(&self, _delta: &ObjectsDelta) -> ShmResult<usize> {
        Ok(0)
    }

    fn objects(&self) -> ShmResult<Objects> {
        Ok(Objects::default())
    }

    fn set_languages(&self, _list: &str) -> ShmResult<()> {
        Ok(())
    }

    fn languages(&self) -> ShmResult<String> {
        Ok(String::new())
    }

    fn set_landscapes(&self, _list: &str) -> ShmResult<()> {
        Ok(())
    }

    fn landscapes(&self) -> ShmResult<String> {
        Ok(String::new())
    }
}

/// Attach to the arena, or fall back to a [`NullControl`] if that fails.
pub fn connect_or_null(config: &SegmentConfig, client_type: ClientType) -> SharedControl {
    match ShmControl::open(config, client_type) {
        Ok(control) => Arc::new(control),
        Err(e) => {
            warn!(arena = %config.name, error = %e, "shared state unavailable, running without it");
            Arc::new(NullControl::new(client_type))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_control_is_inert() {
        let control = NullControl::new(ClientType::Engine);
        assert!(!control.is_shared());
        control.connect().unwrap();
        assert_eq!(control.write(b"anything").unwrap(), 0);
        assert!(control.read().unwrap().is_none());
        assert!(!control.write_rt(b"rt").unwrap());
        assert!(control.read_rt().unwrap().is_none());
        assert!(control.try_lock().unwrap().is_some());
        control.lock().unwrap().unlock();
        control.set_languages("en\nfr").unwrap();
        assert_eq!(control.languages().unwrap(), "");
        assert_eq!(control.reference().unwrap(), Reference::disabled());
        control.publish().unwrap();
        control.disconnect().unwrap();
    }

    #[test]
    fn test_fallback_on_invalid_config() {
        let mut config = SegmentConfig::named("bad name/with slash");
        config.capacity = 1;
        let control = connect_or_null(&config, ClientType::Console);
        assert!(!control.is_shared());
        assert_eq!(control.client_type(), ClientType::Console);
    }

    #[test]
    fn test_fallback_when_arena_stuck_in_teardown() {
        use crate::arena::INIT_TORN_DOWN;
        use std::sync::mpsc;
        use std::time::Duration;

        let mut config = SegmentConfig::named(format!("nsc_stuck_facade_{}", std::process::id()));
        config.attach_timeout_ms = 100;
        let owner = ShmControl::open(&config, ClientType::Engine).unwrap();
        owner
            .arena()
            .init_state()
            .store(INIT_TORN_DOWN, Ordering::Release);

        let (tx, rx) = mpsc::channel();
        let opener_config = config.clone();
        std::thread::spawn(move || {
            let control = connect_or_null(&opener_config, ClientType::Console);
            let _ = tx.send(control.is_shared());
        });
        let shared = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("connect_or_null did not return");
        assert!(!shared);

        drop(owner);
        assert!(!config.path().exists());
    }
}
