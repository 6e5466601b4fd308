//! Per-client command queues and the connection registry.
//!
//! Every connected client owns one bounded queue in the arena. A write is
//! copied into the queue of every *other* client whose client type differs
//! from the writer's, so an engine never hears other engines and a console
//! never hears other consoles. A full queue drops its oldest command.

use crate::alloc::Offset;
use crate::arena::{Arena, Global};
use crate::error::{ShmError, ShmResult};
use crate::platform;
use nscontrol_common::shm::consts::{COMMAND_QUEUE_DEPTH, MAX_CONNECTIONS, PAYLOAD_CAPACITY};
use nscontrol_common::shm::layout::ClientType;
use serde::{Serialize, Serializer};
use static_assertions::const_assert_eq;
use std::fmt;
use tracing::{debug, info, trace, warn};

/// One command: up to [`PAYLOAD_CAPACITY`] bytes, truncated on insert.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Command {
    len: u32,
    data: [u8; PAYLOAD_CAPACITY],
}

const_assert_eq!(std::mem::size_of::<Command>(), 4 + PAYLOAD_CAPACITY);

impl Command {
    /// Copy `payload`, keeping at most [`PAYLOAD_CAPACITY`] bytes.
    pub fn new(payload: &[u8]) -> Self {
        let mut command = Self::EMPTY;
        command.set(payload);
        command
    }

    const EMPTY: Self = Self {
        len: 0,
        data: [0; PAYLOAD_CAPACITY],
    };

    pub(crate) fn set(&mut self, payload: &[u8]) {
        let len = payload.len().min(PAYLOAD_CAPACITY);
        self.data[..len].copy_from_slice(&payload[..len]);
        self.len = len as u32;
    }

    /// Payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(PAYLOAD_CAPACITY)]
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Command {}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.to_text()).finish()
    }
}

/// Bounded FIFO of commands owned by one connection.
#[repr(C)]
pub(crate) struct CommandQueue {
    head: u32,
    len: u32,
    slots: [Command; COMMAND_QUEUE_DEPTH],
}

impl CommandQueue {
    /// Append, evicting the oldest command when full. Returns true if a
    /// command was evicted.
    pub(crate) fn push(&mut self, payload: &[u8]) -> bool {
        let evicted = self.len as usize == COMMAND_QUEUE_DEPTH;
        if evicted {
            self.head = (self.head + 1) % COMMAND_QUEUE_DEPTH as u32;
            self.len -= 1;
        }
        let tail = (self.head as usize + self.len as usize) % COMMAND_QUEUE_DEPTH;
        self.slots[tail].set(payload);
        self.len += 1;
        evicted
    }

    /// Remove and return the oldest command.
    pub(crate) fn pop(&mut self) -> Option<Command> {
        if self.len == 0 {
            return None;
        }
        let command = self.slots[self.head as usize % COMMAND_QUEUE_DEPTH];
        self.head = (self.head + 1) % COMMAND_QUEUE_DEPTH as u32;
        self.len -= 1;
        Some(command)
    }

    pub(crate) fn len(&self) -> usize {
        self.len as usize
    }
}

/// Identity of one facade instance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ClientId([u8; 16]);

impl ClientId {
    /// Fresh random identity.
    pub fn random() -> Self {
        Self(rand::random::<u128>().to_be_bytes())
    }

    /// Identity from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({self})")
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Registry entry: owner identity, client type and queue.
#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) struct Connection {
    pub(crate) id: ClientId,
    pub(crate) client_type: u8,
    _pad: [u8; 3],
    pub(crate) pid: u32,
    pub(crate) queue: Offset<CommandQueue>,
}

/// Connections sorted by client id. Guarded by the global lock.
#[repr(C)]
pub(crate) struct Registry {
    len: u32,
    _pad: u32,
    entries: [Connection; MAX_CONNECTIONS],
}

impl Registry {
    pub(crate) fn entries(&self) -> &[Connection] {
        &self.entries[..(self.len as usize).min(MAX_CONNECTIONS)]
    }

    fn find(&self, id: &ClientId) -> Result<usize, usize> {
        self.entries().binary_search_by(|c| c.id.cmp(id))
    }

    fn insert(&mut self, at: usize, connection: Connection) -> ShmResult<()> {
        let len = self.entries().len();
        if len == MAX_CONNECTIONS {
            return Err(ShmError::RegistryFull {
                capacity: MAX_CONNECTIONS,
            });
        }
        self.entries.copy_within(at..len, at + 1);
        self.entries[at] = connection;
        self.len = len as u32 + 1;
        Ok(())
    }

    fn remove(&mut self, at: usize) -> Connection {
        let len = self.entries().len();
        let removed = self.entries[at];
        self.entries.copy_within(at + 1..len, at);
        self.len = len as u32 - 1;
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Diagnostic view of one registered connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Owner identity
    pub id: ClientId,
    /// Owner client type, `None` if the stored byte is unknown
    pub client_type: Option<ClientType>,
    /// Process that registered the connection
    pub pid: u32,
    /// Commands waiting in the queue
    pub pending: usize,
}

impl Arena {
    /// Register `id`. Returns false if it was already registered.
    pub(crate) fn connect(&self, id: ClientId, client_type: ClientType) -> ShmResult<bool> {
        self.with_global("connect", |g| {
            let at = match g.registry.find(&id) {
                Ok(_) => return Ok(false),
                Err(at) => at,
            };
            if g.registry.len() == MAX_CONNECTIONS {
                return Err(ShmError::RegistryFull {
                    capacity: MAX_CONNECTIONS,
                });
            }
            // SAFETY: an all-zero CommandQueue is an empty queue.
            let queue = unsafe { g.alloc_zeroed::<CommandQueue>()? };
            let connection = Connection {
                id,
                client_type: client_type as u8,
                _pad: [0; 3],
                pid: platform::get_current_pid(),
                queue,
            };
            if let Err(e) = g.registry.insert(at, connection) {
                g.free(queue);
                return Err(e);
            }
            info!(arena = %self.name(), client = %id, %client_type, "client connected");
            Ok(true)
        })
    }

    /// Unregister `id` and release its queue. Returns false if it was not
    /// registered.
    pub(crate) fn disconnect(&self, id: ClientId) -> ShmResult<bool> {
        self.with_global("disconnect", |g| {
            let Ok(at) = g.registry.find(&id) else {
                return Ok(false);
            };
            let removed = g.registry.remove(at);
            g.free(removed.queue);
            info!(arena = %self.name(), client = %id, "client disconnected");
            Ok(true)
        })
    }

    /// Copy `payload` into the queue of every connection other than
    /// `sender` whose client type differs from `sender_type`. Returns the
    /// number of queues written.
    pub(crate) fn broadcast(
        &self,
        sender: ClientId,
        sender_type: ClientType,
        payload: &[u8],
    ) -> ShmResult<usize> {
        if payload.len() > PAYLOAD_CAPACITY {
            debug!(len = payload.len(), max = PAYLOAD_CAPACITY, "command truncated");
        }
        self.with_global("write", |g| {
            let mut delivered = 0;
            for connection in g.registry.entries() {
                if connection.id == sender || connection.client_type == sender_type as u8 {
                    continue;
                }
                // SAFETY: the global lock is held and the queue belongs to a
                // registered connection.
                let queue = unsafe { &mut *g.resolve(connection.queue) };
                if queue.push(payload) {
                    trace!(client = %connection.id, "queue full, oldest command dropped");
                }
                delivered += 1;
            }
            Ok(delivered)
        })
    }

    /// Pop the oldest command queued for `id`.
    pub(crate) fn receive(&self, id: ClientId) -> ShmResult<Option<Command>> {
        self.with_global("read", |g| {
            let Ok(at) = g.registry.find(&id) else {
                return Ok(None);
            };
            let connection = g.registry.entries()[at];
            // SAFETY: see `broadcast`.
            let queue = unsafe { &mut *g.resolve(connection.queue) };
            Ok(queue.pop())
        })
    }

    /// Remove connections whose owning process no longer exists.
    pub(crate) fn prune_dead(&self) -> ShmResult<usize> {
        self.with_global("prune_dead", |g| {
            let mut pruned = 0;
            let mut at = 0;
            while at < g.registry.len() {
                let connection = g.registry.entries()[at];
                if platform::is_process_alive(connection.pid) {
                    at += 1;
                    continue;
                }
                g.registry.remove(at);
                g.free(connection.queue);
                warn!(client = %connection.id, pid = connection.pid, "pruned connection of dead process");
                pruned += 1;
            }
            Ok(pruned)
        })
    }
}

/// Registry snapshot taken inside an existing global critical section.
pub(crate) fn connection_infos(g: &Global<'_>) -> Vec<ConnectionInfo> {
    g.registry
        .entries()
        .iter()
        .map(|c| ConnectionInfo {
            id: c.id,
            client_type: ClientType::from_u8(c.client_type),
            pid: c.pid,
            // SAFETY: the global lock is held and the queue belongs to a
            // registered connection.
            pending: unsafe { (*g.resolve(c.queue)).len() },
        })
        .collect()
}

/// Free every queue and empty the registry. Teardown only.
pub(crate) fn destroy_connections(g: &mut Global<'_>) {
    while g.registry.len() > 0 {
        let connection = g.registry.remove(g.registry.len() - 1);
        g.free(connection.queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_queue() -> Box<CommandQueue> {
        // SAFETY: an all-zero CommandQueue is an empty queue.
        Box::new(unsafe { std::mem::zeroed() })
    }

    #[test]
    fn test_command_truncates() {
        let long = vec![b'x'; PAYLOAD_CAPACITY + 40];
        let command = Command::new(&long);
        assert_eq!(command.len(), PAYLOAD_CAPACITY);
        assert_eq!(Command::new(b"zoom 2").to_text(), "zoom 2");
        assert!(Command::new(b"").is_empty());
    }

    #[test]
    fn test_queue_fifo() {
        let mut queue = empty_queue();
        assert!(queue.pop().is_none());
        for i in 0..5 {
            assert!(!queue.push(format!("cmd {i}").as_bytes()));
        }
        for i in 0..5 {
            assert_eq!(queue.pop().unwrap().to_text(), format!("cmd {i}"));
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_queue_drops_oldest() {
        let mut queue = empty_queue();
        let mut evicted = 0;
        for i in 0..150 {
            if queue.push(format!("cmd {i}").as_bytes()) {
                evicted += 1;
            }
        }
        assert_eq!(evicted, 50);
        assert_eq!(queue.len(), COMMAND_QUEUE_DEPTH);
        for i in 50..150 {
            assert_eq!(queue.pop().unwrap().to_text(), format!("cmd {i}"));
        }
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_registry_stays_sorted() {
        // SAFETY: an all-zero Registry is empty.
        let mut registry: Box<Registry> = Box::new(unsafe { std::mem::zeroed() });
        let ids = [7u8, 2, 9, 4].map(|b| ClientId::from_bytes([b; 16]));
        for id in ids {
            let at = registry.find(&id).unwrap_err();
            registry
                .insert(
                    at,
                    Connection {
                        id,
                        client_type: 0,
                        _pad: [0; 3],
                        pid: 1,
                        queue: Offset::NULL,
                    },
                )
                .unwrap();
        }
        let order: Vec<u8> = registry.entries().iter().map(|c| c.id.as_bytes()[0]).collect();
        assert_eq!(order, vec![2, 4, 7, 9]);

        let at = registry.find(&ids[0]).unwrap();
        assert_eq!(registry.remove(at).id, ids[0]);
        assert_eq!(registry.len(), 3);
        assert!(registry.find(&ids[0]).is_err());
    }

    #[test]
    fn test_client_id_display() {
        let id = ClientId::from_bytes([0xab; 16]);
        assert_eq!(id.to_string(), "abababab-abab-abab-abab-abababababab");
        assert_ne!(ClientId::random(), ClientId::random());
    }
}
