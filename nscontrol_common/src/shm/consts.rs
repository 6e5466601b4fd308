//! SHM (Shared Memory) constants.
//!
//! These constants define the fundamental parameters of the nscontrol arena.
//! They are the single source of truth - all other crates should import from here.
//!
//! Note: The arena magic lives in `nscontrol_common::shm::layout::ARENA_MAGIC`.

/// Well-known arena name. Unrelated processes rendezvous on this name
/// without any other coordination.
pub const ARENA_NAME: &str = "nscontrol";

/// Directory backing named shared memory regions on Linux (tmpfs).
pub const SHM_DIR: &str = "/dev/shm";

/// Default total arena capacity in bytes (4MB).
pub const ARENA_CAPACITY: usize = 4 * 1024 * 1024;

/// Minimum arena size in bytes.
///
/// Set to 4KB (one memory page); arena capacities must be a multiple of it.
pub const SHM_MIN_SIZE: usize = 4096;

/// Maximum arena size in bytes.
///
/// Offsets inside the arena are stored as `u32`, so this must stay below 4GB.
pub const SHM_MAX_SIZE: usize = 1_073_741_824; // 1GB

/// CPU cache line size in bytes.
///
/// Used for memory alignment to prevent false sharing between processes.
pub const CACHE_LINE_SIZE: usize = 64;

/// Payload capacity of a single command or realtime ring slot in bytes.
///
/// Longer payloads are truncated on insert.
pub const PAYLOAD_CAPACITY: usize = 512;

/// Maximum number of commands held by one connection's queue.
///
/// Inserting into a full queue evicts the oldest entry.
pub const COMMAND_QUEUE_DEPTH: usize = 100;

/// Number of nodes in the realtime ring.
///
/// One node is always left unused between the cursors, and the gap counter
/// treats `RT_RING_SIZE - 1` as full, so at most `RT_RING_SIZE - 2` entries
/// are pending at any time.
pub const RT_RING_SIZE: usize = 100;

/// Maximum number of simultaneously registered connections.
pub const MAX_CONNECTIONS: usize = 32;

/// Default time an opener waits for another process to finish initializing
/// a freshly created arena.
pub const ATTACH_TIMEOUT_MS: u64 = 2000;
