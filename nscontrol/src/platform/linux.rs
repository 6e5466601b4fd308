//! Linux-specific shared memory operations
//!
//! Named regions are plain files on tmpfs (`/dev/shm`), so creation,
//! attachment and OS-level removal map onto ordinary file operations.

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

/// An opened named region, before mapping.
#[derive(Debug)]
pub struct RegionFile {
    /// Open handle on the backing file
    pub file: File,
    /// True when this call created the region
    pub created: bool,
}

/// Create the named region, or open it if another process already did.
///
/// The creator sizes the file to `capacity`; openers keep whatever size
/// the creator chose.
pub fn create_or_open_region(path: &Path, capacity: usize) -> ShmResult<RegionFile> {
    let created = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path);

    match created {
        Ok(file) => {
            if let Err(e) = file.set_len(capacity as u64) {
                let _ = std::fs::remove_file(path);
                return Err(map_io_error(path, e));
            }
            Ok(RegionFile {
                file,
                created: true,
            })
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| map_io_error(path, e))?;
            Ok(RegionFile {
                file,
                created: false,
            })
        }
        Err(e) => Err(map_io_error(path, e)),
    }
}

/// Wait until the creator has sized the region to at least `min_len` bytes.
///
/// Returns the region length once it is large enough, or `InitTimeout` if
/// the creator never got that far.
pub fn wait_for_region_len(
    path: &Path,
    file: &File,
    min_len: usize,
    timeout: Duration,
) -> ShmResult<usize> {
    let start = Instant::now();
    loop {
        let len = file.metadata()?.len() as usize;
        if len >= min_len {
            return Ok(len);
        }
        if start.elapsed() > timeout {
            return Err(ShmError::InitTimeout {
                name: path.display().to_string(),
            });
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Map `len` bytes of an opened region read/write and shared.
pub fn map_region(file: &File, len: usize) -> ShmResult<MmapMut> {
    // SAFETY: the file was sized to at least `len` bytes before mapping; the
    // mapping is shared on purpose and all concurrent access goes through
    // atomics or process-shared locks.
    let mmap = unsafe { MmapOptions::new().len(len).map_mut(file)? };
    Ok(mmap)
}

/// Remove the named region from the OS. A missing region is not an error.
pub fn remove_region(path: &Path) -> ShmResult<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(map_io_error(path, e)),
    }
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false, // No such process
        Err(nix::Error::EPERM) => true,  // Process exists but no permission to signal
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

fn map_io_error(path: &Path, e: std::io::Error) -> ShmError {
    let name = path.display().to_string();
    match e.kind() {
        ErrorKind::PermissionDenied => ShmError::PermissionDenied { name },
        ErrorKind::NotFound => ShmError::NotFound { name },
        _ => ShmError::Io { source: e },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_open() {
        let path = std::path::PathBuf::from(format!("/dev/shm/nsc_platform_{}", std::process::id()));
        let first = create_or_open_region(&path, 8192).unwrap();
        assert!(first.created);
        assert_eq!(first.file.metadata().unwrap().len(), 8192);

        let second = create_or_open_region(&path, 4096).unwrap();
        assert!(!second.created);
        let len = wait_for_region_len(&path, &second.file, 4096, Duration::from_millis(10)).unwrap();
        assert_eq!(len, 8192);
        assert!(matches!(
            wait_for_region_len(&path, &second.file, 16384, Duration::from_millis(5)),
            Err(ShmError::InitTimeout { .. })
        ));

        assert!(remove_region(&path).unwrap());
        assert!(!remove_region(&path).unwrap());
    }

    #[test]
    fn test_missing_directory_maps_to_not_found() {
        let path = Path::new("/nonexistent_dir_for_nscontrol/region");
        assert!(matches!(
            create_or_open_region(path, 4096),
            Err(ShmError::NotFound { .. })
        ));
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(get_current_pid()));
    }
}
