//! Exclusive advisory byte-range locks, released when the guard drops.
//!
//! On Linux these are open-file-description locks, owned by the handle rather
//! than the process: two handles in one process with overlapping ranges
//! conflict, and closing one handle leaves the other handle's locks alone.
//! Other Unix systems fall back to classic POSIX record locks. Elsewhere the
//! guard is a no-op.

use std::fs::File;
use std::io;
use tracing::warn;

/// Held lock over `[offset, offset + len)` of `file`.
#[must_use = "the range is unlocked as soon as the guard is dropped"]
pub struct RangeLock<'a> {
    file: &'a File,
    offset: u64,
    len: u64,
}

impl<'a> RangeLock<'a> {
    /// Take an exclusive lock without waiting.
    ///
    /// Fails with [`io::ErrorKind::WouldBlock`] if another handle holds an
    /// overlapping lock. Zero-length ranges are not locked (for `fcntl` a
    /// length of zero means "through end of file").
    pub fn acquire(file: &'a File, offset: u64, len: u64) -> io::Result<Self> {
        if len > 0 {
            sys::lock(file, offset, len).map_err(|e| match e.raw_os_error() {
                Some(code) if sys::is_conflict(code) => io::Error::new(
                    io::ErrorKind::WouldBlock,
                    format!("lock conflict on bytes [{}, {})", offset, offset + len),
                ),
                _ => e,
            })?;
        }
        Ok(Self { file, offset, len })
    }

    pub fn range(&self) -> (u64, u64) {
        (self.offset, self.offset + self.len)
    }
}

impl Drop for RangeLock<'_> {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        if let Err(e) = sys::unlock(self.file, self.offset, self.len) {
            warn!("Failed to unlock bytes [{}, {}): {}", self.offset, self.offset + self.len, e);
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    #[cfg(target_os = "linux")]
    const SET_LOCK: libc::c_int = libc::F_OFD_SETLK;
    #[cfg(not(target_os = "linux"))]
    const SET_LOCK: libc::c_int = libc::F_SETLK;

    pub(super) fn lock(file: &File, offset: u64, len: u64) -> io::Result<()> {
        set(file, offset, len, libc::F_WRLCK as libc::c_short)
    }

    pub(super) fn unlock(file: &File, offset: u64, len: u64) -> io::Result<()> {
        set(file, offset, len, libc::F_UNLCK as libc::c_short)
    }

    pub(super) fn is_conflict(code: i32) -> bool {
        code == libc::EAGAIN || code == libc::EACCES
    }

    fn set(file: &File, offset: u64, len: u64, lock_type: libc::c_short) -> io::Result<()> {
        let start = libc::off_t::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "lock offset out of range"))?;
        let len = libc::off_t::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "lock length out of range"))?;

        // Zeroed so l_pid is 0, which open-file-description locks require.
        let mut flock: libc::flock = unsafe { std::mem::zeroed() };
        flock.l_type = lock_type;
        flock.l_whence = libc::SEEK_SET as libc::c_short;
        flock.l_start = start;
        flock.l_len = len;

        let rc = unsafe { libc::fcntl(file.as_raw_fd(), SET_LOCK, &flock as *const libc::flock) };
        if rc == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    pub(super) fn lock(_file: &File, _offset: u64, _len: u64) -> io::Result<()> {
        Ok(())
    }

    pub(super) fn unlock(_file: &File, _offset: u64, _len: u64) -> io::Result<()> {
        Ok(())
    }

    pub(super) fn is_conflict(_code: i32) -> bool {
        false
    }
}
