use crossbeam::queue::SegQueue;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Per-device cache of open descriptors. Threads borrow a descriptor for the
/// duration of one operation; on I/O failure the borrower drops it instead of
/// returning it, and the next acquire opens a replacement.
pub struct FdPool {
    path: PathBuf,
    open_flags: i32,
    fds: SegQueue<File>,
}

impl FdPool {
    /// `open_flags` are OR'd into the open call (O_DIRECT and friends);
    /// read-write access is always requested.
    pub fn new<P: AsRef<Path>>(path: P, open_flags: i32) -> FdPool {
        FdPool {
            path: path.as_ref().to_path_buf(),
            open_flags,
            fds: SegQueue::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn acquire(&self) -> io::Result<File> {
        match self.fds.pop() {
            Some(fd) => Ok(fd),
            None => OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(self.open_flags)
                .open(&self.path),
        }
    }

    pub fn release(&self, fd: File) {
        self.fds.push(fd);
    }

    /// Drain and close every cached descriptor.
    pub fn close_all(&self) {
        while self.fds.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn recycles_descriptors() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 4096]).unwrap();

        let pool = FdPool::new(tmp.path(), 0);
        let fd = pool.acquire().unwrap();
        let raw = fd.as_raw_fd();
        pool.release(fd);

        // Popped back out, not re-opened.
        let fd = pool.acquire().unwrap();
        assert_eq!(fd.as_raw_fd(), raw);
        pool.release(fd);

        pool.close_all();
        // Empty again; the next acquire opens fresh.
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn acquire_fails_on_missing_path() {
        let pool = FdPool::new("/no/such/device", 0);
        assert!(pool.acquire().is_err());
    }
}
