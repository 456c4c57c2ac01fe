use std::io;
use std::os::unix::fs::FileExt;

use crate::clock;
use crate::io::pool::FdPool;

/// Direction of a single device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Read,
    Write,
}

impl IoKind {
    pub fn label(self) -> &'static str {
        match self {
            IoKind::Read => "read",
            IoKind::Write => "write",
        }
    }
}

/// Issue one positioned operation of exactly `buf.len()` bytes on a borrowed
/// descriptor and return the monotonic stop time in nanoseconds.
///
/// Callers guarantee `offset`, `buf.len()` and the buffer address satisfy the
/// device's direct-I/O alignment; a violation is a programming error, not a
/// runtime condition. On failure the descriptor is closed rather than pooled,
/// the error is logged with its OS code, and the sample is dropped by the
/// caller.
pub fn io(pool: &FdPool, kind: IoKind, offset: u64, buf: &mut [u8]) -> io::Result<u64> {
    let fd = match pool.acquire() {
        Ok(fd) => fd,
        Err(err) => {
            println!(
                "ERROR: {} open failed: {} (errno {})",
                pool.path().display(),
                err,
                err.raw_os_error().unwrap_or(0)
            );
            return Err(err);
        }
    };

    let result = match kind {
        IoKind::Read => fd.read_at(buf, offset).and_then(|n| expect_full(n, buf.len())),
        IoKind::Write => fd.write_at(buf, offset).and_then(|n| expect_full(n, buf.len())),
    };

    match result {
        Ok(()) => {
            let stop_ns = clock::now_ns();
            pool.release(fd);
            Ok(stop_ns)
        }
        Err(err) => {
            println!(
                "ERROR: {} {} of {} bytes at offset {} failed: {} (errno {})",
                pool.path().display(),
                kind.label(),
                buf.len(),
                offset,
                err,
                err.raw_os_error().unwrap_or(0)
            );
            drop(fd);
            Err(err)
        }
    }
}

fn expect_full(n: usize, want: usize) -> io::Result<()> {
    if n == want {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short transfer: {} of {} bytes", n, want),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trip() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.as_file().set_len(64 * 1024).unwrap();

        // Plain buffered flags; the engine itself is alignment-agnostic.
        let pool = FdPool::new(tmp.path(), 0);

        let mut out = vec![0xabu8; 8192];
        let before = crate::clock::now_ns();
        let stop_w = io(&pool, IoKind::Write, 8192, &mut out).unwrap();
        assert!(stop_w >= before);

        let mut back = vec![0u8; 8192];
        let stop_r = io(&pool, IoKind::Read, 8192, &mut back).unwrap();
        assert!(stop_r >= stop_w);
        assert_eq!(back, out);
    }

    #[test]
    fn read_past_eof_is_an_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.as_file().set_len(4096).unwrap();

        let pool = FdPool::new(tmp.path(), 0);
        let mut buf = vec![0u8; 4096];
        // Only a short (zero-byte) transfer is possible at this offset.
        assert!(io(&pool, IoKind::Read, 8192, &mut buf).is_err());
    }
}
