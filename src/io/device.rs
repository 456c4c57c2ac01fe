use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;

use crate::config::Config;
use crate::error::SetupError;
use crate::io::buffer::AlignedBuf;
use crate::io::engine::{self, IoKind};
use crate::io::pool::FdPool;
use crate::report::{HistScale, LatencyHistogram};

// BLKGETSIZE64 ioctl constant (from linux/fs.h)
const BLKGETSIZE64: libc::c_ulong = 0x80081272;

/// Offset-space arithmetic for one device, fixed at setup.
///
/// All sizes are bytes. `num_read_offsets` counts the valid starting
/// positions for a transaction read at `min_op_bytes` granularity within the
/// large-block-aligned span of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub size_bytes: u64,
    pub min_op_bytes: u64,
    pub num_large_blocks: u64,
    pub num_read_offsets: u64,
    pub read_bytes: u64,
}

impl Geometry {
    pub fn derive(
        path: &str,
        size_bytes: u64,
        min_op_bytes: u64,
        large_block_bytes: u64,
        record_bytes: u32,
    ) -> Result<Geometry, SetupError> {
        let num_large_blocks = size_bytes / large_block_bytes;
        let num_min_op_blocks = num_large_blocks * large_block_bytes / min_op_bytes;
        let read_req_blocks = (record_bytes as u64 + min_op_bytes - 1) / min_op_bytes;
        let read_bytes = read_req_blocks * min_op_bytes;
        let num_read_offsets = num_min_op_blocks as i64 - read_req_blocks as i64 + 1;

        if num_large_blocks == 0 || num_read_offsets <= 0 {
            return Err(SetupError::DeviceTooSmall {
                path: path.to_string(),
                record_bytes,
            });
        }

        Ok(Geometry {
            size_bytes,
            min_op_bytes,
            num_large_blocks,
            num_read_offsets: num_read_offsets as u64,
            read_bytes,
        })
    }
}

/// One raw block device under test. Everything except the descriptor pool
/// and the latency histogram is immutable after setup.
pub struct Device {
    pub name: String,
    pub index: usize,
    pub geo: Geometry,
    pub pool: FdPool,
    pub raw_read_hist: LatencyHistogram,
}

impl Device {
    /// Open the device with direct-I/O semantics, probe its size and minimum
    /// direct-op size, and derive the offset space.
    pub fn setup(
        name: &str,
        index: usize,
        cfg: &Config,
        scale: HistScale,
    ) -> Result<Device, SetupError> {
        let mut flags = libc::O_DIRECT;
        if !cfg.disable_odsync {
            flags |= libc::O_DSYNC;
        }
        let pool = FdPool::new(name, flags);

        let fd = pool.acquire().map_err(|e| SetupError::DeviceUnreadable {
            path: name.to_string(),
            detail: e.to_string(),
        })?;

        let size_bytes = device_size(&fd).map_err(|e| SetupError::DeviceUnreadable {
            path: name.to_string(),
            detail: format!("size probe failed: {}", e),
        })?;

        let min_op_bytes = probe_min_op_bytes(&fd).ok_or_else(|| SetupError::DeviceUnreadable {
            path: name.to_string(),
            detail: "no direct read succeeded at block sizes 512 through 4096".to_string(),
        })?;

        let geo = Geometry::derive(
            name,
            size_bytes,
            min_op_bytes,
            cfg.large_block_bytes(),
            cfg.record_bytes,
        )?;

        pool.release(fd);

        Ok(Device {
            name: name.to_string(),
            index,
            geo,
            pool,
            raw_read_hist: LatencyHistogram::new(scale),
        })
    }

    /// One timed direct operation against this device.
    pub fn io(&self, kind: IoKind, offset: u64, buf: &mut [u8]) -> io::Result<u64> {
        engine::io(&self.pool, kind, offset, buf)
    }
}

/// Block-device byte size via ioctl, falling back to fstat for file-backed
/// stand-ins.
fn device_size(fd: &File) -> io::Result<u64> {
    let mut size: u64 = 0;
    let rc = unsafe { libc::ioctl(fd.as_raw_fd(), BLKGETSIZE64, &mut size) };
    if rc == 0 && size > 0 {
        return Ok(size);
    }
    Ok(fd.metadata()?.len())
}

/// Smallest direct-read size the device accepts, by trial: 512, doubling up
/// to 4096. Direct I/O rejects under-sized transfers with EINVAL, so the
/// first size that reads fully is the device minimum.
fn probe_min_op_bytes(fd: &File) -> Option<u64> {
    let mut op = 512usize;
    while op <= 4096 {
        if let Ok(mut buf) = AlignedBuf::new(op) {
            if let Ok(n) = fd.read_at(&mut buf.as_mut_slice()[..op], 0) {
                if n == op {
                    return Some(op as u64);
                }
            }
        }
        op *= 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const LB: u64 = 128 * 1024;

    #[test]
    fn geometry_basic() {
        let geo = Geometry::derive("d", 1 << 30, 4096, LB, 1536).unwrap();
        assert_eq!(geo.num_large_blocks, (1 << 30) / LB);
        assert_eq!(geo.read_bytes, 4096);
        // One min-op block per read request.
        assert_eq!(geo.num_read_offsets, (1 << 30) / 4096);
    }

    #[test]
    fn geometry_single_large_block() {
        // Device exactly one large block: offsets = lb/min_op - blocks + 1.
        let geo = Geometry::derive("d", LB, 4096, LB, 1536).unwrap();
        assert_eq!(geo.num_large_blocks, 1);
        assert_eq!(geo.num_read_offsets, LB / 4096 - 1 + 1);
    }

    #[test]
    fn read_bytes_rounds_up_to_min_op() {
        let geo = Geometry::derive("d", 1 << 30, 4096, LB, 1536).unwrap();
        assert_eq!(geo.read_bytes, 4096);
        let geo = Geometry::derive("d", 1 << 30, 512, LB, 1536).unwrap();
        assert_eq!(geo.read_bytes, 1536);
    }

    #[test]
    fn read_bytes_exact_multiple_is_unchanged() {
        let geo = Geometry::derive("d", 1 << 30, 512, LB, 4096).unwrap();
        assert_eq!(geo.read_bytes, 4096);
    }

    #[test]
    fn tiny_device_rejected() {
        let err = Geometry::derive("d", LB - 1, 4096, LB, 1536).unwrap_err();
        assert!(matches!(err, SetupError::DeviceTooSmall { .. }));
    }

    #[test]
    fn record_larger_than_device_rejected() {
        // Record needs more min-op blocks than the device spans.
        let err = Geometry::derive("d", LB, 4096, LB, (LB + 4096) as u32).unwrap_err();
        assert!(matches!(err, SetupError::DeviceTooSmall { .. }));
    }

    #[test]
    fn offsets_stay_in_bounds() {
        let geo = Geometry::derive("d", 1 << 30, 4096, LB, 1536).unwrap();
        let last = (geo.num_read_offsets - 1) * geo.min_op_bytes;
        assert!(last + geo.read_bytes <= geo.size_bytes);
    }
}
