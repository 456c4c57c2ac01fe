use anyhow::{anyhow, Result};

/// Direct I/O wants page alignment; 4096 covers every min-op size we probe.
pub const BUFFER_ALIGN: usize = 4096;

/// Round `n` up to the next multiple of `align` (a power of two).
pub fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

/// Heap buffer whose address and length are both multiples of 4096, as
/// required for O_DIRECT transfers. Allocated with posix_memalign and
/// zero-filled; freed on drop.
pub struct AlignedBuf {
    ptr: *mut u8,
    len: usize,
}

// The buffer is plain owned memory; threads move it, never share it.
unsafe impl Send for AlignedBuf {}

impl AlignedBuf {
    pub fn new(size: usize) -> Result<AlignedBuf> {
        let len = align_up(size.max(1), BUFFER_ALIGN);
        let mut ptr: *mut libc::c_void = std::ptr::null_mut();
        let rc = unsafe { libc::posix_memalign(&mut ptr, BUFFER_ALIGN, len) };
        if rc != 0 || ptr.is_null() {
            return Err(anyhow!("out of memory allocating {} aligned bytes", len));
        }
        unsafe { std::ptr::write_bytes(ptr as *mut u8, 0, len) };
        Ok(AlignedBuf {
            ptr: ptr as *mut u8,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        unsafe { libc::free(self.ptr as *mut libc::c_void) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_and_length_are_page_aligned() {
        for size in [1, 512, 1536, 4096, 131072] {
            let buf = AlignedBuf::new(size).unwrap();
            assert_eq!(buf.as_slice().as_ptr() as usize % BUFFER_ALIGN, 0);
            assert_eq!(buf.len() % BUFFER_ALIGN, 0);
            assert!(buf.len() >= size);
        }
    }

    #[test]
    fn zero_filled() {
        let buf = AlignedBuf::new(8192).unwrap();
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn align_up_rounds() {
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_up(4097, 4096), 8192);
        assert_eq!(align_up(1536, 512), 1536);
    }
}
