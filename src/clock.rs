use std::mem::MaybeUninit;

/// Monotonic timestamp in nanoseconds.
///
/// CLOCK_MONOTONIC is steady across wall-clock adjustments; all pacing and
/// latency math in this crate works on these raw u64 values so timestamps
/// can be shared between threads without carrying an `Instant` origin around.
pub fn now_ns() -> u64 {
    let mut ts = MaybeUninit::<libc::timespec>::uninit();
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, ts.as_mut_ptr()) };
    // clock_gettime can only fail for an invalid clock id or bad pointer.
    debug_assert_eq!(rc, 0);
    let ts = unsafe { ts.assume_init() };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Monotonic timestamp in microseconds.
pub fn now_us() -> u64 {
    now_ns() / 1_000
}

/// Monotonic timestamp in milliseconds.
pub fn now_ms() -> u64 {
    now_ns() / 1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[test]
    fn unit_scales_agree() {
        let us = now_us();
        let ns = now_ns();
        // Two separate reads, so allow generous slack.
        assert!(ns / 1_000 >= us);
        assert!(ns / 1_000 - us < 1_000_000);
        assert!(now_ms() <= now_us() / 1_000 + 1);
    }
}
