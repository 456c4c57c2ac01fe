use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

pub mod generator;
pub mod large_block;
pub mod worker;

/// One pending transaction read, produced by the generator and consumed by
/// exactly one worker. The device is referenced by index into the run's
/// device table.
pub struct ReadRequest {
    pub device_index: usize,
    pub offset: u64,
    pub size: u64,
    pub enqueue_ns: u64,
}

/// Sleep `total_us`, waking at least every 100 ms to observe a cleared
/// `running` flag. Keeps shutdown latency bounded even when a paced loop's
/// residual sleep is long.
pub(crate) fn interruptible_sleep_us(total_us: u64, running: &AtomicBool) {
    const SLICE_US: u64 = 100_000;
    let mut remaining_us = total_us;
    while remaining_us > 0 && running.load(Ordering::Relaxed) {
        let chunk_us = remaining_us.min(SLICE_US);
        thread::sleep(Duration::from_micros(chunk_us));
        remaining_us -= chunk_us;
    }
}
