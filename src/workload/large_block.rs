use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::atomic::Ordering;

use crate::clock;
use crate::io::engine::IoKind;
use crate::io::AlignedBuf;
use crate::run::RunContext;
use crate::workload::interruptible_sleep_us;

/// Nominal start-time offset between devices, so the paced loops don't hit
/// every device in the same instant.
pub const DEVICE_STAGGER_US: u64 = 1_000;
/// Additional offset between the read and write loop on one device.
pub const RW_STAGGER_US: u64 = 500;

/// Per-device large-block loop for one direction, paced so that all devices
/// together hit the derived aggregate rate. Models defragmentation reads
/// (`Read`) and write-back (`Write`).
pub fn run(ctx: &RunContext, device_index: usize, kind: IoKind) {
    let device = &ctx.devices[device_index];
    let large_block_bytes = ctx.cfg.large_block_bytes();

    let mut buf = match AlignedBuf::new(large_block_bytes as usize) {
        Ok(buf) => buf,
        Err(err) => {
            println!("ERROR: large block {} buffer: {}", kind.label(), err);
            ctx.running.store(false, Ordering::Relaxed);
            return;
        }
    };

    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let rate = ctx.cfg.large_block_ops_per_sec();
    let num_devices = ctx.devices.len() as f64;
    let max_lag_us = ctx.cfg.max_lag_us();
    let hist = match kind {
        IoKind::Read => &ctx.large_block_reads,
        IoKind::Write => &ctx.large_block_writes,
    };

    let stagger_us = device.index as u64 * DEVICE_STAGGER_US
        + if kind == IoKind::Write { RW_STAGGER_US } else { 0 };
    let start_us = ctx.run_start_us.saturating_sub(stagger_us);
    let mut count: u64 = 0;

    while ctx.running.load(Ordering::Relaxed) {
        let offset = (rng.next_u64() % device.geo.num_large_blocks) * large_block_bytes;

        if kind == IoKind::Write {
            // Fresh salt every op, so the device can't compress or dedup it.
            rng.fill_bytes(buf.as_mut_slice());
        }

        let start_ns = clock::now_ns();
        let slice = &mut buf.as_mut_slice()[..large_block_bytes as usize];
        if let Ok(stop_ns) = device.io(kind, offset, slice) {
            hist.record_ns(stop_ns.saturating_sub(start_ns));
        }
        count += 1;

        let target_us = (count as f64 * 1_000_000.0 * num_devices / rate) as u64;
        let elapsed_us = clock::now_us().saturating_sub(start_us);
        if target_us > elapsed_us {
            interruptible_sleep_us(target_us - elapsed_us, &ctx.running);
        } else if elapsed_us - target_us > max_lag_us {
            println!(
                "ERROR: large block {}s can't keep up - test stopped",
                kind.label()
            );
            ctx.running.store(false, Ordering::Relaxed);
        }
    }
}
