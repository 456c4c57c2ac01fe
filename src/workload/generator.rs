use crossbeam::channel::Sender;
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::atomic::Ordering;

use crate::clock;
use crate::io::Geometry;
use crate::run::RunContext;
use crate::workload::{interruptible_sleep_us, ReadRequest};

/// Transaction request generator: one thread producing small-read requests
/// at `read-reqs-per-sec`, fanned out round-robin across the worker queues
/// with uniform device selection. Trips overload when the backlog exceeds
/// `max-reqs-queued`.
pub fn run(ctx: &RunContext, queues: &[Sender<ReadRequest>]) {
    let mut rng = Xoshiro256PlusPlus::from_entropy();
    let num_devices = ctx.devices.len() as u64;
    let num_queues = queues.len() as u64;
    let rate = ctx.cfg.read_reqs_per_sec as u64;
    let mut count: u64 = 0;

    while ctx.running.load(Ordering::Relaxed) {
        let queued = ctx.reqs_queued.fetch_add(1, Ordering::Relaxed) + 1;
        if queued > ctx.cfg.max_reqs_queued {
            println!(
                "ERROR: too many requests queued ({} > {})",
                queued, ctx.cfg.max_reqs_queued
            );
            println!("ERROR: drive(s) can't keep up - test stopped");
            ctx.running.store(false, Ordering::Relaxed);
            break;
        }

        let device_index = (rng.next_u64() % num_devices) as usize;
        let geo = &ctx.devices[device_index].geo;
        let req = ReadRequest {
            device_index,
            offset: pick_read_offset(&mut rng, geo),
            size: geo.read_bytes,
            enqueue_ns: clock::now_ns(),
        };

        if queues[queue_index(count, num_queues)].send(req).is_err() {
            break;
        }
        count += 1;

        // Drift-corrected pacing: sleep toward the cumulative target, so the
        // Nth request converges to start + N/rate regardless of jitter.
        let target_us = count * 1_000_000 / rate;
        let elapsed_us = clock::now_us().saturating_sub(ctx.run_start_us);
        if target_us > elapsed_us {
            interruptible_sleep_us(target_us - elapsed_us, &ctx.running);
        }
    }
}

fn queue_index(count: u64, num_queues: u64) -> usize {
    (count % num_queues) as usize
}

fn pick_read_offset(rng: &mut Xoshiro256PlusPlus, geo: &Geometry) -> u64 {
    (rng.next_u64() % geo.num_read_offsets) * geo.min_op_bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> Geometry {
        Geometry::derive("d", 1 << 30, 4096, 128 * 1024, 1536).unwrap()
    }

    #[test]
    fn fan_out_is_even() {
        // Over N iterations each queue gets floor(N/q) or ceil(N/q).
        for (iters, queues) in [(10u64, 3u64), (1000, 7), (8, 8), (5, 2)] {
            let mut counts = vec![0u64; queues as usize];
            for count in 0..iters {
                counts[queue_index(count, queues)] += 1;
            }
            let lo = iters / queues;
            let hi = (iters + queues - 1) / queues;
            for c in counts {
                assert!(c == lo || c == hi, "{} not in [{}, {}]", c, lo, hi);
            }
        }
    }

    #[test]
    fn offsets_aligned_and_in_bounds() {
        let geo = geometry();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        for _ in 0..10_000 {
            let offset = pick_read_offset(&mut rng, &geo);
            assert_eq!(offset % geo.min_op_bytes, 0);
            assert!(offset + geo.read_bytes <= geo.size_bytes);
        }
    }
}
