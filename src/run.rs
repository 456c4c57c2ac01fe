use anyhow::Result;
use crossbeam::channel;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use crate::clock;
use crate::config::Config;
use crate::io::engine::IoKind;
use crate::io::{sched, Device};
use crate::report::{HistScale, LatencyHistogram};
use crate::signal;
use crate::workload::{generator, interruptible_sleep_us, large_block, worker};

/// Everything the workload threads share. Built once by the supervisor and
/// passed around by `Arc`; only `running`, `reqs_queued`, the descriptor
/// pools and the histograms mutate after construction.
pub struct RunContext {
    pub cfg: Config,
    pub devices: Vec<Device>,
    pub running: AtomicBool,
    pub reqs_queued: AtomicU32,
    pub run_start_us: u64,
    pub large_block_reads: LatencyHistogram,
    pub large_block_writes: LatencyHistogram,
    pub raw_reads: LatencyHistogram,
    pub reads: LatencyHistogram,
}

/// Execute one full run: device setup, staggered thread launch, report
/// ticks until the duration elapses or `running` is cleared, then the
/// join/drain shutdown sequence. Returns the context so callers (and the
/// integration tests) can inspect the final counters and histograms.
pub fn run(cfg: Config) -> Result<Arc<RunContext>> {
    for name in &cfg.device_names {
        sched::set_scheduler(name, cfg.scheduler_mode);
    }

    let scale = HistScale::from_micro_flag(cfg.microsecond_histograms);
    let mut devices = Vec::with_capacity(cfg.device_names.len());
    for (index, name) in cfg.device_names.iter().enumerate() {
        devices.push(Device::setup(name, index, &cfg, scale)?);
    }

    let mut senders = Vec::with_capacity(cfg.num_queues as usize);
    let mut receivers = Vec::with_capacity(cfg.num_queues as usize);
    for _ in 0..cfg.num_queues {
        let (tx, rx) = channel::unbounded();
        senders.push(tx);
        receivers.push(rx);
    }

    let ctx = Arc::new(RunContext {
        devices,
        running: AtomicBool::new(true),
        reqs_queued: AtomicU32::new(0),
        run_start_us: clock::now_us(),
        large_block_reads: LatencyHistogram::new(scale),
        large_block_writes: LatencyHistogram::new(scale),
        raw_reads: LatencyHistogram::new(scale),
        reads: LatencyHistogram::new(scale),
        cfg,
    });

    signal::install(&ctx);

    let threads_per_queue = ctx.cfg.threads_per_queue;
    let mut handles = Vec::new();

    {
        let ctx = Arc::clone(&ctx);
        handles.push(
            thread::Builder::new()
                .name("generator".into())
                .spawn(move || generator::run(&ctx, &senders))?,
        );
    }

    for (queue_index, rx) in receivers.into_iter().enumerate() {
        for thread_index in 0..threads_per_queue {
            let ctx = Arc::clone(&ctx);
            let rx = rx.clone();
            handles.push(
                thread::Builder::new()
                    .name(format!("trans-q{}-{}", queue_index, thread_index))
                    .spawn(move || worker::run(&ctx, &rx))?,
            );
        }
    }

    // Large-block pressure exists only when the write stream is configured;
    // a pure-read benchmark models an idle device.
    if ctx.cfg.write_reqs_per_sec != 0 {
        for device_index in 0..ctx.devices.len() {
            for kind in [IoKind::Read, IoKind::Write] {
                let ctx = Arc::clone(&ctx);
                handles.push(
                    thread::Builder::new()
                        .name(format!("large-{}-{}", kind.label(), device_index))
                        .spawn(move || large_block::run(&ctx, device_index, kind))?,
                );
            }
        }
    }

    supervise(&ctx);

    // Shutdown: clear the flag, join in spawn order (generator, workers,
    // large-block), then drain every descriptor pool.
    ctx.running.store(false, Ordering::Relaxed);
    for handle in handles {
        let _ = handle.join();
    }
    for device in &ctx.devices {
        device.pool.close_all();
    }

    Ok(ctx)
}

/// Report tick loop: wake at `run_start + N * interval`, print the
/// histogram block, stop once the configured duration has elapsed or
/// another party clears `running`.
fn supervise(ctx: &RunContext) {
    let interval_us = ctx.cfg.report_interval_us();
    let duration_us = ctx.cfg.test_duration_us();
    let mut count: u64 = 1;

    while ctx.running.load(Ordering::Relaxed) {
        let target_us = ctx.run_start_us + count * interval_us;
        let now_us = clock::now_us();
        if target_us > now_us {
            interruptible_sleep_us(target_us - now_us, &ctx.running);
        }
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        let elapsed_us = clock::now_us().saturating_sub(ctx.run_start_us);
        print_tick(ctx, elapsed_us / 1_000_000);

        if count * interval_us >= duration_us {
            break;
        }
        count += 1;
    }
}

fn print_tick(ctx: &RunContext, elapsed_sec: u64) {
    println!("After {} sec:", elapsed_sec);
    println!("requests queued: {}", ctx.reqs_queued.load(Ordering::Relaxed));
    if ctx.cfg.write_reqs_per_sec != 0 {
        ctx.large_block_reads.dump("LARGE BLOCK READS");
        ctx.large_block_writes.dump("LARGE BLOCK WRITES");
    }
    ctx.raw_reads.dump("RAW READS");
    for device in &ctx.devices {
        device.raw_read_hist.dump(&format!("{:>18}", device.name));
    }
    ctx.reads.dump("READS");
    println!();
}
