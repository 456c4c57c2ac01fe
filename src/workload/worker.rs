use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::clock;
use crate::io::engine::IoKind;
use crate::io::AlignedBuf;
use crate::run::RunContext;
use crate::workload::ReadRequest;

/// Bounds shutdown latency: an idle worker re-checks `running` this often.
const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// Transaction worker: pops requests from one queue, issues the raw read
/// and feeds three histograms. `raw` is the latency strictly around the
/// I/O; `end-to-end` starts at enqueue time and diverges from raw as the
/// queue grows.
pub fn run(ctx: &RunContext, queue: &Receiver<ReadRequest>) {
    let max_read_bytes = ctx
        .devices
        .iter()
        .map(|d| d.geo.read_bytes)
        .max()
        .unwrap_or(0) as usize;

    let mut buf = match AlignedBuf::new(max_read_bytes) {
        Ok(buf) => buf,
        Err(err) => {
            println!("ERROR: transaction worker buffer: {}", err);
            ctx.running.store(false, Ordering::Relaxed);
            return;
        }
    };

    while ctx.running.load(Ordering::Relaxed) {
        let req = match queue.recv_timeout(POP_TIMEOUT) {
            Ok(req) => req,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let device = &ctx.devices[req.device_index];
        let slice = &mut buf.as_mut_slice()[..req.size as usize];

        let raw_start_ns = clock::now_ns();
        if let Ok(stop_ns) = device.io(IoKind::Read, req.offset, slice) {
            let raw_ns = stop_ns.saturating_sub(raw_start_ns);
            ctx.raw_reads.record_ns(raw_ns);
            device.raw_read_hist.record_ns(raw_ns);
            ctx.reads.record_ns(stop_ns.saturating_sub(req.enqueue_ns));
        }
        // Failed samples are dropped; the request itself still completes.
        ctx.reqs_queued.fetch_sub(1, Ordering::Relaxed);
    }
}
