use hdrhistogram::Histogram;
use std::sync::Mutex;

/// Bucket scale for recorded latencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistScale {
    Milliseconds,
    Microseconds,
}

impl HistScale {
    pub fn from_micro_flag(microsecond_histograms: bool) -> HistScale {
        if microsecond_histograms {
            HistScale::Microseconds
        } else {
            HistScale::Milliseconds
        }
    }

    fn ns_divisor(self) -> u64 {
        match self {
            HistScale::Milliseconds => 1_000_000,
            HistScale::Microseconds => 1_000,
        }
    }

    fn unit(self) -> &'static str {
        match self {
            HistScale::Milliseconds => "msec",
            HistScale::Microseconds => "usec",
        }
    }
}

/// Latency histogram shared between many recording threads and the single
/// reporter. Insertion takes the lock briefly; the reporter prints from a
/// cloned snapshot, so a dump concurrent with insertion can at most miss
/// in-flight samples.
pub struct LatencyHistogram {
    scale: HistScale,
    inner: Mutex<Histogram<u64>>,
}

impl LatencyHistogram {
    pub fn new(scale: HistScale) -> LatencyHistogram {
        LatencyHistogram {
            scale,
            inner: Mutex::new(Histogram::new(3).expect("3 sigfigs is in range")),
        }
    }

    pub fn record_ns(&self, elapsed_ns: u64) {
        let value = elapsed_ns / self.scale.ns_divisor();
        self.inner.lock().unwrap().saturating_record(value);
    }

    pub fn total(&self) -> u64 {
        self.inner.lock().unwrap().len()
    }

    pub fn snapshot(&self) -> Histogram<u64> {
        self.inner.lock().unwrap().clone()
    }

    /// Print `TAG (N total) <unit>` and the nonzero power-of-two latency
    /// buckets, four columns per line.
    pub fn dump(&self, tag: &str) {
        let snap = self.snapshot();
        println!("{} ({} total) {}", tag, snap.len(), self.scale.unit());
        if snap.len() == 0 {
            return;
        }

        let mut line = String::new();
        let mut columns = 0;
        for (bucket, step) in snap.iter_log(1, 2.0).enumerate() {
            let count = step.count_since_last_iteration();
            if count > 0 {
                line.push_str(&format!(" ({:02}: {:010})", bucket, count));
                columns += 1;
                if columns == 4 {
                    println!("{}", line);
                    line.clear();
                    columns = 0;
                }
            }
            if step.value_iterated_to() >= snap.max() {
                break;
            }
        }
        if !line.is_empty() {
            println!("{}", line);
        }
    }
}
