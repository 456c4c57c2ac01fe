use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::SetupError;

/// Kernel I/O scheduler mode written to sysfs for each device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerMode {
    Noop,
    Cfq,
    Deadline,
}

impl SchedulerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerMode::Noop => "noop",
            SchedulerMode::Cfq => "cfq",
            SchedulerMode::Deadline => "deadline",
        }
    }
}

impl FromStr for SchedulerMode {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "noop" => Ok(SchedulerMode::Noop),
            "cfq" => Ok(SchedulerMode::Cfq),
            "deadline" => Ok(SchedulerMode::Deadline),
            _ => Err(SetupError::ConfigInvalid(format!(
                "scheduler-mode must be noop, cfq or deadline, got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for SchedulerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective run configuration, merged from the config file and any
/// command-line overrides. Immutable once validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device_names: Vec<String>,
    pub test_duration_sec: u32,
    pub read_reqs_per_sec: u32,
    pub write_reqs_per_sec: u32,
    pub num_queues: u32,
    pub threads_per_queue: u32,
    pub report_interval_sec: u32,
    pub microsecond_histograms: bool,
    pub record_bytes: u32,
    pub record_bytes_range_max: u32,
    pub large_block_op_kbytes: u32,
    pub replication_factor: u32,
    pub update_pct: u32,
    pub defrag_lwm_pct: u32,
    pub disable_odsync: bool,
    pub commit_to_device: bool,
    pub commit_min_bytes: u32,
    pub tomb_raider: bool,
    pub tomb_raider_sleep_usec: u32,
    pub max_reqs_queued: u32,
    pub max_lag_sec: i32,
    pub scheduler_mode: SchedulerMode,
}

impl Config {
    pub fn load(path: &Path, overrides: &[(String, String)]) -> Result<Config, SetupError> {
        let text = fs::read_to_string(path)
            .map_err(|e| SetupError::ConfigInvalid(format!("{}: {}", path.display(), e)))?;
        Config::parse_with_overrides(&text, overrides)
    }

    pub fn parse(text: &str) -> Result<Config, SetupError> {
        Config::parse_with_overrides(text, &[])
    }

    pub fn parse_with_overrides(
        text: &str,
        overrides: &[(String, String)],
    ) -> Result<Config, SetupError> {
        let mut builder = Builder::default();

        for (lineno, raw) in text.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                SetupError::ConfigInvalid(format!("line {}: expected 'key: value'", lineno + 1))
            })?;
            builder.set(key.trim(), value.trim())?;
        }

        for (key, value) in overrides {
            builder.set(key.trim(), value.trim())?;
        }

        builder.finish()
    }

    pub fn large_block_bytes(&self) -> u64 {
        self.large_block_op_kbytes as u64 * 1024
    }

    /// Aggregate rate (ops/sec across all devices) for each large-block
    /// direction. Writes at `write-reqs-per-sec` fill large blocks at
    /// `rate * replication * record_bytes / large_block_bytes`; defrag
    /// amplifies that by `100 / (100 - defrag-lwm-pct)`, since blocks are
    /// recovered once they drain to the low-water mark.
    pub fn large_block_ops_per_sec(&self) -> f64 {
        if self.write_reqs_per_sec == 0 {
            return 0.0;
        }
        let fill_bytes_per_sec = self.write_reqs_per_sec as f64
            * self.replication_factor as f64
            * self.record_bytes as f64;
        let base = fill_bytes_per_sec / self.large_block_bytes() as f64;
        let defrag = 100.0 / (100.0 - self.defrag_lwm_pct as f64);
        (base * defrag).max(1.0)
    }

    pub fn report_interval_us(&self) -> u64 {
        self.report_interval_sec as u64 * 1_000_000
    }

    pub fn test_duration_us(&self) -> u64 {
        self.test_duration_sec as u64 * 1_000_000
    }

    pub fn max_lag_us(&self) -> u64 {
        self.max_lag_sec as u64 * 1_000_000
    }

    /// Echo the effective settings to stdout, one `key: value` line each.
    pub fn echo(&self) {
        println!("device-names: {}", self.device_names.join(","));
        println!("test-duration-sec: {}", self.test_duration_sec);
        println!("read-reqs-per-sec: {}", self.read_reqs_per_sec);
        println!("write-reqs-per-sec: {}", self.write_reqs_per_sec);
        println!("num-queues: {}", self.num_queues);
        println!("threads-per-queue: {}", self.threads_per_queue);
        println!("report-interval-sec: {}", self.report_interval_sec);
        println!(
            "microsecond-histograms: {}",
            if self.microsecond_histograms { "yes" } else { "no" }
        );
        println!("record-bytes: {}", self.record_bytes);
        println!("record-bytes-range-max: {}", self.record_bytes_range_max);
        println!("large-block-op-kbytes: {}", self.large_block_op_kbytes);
        println!("replication-factor: {}", self.replication_factor);
        println!("update-pct: {}", self.update_pct);
        println!("defrag-lwm-pct: {}", self.defrag_lwm_pct);
        println!(
            "disable-odsync: {}",
            if self.disable_odsync { "yes" } else { "no" }
        );
        println!(
            "commit-to-device: {}",
            if self.commit_to_device { "yes" } else { "no" }
        );
        println!("commit-min-bytes: {}", self.commit_min_bytes);
        println!(
            "tomb-raider: {}",
            if self.tomb_raider { "yes" } else { "no" }
        );
        println!("tomb-raider-sleep-usec: {}", self.tomb_raider_sleep_usec);
        println!("max-reqs-queued: {}", self.max_reqs_queued);
        println!("max-lag-sec: {}", self.max_lag_sec);
        println!("scheduler-mode: {}", self.scheduler_mode);
        println!(
            "derived large-block-ops-per-sec: {:.1}",
            self.large_block_ops_per_sec()
        );
    }
}

/// Accumulates settings as they are read; required keys stay `None` until
/// seen so `finish` can tell "missing" from "zero".
struct Builder {
    device_names: Option<Vec<String>>,
    test_duration_sec: Option<u32>,
    read_reqs_per_sec: Option<u32>,
    write_reqs_per_sec: Option<u32>,
    num_queues: u32,
    threads_per_queue: u32,
    report_interval_sec: u32,
    microsecond_histograms: bool,
    record_bytes: u32,
    record_bytes_range_max: u32,
    large_block_op_kbytes: u32,
    replication_factor: u32,
    update_pct: u32,
    defrag_lwm_pct: u32,
    disable_odsync: bool,
    commit_to_device: bool,
    commit_min_bytes: u32,
    tomb_raider: bool,
    tomb_raider_sleep_usec: u32,
    max_reqs_queued: u32,
    max_lag_sec: i32,
    scheduler_mode: SchedulerMode,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            device_names: None,
            test_duration_sec: None,
            read_reqs_per_sec: None,
            write_reqs_per_sec: None,
            num_queues: num_cpus::get() as u32,
            threads_per_queue: 4,
            report_interval_sec: 1,
            microsecond_histograms: false,
            record_bytes: 1536,
            record_bytes_range_max: 0,
            large_block_op_kbytes: 128,
            replication_factor: 1,
            update_pct: 0,
            defrag_lwm_pct: 50,
            disable_odsync: false,
            commit_to_device: false,
            commit_min_bytes: 0,
            tomb_raider: false,
            tomb_raider_sleep_usec: 0,
            max_reqs_queued: 100_000,
            max_lag_sec: 10,
            scheduler_mode: SchedulerMode::Noop,
        }
    }
}

impl Builder {
    fn set(&mut self, key: &str, value: &str) -> Result<(), SetupError> {
        let key = key.to_lowercase();
        match key.as_str() {
            "device-names" => {
                let names: Vec<String> = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                self.device_names = Some(names);
            }
            "test-duration-sec" => self.test_duration_sec = Some(parse_u32(&key, value)?),
            "read-reqs-per-sec" => self.read_reqs_per_sec = Some(parse_u32(&key, value)?),
            "write-reqs-per-sec" => self.write_reqs_per_sec = Some(parse_u32(&key, value)?),
            "num-queues" => self.num_queues = parse_u32(&key, value)?,
            "threads-per-queue" => self.threads_per_queue = parse_u32(&key, value)?,
            "report-interval-sec" => self.report_interval_sec = parse_u32(&key, value)?,
            "microsecond-histograms" => self.microsecond_histograms = parse_bool(&key, value)?,
            "record-bytes" => self.record_bytes = parse_u32(&key, value)?,
            "record-bytes-range-max" => self.record_bytes_range_max = parse_u32(&key, value)?,
            "large-block-op-kbytes" => self.large_block_op_kbytes = parse_u32(&key, value)?,
            "replication-factor" => self.replication_factor = parse_u32(&key, value)?,
            "update-pct" => self.update_pct = parse_u32(&key, value)?,
            "defrag-lwm-pct" => self.defrag_lwm_pct = parse_u32(&key, value)?,
            "disable-odsync" => self.disable_odsync = parse_bool(&key, value)?,
            "commit-to-device" => self.commit_to_device = parse_bool(&key, value)?,
            "commit-min-bytes" => self.commit_min_bytes = parse_u32(&key, value)?,
            "tomb-raider" => self.tomb_raider = parse_bool(&key, value)?,
            "tomb-raider-sleep-usec" => self.tomb_raider_sleep_usec = parse_u32(&key, value)?,
            "max-reqs-queued" => self.max_reqs_queued = parse_u32(&key, value)?,
            "max-lag-sec" => self.max_lag_sec = parse_i32(&key, value)?,
            "scheduler-mode" => self.scheduler_mode = value.parse()?,
            _ => println!("WARNING: ignoring unknown config item '{}'", key),
        }
        Ok(())
    }

    fn finish(self) -> Result<Config, SetupError> {
        let device_names = self.device_names.ok_or_else(|| missing("device-names"))?;
        let test_duration_sec = self
            .test_duration_sec
            .ok_or_else(|| missing("test-duration-sec"))?;
        let read_reqs_per_sec = self
            .read_reqs_per_sec
            .ok_or_else(|| missing("read-reqs-per-sec"))?;
        let write_reqs_per_sec = self
            .write_reqs_per_sec
            .ok_or_else(|| missing("write-reqs-per-sec"))?;

        if device_names.is_empty() {
            return Err(SetupError::ConfigInvalid(
                "device-names must list at least one device".into(),
            ));
        }
        require_nonzero("test-duration-sec", test_duration_sec)?;
        require_nonzero("read-reqs-per-sec", read_reqs_per_sec)?;
        require_nonzero("num-queues", self.num_queues)?;
        require_nonzero("threads-per-queue", self.threads_per_queue)?;
        require_nonzero("report-interval-sec", self.report_interval_sec)?;
        require_nonzero("record-bytes", self.record_bytes)?;
        require_nonzero("large-block-op-kbytes", self.large_block_op_kbytes)?;
        require_nonzero("max-reqs-queued", self.max_reqs_queued)?;
        if self.defrag_lwm_pct >= 100 {
            return Err(SetupError::ConfigInvalid(
                "defrag-lwm-pct must be below 100".into(),
            ));
        }
        if self.max_lag_sec <= 0 {
            return Err(SetupError::ConfigInvalid(
                "max-lag-sec must be positive".into(),
            ));
        }

        Ok(Config {
            device_names,
            test_duration_sec,
            read_reqs_per_sec,
            write_reqs_per_sec,
            num_queues: self.num_queues,
            threads_per_queue: self.threads_per_queue,
            report_interval_sec: self.report_interval_sec,
            microsecond_histograms: self.microsecond_histograms,
            record_bytes: self.record_bytes,
            record_bytes_range_max: self.record_bytes_range_max,
            large_block_op_kbytes: self.large_block_op_kbytes,
            replication_factor: self.replication_factor,
            update_pct: self.update_pct,
            defrag_lwm_pct: self.defrag_lwm_pct,
            disable_odsync: self.disable_odsync,
            commit_to_device: self.commit_to_device,
            commit_min_bytes: self.commit_min_bytes,
            tomb_raider: self.tomb_raider,
            tomb_raider_sleep_usec: self.tomb_raider_sleep_usec,
            max_reqs_queued: self.max_reqs_queued,
            max_lag_sec: self.max_lag_sec,
            scheduler_mode: self.scheduler_mode,
        })
    }
}

fn missing(key: &str) -> SetupError {
    SetupError::ConfigInvalid(format!("missing required setting '{}'", key))
}

fn require_nonzero(key: &str, value: u32) -> Result<(), SetupError> {
    if value == 0 {
        return Err(SetupError::ConfigInvalid(format!("{} must be nonzero", key)));
    }
    Ok(())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, SetupError> {
    value
        .parse()
        .map_err(|_| SetupError::ConfigInvalid(format!("{}: bad value '{}'", key, value)))
}

fn parse_i32(key: &str, value: &str) -> Result<i32, SetupError> {
    value
        .parse()
        .map_err(|_| SetupError::ConfigInvalid(format!("{}: bad value '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SetupError> {
    match value.to_lowercase().as_str() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(SetupError::ConfigInvalid(format!(
            "{}: expected yes/no, got '{}'",
            key, value
        ))),
    }
}
