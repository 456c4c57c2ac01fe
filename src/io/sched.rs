use std::fs;
use std::path::{Path, PathBuf};

use crate::config::SchedulerMode;

/// Sysfs scheduler knob for a device path, e.g. `/dev/sda` ->
/// `/sys/block/sda/queue/scheduler`.
pub fn sysfs_scheduler_path(device_name: &str) -> Option<PathBuf> {
    let segment = Path::new(device_name).file_name()?;
    Some(
        Path::new("/sys/block")
            .join(segment)
            .join("queue")
            .join("scheduler"),
    )
}

/// Best-effort: nested devices, non-Linux platforms and permission errors
/// all log one line and the run proceeds.
pub fn set_scheduler(device_name: &str, mode: SchedulerMode) {
    let Some(path) = sysfs_scheduler_path(device_name) else {
        println!(
            "ERROR: couldn't derive sysfs scheduler path for '{}'",
            device_name
        );
        return;
    };
    if let Err(err) = fs::write(&path, mode.as_str()) {
        println!(
            "ERROR: couldn't set scheduler mode {} for {}: {}",
            mode, device_name, err
        );
    }
}
