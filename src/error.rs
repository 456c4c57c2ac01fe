use thiserror::Error;

/// Fatal setup failures. Any of these aborts the process before a single
/// workload thread is started; runtime I/O errors are plain `std::io::Error`
/// sentinels handled at the engine instead.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{path}: unreadable with direct I/O ({detail})")]
    DeviceUnreadable { path: String, detail: String },

    #[error("{path}: device too small for record size {record_bytes}")]
    DeviceTooSmall { path: String, record_bytes: u32 },
}
