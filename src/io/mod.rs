pub mod buffer;
pub mod device;
pub mod engine;
pub mod pool;
pub mod sched;

pub use buffer::AlignedBuf;
pub use device::{Device, Geometry};
pub use engine::IoKind;
pub use pool::FdPool;
