//! 块设备抽象
//!
//! block/device.rs 定义缓存与设备驱动之间的调用契约（同步、整块读写）
//! block/mem.rs 提供内存盘实现，用于测试和演示

mod device;
mod mem;

pub use device::{BlockDevice, BlockId};
pub use mem::MemDisk;
