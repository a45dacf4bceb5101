//! 同步原语
//!
//! 缓存使用两类锁：
//!
//! - 分片锁：`spin::Mutex`，只保护短小的元数据临界区，绝不跨越设备 I/O。
//! - 内容锁：[`SleepLock`]，每个缓冲槽一把，等待者被挂起而不是自旋，
//!   可以跨越设备 I/O 持有。
//!
//! 持有分片锁时绝不能获取内容锁。

mod sleeplock;

pub use sleeplock::{SleepLock, SleepLockGuard};
