//! bcache_core: 内核块缓存（分片 + LRU + 跨分片窃取）
//!
//! 位于文件系统层与块设备驱动之间，提供：
//! - **固定容量**的缓冲槽池，启动时一次性分配
//! - **哈希分片**，每个分片独立加锁，局部 LRU 驱逐
//! - **跨分片窃取**，归属分片耗尽时从其他分片借用空闲槽位
//! - **RAII 句柄**，离开作用域自动释放引用
//!
//! # 示例
//!
//! ```rust,ignore
//! use bcache_core::{BufferCache, CacheConfig, MemDisk, Result};
//!
//! fn main() -> Result<()> {
//!     let cache = BufferCache::new(MemDisk::new(1024), CacheConfig::default())?;
//!
//!     // 读取块
//!     let mut buf = cache.bread(1, 0)?;
//!     buf.data_mut()?[0] = 0x42;
//!
//!     // 写穿到设备
//!     buf.write()?;
//!     buf.release()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`config`] - 缓存配置
//! - [`sync`] - 睡眠锁
//! - [`block`] - 块设备抽象
//! - [`cache`] - 分片块缓存

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 缓存配置
pub mod config;

/// 同步原语
pub mod sync;

/// 块设备抽象
pub mod block;

/// 块缓存
pub mod cache;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 配置
pub use config::{CacheConfig, ExhaustionPolicy};

// 块设备
pub use block::{BlockDevice, BlockId, MemDisk};

// 缓存
pub use cache::{home_shard, BufFlags, BufHandle, BufferCache, CacheStats, SlotId, SlotMeta};
