//! 块缓存模块
//!
//! 内核文件系统层与块设备驱动之间的缓冲层：每次对块的读写都经过内存中的副本，
//! 重复访问避免设备 I/O，并发访问同一块的线程看到串行化的视图。
//!
//! # 主要组件
//!
//! - [`BufferCache`] - 缓存服务：分片表、获取/驱逐/窃取、释放、pin
//! - [`BufHandle`] - 持有独占锁的句柄，离开作用域自动释放
//! - [`SlotMeta`] / [`BufFlags`] - 由分片锁保护的槽位元数据
//! - [`CacheStats`] - 缓存统计信息
//!
//! # 与内核接口的对应关系
//!
//! | 内核                 | bcache_core                         |
//! |----------------------|-------------------------------------|
//! | `binit()`            | [`BufferCache::new()`]              |
//! | `bget()`             | [`BufferCache::acquire()`]          |
//! | `bread()`            | [`BufferCache::bread()`] / [`BufHandle::read()`] |
//! | `bwrite()`           | [`BufHandle::write()`]              |
//! | `brelse()`           | [`BufHandle::release()`] / drop     |
//! | `bpin()` / `bunpin()`| [`BufHandle::pin()`] / [`BufHandle::unpin()`] |
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use bcache_core::{BufferCache, CacheConfig, MemDisk};
//!
//! let cache = BufferCache::new(MemDisk::new(1024), CacheConfig::default())?;
//!
//! let mut buf = cache.bread(1, 42)?;
//! buf.data_mut()?[0] = 0x42;
//! buf.write()?;
//! buf.release()?;
//!
//! let stats = cache.stats();
//! log::info!("hits={} misses={} steals={}", stats.hits, stats.misses, stats.steals);
//! ```

mod bcache;
mod buffer;
mod handle;
mod shard;

pub use bcache::{BufferCache, CacheStats};
pub use buffer::{BufFlags, SlotId, SlotMeta};
pub use handle::BufHandle;
pub use shard::home_shard;
