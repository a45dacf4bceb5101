//! 块设备核心类型

use crate::error::Result;
use alloc::sync::Arc;
use core::fmt;

/// 块标识：设备号 + 块号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    /// 设备号
    pub dev: u32,
    /// 块号
    pub blockno: u32,
}

impl BlockId {
    /// 创建块标识
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

/// 块设备接口
///
/// 缓存在持有对应缓冲槽的内容锁时调用驱动，驱动自身负责内部同步，
/// 因此两个方法都只借用 `&self`。读写都是同步的整块传输，
/// 失败即视为本次操作失败，缓存不会重试。
///
/// # 示例
///
/// ```rust,ignore
/// use bcache_core::{BlockDevice, BlockId, Result};
///
/// struct VirtioDisk { /* ... */ }
///
/// impl BlockDevice for VirtioDisk {
///     fn block_size(&self) -> usize {
///         1024
///     }
///
///     fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
///         // 提交请求并等待中断
///         Ok(())
///     }
///
///     fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait BlockDevice: Send + Sync {
    /// 块大小（字节）
    fn block_size(&self) -> usize;

    /// 读取整块到 `buf`（长度等于 `block_size()`）
    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()>;

    /// 将 `buf` 整块写入设备
    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for Arc<T> {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        (**self).read_block(id, buf)
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        (**self).write_block(id, buf)
    }
}
