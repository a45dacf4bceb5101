//! 缓冲槽句柄 - RAII 风格的块访问
//!
//! 对应内核的 `struct buf *`：由 `bget`/`bread` 返回，
//! 持有期间独占槽位内容，`brelse` 或离开作用域时归还引用。

use super::bcache::BufferCache;
use super::buffer::SlotId;
use crate::block::{BlockDevice, BlockId};
use crate::error::{Error, ErrorKind, Result};
use crate::sync::SleepLockGuard;
use alloc::boxed::Box;
use byteorder::{ByteOrder, LittleEndian};

const LOCK_NOT_HELD: Error = Error::new(ErrorKind::LockNotHeld, "buffer lock not held");

/// 缓冲槽句柄
///
/// - 获取时引用计数已加一，并持有槽位的独占锁
/// - [`read`](Self::read) 按需从设备读入，[`write`](Self::write) 写穿到设备
/// - [`release`](Self::release) 或 drop 时先放开独占锁，再归还引用
/// - [`unlock`](Self::unlock) 只放开独占锁、保留引用，之后访问内容、
///   写回或 release 都会得到 `LockNotHeld`
///
/// # 示例
///
/// ```rust,ignore
/// let mut buf = cache.bread(ROOTDEV, 1)?;
/// let magic = buf.read_u32(0)?;
/// buf.write_u32(4, magic + 1)?;
/// buf.write()?;
/// buf.release()?;
/// ```
pub struct BufHandle<'a, D: BlockDevice> {
    cache: &'a BufferCache<D>,
    slot: SlotId,
    shard: usize,
    id: BlockId,
    guard: Option<SleepLockGuard<'a, Box<[u8]>>>,
    held: bool,
}

impl<'a, D: BlockDevice> BufHandle<'a, D> {
    pub(crate) fn new(
        cache: &'a BufferCache<D>,
        slot: SlotId,
        shard: usize,
        id: BlockId,
        guard: SleepLockGuard<'a, Box<[u8]>>,
    ) -> Self {
        Self {
            cache,
            slot,
            shard,
            id,
            guard: Some(guard),
            held: true,
        }
    }

    /// 块标识
    pub fn block_id(&self) -> BlockId {
        self.id
    }

    /// 槽位编号
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// 是否持有独占锁
    pub fn is_locked(&self) -> bool {
        self.guard.is_some()
    }

    /// 内容是否有效
    pub fn is_valid(&self) -> bool {
        self.cache.is_slot_valid(self.shard, self.slot)
    }

    /// 读取块内容
    ///
    /// 对应 `bread`：内容无效时同步读设备并置有效位。
    pub fn read(&mut self) -> Result<&[u8]> {
        let guard = self.guard.as_mut().ok_or(LOCK_NOT_HELD)?;
        self.cache.load(self.shard, self.slot, self.id, &mut guard[..])?;
        Ok(&guard[..])
    }

    /// 当前内容（不触发 I/O）
    pub fn data(&self) -> Result<&[u8]> {
        self.guard.as_deref().map(|data| &data[..]).ok_or(LOCK_NOT_HELD)
    }

    /// 可变内容（不触发 I/O）
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        self.guard.as_deref_mut().map(|data| &mut data[..]).ok_or(LOCK_NOT_HELD)
    }

    /// 写穿到设备
    ///
    /// 对应 `bwrite`，必须持有独占锁。
    pub fn write(&mut self) -> Result<()> {
        let guard = self.guard.as_ref().ok_or_else(|| {
            log::error!("[BCACHE] bwrite of {} without holding its lock", self.id);
            LOCK_NOT_HELD
        })?;
        self.cache.store(self.shard, self.slot, self.id, &guard[..])
    }

    /// 释放句柄
    ///
    /// 对应 `brelse`。未持有独占锁时返回 `LockNotHeld`，
    /// 但引用仍会在句柄销毁时归还，不会泄漏。
    pub fn release(mut self) -> Result<()> {
        if self.guard.is_none() {
            log::error!("[BCACHE] brelse of {} without holding its lock", self.id);
            return Err(LOCK_NOT_HELD);
        }
        self.put()
    }

    /// 放开独占锁但保留引用（槽位不会被驱逐）
    pub fn unlock(&mut self) {
        self.guard = None;
    }

    /// 重新获取独占锁，可能阻塞
    pub fn relock(&mut self) {
        if self.guard.is_none() {
            self.guard = Some(self.cache.lock_content(self.slot));
        }
    }

    /// 增加一次 pin，使块在句柄释放后仍常驻缓存
    pub fn pin(&self) -> Result<()> {
        self.cache.pin(self.shard, self.slot)
    }

    /// 撤销一次 pin
    pub fn unpin(&self) -> Result<()> {
        self.cache.unpin(self.shard, self.slot)
    }

    /// 按小端读取 `offset` 处的 u32
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let data = self.data()?;
        let field = offset
            .checked_add(4)
            .and_then(|end| data.get(offset..end))
            .ok_or(Error::new(ErrorKind::InvalidInput, "offset out of block"))?;
        Ok(LittleEndian::read_u32(field))
    }

    /// 按小端写入 `offset` 处的 u32
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        let data = self.data_mut()?;
        let field = offset
            .checked_add(4)
            .and_then(move |end| data.get_mut(offset..end))
            .ok_or(Error::new(ErrorKind::InvalidInput, "offset out of block"))?;
        LittleEndian::write_u32(field, value);
        Ok(())
    }

    fn put(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        self.guard = None;
        self.cache.put(self.shard, self.slot)
    }
}

impl<D: BlockDevice> Drop for BufHandle<'_, D> {
    fn drop(&mut self) {
        if let Err(err) = self.put() {
            log::error!("[BCACHE] release of {} failed: {}", self.id, err);
        }
    }
}

impl<D: BlockDevice> core::fmt::Debug for BufHandle<'_, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufHandle")
            .field("id", &self.id)
            .field("slot", &self.slot)
            .field("shard", &self.shard)
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemDisk;
    use crate::config::CacheConfig;
    use crate::consts::ROOTDEV;

    fn cache() -> BufferCache<MemDisk> {
        BufferCache::new(MemDisk::new(128), CacheConfig::new(4, 2).with_block_size(128)).unwrap()
    }

    #[test]
    fn test_handle_identity() {
        let cache = cache();
        let handle = cache.acquire(2, 9).unwrap();
        assert_eq!(handle.block_id(), BlockId::new(2, 9));
        assert!(handle.is_locked());
        assert!(!handle.is_valid());
        assert_eq!(cache.refcnt(handle.slot()), Some(1));
    }

    #[test]
    fn test_drop_releases_reference() {
        let cache = cache();
        let slot = {
            let handle = cache.acquire(ROOTDEV, 1).unwrap();
            handle.slot()
        };
        assert_eq!(cache.refcnt(slot), Some(0));
    }

    #[test]
    fn test_u32_fields() {
        let cache = cache();
        let mut handle = cache.bread(ROOTDEV, 1).unwrap();
        handle.write_u32(8, 0xDEAD_BEEF).unwrap();
        assert_eq!(handle.read_u32(8).unwrap(), 0xDEAD_BEEF);
        assert_eq!(&handle.data().unwrap()[8..12], &[0xEF, 0xBE, 0xAD, 0xDE]);

        assert_eq!(handle.read_u32(126).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(handle.write_u32(128, 1).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(handle.read_u32(usize::MAX - 1).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(handle.write_u32(usize::MAX, 1).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_write_marks_valid() {
        let cache = cache();
        let mut handle = cache.acquire(ROOTDEV, 4).unwrap();
        handle.data_mut().unwrap().fill(7);
        handle.write().unwrap();
        assert!(handle.is_valid());
        assert_eq!(cache.device().peek(BlockId::new(ROOTDEV, 4)).unwrap()[0], 7);
        assert_eq!(cache.stats().device_writes, 1);
    }

    #[test]
    fn test_pin_survives_release() {
        let cache = cache();
        let handle = cache.acquire(ROOTDEV, 1).unwrap();
        let slot = handle.slot();
        handle.pin().unwrap();
        handle.release().unwrap();
        assert_eq!(cache.refcnt(slot), Some(1));

        cache.unpin_block(ROOTDEV, 1).unwrap();
        assert_eq!(cache.refcnt(slot), Some(0));
    }
}
