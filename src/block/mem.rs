//! 内存盘
//!
//! 稀疏存储：未写过的块读出为全零。记录读写次数，并支持注入读错误，
//! 便于验证缓存的命中与 I/O 错误传播。

use super::{BlockDevice, BlockId};
use crate::error::{Error, ErrorKind, Result};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use spin::Mutex;

/// 内存块设备
pub struct MemDisk {
    block_size: usize,
    blocks: Mutex<BTreeMap<BlockId, Box<[u8]>>>,
    reads: AtomicU64,
    writes: AtomicU64,
    failing_reads: AtomicU32,
}

impl MemDisk {
    /// 创建指定块大小的内存盘
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Mutex::new(BTreeMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            failing_reads: AtomicU32::new(0),
        }
    }

    /// 成功完成的读次数
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// 成功完成的写次数
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// 让接下来的 `count` 次读失败
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::Relaxed);
    }

    /// 直接查看设备上的块内容（绕过缓存）
    pub fn peek(&self, id: BlockId) -> Option<Box<[u8]>> {
        self.blocks.lock().get(&id).cloned()
    }

    /// 直接写入设备上的块内容（绕过缓存），用于准备测试数据
    pub fn poke(&self, id: BlockId, data: &[u8]) -> Result<()> {
        self.check_len(data.len())?;
        self.blocks.lock().insert(id, Box::from(data));
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer length != block size"));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_reads
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl BlockDevice for MemDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, id: BlockId, buf: &mut [u8]) -> Result<()> {
        self.check_len(buf.len())?;
        if self.take_injected_failure() {
            log::warn!("[MEMDISK] injected read failure at {}", id);
            return Err(Error::new(ErrorKind::Io, "injected read failure"));
        }
        match self.blocks.lock().get(&id) {
            Some(data) => buf.copy_from_slice(data),
            None => buf.fill(0),
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, id: BlockId, buf: &[u8]) -> Result<()> {
        self.check_len(buf.len())?;
        self.blocks.lock().insert(id, Box::from(buf));
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl core::fmt::Debug for MemDisk {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemDisk")
            .field("block_size", &self.block_size)
            .field("stored_blocks", &self.blocks.lock().len())
            .field("reads", &self.reads())
            .field("writes", &self.writes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_unwritten_block_reads_zero() {
        let disk = MemDisk::new(512);
        let mut buf = vec![0xAAu8; 512];
        disk.read_block(BlockId::new(1, 7), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn test_write_then_read() {
        let disk = MemDisk::new(512);
        let id = BlockId::new(1, 3);
        let data = vec![0x5Au8; 512];
        disk.write_block(id, &data).unwrap();

        let mut buf = vec![0u8; 512];
        disk.read_block(id, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(disk.writes(), 1);
        assert_eq!(disk.peek(id).as_deref(), Some(&data[..]));
    }

    #[test]
    fn test_length_mismatch() {
        let disk = MemDisk::new(512);
        let mut buf = vec![0u8; 100];
        let err = disk.read_block(BlockId::new(1, 0), &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(disk.poke(BlockId::new(1, 0), &buf).is_err());
    }

    #[test]
    fn test_injected_failure() {
        let disk = MemDisk::new(512);
        let mut buf = vec![0u8; 512];
        disk.fail_next_reads(1);
        let err = disk.read_block(BlockId::new(1, 0), &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(disk.reads(), 0);
        // 只失败一次
        disk.read_block(BlockId::new(1, 0), &mut buf).unwrap();
        assert_eq!(disk.reads(), 1);
    }
}
