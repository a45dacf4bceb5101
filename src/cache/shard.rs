//! 分片与分片表
//!
//! 每个分片是一把 `spin::Mutex` 保护的 LRU 链表，链表项是槽位元数据。
//! 链表头部是最近释放的槽位，尾部是最久未用的槽位。

use super::buffer::{SlotId, SlotMeta};
use crate::block::BlockId;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

/// 块的归属分片
///
/// 纯函数：`(dev + blockno) % nbucket`。查找只会在归属分片中进行，
/// 新缓存的块也总是放入归属分片。
pub fn home_shard(id: BlockId, nbucket: usize) -> usize {
    ((u64::from(id.dev) + u64::from(id.blockno)) % nbucket as u64) as usize
}

/// 分片的 LRU 链表
#[derive(Debug, Default)]
pub(crate) struct LruList {
    entries: VecDeque<SlotMeta>,
}

impl LruList {
    /// 命中查找
    pub(crate) fn find_mut(&mut self, id: BlockId) -> Option<&mut SlotMeta> {
        self.entries.iter_mut().find(|meta| meta.holds(id))
    }

    /// 从尾部（最久未用）向头部查找第一个空闲槽位
    pub(crate) fn lru_idle_mut(&mut self) -> Option<&mut SlotMeta> {
        self.entries.iter_mut().rev().find(|meta| meta.is_idle())
    }

    /// 摘下最久未用的空闲槽位（窃取用）
    pub(crate) fn take_lru_idle(&mut self) -> Option<SlotMeta> {
        let pos = self.entries.iter().rposition(SlotMeta::is_idle)?;
        self.entries.remove(pos)
    }

    /// 按槽位编号查找
    pub(crate) fn slot_mut(&mut self, slot: SlotId) -> Option<&mut SlotMeta> {
        self.entries.iter_mut().find(|meta| meta.slot == slot)
    }

    /// 把槽位移到头部（最近释放端）
    pub(crate) fn move_to_front(&mut self, slot: SlotId) {
        if let Some(pos) = self.entries.iter().position(|meta| meta.slot == slot) {
            if let Some(meta) = self.entries.remove(pos) {
                self.entries.push_front(meta);
            }
        }
    }

    /// 插入到头部
    pub(crate) fn push_front(&mut self, meta: SlotMeta) {
        self.entries.push_front(meta);
    }

    /// 从头到尾遍历
    pub(crate) fn iter(&self) -> impl Iterator<Item = &SlotMeta> {
        self.entries.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// 分片
#[derive(Debug, Default)]
pub(crate) struct Shard {
    list: Mutex<LruList>,
}

impl Shard {
    /// 用一组初始槽位创建分片
    pub(crate) fn with_slots(slots: impl IntoIterator<Item = SlotId>) -> Self {
        let mut list = LruList::default();
        for slot in slots {
            list.entries.push_back(SlotMeta::new(slot));
        }
        Self {
            list: Mutex::new(list),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, LruList> {
        self.list.lock()
    }

    pub(crate) fn try_lock(&self) -> Option<MutexGuard<'_, LruList>> {
        self.list.try_lock()
    }

    /// 头到尾的槽位编号快照
    pub(crate) fn members(&self) -> Vec<SlotId> {
        self.lock().iter().map(|meta| meta.slot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_home_shard() {
        assert_eq!(home_shard(BlockId::new(1, 12), 13), 0);
        assert_eq!(home_shard(BlockId::new(1, 13), 13), 1);
        assert_eq!(home_shard(BlockId::new(0, 0), 13), 0);
        // 不会溢出
        assert_eq!(home_shard(BlockId::new(u32::MAX, u32::MAX), 2), 0);
        for blockno in 0..100 {
            assert!(home_shard(BlockId::new(1, blockno), 7) < 7);
        }
    }

    #[test]
    fn test_lru_idle_prefers_tail() {
        let shard = Shard::with_slots([0, 1, 2]);
        let mut list = shard.lock();
        assert_eq!(list.lru_idle_mut().map(|m| m.slot), Some(2));

        list.slot_mut(2).unwrap().refcnt = 1;
        assert_eq!(list.lru_idle_mut().map(|m| m.slot), Some(1));
    }

    #[test]
    fn test_move_to_front() {
        let shard = Shard::with_slots([0, 1, 2]);
        shard.lock().move_to_front(2);
        assert_eq!(shard.members(), vec![2, 0, 1]);
    }

    #[test]
    fn test_take_lru_idle() {
        let shard = Shard::with_slots([0, 1, 2]);
        {
            let mut list = shard.lock();
            list.slot_mut(2).unwrap().refcnt = 1;
            let taken = list.take_lru_idle().unwrap();
            assert_eq!(taken.slot, 1);
            assert_eq!(list.len(), 2);
        }
        assert_eq!(shard.members(), vec![0, 2]);
    }

    #[test]
    fn test_find_mut() {
        let shard = Shard::with_slots([0, 1]);
        let mut list = shard.lock();
        let id = BlockId::new(1, 9);
        assert!(list.find_mut(id).is_none());
        list.slot_mut(1).unwrap().claim(id);
        assert_eq!(list.find_mut(id).map(|m| m.slot), Some(1));
    }

    #[test]
    fn test_try_lock_contended() {
        let shard = Shard::with_slots([0]);
        let guard = shard.lock();
        assert!(shard.try_lock().is_none());
        drop(guard);
        assert!(shard.try_lock().is_some());
    }
}
