//! 缓冲槽元数据
//!
//! 对应内核 `struct buf` 中由分片锁保护的那部分字段。
//!
//! 槽位内容（块数据 + 睡眠锁）存放在缓存的槽位数组中，按 [`SlotId`] 索引，
//! 永不移动；元数据则存放在所属分片的 LRU 链表里，窃取时随槽位一起迁移。
//! 这样元数据只可能在持有其*当前*分片锁时被访问。

use crate::block::BlockId;
use bitflags::bitflags;

/// 缓冲槽编号（槽位数组下标）
pub type SlotId = usize;

bitflags! {
    /// 缓冲槽状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufFlags: u8 {
        /// 内容与设备上的数据一致
        const VALID = 0x01;
        /// 正在与设备传输数据
        const DISK  = 0x02;
    }
}

/// 缓冲槽元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMeta {
    /// 槽位编号
    pub slot: SlotId,
    /// 最近一次持有的块；从未使用过的槽位为 `None`
    pub id: Option<BlockId>,
    /// 状态标志
    pub flags: BufFlags,
    /// 引用计数（句柄 + pin），为 0 时可被驱逐
    pub refcnt: u32,
    /// 其中由 pin 贡献的部分
    pub pins: u32,
}

impl SlotMeta {
    /// 创建空闲槽位
    pub fn new(slot: SlotId) -> Self {
        Self {
            slot,
            id: None,
            flags: BufFlags::empty(),
            refcnt: 0,
            pins: 0,
        }
    }

    /// 是否持有该块
    pub fn holds(&self, id: BlockId) -> bool {
        self.id == Some(id)
    }

    /// 是否可被驱逐
    pub fn is_idle(&self) -> bool {
        self.refcnt == 0
    }

    /// 数据是否有效
    pub fn is_valid(&self) -> bool {
        self.flags.contains(BufFlags::VALID)
    }

    /// 将空闲槽位改派给新块：清除有效位，引用计数置 1
    pub fn claim(&mut self, id: BlockId) {
        debug_assert!(self.is_idle());
        self.id = Some(id);
        self.flags = BufFlags::empty();
        self.refcnt = 1;
        self.pins = 0;
    }
}
