//! 分片块缓存
//!
//! 固定数量的缓冲槽按 `(dev + blockno) % nbucket` 划分到各分片，
//! 每个分片有自己的锁和 LRU 链表。
//!
//! # 获取流程
//!
//! 1. 锁住归属分片 `h`，在其中查找命中，命中则引用计数加一。
//! 2. 未命中时从 `h` 的尾部找最久未用的空闲槽位，原地改派。
//! 3. `h` 没有空闲槽位时按 `h+1, h+2, ...` 循环扫描其他分片（不回到 `h`），
//!    把找到的空闲槽位摘下、改派并挂到 `h` 的头部。
//! 4. 所有分片都没有空闲槽位即为耗尽。
//!
//! 放开分片锁之后才去获取槽位的睡眠锁。
//!
//! # 锁顺序
//!
//! 窃取期间同时持有 `h` 和候选分片 `i` 两把锁。编号大于 `h` 的分片阻塞获取；
//! 回绕后编号小于 `h` 的分片只 `try_lock`，失败则记下竞争并跳过。
//! 所以阻塞等待只会发生在"低编号 -> 高编号"方向上，不会成环。
//! 若一轮扫描一无所获但曾跳过被占用的分片，则放开 `h` 从头重试，
//! 只有无竞争的完整扫描才会判定为耗尽。

use super::buffer::{BufFlags, SlotId, SlotMeta};
use super::handle::BufHandle;
use super::shard::{home_shard, LruList, Shard};
use crate::block::{BlockDevice, BlockId};
use crate::config::{CacheConfig, ExhaustionPolicy};
use crate::consts::STEAL_WARN_PERCENT;
use crate::error::{Error, ErrorKind, Result};
use crate::sync::{SleepLock, SleepLockGuard};
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 命中次数
    pub hits: u64,
    /// 未命中次数（= 本地驱逐 + 窃取）
    pub misses: u64,
    /// 在归属分片内原地改派的次数
    pub local_evictions: u64,
    /// 从其他分片窃取的次数
    pub steals: u64,
    /// 窃取扫描因分片被占用而重试的次数
    pub steal_retries: u64,
    /// 设备读次数
    pub device_reads: u64,
    /// 设备写次数
    pub device_writes: u64,
}

impl CacheStats {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct StatCounters {
    hits: AtomicU64,
    local_evictions: AtomicU64,
    steals: AtomicU64,
    steal_retries: AtomicU64,
    device_reads: AtomicU64,
    device_writes: AtomicU64,
}

impl StatCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        let local_evictions = self.local_evictions.load(Ordering::Relaxed);
        let steals = self.steals.load(Ordering::Relaxed);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: local_evictions + steals,
            local_evictions,
            steals,
            steal_retries: self.steal_retries.load(Ordering::Relaxed),
            device_reads: self.device_reads.load(Ordering::Relaxed),
            device_writes: self.device_writes.load(Ordering::Relaxed),
        }
    }
}

/// 分片块缓存
///
/// 构造即初始化：所有槽位一次性分配并轮转分配给各分片，之后只改派身份，
/// 不再分配或释放槽位。多个实例互不影响。
pub struct BufferCache<D: BlockDevice> {
    device: D,
    config: CacheConfig,
    shards: Box<[Shard]>,
    contents: Box<[SleepLock<Box<[u8]>>]>,
    stats: StatCounters,
}

impl<D: BlockDevice> BufferCache<D> {
    /// 创建缓存
    ///
    /// 槽位 `i` 初始属于分片 `i % nbucket`。
    ///
    /// # 错误
    ///
    /// 配置非法或块大小与设备不一致时返回 `InvalidInput`。
    pub fn new(device: D, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        if device.block_size() != config.block_size {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "device block size does not match cache block size",
            ));
        }

        let shards = (0..config.nbucket)
            .map(|k| Shard::with_slots((k..config.nbuf).step_by(config.nbucket)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let contents = (0..config.nbuf)
            .map(|_| SleepLock::new(vec![0u8; config.block_size].into_boxed_slice(), "buffer"))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        log::info!(
            "[BCACHE] init: {} buffers x {} bytes over {} shards",
            config.nbuf,
            config.block_size,
            config.nbucket
        );

        Ok(Self {
            device,
            config,
            shards,
            contents,
            stats: StatCounters::default(),
        })
    }

    /// 使用默认容量创建缓存，块大小取自设备
    pub fn with_defaults(device: D) -> Result<Self> {
        let config = CacheConfig::default().with_block_size(device.block_size());
        Self::new(device, config)
    }

    /// 获取块的缓冲槽
    ///
    /// 返回的句柄持有槽位的独占锁，内容不一定有效，需要时调用
    /// [`BufHandle::read`]。可能阻塞等待其他线程释放同一块。
    ///
    /// # 错误
    ///
    /// 所有槽位都被引用时按 [`ExhaustionPolicy`] panic 或返回 `NoBuffers`。
    pub fn acquire(&self, dev: u32, blockno: u32) -> Result<BufHandle<'_, D>> {
        let id = BlockId::new(dev, blockno);
        let home = self.home_shard(id);
        let slot = loop {
            if let Some(slot) = self.bget(id, home)? {
                break slot;
            }
            // 只有跳过了被占用的分片才会走到这里；持有者很快会放开分片锁，
            // 而一次无竞争的扫描必然找到槽位或判定耗尽，所以循环会结束
            StatCounters::bump(&self.stats.steal_retries);
            core::hint::spin_loop();
        };
        let guard = self.contents[slot].lock();
        Ok(BufHandle::new(self, slot, home, id, guard))
    }

    /// 获取块并保证内容有效
    pub fn bread(&self, dev: u32, blockno: u32) -> Result<BufHandle<'_, D>> {
        let mut handle = self.acquire(dev, blockno)?;
        handle.read()?;
        Ok(handle)
    }

    /// 撤销一次 pin，无需持有句柄
    ///
    /// 该块必须仍在缓存中且有未撤销的 pin，否则返回 `RefCountUnderflow`。
    pub fn unpin_block(&self, dev: u32, blockno: u32) -> Result<()> {
        let id = BlockId::new(dev, blockno);
        let mut list = self.shards[self.home_shard(id)].lock();
        match list.find_mut(id) {
            Some(meta) => Self::unpin_meta(meta),
            None => Err(Error::new(ErrorKind::RefCountUnderflow, "unpin of uncached block")),
        }
    }

    /// 在归属分片中查找命中、原地改派或窃取
    ///
    /// 返回 `Ok(None)` 表示窃取时遇到竞争，需要重试。
    fn bget(&self, id: BlockId, home: usize) -> Result<Option<SlotId>> {
        let mut home_list = self.shards[home].lock();

        if let Some(meta) = home_list.find_mut(id) {
            meta.refcnt += 1;
            StatCounters::bump(&self.stats.hits);
            log::trace!("[BCACHE] {} hit slot {} (refcnt={})", id, meta.slot, meta.refcnt);
            return Ok(Some(meta.slot));
        }

        if let Some(meta) = home_list.lru_idle_mut() {
            log::debug!("[BCACHE] {} miss, recycle slot {} in shard {}", id, meta.slot, home);
            meta.claim(id);
            StatCounters::bump(&self.stats.local_evictions);
            return Ok(Some(meta.slot));
        }

        let nbucket = self.shards.len();
        let mut contended = false;
        for step in 1..nbucket {
            let cand = (home + step) % nbucket;
            let mut cand_list = if cand > home {
                self.shards[cand].lock()
            } else {
                match self.shards[cand].try_lock() {
                    Some(list) => list,
                    None => {
                        contended = true;
                        continue;
                    }
                }
            };

            if let Some(mut meta) = cand_list.take_lru_idle() {
                drop(cand_list);
                meta.claim(id);
                let slot = meta.slot;
                home_list.push_front(meta);
                drop(home_list);

                StatCounters::bump(&self.stats.steals);
                if step * 100 > nbucket * STEAL_WARN_PERCENT {
                    log::warn!(
                        "[BCACHE] {} stole slot {} after scanning {}/{} shards",
                        id,
                        slot,
                        step,
                        nbucket
                    );
                } else {
                    log::debug!("[BCACHE] {} stole slot {} from shard {}", id, slot, cand);
                }
                return Ok(Some(slot));
            }
        }
        drop(home_list);

        if contended {
            log::trace!("[BCACHE] {} steal scan contended, retrying", id);
            return Ok(None);
        }
        self.exhausted(id).map(|_| None)
    }

    fn exhausted(&self, id: BlockId) -> Result<()> {
        log::error!(
            "[BCACHE] no idle buffer for {}: all {} buffers referenced",
            id,
            self.config.nbuf
        );
        match self.config.on_exhaustion {
            ExhaustionPolicy::Panic => panic!("bget: no buffers"),
            ExhaustionPolicy::Error => Err(Error::new(
                ErrorKind::NoBuffers,
                "no idle buffer in any shard",
            )),
        }
    }

    /// 必要时从设备读入内容并置有效位
    ///
    /// 调用者持有槽位独占锁，`content` 即锁内数据。
    pub(crate) fn load(&self, shard: usize, slot: SlotId, id: BlockId, content: &mut [u8]) -> Result<()> {
        {
            let mut list = self.shards[shard].lock();
            let meta = Self::locate(&mut list, slot)?;
            if meta.is_valid() {
                return Ok(());
            }
            meta.flags.insert(BufFlags::DISK);
        }

        let result = self.device.read_block(id, content);

        let mut list = self.shards[shard].lock();
        let meta = Self::locate(&mut list, slot)?;
        meta.flags.remove(BufFlags::DISK);
        match result {
            Ok(()) => {
                meta.flags.insert(BufFlags::VALID);
                StatCounters::bump(&self.stats.device_reads);
                log::debug!("[BCACHE] read {} into slot {}", id, slot);
                Ok(())
            }
            Err(err) => {
                log::error!("[BCACHE] device read of {} failed: {}", id, err);
                Err(err)
            }
        }
    }

    /// 写穿到设备
    pub(crate) fn store(&self, shard: usize, slot: SlotId, id: BlockId, content: &[u8]) -> Result<()> {
        Self::locate(&mut self.shards[shard].lock(), slot)?
            .flags
            .insert(BufFlags::DISK);

        let result = self.device.write_block(id, content);

        let mut list = self.shards[shard].lock();
        let meta = Self::locate(&mut list, slot)?;
        meta.flags.remove(BufFlags::DISK);
        match result {
            Ok(()) => {
                meta.flags.insert(BufFlags::VALID);
                StatCounters::bump(&self.stats.device_writes);
                log::debug!("[BCACHE] wrote {} from slot {}", id, slot);
                Ok(())
            }
            Err(err) => {
                log::error!("[BCACHE] device write of {} failed: {}", id, err);
                Err(err)
            }
        }
    }

    /// 归还一个引用；归零时移到链表头部
    ///
    /// 调用者必须已经放开槽位独占锁。
    pub(crate) fn put(&self, shard: usize, slot: SlotId) -> Result<()> {
        let mut list = self.shards[shard].lock();
        let meta = Self::locate(&mut list, slot)?;
        if meta.refcnt == 0 {
            return Err(Error::new(ErrorKind::InvalidState, "release of unreferenced buffer"));
        }
        meta.refcnt -= 1;
        if meta.refcnt == 0 {
            list.move_to_front(slot);
        }
        Ok(())
    }

    pub(crate) fn pin(&self, shard: usize, slot: SlotId) -> Result<()> {
        let mut list = self.shards[shard].lock();
        let meta = Self::locate(&mut list, slot)?;
        meta.refcnt += 1;
        meta.pins += 1;
        Ok(())
    }

    pub(crate) fn unpin(&self, shard: usize, slot: SlotId) -> Result<()> {
        let mut list = self.shards[shard].lock();
        Self::unpin_meta(Self::locate(&mut list, slot)?)
    }

    fn unpin_meta(meta: &mut SlotMeta) -> Result<()> {
        if meta.pins == 0 {
            log::error!("[BCACHE] unpin of slot {} without matching pin", meta.slot);
            return Err(Error::new(ErrorKind::RefCountUnderflow, "unpin without matching pin"));
        }
        meta.pins -= 1;
        meta.refcnt -= 1;
        Ok(())
    }

    pub(crate) fn is_slot_valid(&self, shard: usize, slot: SlotId) -> bool {
        Self::locate(&mut self.shards[shard].lock(), slot).is_ok_and(|meta| meta.is_valid())
    }

    pub(crate) fn lock_content(&self, slot: SlotId) -> SleepLockGuard<'_, Box<[u8]>> {
        self.contents[slot].lock()
    }

    fn locate(list: &mut LruList, slot: SlotId) -> Result<&mut SlotMeta> {
        list.slot_mut(slot)
            .ok_or(Error::new(ErrorKind::InvalidState, "buffer missing from its home shard"))
    }

    /// 块的归属分片
    pub fn home_shard(&self, id: BlockId) -> usize {
        home_shard(id, self.shards.len())
    }

    /// 查找块当前缓存在哪个槽位（不增加引用）
    pub fn lookup(&self, dev: u32, blockno: u32) -> Option<SlotId> {
        let id = BlockId::new(dev, blockno);
        let mut list = self.shards[self.home_shard(id)].lock();
        list.find_mut(id).map(|meta| meta.slot)
    }

    /// 分片中的槽位，按最近释放到最久未用排列
    pub fn shard_members(&self, shard: usize) -> Vec<SlotId> {
        self.shards.get(shard).map(Shard::members).unwrap_or_default()
    }

    /// 槽位当前所在分片
    pub fn shard_of_slot(&self, slot: SlotId) -> Option<usize> {
        self.shards
            .iter()
            .position(|shard| shard.lock().iter().any(|meta| meta.slot == slot))
    }

    /// 槽位当前引用计数
    pub fn refcnt(&self, slot: SlotId) -> Option<u32> {
        self.shards.iter().find_map(|shard| {
            shard
                .lock()
                .iter()
                .find(|meta| meta.slot == slot)
                .map(|meta| meta.refcnt)
        })
    }

    /// 校验全局不变量
    ///
    /// - 每个槽位恰好出现在一个分片中，总数等于 `nbuf`
    /// - 已分配身份的槽位位于其归属分片，且身份两两不同
    /// - pin 数不超过引用计数，传输中的槽位必有引用
    ///
    /// 按编号升序锁住所有分片，可与正常操作并发调用。
    pub fn check_invariants(&self) -> Result<()> {
        let lists: Vec<_> = self.shards.iter().map(Shard::lock).collect();
        let mut seen = vec![false; self.config.nbuf];
        let mut ids = BTreeSet::new();

        for (index, list) in lists.iter().enumerate() {
            for meta in list.iter() {
                match seen.get_mut(meta.slot) {
                    Some(flag) if !*flag => *flag = true,
                    _ => return Err(Error::new(ErrorKind::InvalidState, "buffer listed twice")),
                }
                if let Some(id) = meta.id {
                    if self.home_shard(id) != index {
                        return Err(Error::new(ErrorKind::InvalidState, "buffer outside its home shard"));
                    }
                    if !ids.insert(id) {
                        return Err(Error::new(ErrorKind::InvalidState, "block cached twice"));
                    }
                }
                if meta.pins > meta.refcnt {
                    return Err(Error::new(ErrorKind::InvalidState, "pins exceed refcnt"));
                }
                if meta.flags.contains(BufFlags::DISK) && meta.refcnt == 0 {
                    return Err(Error::new(ErrorKind::InvalidState, "idle buffer in flight"));
                }
            }
        }

        let total: usize = lists.iter().map(|list| list.len()).sum();
        if total != self.config.nbuf {
            return Err(Error::new(ErrorKind::InvalidState, "buffer count changed"));
        }
        Ok(())
    }

    /// 获取统计信息
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// 获取配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 底层设备
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 缓冲槽总数
    pub fn nbuf(&self) -> usize {
        self.config.nbuf
    }

    /// 分片数量
    pub fn nbucket(&self) -> usize {
        self.shards.len()
    }

    /// 块大小
    pub fn block_size(&self) -> usize {
        self.config.block_size
    }
}

impl<D: BlockDevice> core::fmt::Debug for BufferCache<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferCache")
            .field("nbuf", &self.config.nbuf)
            .field("nbucket", &self.shards.len())
            .field("block_size", &self.config.block_size)
            .field("stats", &self.stats())
            .finish()
    }
}
