//! 块缓存常量定义
//!
//! 默认几何参数，与内核文件系统层的约定一致。

//=============================================================================
// 块与设备
//=============================================================================

/// 块大小（字节）
pub const BSIZE: usize = 1024;

/// 根设备号
pub const ROOTDEV: u32 = 1;

//=============================================================================
// 缓存容量
//=============================================================================

/// 单个文件系统操作最多写入的块数
pub const MAXOPBLOCKS: usize = 10;

/// 缓冲槽总数
pub const NBUF: usize = MAXOPBLOCKS * 3;

/// 分片（哈希桶）数量，取质数使 `dev + blockno` 分布更均匀
pub const NBUCKET: usize = 13;

/// 跨分片窃取时，扫描超过该比例的分片会打印警告（百分比）
pub const STEAL_WARN_PERCENT: usize = 50;
