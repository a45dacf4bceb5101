//! 缓存配置
//!
//! 缓存容量在构造时静态划分，之后不再调整。

use crate::consts::{BSIZE, NBUCKET, NBUF};
use crate::error::{Error, ErrorKind, Result};

/// 缓冲槽耗尽时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// 直接 panic（内核语义：工作集必须小于缓存容量）
    #[default]
    Panic,
    /// 返回 [`ErrorKind::NoBuffers`]，由调用者决定策略
    Error,
}

/// 块缓存配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// 缓冲槽总数
    pub nbuf: usize,
    /// 分片数量
    pub nbucket: usize,
    /// 块大小（字节），必须与设备一致
    pub block_size: usize,
    /// 耗尽策略
    pub on_exhaustion: ExhaustionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nbucket: NBUCKET,
            block_size: BSIZE,
            on_exhaustion: ExhaustionPolicy::Panic,
        }
    }
}

impl CacheConfig {
    /// 按槽位数和分片数创建配置，其余取默认值
    pub fn new(nbuf: usize, nbucket: usize) -> Self {
        Self {
            nbuf,
            nbucket,
            ..Self::default()
        }
    }

    /// 设置块大小
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// 设置耗尽策略
    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhaustion = policy;
        self
    }

    /// 校验配置
    ///
    /// 槽位数可以小于分片数：初始为空的分片会在未命中时从其他分片窃取。
    pub fn validate(&self) -> Result<()> {
        if self.nbuf == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "nbuf must be positive"));
        }
        if self.nbucket == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "nbucket must be positive"));
        }
        if self.block_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "block_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.nbuf, NBUF);
        assert_eq!(config.nbucket, NBUCKET);
        assert_eq!(config.block_size, BSIZE);
        assert_eq!(config.on_exhaustion, ExhaustionPolicy::Panic);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new(4, 2)
            .with_block_size(512)
            .with_exhaustion_policy(ExhaustionPolicy::Error);
        assert_eq!(config.nbuf, 4);
        assert_eq!(config.nbucket, 2);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.on_exhaustion, ExhaustionPolicy::Error);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert_eq!(
            CacheConfig::new(0, 2).validate().unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            CacheConfig::new(2, 0).validate().unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert!(CacheConfig::new(2, 2).with_block_size(0).validate().is_err());
        // 槽位少于分片是允许的
        assert!(CacheConfig::new(1, 13).validate().is_ok());
    }
}
