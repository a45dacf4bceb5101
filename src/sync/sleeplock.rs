//! 睡眠锁
//!
//! 对应内核的 `sleeplock`：持有者可以在持锁期间执行阻塞的设备 I/O，
//! 竞争者被挂起直到锁释放。
//!
//! 启用 `std` 特性时使用 `Mutex<bool>` + `Condvar` 真正挂起等待线程；
//! 否则退化为带 `spin_loop` 提示的忙等（由内核调度器负责让出 CPU）。

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

#[cfg(feature = "std")]
mod gate {
    use std::sync::{Condvar, Mutex, PoisonError};

    pub(super) struct Gate {
        locked: Mutex<bool>,
        waiters: Condvar,
    }

    impl Gate {
        pub(super) const fn new() -> Self {
            Self {
                locked: Mutex::new(false),
                waiters: Condvar::new(),
            }
        }

        pub(super) fn acquire(&self) {
            let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
            while *locked {
                locked = self
                    .waiters
                    .wait(locked)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            *locked = true;
        }

        pub(super) fn release(&self) {
            let mut locked = self.locked.lock().unwrap_or_else(PoisonError::into_inner);
            *locked = false;
            drop(locked);
            self.waiters.notify_one();
        }

        pub(super) fn is_locked(&self) -> bool {
            *self.locked.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

#[cfg(not(feature = "std"))]
mod gate {
    use core::sync::atomic::{AtomicBool, Ordering};

    pub(super) struct Gate {
        locked: AtomicBool,
    }

    impl Gate {
        pub(super) const fn new() -> Self {
            Self {
                locked: AtomicBool::new(false),
            }
        }

        pub(super) fn acquire(&self) {
            while !self.try_acquire() {
                while self.locked.load(Ordering::Relaxed) {
                    core::hint::spin_loop();
                }
            }
        }

        pub(super) fn try_acquire(&self) -> bool {
            self.locked
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
        }

        pub(super) fn release(&self) {
            self.locked.store(false, Ordering::Release);
        }

        pub(super) fn is_locked(&self) -> bool {
            self.locked.load(Ordering::Relaxed)
        }
    }
}

/// 睡眠锁
///
/// 与 `spin::Mutex` 接口相似，但等待者不会空转。
pub struct SleepLock<T: ?Sized> {
    gate: gate::Gate,
    name: &'static str,
    data: UnsafeCell<T>,
}

// SAFETY: `data` 只能通过 `SleepLockGuard` 访问，而 guard 的存在意味着 gate 已被独占获取。
unsafe impl<T: ?Sized + Send> Send for SleepLock<T> {}
// SAFETY: 同上，跨线程共享时对 `data` 的访问由 gate 串行化。
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    /// 创建睡眠锁
    pub const fn new(data: T, name: &'static str) -> Self {
        Self {
            gate: gate::Gate::new(),
            name,
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// 获取锁，必要时挂起当前线程
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        self.gate.acquire();
        SleepLockGuard { lock: self }
    }

    /// 锁当前是否被某个线程持有
    pub fn is_locked(&self) -> bool {
        self.gate.is_locked()
    }
}

impl<T: ?Sized> fmt::Debug for SleepLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SleepLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// 睡眠锁守卫，drop 时释放锁并唤醒一个等待者
pub struct SleepLockGuard<'a, T: ?Sized> {
    lock: &'a SleepLock<T>,
}

impl<T: ?Sized> Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: guard 存在期间 gate 被独占持有，没有其他引用。
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上，且 `&mut self` 保证 guard 内部唯一。
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.gate.release();
    }
}
