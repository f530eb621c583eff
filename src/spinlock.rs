use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use crate::error::LockError;
use crate::lock::{ActorId, Cancel, RawLock};

/// AtomicBool 1つだけでできた二値ロック
///
/// 誰が保持しているかは覚えていないので、獲得していないスレッドからの
/// release もそのまま通ってしまう。再入もできない (自分自身とデッドロックする)
#[derive(Debug, Default)]
pub struct BinaryLock {
    held: AtomicBool, // true なら保持中
}

impl BinaryLock {
    pub const fn new() -> Self {
        BinaryLock {
            held: AtomicBool::new(false),
        }
    }

    pub fn try_lock(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    // 獲得に失敗するたびにスケジューラへ譲る
    pub fn lock(&self) {
        loop {
            while self.held.load(Ordering::Relaxed) {
                thread::yield_now();
            }

            if self
                .held
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
            thread::yield_now();
        }
    }

    // 無条件に空きにする
    pub fn unlock(&self) {
        self.held.store(false, Ordering::Release);
    }
}

impl RawLock for BinaryLock {
    fn acquire_cancellable(&self, _who: ActorId, cancel: &Cancel) -> Result<(), LockError> {
        while !self.try_lock() {
            if cancel.is_cancelled() {
                return Err(LockError::Cancelled);
            }
            thread::yield_now();
        }
        Ok(())
    }

    fn release(&self, _who: ActorId) -> Result<(), LockError> {
        // 呼び出し元が本当に保持しているかは確かめられない
        self.unlock();
        Ok(())
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

/// BinaryLock で保護対象データを包んだロック
pub struct SpinLock<T> {
    lock: BinaryLock,
    data: UnsafeCell<T>,
}

// ロックの解放および、ロック中に保護対象データを操作するための型
pub struct SpinLockGuard<'a, T> {
    spin_lock: &'a SpinLock<T>,
}

impl<T> SpinLock<T> {
    pub fn new(v: T) -> Self {
        SpinLock {
            lock: BinaryLock::new(),
            data: UnsafeCell::new(v),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<T> {
        self.lock.lock();
        SpinLockGuard { spin_lock: self }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

// data へのアクセスは必ず guard 経由なので、スレッド間で共有してよい
unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

impl<'a, T> Drop for SpinLockGuard<'a, T> {
    fn drop(&mut self) {
        self.spin_lock.lock.unlock();
    }
}

impl<'a, T> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.spin_lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.spin_lock.data.get() }
    }
}
