use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::error::LockError;
use crate::lock::{ActorId, Cancel, RawLock};

// キャンセルを確認する間隔
const POLL: Duration = Duration::from_millis(5);

/// 保持者を記録するブロッキングロック
///
/// 空くまで Condvar で眠るので、BinaryLock のように CPU を回し続けない。
/// 保持者以外からの release と再入は LockError になる
#[derive(Debug, Default)]
pub struct OwnedLock {
    holder: Mutex<Option<ActorId>>,
    cond: Condvar,
}

impl OwnedLock {
    pub fn new() -> Self {
        OwnedLock::default()
    }

    pub fn holder(&self) -> Option<ActorId> {
        *self.state()
    }

    // 中身は Option だけなので poison されても壊れていない
    fn state(&self) -> MutexGuard<'_, Option<ActorId>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RawLock for OwnedLock {
    fn acquire_cancellable(&self, who: ActorId, cancel: &Cancel) -> Result<(), LockError> {
        let mut holder = self.state();
        if *holder == Some(who) {
            return Err(LockError::Reentrant(who));
        }
        while holder.is_some() {
            if cancel.is_cancelled() {
                return Err(LockError::Cancelled);
            }
            holder = self
                .cond
                .wait_timeout(holder, POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *holder = Some(who);
        Ok(())
    }

    fn release(&self, who: ActorId) -> Result<(), LockError> {
        let mut holder = self.state();
        match *holder {
            Some(h) if h == who => {
                *holder = None;
                self.cond.notify_one();
                Ok(())
            }
            Some(h) => Err(LockError::NotOwner {
                holder: h,
                caller: who,
            }),
            None => Err(LockError::NotHeld { caller: who }),
        }
    }

    fn is_held(&self) -> bool {
        self.state().is_some()
    }
}
