use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use crate::error::LockError;

// 哲学者の番号 (0..N)
pub type ActorId = usize;

// sleep 中にキャンセルを確認する間隔
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// 待機中のスレッドに打ち切りを伝えるフラグ
/// clone したものはすべて同じフラグを共有する
#[derive(Clone, Debug, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Self {
        Cancel::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    // dur だけ眠る。途中でキャンセルされたら false
    pub fn sleep(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// フォーク1本分の排他ロック
///
/// 保持者を覚えるかどうかは実装次第。覚えない実装 (BinaryLock) では
/// release が常に成功してしまう
pub trait RawLock: Default + Send + Sync {
    // 獲得できるまで待つ。cancel が立ったら LockError::Cancelled で戻る
    fn acquire_cancellable(&self, who: ActorId, cancel: &Cancel) -> Result<(), LockError>;

    fn release(&self, who: ActorId) -> Result<(), LockError>;

    fn is_held(&self) -> bool;
}

/// 全員がそろうまで待つ集合地点
/// std::sync::Barrier と違ってキャンセルで抜けられる
#[derive(Debug)]
pub struct Rendezvous {
    parties: usize,
    arrived: AtomicUsize,
}

impl Rendezvous {
    pub fn new(parties: usize) -> Self {
        Rendezvous {
            parties,
            arrived: AtomicUsize::new(0),
        }
    }

    pub fn wait(&self, cancel: &Cancel) -> Result<(), LockError> {
        self.arrived.fetch_add(1, Ordering::AcqRel);
        while self.arrived.load(Ordering::Acquire) < self.parties {
            if cancel.is_cancelled() {
                return Err(LockError::Cancelled);
            }
            thread::yield_now();
        }
        Ok(())
    }
}
