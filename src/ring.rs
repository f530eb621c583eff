use clap::ValueEnum;

use crate::error::{ForkError, LockError};
use crate::lock::{ActorId, Cancel, RawLock};
use crate::spinlock::SpinLock;

/// 2本のフォークを取る順番
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AcquireOrder {
    /// Always left (i) then right ((i + 1) % N); can deadlock
    LeftFirst,
    /// Lower-numbered fork first; no circular wait
    #[default]
    Hierarchy,
}

impl AcquireOrder {
    // (先に取るフォーク, 後に取るフォーク)
    pub fn pair(self, left: usize, right: usize) -> (usize, usize) {
        match self {
            AcquireOrder::LeftFirst => (left, right),
            AcquireOrder::Hierarchy => (left.min(right), left.max(right)),
        }
    }
}

// 哲学者ごとの待ち状況
#[derive(Debug, Clone, Default)]
struct Slot {
    awaiting: Option<usize>,
    holding: Vec<usize>,
}

/// 円卓に並んだ N 本のフォーク
/// 哲学者 i の左は i 番、右は (i + 1) % N 番
pub struct ResourceRing<L> {
    forks: Vec<L>,
    slots: SpinLock<Vec<Slot>>,
}

impl<L: RawLock> ResourceRing<L> {
    pub fn new(n: usize) -> Self {
        ResourceRing {
            forks: (0..n).map(|_| L::default()).collect(),
            slots: SpinLock::new(vec![Slot::default(); n]),
        }
    }

    pub fn left(&self, id: ActorId) -> usize {
        id
    }

    pub fn right(&self, id: ActorId) -> usize {
        (id + 1) % self.forks.len()
    }

    pub fn fork(&self, index: usize) -> &L {
        &self.forks[index]
    }

    pub fn acquire_both(
        &self,
        id: ActorId,
        order: AcquireOrder,
        cancel: &Cancel,
    ) -> Result<(), ForkError> {
        self.acquire_both_with(id, order, cancel, || Ok(()))
    }

    /// 1本目と2本目の間で between を呼ぶ
    /// 2本目が取れなければ1本目を置いてから戻る
    pub fn acquire_both_with<F>(
        &self,
        id: ActorId,
        order: AcquireOrder,
        cancel: &Cancel,
        between: F,
    ) -> Result<(), ForkError>
    where
        F: FnOnce() -> Result<(), LockError>,
    {
        let (first, second) = order.pair(self.left(id), self.right(id));

        self.take(id, first, cancel)?;

        let rest = between()
            .map_err(|source| ForkError {
                fork: second,
                source,
            })
            .and_then(|_| self.take(id, second, cancel));

        if let Err(e) = rest {
            self.put(id, first)?;
            return Err(e);
        }
        Ok(())
    }

    // 置く順番は正しさに関係しない
    pub fn release_both(&self, id: ActorId) -> Result<(), ForkError> {
        let left = self.put(id, self.left(id));
        let right = self.put(id, self.right(id));
        left.and(right)
    }

    pub fn awaiting(&self, id: ActorId) -> Option<usize> {
        self.slots.lock()[id].awaiting
    }

    pub fn holding(&self, id: ActorId) -> Vec<usize> {
        self.slots.lock()[id].holding.clone()
    }

    fn take(&self, id: ActorId, fork: usize, cancel: &Cancel) -> Result<(), ForkError> {
        self.slots.lock()[id].awaiting = Some(fork);
        let r = self.forks[fork].acquire_cancellable(id, cancel);

        let mut slots = self.slots.lock();
        slots[id].awaiting = None;
        match r {
            Ok(()) => {
                slots[id].holding.push(fork);
                Ok(())
            }
            Err(source) => Err(ForkError { fork, source }),
        }
    }

    fn put(&self, id: ActorId, fork: usize) -> Result<(), ForkError> {
        self.forks[fork]
            .release(id)
            .map_err(|source| ForkError { fork, source })?;
        self.slots.lock()[id].holding.retain(|&f| f != fork);
        Ok(())
    }
}
