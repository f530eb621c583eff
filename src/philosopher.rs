use std::{ops::Range, sync::Arc, time::Duration};

use rand::Rng;
use tracing::debug;

use crate::board::{Phase, PhaseSink};
use crate::error::SimulationError;
use crate::lock::{ActorId, Cancel, RawLock, Rendezvous};
use crate::ring::{AcquireOrder, ResourceRing};

// 考える時間・食べる時間の決め方
#[derive(Debug, Clone)]
pub struct Pace {
    pub think: Range<u64>,
    pub eat: Range<u64>,
    pub tick: Duration,
}

impl Pace {
    fn draw(&self, ticks: &Range<u64>) -> Duration {
        let n = rand::thread_rng().gen_range(ticks.clone());
        self.tick.saturating_mul(u32::try_from(n).unwrap_or(u32::MAX))
    }
}

/// 全員に共通の決まりごと
#[derive(Debug, Clone)]
pub struct Table {
    pub repetitions: usize,
    pub order: AcquireOrder,
    pub pace: Pace,
    pub cancel: Cancel,
    // 初回だけ、全員が1本目を持った状態で待ち合わせる
    pub rendezvous: Option<Arc<Rendezvous>>,
}

/// 1人分の哲学者
///
/// Idle -> Acquiring -> Busy -> Releasing を repetitions 回繰り返し、
/// 最後に Terminated を報告して終わる。状態が変わるたびに sink へ知らせる
pub struct Philosopher<L, S> {
    id: ActorId,
    ring: Arc<ResourceRing<L>>,
    sink: S,
    table: Arc<Table>,
}

impl<L: RawLock, S: PhaseSink> Philosopher<L, S> {
    pub fn new(id: ActorId, ring: Arc<ResourceRing<L>>, sink: S, table: Arc<Table>) -> Self {
        Philosopher {
            id,
            ring,
            sink,
            table,
        }
    }

    /// 食べた回数を返す
    pub fn dine(self) -> Result<usize, SimulationError> {
        let mut meals = 0;
        for round in 0..self.table.repetitions {
            self.think()?;
            self.pick_up(round)?;
            // 食事中に失敗しても、フォークは必ず置いてから戻る
            let eaten = self.eat();
            let released = self.put_down();
            eaten?;
            released?;
            meals += 1;
            debug!(actor = self.id, round, "finished round");
        }
        self.sink.set_phase(self.id, Phase::Terminated)?;
        Ok(meals)
    }

    fn think(&self) -> Result<(), SimulationError> {
        self.sink.set_phase(self.id, Phase::Idle)?;
        self.pause(&self.table.pace.think)
    }

    fn pick_up(&self, round: usize) -> Result<(), SimulationError> {
        self.sink.set_phase(self.id, Phase::Acquiring)?;
        let Table { order, cancel, .. } = &*self.table;
        match (&self.table.rendezvous, round) {
            (Some(rv), 0) => self
                .ring
                .acquire_both_with(self.id, *order, cancel, || rv.wait(cancel))?,
            _ => self.ring.acquire_both(self.id, *order, cancel)?,
        }
        Ok(())
    }

    fn eat(&self) -> Result<(), SimulationError> {
        self.sink.set_phase(self.id, Phase::Busy)?;
        self.pause(&self.table.pace.eat)
    }

    fn put_down(&self) -> Result<(), SimulationError> {
        let reported = self.sink.set_phase(self.id, Phase::Releasing);
        self.ring.release_both(self.id)?;
        reported?;
        Ok(())
    }

    fn pause(&self, ticks: &Range<u64>) -> Result<(), SimulationError> {
        let Table { pace, cancel, .. } = &*self.table;
        if cancel.sleep(pace.draw(ticks)) {
            Ok(())
        } else {
            Err(SimulationError::Cancelled)
        }
    }
}
