use std::{
    fmt,
    io::Write,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::board::{Board, Phase, PhaseSink, SharedBoard};
use crate::config::{LockKind, ReporterKind, SimConfig};
use crate::error::{ReportError, SimulationError};
use crate::lock::{ActorId, Cancel, RawLock, Rendezvous};
use crate::owned::OwnedLock;
use crate::philosopher::{Pace, Philosopher, Table};
use crate::reporter;
use crate::ring::ResourceRing;
use crate::spinlock::{BinaryLock, SpinLock};

/// 期限までに終わらなかった哲学者
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckActor {
    pub id: ActorId,
    // 最後に報告した状態
    pub phase: Phase,
    pub awaiting: Option<usize>,
    pub holding: Vec<usize>,
}

impl fmt::Display for StuckActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "actor {} ({}) holding {:?}",
            self.id, self.phase, self.holding
        )?;
        match self.awaiting {
            Some(fork) => write!(f, ", waiting for fork {fork}"),
            None => write!(f, ", not waiting on a fork"),
        }
    }
}

// 各哲学者が最後に報告した状態を覚えておく sink
#[derive(Clone)]
struct Tracked<S> {
    inner: S,
    last: Arc<SpinLock<Vec<Phase>>>,
}

impl<S: PhaseSink> PhaseSink for Tracked<S> {
    fn set_phase(&self, id: ActorId, phase: Phase) -> Result<(), ReportError> {
        self.last.lock()[id] = phase;
        self.inner.set_phase(id, phase)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    // 哲学者ごとの食事回数
    pub meals: Vec<usize>,
    pub snapshots: usize,
}

impl Summary {
    pub fn total_meals(&self) -> usize {
        self.meals.iter().sum()
    }
}

pub struct Simulation {
    config: SimConfig,
    cancel: Cancel,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        Ok(Simulation {
            config,
            cancel: Cancel::new(),
        })
    }

    // これを cancel すると実行中の哲学者は全員止まる
    pub fn cancel_handle(&self) -> Cancel {
        self.cancel.clone()
    }

    /// 全員が食べ終わるまで走らせる
    ///
    /// スナップショットは out に書かれ、終了後に out を返す
    pub async fn run<W>(self, out: W) -> Result<(Summary, W), SimulationError>
    where
        W: Write + Send + 'static,
    {
        info!(
            actors = self.config.actors,
            repetitions = self.config.repetitions,
            order = ?self.config.order,
            lock = ?self.config.lock,
            reporter = ?self.config.reporter,
            "simulation starting"
        );
        let r = match self.config.lock {
            LockKind::Spin => self.run_with::<BinaryLock, W>(out).await,
            LockKind::Owned => self.run_with::<OwnedLock, W>(out).await,
        };
        if let Ok((summary, _)) = &r {
            info!(
                meals = summary.total_meals(),
                snapshots = summary.snapshots,
                "simulation finished"
            );
        }
        r
    }

    async fn run_with<L, W>(self, out: W) -> Result<(Summary, W), SimulationError>
    where
        L: RawLock + 'static,
        W: Write + Send + 'static,
    {
        let n = self.config.actors;
        let ring = Arc::new(ResourceRing::<L>::new(n));

        match self.config.reporter {
            ReporterKind::Channel => {
                let (sink, handle) = reporter::spawn(n, out);
                let meals = self.drive(ring, sink).await;
                // 送信側はすべて drop 済みなので報告タスクは終わる
                let (board, out) = handle
                    .await
                    .map_err(|e| SimulationError::Worker(e.to_string()))?
                    .map_err(|e| SimulationError::Report(e.into()))?;
                Ok((summarize(meals?, &board), out))
            }
            ReporterKind::Shared => {
                let shared = Arc::new(SharedBoard::new(n, out));
                let meals = self.drive(ring, shared.clone()).await?;
                let (board, out) = Arc::try_unwrap(shared)
                    .map_err(|_| SimulationError::Worker("board still shared".into()))?
                    .into_inner();
                Ok((summarize(meals, &board), out))
            }
        }
    }

    // 哲学者1人につき1スレッドを起動して全員を待つ
    // 結果は oneshot で受け取るので、待っている間 tokio のスレッドは塞がない
    async fn drive<L, S>(
        &self,
        ring: Arc<ResourceRing<L>>,
        sink: S,
    ) -> Result<Vec<usize>, SimulationError>
    where
        L: RawLock + 'static,
        S: PhaseSink + Clone + 'static,
    {
        let n = self.config.actors;
        let table = Arc::new(Table {
            repetitions: self.config.repetitions,
            order: self.config.order,
            pace: Pace {
                think: self.config.think.clone(),
                eat: self.config.eat.clone(),
                tick: self.config.tick,
            },
            cancel: self.cancel.clone(),
            rendezvous: self
                .config
                .rendezvous
                .then(|| Arc::new(Rendezvous::new(n))),
        });
        let finished: Arc<Vec<AtomicBool>> =
            Arc::new((0..n).map(|_| AtomicBool::new(false)).collect());
        let sink = Tracked {
            inner: sink,
            last: Arc::new(SpinLock::new(vec![Phase::Idle; n])),
        };
        let last = sink.last.clone();

        let mut replies = Vec::with_capacity(n);
        for id in 0..n {
            let p = Philosopher::new(id, ring.clone(), sink.clone(), table.clone());
            let finished = finished.clone();
            let cancel = self.cancel.clone();
            let (tx, rx) = oneshot::channel();
            let spawned = thread::Builder::new()
                .name(format!("philosopher-{id}"))
                .spawn(move || {
                    let r = p.dine();
                    match &r {
                        Err(SimulationError::Cancelled) | Ok(_) => {}
                        Err(e) => {
                            // 1人でも失敗したら残りも止める
                            error!(actor = id, error = %e, "philosopher failed, cancelling");
                            cancel.cancel();
                        }
                    }
                    finished[id].store(true, Ordering::Release);
                    let _ = tx.send(r);
                });
            if let Err(e) = spawned {
                error!(actor = id, error = %e, "failed to spawn philosopher");
                self.cancel.cancel();
                drop(sink);
                join_all(replies).await;
                return Err(SimulationError::Worker(e.to_string()));
            }
            replies.push(rx);
        }
        // 手元の送信側を残すと報告タスクが終わらない
        drop(sink);

        let joined = join_all(replies);
        tokio::pin!(joined);

        let results = match self.config.deadline {
            None => joined.await,
            Some(budget) => match tokio::time::timeout(budget, joined.as_mut()).await {
                Ok(results) => results,
                Err(_) => {
                    let phases = last.lock().clone();
                    let stuck: Vec<StuckActor> = (0..n)
                        .filter(|&id| !finished[id].load(Ordering::Acquire))
                        .map(|id| StuckActor {
                            id,
                            phase: phases[id],
                            awaiting: ring.awaiting(id),
                            holding: ring.holding(id),
                        })
                        .collect();
                    for s in &stuck {
                        warn!(actor = s.id, phase = %s.phase, awaiting = ?s.awaiting, holding = ?s.holding, "actor stuck");
                    }
                    error!(stuck = stuck.len(), ?budget, "deadline elapsed, cancelling");

                    // 止まっている哲学者を起こして回収する
                    self.cancel.cancel();
                    joined.await;
                    return Err(SimulationError::Deadlock { stuck });
                }
            },
        };

        // 巻き添えで止まった Cancelled より、最初の原因を返す
        let mut meals = Vec::with_capacity(n);
        let mut cancelled = false;
        for r in results {
            match r {
                Ok(Ok(m)) => meals.push(m),
                Ok(Err(SimulationError::Cancelled)) => cancelled = true,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(SimulationError::Worker("philosopher thread panicked".into()))
                }
            }
        }
        if cancelled {
            return Err(SimulationError::Cancelled);
        }
        Ok(meals)
    }
}

fn summarize(meals: Vec<usize>, board: &Board) -> Summary {
    Summary {
        meals,
        snapshots: board.snapshots(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::board::test::snapshots;
    use crate::ring::AcquireOrder;
    use std::{io, time::Duration};

    fn quick(actors: usize, repetitions: usize) -> SimConfig {
        let mut c = SimConfig::new(actors, repetitions).unwrap();
        c.tick = Duration::from_micros(10);
        c.deadline = Some(Duration::from_secs(30));
        c
    }

    async fn run(config: SimConfig) -> (Summary, String) {
        let (summary, out) = Simulation::new(config)
            .unwrap()
            .run(Vec::new())
            .await
            .unwrap();
        (summary, String::from_utf8(out).unwrap())
    }

    // 隣り合う2人が同時に Busy になっているスナップショットはない
    fn assert_no_adjacent_busy(out: &str, n: usize) {
        for snap in snapshots(out) {
            assert_eq!(snap.len(), n);
            for id in 0..n {
                let right = (id + 1) % n;
                let busy = |i: usize| snap[i] == format!("Actor {i}: Busy");
                assert!(!(busy(id) && busy(right)), "{snap:?}");
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_two_actors_eat_once_each() {
        for lock in [LockKind::Owned, LockKind::Spin] {
            let mut c = quick(2, 1);
            c.lock = lock;
            let (summary, out) = run(c).await;
            assert_eq!(summary.meals, vec![1, 1]);
            assert_no_adjacent_busy(&out, 2);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_five_actors_three_rounds() {
        for reporter in [ReporterKind::Channel, ReporterKind::Shared] {
            let mut c = quick(5, 3);
            c.reporter = reporter;
            let (summary, out) = run(c).await;
            assert_eq!(summary.total_meals(), 15);
            assert_eq!(summary.meals, vec![3; 5]);

            let snaps = snapshots(&out);
            // 1ラウンド4回 + 退席1回
            assert_eq!(snaps.len(), 5 * (3 * 4 + 1));
            assert_eq!(summary.snapshots, snaps.len());
            assert_no_adjacent_busy(&out, 5);

            // 各自ちょうど3回 Busy に入る
            for id in 0..5 {
                let busy = format!("Actor {id}: Busy");
                let entered = snaps
                    .windows(2)
                    .filter(|w| w[0][id] != busy && w[1][id] == busy)
                    .count();
                assert_eq!(entered, 3, "actor {id}");
            }
            let last = snaps.last().unwrap();
            assert!(last.iter().all(|row| row.ends_with(": Terminated")));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_spin_lock_with_shared_board() {
        let mut c = quick(4, 2);
        c.lock = LockKind::Spin;
        c.reporter = ReporterKind::Shared;
        let (summary, out) = run(c).await;
        assert_eq!(summary.meals, vec![2; 4]);
        assert_no_adjacent_busy(&out, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_left_first_rendezvous_deadlocks() {
        for lock in [LockKind::Spin, LockKind::Owned] {
            let mut c = quick(3, 1);
            c.lock = lock;
            c.order = AcquireOrder::LeftFirst;
            c.rendezvous = true;
            c.deadline = Some(Duration::from_millis(300));

            let r = Simulation::new(c).unwrap().run(Vec::new()).await;
            let stuck = match r {
                Err(SimulationError::Deadlock { stuck }) => stuck,
                other => panic!("expected deadlock, got {other:?}"),
            };
            assert_eq!(stuck.len(), 3);
            for s in stuck {
                assert_eq!(s.phase, Phase::Acquiring);
                assert_eq!(s.holding, vec![s.id]);
                assert_eq!(s.awaiting, Some((s.id + 1) % 3));
            }
        }
    }

    // tokio のブロッキングプールの上限より多い人数でも全員が席につく
    #[tokio::test(flavor = "multi_thread")]
    async fn test_many_actors_all_reach_the_table() {
        const N: usize = 520;
        let mut c = quick(N, 1);
        c.order = AcquireOrder::LeftFirst;
        c.rendezvous = true;
        c.deadline = Some(Duration::from_secs(3));

        let r = Simulation::new(c).unwrap().run(io::sink()).await;
        let stuck = match r {
            Err(SimulationError::Deadlock { stuck }) => stuck,
            other => panic!("expected deadlock, got {other:?}"),
        };
        assert_eq!(stuck.len(), N);
        for s in stuck {
            assert_eq!(s.phase, Phase::Acquiring);
            assert_eq!(s.holding, vec![s.id]);
            assert_eq!(s.awaiting, Some((s.id + 1) % N));
        }
    }

    // ok 回までは書けて、その後は壊れたパイプになる出力先
    struct Flaky {
        ok: usize,
    }

    impl io::Write for Flaky {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.ok == 0 {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.ok -= 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_broken_output_fails_the_run() {
        for reporter in [ReporterKind::Channel, ReporterKind::Shared] {
            let mut c = quick(5, 3);
            c.reporter = reporter;
            c.deadline = None;
            let sim = Simulation::new(c).unwrap();
            let r = tokio::time::timeout(Duration::from_secs(10), sim.run(Flaky { ok: 12 }))
                .await
                .unwrap_or_else(|_| panic!("{reporter:?}: run did not stop"));
            assert!(
                matches!(r, Err(SimulationError::Report(_))),
                "{reporter:?}: {:?}",
                r.map(|(summary, _)| summary)
            );
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_external_cancel_stops_run() {
        let mut c = quick(3, 100);
        c.tick = Duration::from_millis(1);
        c.deadline = None;
        let sim = Simulation::new(c).unwrap();
        let cancel = sim.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let r = sim.run(Vec::new()).await;
        assert!(matches!(r, Err(SimulationError::Cancelled)), "{r:?}");
    }

    #[test]
    fn test_stuck_actor_display() {
        let s = StuckActor {
            id: 2,
            phase: Phase::Acquiring,
            awaiting: Some(0),
            holding: vec![2],
        };
        assert_eq!(s.to_string(), "actor 2 (Acquiring) holding [2], waiting for fork 0");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut c = SimConfig::new(2, 1).unwrap();
        c.actors = 1;
        assert!(matches!(
            Simulation::new(c),
            Err(SimulationError::Config(_))
        ));
    }
}
