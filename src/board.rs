use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};

use crate::error::ReportError;
use crate::lock::ActorId;
use crate::spinlock::SpinLock;

// スナップショットの区切り
pub const SEPARATOR: &str = "---------------------------------";

/// 哲学者の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,       // 考え中
    Acquiring,  // フォークを取りに行っている
    Busy,       // 食事中
    Releasing,  // フォークを置いている
    Terminated, // 食べ終わって退席
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "Idle",
            Phase::Acquiring => "Acquiring",
            Phase::Busy => "Busy",
            Phase::Releasing => "Releasing",
            Phase::Terminated => "Terminated",
        };
        f.write_str(s)
    }
}

/// 全員分の状態表
#[derive(Debug, Clone)]
pub struct Board {
    phases: Vec<Phase>,
    snapshots: usize,
}

impl Board {
    pub fn new(n: usize) -> Self {
        Board {
            phases: vec![Phase::Idle; n],
            snapshots: 0,
        }
    }

    pub fn set(&mut self, id: ActorId, phase: Phase) {
        self.phases[id] = phase;
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    // これまでに書き出したスナップショットの数
    pub fn snapshots(&self) -> usize {
        self.snapshots
    }

    /// 全員の状態を番号順に書き、最後に区切り行を書く
    pub fn render<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        let mut buf = String::with_capacity(self.phases.len() * 20 + SEPARATOR.len() + 1);
        for (id, phase) in self.phases.iter().enumerate() {
            buf.push_str(&format!("Actor {id}: {phase}\n"));
        }
        buf.push_str(SEPARATOR);
        buf.push('\n');

        // 1回の write_all でまとめて出す
        out.write_all(buf.as_bytes())?;
        out.flush()?;
        self.snapshots += 1;
        Ok(())
    }
}

/// 状態の変化を受け取る側
pub trait PhaseSink: Send + Sync {
    fn set_phase(&self, id: ActorId, phase: Phase) -> Result<(), ReportError>;
}

impl<T: PhaseSink + ?Sized> PhaseSink for Arc<T> {
    fn set_phase(&self, id: ActorId, phase: Phase) -> Result<(), ReportError> {
        (**self).set_phase(id, phase)
    }
}

/// 状態表と出力先をまとめて1つの SpinLock で守る
///
/// 書き換えと表示が同じロックの中で行われるので、行が混ざることはない
pub struct SharedBoard<W> {
    inner: SpinLock<(Board, W)>,
}

impl<W: Write + Send> SharedBoard<W> {
    pub fn new(n: usize, out: W) -> Self {
        SharedBoard {
            inner: SpinLock::new((Board::new(n), out)),
        }
    }

    pub fn into_inner(self) -> (Board, W) {
        self.inner.into_inner()
    }
}

impl<W: Write + Send> PhaseSink for SharedBoard<W> {
    fn set_phase(&self, id: ActorId, phase: Phase) -> Result<(), ReportError> {
        let mut guard = self.inner.lock();
        let (board, out) = &mut *guard;
        board.set(id, phase);
        board.render(out)?;
        Ok(())
    }
}
