use std::io::{self, Write};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

use crate::board::{Board, Phase, PhaseSink};
use crate::error::ReportError;
use crate::lock::ActorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub id: ActorId,
    pub phase: Phase,
}

/// 状態の変化を報告タスクへ送る側
/// 状態表を持つのは報告タスクだけで、哲学者は共有メモリに触らない
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PhaseChange>,
}

impl PhaseSink for ChannelSink {
    fn set_phase(&self, id: ActorId, phase: Phase) -> Result<(), ReportError> {
        self.tx
            .send(PhaseChange { id, phase })
            .map_err(|_| ReportError::Closed)
    }
}

/// 報告タスクを起動する
///
/// 送信側がすべて drop されると、最後の状態表と出力先を返して終わる
pub fn spawn<W>(n: usize, mut out: W) -> (ChannelSink, JoinHandle<io::Result<(Board, W)>>)
where
    W: Write + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<PhaseChange>();

    let handle = tokio::spawn(async move {
        let mut board = Board::new(n);
        // 受け取った順に1件ずつ反映して書き出す
        while let Some(change) = rx.recv().await {
            board.set(change.id, change.phase);
            board.render(&mut out)?;
        }
        debug!(snapshots = board.snapshots(), "reporter finished");
        Ok((board, out))
    });

    (ChannelSink { tx }, handle)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::board::test::snapshots;

    #[tokio::test]
    async fn test_reporter_prints_each_change() {
        let (sink, handle) = spawn(2, Vec::new());
        sink.set_phase(0, Phase::Acquiring).unwrap();
        sink.set_phase(0, Phase::Busy).unwrap();
        sink.set_phase(1, Phase::Terminated).unwrap();
        drop(sink);

        let (board, out) = handle.await.unwrap().unwrap();
        assert_eq!(board.phases(), &[Phase::Busy, Phase::Terminated]);

        let out = String::from_utf8(out).unwrap();
        let snaps = snapshots(&out);
        assert_eq!(snaps.len(), 3);
        assert_eq!(snaps[0], vec!["Actor 0: Acquiring", "Actor 1: Idle"]);
        assert_eq!(snaps[2], vec!["Actor 0: Busy", "Actor 1: Terminated"]);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let (sink, handle) = spawn(1, Vec::new());
        handle.abort();
        let _ = handle.await;
        assert!(matches!(
            sink.set_phase(0, Phase::Busy),
            Err(ReportError::Closed)
        ));
    }
}
