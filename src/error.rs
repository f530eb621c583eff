use std::io;

use thiserror::Error;

use crate::lock::ActorId;
use crate::simulation::StuckActor;

/// フォーク (ロック) 操作の失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("actor {caller} released a lock nobody holds")]
    NotHeld { caller: ActorId },

    #[error("actor {caller} released a lock held by actor {holder}")]
    NotOwner { holder: ActorId, caller: ActorId },

    #[error("actor {0} tried to acquire a lock it already holds")]
    Reentrant(ActorId),

    #[error("wait was cancelled")]
    Cancelled,
}

// どのフォークで失敗したか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("fork {fork}: {source}")]
pub struct ForkError {
    pub fork: usize,
    #[source]
    pub source: LockError,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write snapshot: {0}")]
    Io(#[from] io::Error),

    #[error("reporter has shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("number of actors must be >= 2 (got {0})")]
    TooFewActors(usize),

    #[error("repetitions must be >= 1 (got {0})")]
    TooFewRepetitions(usize),

    #[error("{0} duration range is empty")]
    EmptyRange(&'static str),

    #[error("rendezvous requires the left-first acquisition order")]
    RendezvousNeedsLeftFirst,
}

/// コマンドライン引数の誤り
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("<{name}> must be an integer (got {value:?})")]
    InvalidNumber { name: &'static str, value: String },

    #[error("<{name}> must be >= {min} (got {value})")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fork(ForkError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("deadlock suspected: {} actor(s) stuck", stuck.len())]
    Deadlock { stuck: Vec<StuckActor> },

    #[error("simulation cancelled")]
    Cancelled,

    #[error("worker failed: {0}")]
    Worker(String),
}

// キャンセルで抜けたものはフォークの失敗としては扱わない
impl From<ForkError> for SimulationError {
    fn from(e: ForkError) -> Self {
        match e.source {
            LockError::Cancelled => SimulationError::Cancelled,
            _ => SimulationError::Fork(e),
        }
    }
}
