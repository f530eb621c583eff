use std::{ops::Range, time::Duration};

use clap::ValueEnum;

use crate::error::ConfigError;
use crate::ring::AcquireOrder;

pub const MIN_ACTORS: usize = 2;
pub const MIN_REPETITIONS: usize = 1;

// 考える時間・食べる時間 (tick 単位、[1000, 3000))
pub const THINK_TICKS: Range<u64> = 1000..3000;
pub const EAT_TICKS: Range<u64> = 1000..3000;

// 1 tick の長さ
pub const TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LockKind {
    /// Spin on an atomic flag; release is unchecked
    Spin,
    /// Blocking lock that tracks its holder
    #[default]
    Owned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReporterKind {
    /// A reporter task receives phase changes over a channel
    #[default]
    Channel,
    /// One board shared by everyone behind a single lock
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub actors: usize,
    pub repetitions: usize,
    pub order: AcquireOrder,
    pub lock: LockKind,
    pub reporter: ReporterKind,
    pub think: Range<u64>,
    pub eat: Range<u64>,
    pub tick: Duration,
    // None なら終わるまで待ち続ける
    pub deadline: Option<Duration>,
    // 初回だけ、全員が1本目を取ってから2本目へ進む
    pub rendezvous: bool,
}

impl SimConfig {
    pub fn new(actors: usize, repetitions: usize) -> Result<Self, ConfigError> {
        let config = SimConfig {
            actors,
            repetitions,
            order: AcquireOrder::default(),
            lock: LockKind::default(),
            reporter: ReporterKind::default(),
            think: THINK_TICKS,
            eat: EAT_TICKS,
            tick: TICK,
            deadline: None,
            rendezvous: false,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.actors < MIN_ACTORS {
            return Err(ConfigError::TooFewActors(self.actors));
        }
        if self.repetitions < MIN_REPETITIONS {
            return Err(ConfigError::TooFewRepetitions(self.repetitions));
        }
        if self.think.is_empty() {
            return Err(ConfigError::EmptyRange("think"));
        }
        if self.eat.is_empty() {
            return Err(ConfigError::EmptyRange("eat"));
        }
        if self.rendezvous && self.order != AcquireOrder::LeftFirst {
            return Err(ConfigError::RendezvousNeedsLeftFirst);
        }
        Ok(())
    }
}
