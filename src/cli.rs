use std::time::Duration;

use clap::Parser;

use crate::config::{LockKind, ReporterKind, SimConfig, MIN_ACTORS, MIN_REPETITIONS};
use crate::error::ArgError;
use crate::ring::AcquireOrder;

/// Dining philosophers simulation
#[derive(Debug, Parser)]
#[command(name = "dining", version, allow_negative_numbers = true)]
pub struct Cli {
    /// Number of philosophers (>= 2)
    pub number_of_actors: String,

    /// How many times each philosopher eats (>= 1)
    pub repetitions: String,

    /// Order in which the two forks are picked up
    #[arg(long, value_enum, default_value_t = AcquireOrder::Hierarchy)]
    pub order: AcquireOrder,

    /// Fork lock implementation
    #[arg(long, value_enum, default_value_t = LockKind::Owned)]
    pub lock: LockKind,

    /// How phase changes reach the output
    #[arg(long, value_enum, default_value_t = ReporterKind::Channel)]
    pub reporter: ReporterKind,

    /// Length of one time unit in microseconds
    #[arg(long, default_value_t = 1000)]
    pub tick_us: u64,

    /// Give up and report stuck philosophers after this many seconds
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Make everyone hold their first fork before anyone takes a second (needs --order left-first)
    #[arg(long)]
    pub rendezvous: bool,
}

impl Cli {
    pub fn into_config(self) -> Result<SimConfig, ArgError> {
        let actors = parse_count("number_of_actors", &self.number_of_actors, MIN_ACTORS)?;
        let repetitions = parse_count("repetitions", &self.repetitions, MIN_REPETITIONS)?;

        let mut config = SimConfig::new(actors, repetitions)?;
        config.order = self.order;
        config.lock = self.lock;
        config.reporter = self.reporter;
        config.tick = Duration::from_micros(self.tick_us);
        config.deadline = self.deadline_secs.map(Duration::from_secs);
        config.rendezvous = self.rendezvous;
        config.validate()?;
        Ok(config)
    }
}

// 数値でなければ InvalidNumber、範囲外なら OutOfRange
fn parse_count(name: &'static str, value: &str, min: usize) -> Result<usize, ArgError> {
    let n: i64 = value.trim().parse().map_err(|_| ArgError::InvalidNumber {
        name,
        value: value.to_string(),
    })?;
    let min = i64::try_from(min).unwrap_or(i64::MAX);
    if n < min {
        return Err(ArgError::OutOfRange {
            name,
            value: n,
            min,
        });
    }
    usize::try_from(n).map_err(|_| ArgError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}
