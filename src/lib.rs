pub mod board;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod owned;
pub mod philosopher;
pub mod reporter;
pub mod ring;
pub mod simulation;
pub mod spinlock;
