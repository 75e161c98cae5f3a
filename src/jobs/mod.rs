//! Jobs Module
//!
//! Incremental tile (re)builds that run off the owning thread. Jobs carry
//! copies of their inputs; only finished uploads come back.

pub mod tile_job;
pub mod tile_scheduler;

pub use tile_job::{CancelToken, Generation, TileFill, TileJob, TileOverride, TileTarget, TileUpload, TileWork};
pub use tile_scheduler::{GenerationGate, TileOutcome, TileScheduler, TileSchedulerStats};
