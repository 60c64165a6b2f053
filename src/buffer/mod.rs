//! Event buffering and batch assembly: accumulates events, seals them into
//! byte-bounded batches on thresholds, timers, or lifecycle transitions,
//! and hands sealed batches to the engine.

pub mod assembler;
pub mod chunk;

pub use assembler::{AssemblerHandle, EventAssembler, TextSize, UserEngagement};
pub use chunk::split_events_by_max_bytes;
