//! Domain layer for pulse-telemetry.
//!
//! Contains the canonical types shared across all modules:
//! - `Event`: a single analytics event
//! - `Batch` / `BatchRecord`: the unit of transmission and its storage identity
//! - `MetaProvider` / `NetworkTypeProvider`: enrichment seams for batch metadata

pub mod batch;
pub mod event;
pub mod meta;

pub use batch::{Batch, BatchRecord};
pub use event::Event;
pub use meta::{AppMeta, MetaProvider, NetworkType, NetworkTypeProvider, NewLaunchFlag};
