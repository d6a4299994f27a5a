//! adaptivemap: an adaptive two-tier concurrent map for read-heavy workloads.
//!
//! Reads go through an atomically swapped snapshot without taking a lock.
//! Writes the snapshot cannot absorb fall back to a mutex-guarded overlay,
//! which is promoted to become the next snapshot once enough lookups have
//! paid the overlay toll. See the [`map`] module for the full design.

mod cell;
pub mod error;
pub mod map;
pub mod metrics;
pub mod prelude;

pub use error::InvariantError;
pub use map::AdaptiveMap;
pub use metrics::MapMetrics;
