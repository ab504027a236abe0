//! Runtime layer for Roster Health.
//!
//! Wires the data layer into use cases: the storage-backed import pipeline,
//! the cached roster source and the async watch loop.

pub mod orchestrator;
pub mod pipeline;
pub mod roster_source;

pub use health_core as core;
pub use health_data as data;
