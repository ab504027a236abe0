//! Data layer for Roster Health.
//!
//! Reads roster exports, validates and imports them, stores customers behind
//! the [`repository::CustomerRepository`] trait, aggregates statistics,
//! writes exports and keeps the score history and alert log.

pub mod aggregator;
pub mod exporter;
pub mod file_store;
pub mod history;
pub mod importer;
pub mod memory_store;
pub mod reader;
pub mod repository;

pub use health_core as core;
