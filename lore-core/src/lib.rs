//! # lore-core
//!
//! Core types for the Lore pattern engine: the pattern data model,
//! trust-score math, per-subsystem errors, layered configuration,
//! and tracing setup.

pub mod config;
pub mod errors;
pub mod pattern;
pub mod tracing;
pub mod trust;
