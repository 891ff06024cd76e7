//! ister workflow orchestration.
//!
//! This crate holds the ordered, single-shot stage runner. Higher-level crates
//! provide the concrete state type and the stage bodies.

pub mod stage_runner;
