// procpipe/src/pipeline/mod.rs

//! Defines the `Pipeline<S>` struct, its wiring, start and wait logic.

pub mod definition;
pub mod execution;

pub use definition::Pipeline;
