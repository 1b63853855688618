// src/lib.rs

//! procpipe: link independently spawned processes into one pipeline, the
//! way a shell's `|` does.
//!
//! A [`Pipeline`] takes an ordered list of not-yet-started stages and:
//!  - wires each stage's stdout into the next stage's stdin before anything runs,
//!    closing every pipe it opened if the wiring fails part way;
//!  - starts the stages in order, killing the ones already running if a later
//!    one cannot start;
//!  - waits for every stage and reports every failure, not just the first.
//!
//! The pipeline never copies data itself: bytes flow through OS pipes
//! directly from one process to the next.
//!
//! Stages are anything implementing [`Stage`]. [`Cmd`] is the implementation
//! backed by `std::process::Command`.
//!
//! ```no_run
//! use procpipe::{Capture, Cmd, Pipeline};
//!
//! let mut pipeline = Pipeline::new(vec![
//!   Cmd::new("echo").arg("hi"),
//!   Cmd::new("sed").arg("s/h/H/"),
//!   Cmd::new("sed").arg("s/i/ello/"),
//! ])?;
//!
//! let out = Capture::new();
//! pipeline.last_mut().set_stdout(out.clone());
//!
//! pipeline.start()?;
//! let errors = pipeline.wait();
//! assert!(errors.is_empty());
//! assert_eq!(out.contents(), b"Hello\n");
//! # Ok::<(), procpipe::PipelineError<procpipe::CmdError>>(())
//! ```

pub mod error;
pub mod pipeline;
pub mod process;
pub mod stage;

// --- Re-exports for the Public API ---

pub use crate::error::{CmdError, CmdResult, PipelineError, PipelineResult, WiringFailure};
pub use crate::pipeline::Pipeline;
pub use crate::process::{Capture, Cmd, Input, Output, SharedWriter};
pub use crate::stage::Stage;
