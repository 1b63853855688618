// procpipe/src/error.rs

//! Error types for pipeline coordination (`PipelineError`) and for the
//! std-backed process stage (`CmdError`).

use crate::stage::Stage;
use std::fmt;
use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Failure reported by a [`Pipeline`](crate::Pipeline) operation.
///
/// Generic over `E`, the error type of the pipeline's stages, so the stage's
/// own error is carried through untouched as the `source`.
#[derive(Debug, Error)]
pub enum PipelineError<E>
where
  E: std::error::Error + 'static,
{
  #[error("Pipeline requires at least one stage")]
  EmptyPipeline,

  #[error("Failed to wire stage {stage_index} output into the next stage. Source: {source}")]
  PipeSetup {
    stage_index: usize,
    #[source]
    source: E,
  },

  #[error("Stage {stage_index} failed to start. Source: {source}")]
  StartFailure {
    stage_index: usize,
    #[source]
    source: E,
  },

  #[error("Stage {stage_index} finished with an error. Source: {source}")]
  StageWait {
    stage_index: usize,
    #[source]
    source: E,
  },
}

impl<E> PipelineError<E>
where
  E: std::error::Error + 'static,
{
  /// Position of the stage this error came from, if any.
  pub fn stage_index(&self) -> Option<usize> {
    match self {
      PipelineError::EmptyPipeline => None,
      PipelineError::PipeSetup { stage_index, .. }
      | PipelineError::StartFailure { stage_index, .. }
      | PipelineError::StageWait { stage_index, .. } => Some(*stage_index),
    }
  }

  /// Borrow the stage's own error.
  pub fn stage_error(&self) -> Option<&E> {
    match self {
      PipelineError::EmptyPipeline => None,
      PipelineError::PipeSetup { source, .. }
      | PipelineError::StartFailure { source, .. }
      | PipelineError::StageWait { source, .. } => Some(source),
    }
  }

  /// Unwrap into the stage's own error, exactly as the stage returned it.
  pub fn into_stage_error(self) -> Option<E> {
    match self {
      PipelineError::EmptyPipeline => None,
      PipelineError::PipeSetup { source, .. }
      | PipelineError::StartFailure { source, .. }
      | PipelineError::StageWait { source, .. } => Some(source),
    }
  }
}

/// A failed [`Pipeline::try_new`](crate::Pipeline::try_new): the error plus
/// the stages, with every pipe handle opened during construction released.
pub struct WiringFailure<S: Stage> {
  pub error: PipelineError<S::Error>,
  pub stages: Vec<S>,
}

impl<S: Stage> fmt::Debug for WiringFailure<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WiringFailure")
      .field("error", &self.error)
      .field("num_stages", &self.stages.len())
      .finish()
  }
}

impl<S: Stage> fmt::Display for WiringFailure<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.error, f)
  }
}

impl<S: Stage> std::error::Error for WiringFailure<S> {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    Some(&self.error)
  }
}

/// Errors produced by [`Cmd`](crate::Cmd), the process-backed stage.
#[derive(Debug, Error)]
pub enum CmdError {
  #[error("Executable '{program}' not found: {reason}")]
  NotFound { program: String, reason: String },

  #[error("Failed to spawn '{program}'. Source: {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("Failed to create pipe. Source: {source}")]
  Pipe {
    #[source]
    source: io::Error,
  },

  #[error("Stdout already set")]
  StdoutAlreadySet,

  #[error("Process '{program}' already started")]
  AlreadyStarted { program: String },

  #[error("Process '{program}' not started")]
  NotStarted { program: String },

  #[error("Wait was already called for '{program}'")]
  AlreadyWaited { program: String },

  #[error("Failed waiting for '{program}'. Source: {source}")]
  Wait {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("Failed to kill '{program}'. Source: {source}")]
  Kill {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("Process '{program}' exited unsuccessfully: {status}")]
  Exit { program: String, status: ExitStatus },

  #[error("I/O copy for '{program}' failed. Source: {source}")]
  Io {
    program: String,
    #[source]
    source: io::Error,
  },
}

pub type PipelineResult<T, E> = std::result::Result<T, PipelineError<E>>;
pub type CmdResult<T> = std::result::Result<T, CmdError>;
