// procpipe/src/pipeline/definition.rs

//! Contains the `Pipeline<S>` struct definition, its construction (which
//! performs all the stdout -> stdin wiring) and its accessors.

use crate::error::{PipelineError, WiringFailure};
use crate::stage::Stage;
use std::fmt;
use tracing::{event, instrument, Level};

/// An ordered, non-empty sequence of stages where each stage's stdout feeds
/// the next stage's stdin.
///
/// The order is fixed at construction. Attach the pipeline's overall input to
/// [`first_mut`](Pipeline::first_mut) and its overall output to
/// [`last_mut`](Pipeline::last_mut) before calling `start`. Reassigning the
/// stdin or stdout of a stage that was wired to a neighbour breaks the
/// pipeline.
///
/// Dropping a `Pipeline` does not terminate processes that are still running.
pub struct Pipeline<S: Stage> {
  /// Stages in wiring order.
  pub(crate) stages: Vec<S>,
}

impl<S: Stage> Pipeline<S> {
  /// Wires `stages[i-1]` stdout into `stages[i]` stdin for every adjacent pair.
  ///
  /// Fails with [`PipelineError::EmptyPipeline`] when `stages` is empty, or with
  /// [`PipelineError::PipeSetup`] when a stage cannot open its stdout handle.
  /// In the latter case every handle opened during this call is closed again
  /// before returning. Nothing is started either way.
  ///
  /// The stages are dropped on failure; use [`try_new`](Pipeline::try_new) to
  /// get them back.
  pub fn new(stages: Vec<S>) -> Result<Self, PipelineError<S::Error>> {
    Self::try_new(stages).map_err(|failure| failure.error)
  }

  /// Same as [`new`](Pipeline::new), but a failure hands the stages back
  /// with their stdout pipes released and no stdin pipe assigned.
  #[instrument(name = "Pipeline::new", skip_all, fields(num_stages = stages.len()))]
  pub fn try_new(mut stages: Vec<S>) -> Result<Self, WiringFailure<S>> {
    if stages.is_empty() {
      event!(Level::ERROR, "Refusing to build an empty pipeline.");
      return Err(WiringFailure {
        error: PipelineError::EmptyPipeline,
        stages,
      });
    }

    // Readers are held here until every pair is wired, so a failure only has
    // to drop this Vec and release the write ends already handed out.
    let mut readers = Vec::with_capacity(stages.len() - 1);
    for stage_index in 0..stages.len() - 1 {
      match stages[stage_index].stdout_pipe() {
        Ok(reader) => readers.push(reader),
        Err(source) => {
          event!(Level::ERROR, stage_index, error = %source, "Failed to open stdout pipe, releasing earlier pipes.");
          drop(readers);
          for stage in stages.iter_mut().take(stage_index) {
            stage.release_stdout_pipe();
          }
          return Err(WiringFailure {
            error: PipelineError::PipeSetup { stage_index, source },
            stages,
          });
        }
      }
    }

    for (stage, reader) in stages.iter_mut().skip(1).zip(readers) {
      stage.set_stdin_pipe(reader);
    }

    event!(Level::DEBUG, "Pipeline wired.");
    Ok(Self { stages })
  }

  /// The first stage. Attach the pipeline's input here.
  pub fn first(&self) -> &S {
    &self.stages[0]
  }

  pub fn first_mut(&mut self) -> &mut S {
    &mut self.stages[0]
  }

  /// The last stage. Attach the pipeline's output here.
  pub fn last(&self) -> &S {
    &self.stages[self.stages.len() - 1]
  }

  pub fn last_mut(&mut self) -> &mut S {
    let last = self.stages.len() - 1;
    &mut self.stages[last]
  }

  /// Number of stages. Never zero.
  pub fn len(&self) -> usize {
    self.stages.len()
  }

  /// Always `false`; a pipeline cannot be built without stages.
  pub fn is_empty(&self) -> bool {
    self.stages.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&S> {
    self.stages.get(index)
  }

  /// Mutable access to one stage. Reassigning the stdin or stdout of a wired
  /// stage disconnects it from its neighbour.
  pub fn get_mut(&mut self, index: usize) -> Option<&mut S> {
    self.stages.get_mut(index)
  }

  pub fn stages(&self) -> &[S] {
    &self.stages
  }

  pub fn iter(&self) -> std::slice::Iter<'_, S> {
    self.stages.iter()
  }

  /// Gives the stages back, in order.
  pub fn into_stages(self) -> Vec<S> {
    self.stages
  }

  /// Points every stage's error stream at a clone of `sink`.
  ///
  /// Only affects stages that have not been started yet.
  pub fn set_error_stream(&mut self, sink: S::Sink)
  where
    S::Sink: Clone,
  {
    for stage in &mut self.stages {
      stage.set_stderr(sink.clone());
    }
  }
}

impl<'a, S: Stage> IntoIterator for &'a Pipeline<S> {
  type Item = &'a S;
  type IntoIter = std::slice::Iter<'a, S>;

  fn into_iter(self) -> Self::IntoIter {
    self.stages.iter()
  }
}

/// Formats as `path arg1 arg2 | path arg1 | ...`.
///
/// Nothing is quoted or escaped; the output is for logs, not for a shell.
impl<S: Stage> fmt::Display for Pipeline<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (stage_index, stage) in self.stages.iter().enumerate() {
      if stage_index > 0 {
        f.write_str(" | ")?;
      }
      f.write_str(&stage.program())?;
      for arg in stage.args() {
        write!(f, " {arg}")?;
      }
    }
    Ok(())
  }
}

impl<S: Stage> fmt::Debug for Pipeline<S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipeline")
      .field("num_stages", &self.stages.len())
      .field("command_line", &self.to_string())
      .finish()
  }
}
