// procpipe/src/pipeline/execution.rs

//! Contains `Pipeline::start()` (all-or-nothing) and `Pipeline::wait()`
//! (fail-slow), plus `run()` which chains the two.

use crate::error::PipelineError;
use crate::pipeline::definition::Pipeline;
use crate::stage::Stage;
use tracing::{event, instrument, span, Level};

impl<S: Stage> Pipeline<S> {
  /// Starts every stage in order, index 0 first.
  ///
  /// If stage `k` fails to start, no later stage is started, stages `0..k`
  /// are killed, and stage `k`'s error is returned. Kill failures are logged
  /// and otherwise ignored. `wait` is not called on the killed stages.
  ///
  /// Call at most once per pipeline.
  #[instrument(
    name = "Pipeline::start",
    skip_all,
    fields(num_stages = self.stages.len()),
    err(Display)
  )]
  pub fn start(&mut self) -> Result<(), PipelineError<S::Error>> {
    for stage_index in 0..self.stages.len() {
      let stage_span = span!(Level::DEBUG, "pipeline_stage_start", stage_index);
      let _stage_span_guard = stage_span.enter();

      if let Err(source) = self.stages[stage_index].start() {
        event!(Level::ERROR, error = %source, "Stage failed to start, killing started stages.");
        self.kill_started(stage_index);
        return Err(PipelineError::StartFailure { stage_index, source });
      }
      event!(Level::DEBUG, "Stage started.");
    }

    event!(Level::DEBUG, "All stages started.");
    Ok(())
  }

  /// Best-effort teardown of `stages[..started]` after a partial start.
  fn kill_started(&mut self, started: usize) {
    for (stage_index, stage) in self.stages.iter_mut().enumerate().take(started) {
      // Kill only. `wait` may join helper work such as a stdin feeder blocked
      // on its source, and start must not block on that.
      match stage.kill() {
        Ok(()) => event!(Level::DEBUG, stage_index, "Stage killed."),
        Err(kill_err) => event!(Level::WARN, stage_index, error = %kill_err, "Ignoring failure to kill stage."),
      }
    }
  }

  /// Waits for every stage in order and collects each stage's error.
  ///
  /// Never stops early: a failed stage does not prevent later stages from
  /// being waited on. Returns an empty `Vec` when every stage finished
  /// cleanly; otherwise one [`PipelineError::StageWait`] per failed stage,
  /// in stage order.
  ///
  /// Only meaningful after `start` returned `Ok`.
  #[instrument(name = "Pipeline::wait", skip_all, fields(num_stages = self.stages.len()))]
  pub fn wait(&mut self) -> Vec<PipelineError<S::Error>> {
    let mut errors = Vec::new();

    for (stage_index, stage) in self.stages.iter_mut().enumerate() {
      match stage.wait() {
        Ok(()) => event!(Level::DEBUG, stage_index, "Stage finished."),
        Err(source) => {
          event!(Level::ERROR, stage_index, error = %source, "Stage finished with an error.");
          errors.push(PipelineError::StageWait { stage_index, source });
        }
      }
    }

    event!(Level::DEBUG, num_errors = errors.len(), "Pipeline finished.");
    errors
  }

  /// `start` followed by `wait`.
  ///
  /// A start failure comes back as a single-element `Vec` and nothing is
  /// waited on beyond the cleanup `start` already performs.
  pub fn run(&mut self) -> Vec<PipelineError<S::Error>> {
    match self.start() {
      Ok(()) => self.wait(),
      Err(start_err) => vec![start_err],
    }
  }
}
