// procpipe/src/stage.rs

//! Defines the `Stage` trait: the capability set a process descriptor must
//! offer for a [`Pipeline`](crate::Pipeline) to wire, start, wait on and
//! kill it.

use std::borrow::Cow;

/// One not-yet-started process participating in a pipeline.
///
/// `Pipeline` never spawns anything itself. It only asks each stage to open
/// a handle on its future stdout, hands that handle to the next stage as its
/// stdin, and then drives `start`, `wait` and `kill`. Implementors own every
/// detail of process creation.
///
/// [`Cmd`](crate::Cmd) is the implementation backed by `std::process`. Tests
/// can provide in-memory implementations.
pub trait Stage {
  /// Error returned by every fallible stage operation.
  type Error: std::error::Error + Send + Sync + 'static;

  /// Readable end of this stage's stdout, handed to the next stage as stdin.
  type Reader;

  /// Sink accepted as the stage's error stream.
  type Sink;

  /// Opens a readable handle on the stage's eventual stdout.
  ///
  /// Must be called before `start`. Must fail if the stage is already
  /// started or if its stdout has already been claimed.
  fn stdout_pipe(&mut self) -> Result<Self::Reader, Self::Error>;

  /// Undoes a successful `stdout_pipe`, closing the write end the stage holds.
  /// A no-op if no pipe is open.
  fn release_stdout_pipe(&mut self);

  /// Uses `reader` as the stage's stdin.
  fn set_stdin_pipe(&mut self, reader: Self::Reader);

  /// Uses `sink` as the stage's error stream.
  fn set_stderr(&mut self, sink: Self::Sink);

  fn start(&mut self) -> Result<(), Self::Error>;

  /// Blocks until the stage terminates. Errors cover both failures to wait
  /// and unsuccessful termination.
  fn wait(&mut self) -> Result<(), Self::Error>;

  /// Forcibly terminates a started stage.
  ///
  /// Called by `Pipeline::start` while recovering from a partial start, with
  /// no `wait` afterwards. Implementations that need to reap should do it
  /// here, blocking on nothing but the termination itself.
  fn kill(&mut self) -> Result<(), Self::Error>;

  /// Executable path, used when formatting the pipeline.
  fn program(&self) -> Cow<'_, str>;

  /// Arguments, not including the program itself.
  fn args(&self) -> Vec<Cow<'_, str>>;
}
