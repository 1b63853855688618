// procpipe/src/process/cmd.rs

//! `Cmd`: a builder for one external process, implementing [`Stage`] on top of
//! `std::process`.

use crate::error::{CmdError, CmdResult};
use crate::process::io::{Input, Output, SharedWriter};
use crate::stage::Stage;
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::{self, PipeReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{event, instrument, Level};

/// Lifecycle of the child process behind a `Cmd`.
#[derive(Debug)]
enum ProcessState {
  NotStarted,
  Running(Child),
  /// Killed and reaped by `kill`; `wait` has not reported it yet.
  Killed(ExitStatus),
  Finished(ExitStatus),
}

/// Environment change recorded by the builder, applied in order at spawn.
#[derive(Debug, Clone)]
enum EnvOp {
  Set(OsString, OsString),
  Remove(OsString),
  Clear,
}

/// One external process, configured but not started.
///
/// Program names without a path separator are looked up on `PATH` when the
/// `Cmd` is created; the resolved path is what [`program`](Stage::program)
/// reports. A failed lookup is reported by `start`.
///
/// Stream slots left unset inherit the parent's streams.
#[derive(Debug)]
pub struct Cmd {
  name: OsString,
  path: PathBuf,
  lookup_error: Option<String>,
  args: Vec<OsString>,
  env_ops: Vec<EnvOp>,
  current_dir: Option<PathBuf>,
  stdin: Option<Input>,
  stdout: Option<Output>,
  stderr: Option<Output>,
  stdout_piped: bool,
  state: ProcessState,
  copiers: Vec<JoinHandle<io::Result<()>>>,
}

impl Cmd {
  pub fn new(program: impl AsRef<OsStr>) -> Self {
    let name = program.as_ref().to_os_string();
    let (path, lookup_error) = resolve_program(&name);
    if let Some(reason) = &lookup_error {
      event!(Level::DEBUG, program = ?name, %reason, "Program lookup failed, deferring error to start.");
    }
    Self {
      name,
      path,
      lookup_error,
      args: Vec::new(),
      env_ops: Vec::new(),
      current_dir: None,
      stdin: None,
      stdout: None,
      stderr: None,
      stdout_piped: false,
      state: ProcessState::NotStarted,
      copiers: Vec::new(),
    }
  }

  pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
    self.args.push(arg.as_ref().to_os_string());
    self
  }

  pub fn args<I, A>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
  {
    self.args.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
    self
  }

  pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
    self
      .env_ops
      .push(EnvOp::Set(key.as_ref().to_os_string(), value.as_ref().to_os_string()));
    self
  }

  pub fn env_remove(mut self, key: impl AsRef<OsStr>) -> Self {
    self.env_ops.push(EnvOp::Remove(key.as_ref().to_os_string()));
    self
  }

  /// Starts the process from an empty environment, keeping only variables
  /// set after this call.
  pub fn env_clear(mut self) -> Self {
    self.env_ops.push(EnvOp::Clear);
    self
  }

  pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.current_dir = Some(dir.into());
    self
  }

  pub fn stdin(mut self, input: Input) -> Self {
    self.set_stdin(input);
    self
  }

  pub fn stdout(mut self, output: impl Into<Output>) -> Self {
    self.set_stdout(output);
    self
  }

  pub fn stderr(mut self, output: impl Into<Output>) -> Self {
    self.stderr = Some(output.into());
    self
  }

  /// Replaces the stdin slot. On a wired, non-first pipeline stage this
  /// disconnects it from the previous stage.
  pub fn set_stdin(&mut self, input: Input) {
    self.stdin = Some(input);
  }

  /// Replaces the stdout slot. On a wired, non-last pipeline stage this
  /// disconnects it from the next stage.
  pub fn set_stdout(&mut self, output: impl Into<Output>) {
    self.stdout = Some(output.into());
    self.stdout_piped = false;
  }

  pub fn set_stderr_output(&mut self, output: impl Into<Output>) {
    self.stderr = Some(output.into());
  }

  /// Path the process is spawned from.
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn get_args(&self) -> &[OsString] {
    &self.args
  }

  /// OS process id while the process is running.
  pub fn id(&self) -> Option<u32> {
    match &self.state {
      ProcessState::Running(child) => Some(child.id()),
      _ => None,
    }
  }

  /// Exit status once `wait` has reaped the process.
  pub fn exit_status(&self) -> Option<ExitStatus> {
    match self.state {
      ProcessState::Killed(status) | ProcessState::Finished(status) => Some(status),
      _ => None,
    }
  }

  /// Polls the child without blocking. `false` before start and after the
  /// process exited.
  pub fn is_running(&mut self) -> bool {
    match &mut self.state {
      ProcessState::Running(child) => matches!(child.try_wait(), Ok(None)),
      _ => false,
    }
  }

  fn display_name(&self) -> String {
    self.path.to_string_lossy().into_owned()
  }

  /// Opens the read end of a fresh pipe whose write end becomes this
  /// process's stdout.
  pub fn stdout_pipe(&mut self) -> CmdResult<PipeReader> {
    if !matches!(self.state, ProcessState::NotStarted) {
      return Err(CmdError::AlreadyStarted {
        program: self.display_name(),
      });
    }
    if self.stdout.is_some() {
      return Err(CmdError::StdoutAlreadySet);
    }
    let (reader, writer) = io::pipe().map_err(|source| CmdError::Pipe { source })?;
    self.stdout = Some(Output::Pipe(writer));
    self.stdout_piped = true;
    Ok(reader)
  }

  fn build_std_command(&self) -> Command {
    let mut command = Command::new(&self.path);
    command.args(&self.args);
    for op in &self.env_ops {
      match op {
        EnvOp::Set(key, value) => {
          command.env(key, value);
        }
        EnvOp::Remove(key) => {
          command.env_remove(key);
        }
        EnvOp::Clear => {
          command.env_clear();
        }
      }
    }
    if let Some(dir) = &self.current_dir {
      command.current_dir(dir);
    }
    command
  }

  /// Spawns the process.
  ///
  /// The stream slots are consumed: the parent's copies of any pipe ends are
  /// closed once the child holds them, so readers downstream see EOF when
  /// the child exits.
  #[instrument(name = "Cmd::start", skip_all, fields(program = %self.path.display()), err(Display))]
  pub fn start(&mut self) -> CmdResult<()> {
    if !matches!(self.state, ProcessState::NotStarted) {
      return Err(CmdError::AlreadyStarted {
        program: self.display_name(),
      });
    }
    if let Some(reason) = &self.lookup_error {
      return Err(CmdError::NotFound {
        program: self.name.to_string_lossy().into_owned(),
        reason: reason.clone(),
      });
    }

    let mut command = self.build_std_command();

    let mut stdin_feed = None;
    command.stdin(match self.stdin.take() {
      None | Some(Input::Inherit) => Stdio::inherit(),
      Some(Input::Null) => Stdio::null(),
      Some(Input::File(file)) => Stdio::from(file),
      Some(Input::Pipe(reader)) => Stdio::from(reader),
      Some(Input::Reader(reader)) => {
        stdin_feed = Some(reader);
        Stdio::piped()
      }
    });
    let (stdout_stdio, stdout_sink) = output_stdio(self.stdout.take());
    command.stdout(stdout_stdio);
    let (stderr_stdio, stderr_sink) = output_stdio(self.stderr.take());
    command.stderr(stderr_stdio);
    self.stdout_piped = false;

    let mut child = command.spawn().map_err(|source| CmdError::Spawn {
      program: self.display_name(),
      source,
    })?;
    // Drops the parent's handles on every Stdio passed to the child.
    drop(command);
    event!(Level::DEBUG, pid = child.id(), "Process spawned.");

    let program = self.display_name();
    let copiers = spawn_copiers(&program, &mut child, stdin_feed, stdout_sink, stderr_sink);
    self.state = ProcessState::Running(child);
    match copiers {
      Ok(copiers) => {
        self.copiers = copiers;
        Ok(())
      }
      Err(source) => {
        // The child is running but its streams cannot be serviced. `kill`
        // also reaps it.
        if let Err(kill_err) = self.kill() {
          event!(Level::WARN, error = %kill_err, "Ignoring failure to kill process after copier setup failed.");
        }
        Err(CmdError::Io { program, source })
      }
    }
  }

  fn wait_child(&mut self) -> CmdResult<ExitStatus> {
    let program = self.display_name();
    let status = match &mut self.state {
      ProcessState::NotStarted => return Err(CmdError::NotStarted { program }),
      ProcessState::Finished(_) => return Err(CmdError::AlreadyWaited { program }),
      ProcessState::Killed(status) => *status,
      ProcessState::Running(child) => child.wait().map_err(|source| CmdError::Wait {
        program: program.clone(),
        source,
      })?,
    };
    self.state = ProcessState::Finished(status);
    Ok(status)
  }

  /// Blocks until the process exits and every stream copier has finished.
  ///
  /// A non-success exit status is reported as [`CmdError::Exit`].
  #[instrument(name = "Cmd::wait", skip_all, fields(program = %self.path.display()))]
  pub fn wait(&mut self) -> CmdResult<()> {
    let status = self.wait_child()?;
    let program = self.display_name();

    let mut copy_error = None;
    for copier in self.copiers.drain(..) {
      let outcome = copier
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("stream copier thread panicked")));
      if let Err(source) = outcome {
        event!(Level::WARN, error = %source, "Stream copy failed.");
        copy_error.get_or_insert(source);
      }
    }

    event!(Level::DEBUG, %status, "Process exited.");
    if !status.success() {
      return Err(CmdError::Exit { program, status });
    }
    match copy_error {
      Some(source) => Err(CmdError::Io { program, source }),
      None => Ok(()),
    }
  }

  /// Sends SIGKILL (or the platform equivalent) to a started process and
  /// reaps it.
  ///
  /// Stream copier threads are detached, not joined: a stdin feeder may be
  /// blocked reading its source and would never return. A later `wait`
  /// reports the kill as [`CmdError::Exit`] without blocking.
  pub fn kill(&mut self) -> CmdResult<()> {
    let program = self.display_name();
    let status = match &mut self.state {
      ProcessState::NotStarted => return Err(CmdError::NotStarted { program }),
      // Already reaped; nothing left to kill.
      ProcessState::Killed(_) | ProcessState::Finished(_) => return Ok(()),
      ProcessState::Running(child) => {
        event!(Level::DEBUG, pid = child.id(), "Killing process.");
        child.kill().map_err(|source| CmdError::Kill {
          program: program.clone(),
          source,
        })?;
        child.wait().map_err(|source| CmdError::Wait { program, source })?
      }
    };
    event!(Level::DEBUG, %status, detached_copiers = self.copiers.len(), "Killed process reaped.");
    self.copiers.clear();
    self.state = ProcessState::Killed(status);
    Ok(())
  }
}

impl Stage for Cmd {
  type Error = CmdError;
  type Reader = PipeReader;
  type Sink = SharedWriter;

  fn stdout_pipe(&mut self) -> Result<PipeReader, CmdError> {
    Cmd::stdout_pipe(self)
  }

  fn release_stdout_pipe(&mut self) {
    if self.stdout_piped {
      self.stdout = None;
      self.stdout_piped = false;
    }
  }

  fn set_stdin_pipe(&mut self, reader: PipeReader) {
    self.stdin = Some(Input::Pipe(reader));
  }

  fn set_stderr(&mut self, sink: SharedWriter) {
    self.stderr = Some(Output::Writer(sink));
  }

  fn start(&mut self) -> Result<(), CmdError> {
    Cmd::start(self)
  }

  fn wait(&mut self) -> Result<(), CmdError> {
    Cmd::wait(self)
  }

  fn kill(&mut self) -> Result<(), CmdError> {
    Cmd::kill(self)
  }

  fn program(&self) -> Cow<'_, str> {
    self.path.to_string_lossy()
  }

  fn args(&self) -> Vec<Cow<'_, str>> {
    self.args.iter().map(|a| a.to_string_lossy()).collect()
  }
}

/// Resolves `name` the way a shell would. Names containing a path separator
/// are taken as-is.
fn resolve_program(name: &OsStr) -> (PathBuf, Option<String>) {
  let as_path = Path::new(name);
  if as_path.components().count() > 1 || as_path.is_absolute() {
    return (as_path.to_path_buf(), None);
  }
  match which::which(name) {
    Ok(path) => (path, None),
    Err(err) => (as_path.to_path_buf(), Some(err.to_string())),
  }
}

/// Splits an output slot into the `Stdio` handed to the child and, for
/// in-process sinks, the writer a copier thread must drain into.
fn output_stdio(output: Option<Output>) -> (Stdio, Option<SharedWriter>) {
  match output {
    None | Some(Output::Inherit) => (Stdio::inherit(), None),
    Some(Output::Null) => (Stdio::null(), None),
    Some(Output::File(file)) => (Stdio::from(file), None),
    Some(Output::Pipe(writer)) => (Stdio::from(writer), None),
    Some(Output::Writer(sink)) => (Stdio::piped(), Some(sink)),
  }
}

/// Starts one thread per stream that needs copying.
///
/// On error, threads already spawned are detached; the caller kills the
/// child, which ends the stdout and stderr drains. A stdin feeder ends once
/// its source does.
fn spawn_copiers(
  program: &str,
  child: &mut Child,
  stdin_feed: Option<Box<dyn Read + Send>>,
  stdout_sink: Option<SharedWriter>,
  stderr_sink: Option<SharedWriter>,
) -> io::Result<Vec<JoinHandle<io::Result<()>>>> {
  let mut copiers = Vec::new();

  if let (Some(mut reader), Some(mut child_stdin)) = (stdin_feed, child.stdin.take()) {
    copiers.push(spawn_named(program, "stdin", move || {
      match io::copy(&mut reader, &mut child_stdin) {
        Ok(_) => Ok(()),
        // The child stopped reading; it decides its own outcome.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(e),
      }
    })?);
  }
  if let (Some(sink), Some(child_stdout)) = (stdout_sink, child.stdout.take()) {
    copiers.push(spawn_named(program, "stdout", move || drain(child_stdout, sink))?);
  }
  if let (Some(sink), Some(child_stderr)) = (stderr_sink, child.stderr.take()) {
    copiers.push(spawn_named(program, "stderr", move || drain(child_stderr, sink))?);
  }

  Ok(copiers)
}

fn spawn_named<F>(program: &str, stream: &str, f: F) -> io::Result<JoinHandle<io::Result<()>>>
where
  F: FnOnce() -> io::Result<()> + Send + 'static,
{
  let name = Path::new(program)
    .file_name()
    .map_or_else(|| program.to_string(), |n| n.to_string_lossy().into_owned());
  thread::Builder::new().name(format!("{name}-{stream}")).spawn(f)
}

fn drain(mut from: impl Read, mut sink: SharedWriter) -> io::Result<()> {
  io::copy(&mut from, &mut sink)?;
  sink.flush()
}
