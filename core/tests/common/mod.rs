// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use parking_lot::Mutex;
use procpipe::Stage;
use std::borrow::Cow;
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tracing::Level;

// --- Common Error Type for Tests ---
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum FakeError {
  #[error("stage {0}: pipe unavailable")]
  Pipe(usize),

  #[error("stage {0}: failed to start")]
  Start(usize),

  #[error("stage {0}: exited with status 1")]
  Exit(usize),

  #[error("stage {0}: kill failed")]
  Kill(usize),

  #[error("stage {0}: stdout already claimed")]
  StdoutClaimed(usize),
}

// --- Shared record of everything the fake stages saw ---
#[derive(Clone, Default)]
pub struct World {
  events: Arc<Mutex<Vec<String>>>,
  open_handles: Arc<AtomicUsize>,
}

impl World {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&self, event: String) {
    tracing::debug!(target: "fake_stage", %event);
    self.events.lock().push(event);
  }

  pub fn events(&self) -> Vec<String> {
    self.events.lock().clone()
  }

  pub fn events_starting_with(&self, prefix: &str) -> Vec<String> {
    self.events().into_iter().filter(|e| e.starts_with(prefix)).collect()
  }

  /// Pipe ends (read and write) currently open across all fake stages.
  pub fn open_handles(&self) -> usize {
    self.open_handles.load(Ordering::SeqCst)
  }

  fn open_handle(&self, from_stage: usize) -> FakeHandle {
    self.open_handles.fetch_add(1, Ordering::SeqCst);
    FakeHandle {
      from_stage,
      counter: self.open_handles.clone(),
    }
  }
}

/// One end of a fake pipe. Closing it (dropping) is visible in `World::open_handles`.
#[derive(Debug)]
pub struct FakeHandle {
  pub from_stage: usize,
  counter: Arc<AtomicUsize>,
}

impl Drop for FakeHandle {
  fn drop(&mut self) {
    self.counter.fetch_sub(1, Ordering::SeqCst);
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeState {
  Idle,
  Running,
  Killed,
  Exited,
}

/// In-memory `Stage` that journals every call instead of spawning anything.
pub struct FakeStage {
  pub index: usize,
  pub program: String,
  pub args: Vec<String>,
  pub state: FakeState,
  pub stdin: Option<FakeHandle>,
  pub stderr: Option<String>,
  stdout_writer: Option<FakeHandle>,
  stdout_claimed: bool,
  fail_pipe: bool,
  fail_start: bool,
  fail_wait: bool,
  fail_kill: bool,
  world: World,
}

impl FakeStage {
  pub fn new(world: &World, index: usize, program: &str, args: &[&str]) -> Self {
    Self {
      index,
      program: program.to_string(),
      args: args.iter().map(|a| a.to_string()).collect(),
      state: FakeState::Idle,
      stdin: None,
      stderr: None,
      stdout_writer: None,
      stdout_claimed: false,
      fail_pipe: false,
      fail_start: false,
      fail_wait: false,
      fail_kill: false,
      world: world.clone(),
    }
  }

  pub fn failing_pipe(mut self) -> Self {
    self.fail_pipe = true;
    self
  }

  pub fn failing_start(mut self) -> Self {
    self.fail_start = true;
    self
  }

  pub fn failing_wait(mut self) -> Self {
    self.fail_wait = true;
    self
  }

  pub fn failing_kill(mut self) -> Self {
    self.fail_kill = true;
    self
  }

  /// Simulates a caller-assigned stdout.
  pub fn with_claimed_stdout(mut self) -> Self {
    self.stdout_claimed = true;
    self
  }

  pub fn has_stdout_pipe(&self) -> bool {
    self.stdout_writer.is_some()
  }
}

impl Stage for FakeStage {
  type Error = FakeError;
  type Reader = FakeHandle;
  type Sink = String;

  fn stdout_pipe(&mut self) -> Result<FakeHandle, FakeError> {
    self.world.record(format!("pipe:{}", self.index));
    if self.fail_pipe {
      return Err(FakeError::Pipe(self.index));
    }
    if self.stdout_claimed || self.stdout_writer.is_some() {
      return Err(FakeError::StdoutClaimed(self.index));
    }
    self.stdout_writer = Some(self.world.open_handle(self.index));
    Ok(self.world.open_handle(self.index))
  }

  fn release_stdout_pipe(&mut self) {
    self.world.record(format!("release:{}", self.index));
    self.stdout_writer = None;
  }

  fn set_stdin_pipe(&mut self, reader: FakeHandle) {
    self.stdin = Some(reader);
  }

  fn set_stderr(&mut self, sink: String) {
    self.stderr = Some(sink);
  }

  fn start(&mut self) -> Result<(), FakeError> {
    self.world.record(format!("start:{}", self.index));
    if self.fail_start {
      return Err(FakeError::Start(self.index));
    }
    self.state = FakeState::Running;
    Ok(())
  }

  fn wait(&mut self) -> Result<(), FakeError> {
    self.world.record(format!("wait:{}", self.index));
    match self.state {
      FakeState::Killed => Err(FakeError::Exit(self.index)),
      _ if self.fail_wait => {
        self.state = FakeState::Exited;
        Err(FakeError::Exit(self.index))
      }
      _ => {
        self.state = FakeState::Exited;
        Ok(())
      }
    }
  }

  fn kill(&mut self) -> Result<(), FakeError> {
    self.world.record(format!("kill:{}", self.index));
    if self.fail_kill {
      return Err(FakeError::Kill(self.index));
    }
    self.state = FakeState::Killed;
    Ok(())
  }

  fn program(&self) -> Cow<'_, str> {
    Cow::Borrowed(&self.program)
  }

  fn args(&self) -> Vec<Cow<'_, str>> {
    self.args.iter().map(|a| Cow::Borrowed(a.as_str())).collect()
  }
}

/// `n` plain fake stages named `/bin/stage0`, `/bin/stage1`, ...
pub fn fake_stages(world: &World, n: usize) -> Vec<FakeStage> {
  (0..n)
    .map(|i| FakeStage::new(world, i, &format!("/bin/stage{i}"), &[]))
    .collect()
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
