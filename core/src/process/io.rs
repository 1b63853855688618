// procpipe/src/process/io.rs

//! Stream slots for a [`Cmd`](super::Cmd): where its stdin comes from and
//! where its stdout/stderr go.

use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::io::{self, PipeReader, PipeWriter, Read, Write};
use std::sync::Arc;

/// Source of a process's stdin.
pub enum Input {
  Inherit,
  Null,
  File(File),
  /// Read end of an OS pipe. This is what pipeline wiring installs.
  Pipe(PipeReader),
  /// Arbitrary reader, copied into the child's stdin on a background thread.
  Reader(Box<dyn Read + Send>),
}

impl Input {
  /// Feeds `bytes` to the process, then closes its stdin.
  pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
    Input::Reader(Box::new(io::Cursor::new(bytes.into())))
  }
}

impl fmt::Debug for Input {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Input::Inherit => f.write_str("Inherit"),
      Input::Null => f.write_str("Null"),
      Input::File(file) => f.debug_tuple("File").field(file).finish(),
      Input::Pipe(_) => f.write_str("Pipe(..)"),
      Input::Reader(_) => f.write_str("Reader(..)"),
    }
  }
}

/// Destination of a process's stdout or stderr.
pub enum Output {
  Inherit,
  Null,
  File(File),
  /// Write end of an OS pipe. This is what `stdout_pipe` installs.
  Pipe(PipeWriter),
  /// In-process sink, drained from the child on a background thread.
  Writer(SharedWriter),
}

impl fmt::Debug for Output {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Output::Inherit => f.write_str("Inherit"),
      Output::Null => f.write_str("Null"),
      Output::File(file) => f.debug_tuple("File").field(file).finish(),
      Output::Pipe(_) => f.write_str("Pipe(..)"),
      Output::Writer(writer) => f.debug_tuple("Writer").field(writer).finish(),
    }
  }
}

impl From<SharedWriter> for Output {
  fn from(writer: SharedWriter) -> Self {
    Output::Writer(writer)
  }
}

impl From<Capture> for Output {
  fn from(capture: Capture) -> Self {
    Output::Writer(SharedWriter::new(capture))
  }
}

/// A writer that can be handed to several processes at once.
///
/// Clones share the same underlying writer; each write call holds the lock
/// for its duration, so chunks from different processes never tear.
#[derive(Clone)]
pub struct SharedWriter(Arc<Mutex<dyn Write + Send>>);

impl SharedWriter {
  pub fn new(writer: impl Write + Send + 'static) -> Self {
    SharedWriter(Arc::new(Mutex::new(writer)))
  }

  /// The parent's own stderr.
  pub fn stderr() -> Self {
    Self::new(io::stderr())
  }
}

impl Write for SharedWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().write(buf)
  }

  fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
    self.0.lock().write_all(buf)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.0.lock().flush()
  }
}

impl fmt::Debug for SharedWriter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SharedWriter(..)")
  }
}

impl From<Capture> for SharedWriter {
  fn from(capture: Capture) -> Self {
    SharedWriter::new(capture)
  }
}

/// In-memory byte sink. Clones share one buffer, so keep a clone to read
/// back what a process wrote.
#[derive(Clone, Debug, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
  pub fn new() -> Self {
    Self::default()
  }

  /// Copy of everything written so far.
  pub fn contents(&self) -> Vec<u8> {
    self.0.lock().clone()
  }

  pub fn to_string_lossy(&self) -> String {
    String::from_utf8_lossy(&self.0.lock()).into_owned()
  }

  pub fn is_empty(&self) -> bool {
    self.0.lock().is_empty()
  }
}

impl Write for Capture {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.0.lock().extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}
