// procpipe/examples/shared_stderr.rs
//
// Feeds input to the first stage, captures the last stage's output, and
// collects every stage's stderr in one buffer.

use procpipe::{Capture, Cmd, Input, Pipeline, SharedWriter};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut pipeline = Pipeline::new(vec![
    Cmd::new("sh").args(["-c", "echo 'reading input' >&2; cat"]),
    Cmd::new("sort"),
    Cmd::new("sh").args(["-c", "echo 'numbering lines' >&2; cat -n"]),
  ])?;

  let out = Capture::new();
  let diagnostics = Capture::new();
  pipeline.first_mut().set_stdin(Input::bytes("pear\napple\nfig\n"));
  pipeline.last_mut().set_stdout(out.clone());
  pipeline.set_error_stream(SharedWriter::from(diagnostics.clone()));

  info!(command_line = %pipeline, "Running.");
  let errors = pipeline.run();
  for err in &errors {
    eprintln!("stage failed: {err}");
  }

  print!("{}", out.to_string_lossy());
  eprint!("--- stderr from all stages ---\n{}", diagnostics.to_string_lossy());

  if errors.is_empty() {
    Ok(())
  } else {
    anyhow::bail!("{} stage(s) failed", errors.len())
  }
}
