// procpipe/examples/echo_sed.rs
//
// echo hi | sed s/h/H/ | sed s/i/ello/   =>   Hello

use procpipe::{Cmd, Output, Pipeline};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut pipeline = Pipeline::new(vec![
    Cmd::new("echo").arg("hi"),
    Cmd::new("sed").arg("s/h/H/"),
    Cmd::new("sed").arg("s/i/ello/"),
  ])?;
  info!(command_line = %pipeline, "Pipeline built.");

  // Let the last stage write straight to our stdout.
  pipeline.last_mut().set_stdout(Output::Inherit);

  pipeline.start()?;

  let errors = pipeline.wait();
  if !errors.is_empty() {
    for err in &errors {
      error!(error = %err, "Stage failed.");
    }
    anyhow::bail!("{} stage(s) failed", errors.len());
  }
  Ok(())
}
