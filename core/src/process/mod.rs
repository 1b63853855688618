// procpipe/src/process/mod.rs

//! The `std::process`-backed stage and its stream types.

pub mod cmd;
pub mod io;

pub use cmd::Cmd;
pub use io::{Capture, Input, Output, SharedWriter};
