//! Command-Line Interface
//!
//! Command implementations plus the console output helpers they share.
//! Argument parsing lives in `main.rs`.

pub mod commands;
pub mod output;
pub mod util;

pub use output::Output;
