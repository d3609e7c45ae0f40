//! Command-line interface for the `reviews` binary.

mod commands;
mod helpers;

pub use commands::{is_verbose, run};
