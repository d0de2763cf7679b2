//! Command-line interface module.

mod args;
pub mod clean;
pub mod serve;

pub use args::{Cli, Commands};
