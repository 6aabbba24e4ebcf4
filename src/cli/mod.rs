//! Command-line interface for stepforge.
//!
//! Provides commands to run a task, compile it to a bash script, run a
//! single function step, and list the declared steps.

mod commands;

pub use commands::{
    collect_inputs, describe_steps, parse_cli, run, run_with_cli, Cli, Commands, InputArgs,
};
