// ABOUTME: Library half of the harness CLI
// ABOUTME: Command definitions, dispatch, and logging setup shared with the binary

pub mod commands;
pub mod logging;

pub use commands::{execute, render_report, render_steps, Cli, Commands};
pub use logging::init_tracing;
