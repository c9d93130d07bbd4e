// ABOUTME: Configuration constants shared by the sandbox harness packages
// ABOUTME: Re-exports the environment variable names read at startup

pub mod constants;

pub use constants::*;
