// ABOUTME: Tracing subscriber setup for the harness binary
// ABOUTME: Honors RUST_LOG and falls back to info, or debug with --verbose

use tracing_subscriber::EnvFilter;

/// Filter used when RUST_LOG is not set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "harness_sandbox=debug,harness_cli=debug,info"
    } else {
        "info"
    }
}

pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A subscriber may already be installed when embedded in tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
