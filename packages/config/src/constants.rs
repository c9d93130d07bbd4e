// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used by the harness

// Control surface
pub const HARNESS_WSB_PATH: &str = "HARNESS_WSB_PATH";
pub const HARNESS_LAUNCHER_PATH: &str = "HARNESS_LAUNCHER_PATH";

// Host directories shared into the guest
pub const HARNESS_BIN_DIR: &str = "HARNESS_BIN_DIR";
pub const HARNESS_LOG_DIR: &str = "HARNESS_LOG_DIR";

// Guest-side deployment
pub const HARNESS_GUEST_SOURCE: &str = "HARNESS_GUEST_SOURCE";
pub const HARNESS_GUEST_DEST: &str = "HARNESS_GUEST_DEST";
pub const HARNESS_LIBRARY: &str = "HARNESS_LIBRARY";
pub const HARNESS_RUN_AS: &str = "HARNESS_RUN_AS";
pub const HARNESS_FAILURE_POLICY: &str = "HARNESS_FAILURE_POLICY";

// Readiness wait
pub const HARNESS_READY_TIMEOUT_SECS: &str = "HARNESS_READY_TIMEOUT_SECS";
pub const HARNESS_POLL_INTERVAL_MS: &str = "HARNESS_POLL_INTERVAL_MS";
pub const HARNESS_POLL_MAX_INTERVAL_MS: &str = "HARNESS_POLL_MAX_INTERVAL_MS";
