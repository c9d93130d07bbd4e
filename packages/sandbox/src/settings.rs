// ABOUTME: Harness settings loaded from environment variables with built-in defaults
// ABOUTME: Resolves host share paths, guest deployment paths, and the readiness policy

use crate::providers::wsb::{DEFAULT_LAUNCHER_PATH, DEFAULT_WSB_PATH};
use crate::readiness::ReadinessPolicy;
use crate::types::{FailurePolicy, RunAs};
use harness_config::constants::*;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GUEST_SOURCE: &str = r"C:\Users\WDAGUtilityAccount\Desktop\release";
pub const DEFAULT_GUEST_DEST: &str = r"C:\Users\WDAGUtilityAccount\Desktop\IME";
pub const DEFAULT_LIBRARY: &str = "ime.dll";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid number for {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        #[source]
        source: ParseIntError,
    },
    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
    #[error("Could not find workspace root (Cargo.toml with [workspace]) above {0}")]
    WorkspaceRootNotFound(PathBuf),
    #[error("Failed to read current directory: {0}")]
    CurrentDir(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessSettings {
    pub wsb_path: PathBuf,
    pub launcher_path: PathBuf,
    /// Release build output, shared read-only
    pub bin_dir: PathBuf,
    /// Log directory, shared read-write
    pub log_dir: PathBuf,
    /// Where the shared release directory appears inside the guest
    pub guest_source: String,
    /// Guest install directory the release tree is copied into
    pub guest_dest: String,
    /// Shared library registered after the copy
    pub library: String,
    pub run_as: RunAs,
    pub failure_policy: FailurePolicy,
    pub readiness: ReadinessPolicy,
}

impl HarnessSettings {
    /// Defaults with host paths relative to a workspace root
    pub fn for_workspace(root: &Path) -> Self {
        Self {
            wsb_path: PathBuf::from(DEFAULT_WSB_PATH),
            launcher_path: PathBuf::from(DEFAULT_LAUNCHER_PATH),
            bin_dir: root.join("target").join("release"),
            log_dir: root.join("log"),
            guest_source: DEFAULT_GUEST_SOURCE.to_string(),
            guest_dest: DEFAULT_GUEST_DEST.to_string(),
            library: DEFAULT_LIBRARY.to_string(),
            run_as: RunAs::ExistingLogin,
            failure_policy: FailurePolicy::default(),
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    ///
    /// The workspace root is only searched for when a host directory is not
    /// given explicitly. See [`locate_workspace_root`] for the search order.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = if lookup(HARNESS_BIN_DIR).is_none() || lookup(HARNESS_LOG_DIR).is_none() {
            locate_workspace_root()?
        } else {
            PathBuf::new()
        };
        Self::from_lookup_at(lookup, &root)
    }

    /// Like [`HarnessSettings::from_lookup`], but with default host
    /// directories under `root` instead of a discovered workspace.
    ///
    /// Commands that never touch the host directories use this to avoid
    /// failing outside a checkout.
    pub fn from_lookup_at<F>(lookup: F, root: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::for_workspace(root);
        if let Some(dir) = lookup(HARNESS_BIN_DIR) {
            settings.bin_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(HARNESS_LOG_DIR) {
            settings.log_dir = PathBuf::from(dir);
        }

        if let Some(path) = lookup(HARNESS_WSB_PATH) {
            settings.wsb_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(HARNESS_LAUNCHER_PATH) {
            settings.launcher_path = PathBuf::from(path);
        }
        if let Some(source) = lookup(HARNESS_GUEST_SOURCE) {
            settings.guest_source = source;
        }
        if let Some(dest) = lookup(HARNESS_GUEST_DEST) {
            settings.guest_dest = dest;
        }
        if let Some(library) = lookup(HARNESS_LIBRARY) {
            settings.library = library;
        }

        if let Some(value) = lookup(HARNESS_RUN_AS) {
            settings.run_as = value
                .parse::<RunAs>()
                .map_err(|message| ConfigError::InvalidValue {
                    name: HARNESS_RUN_AS,
                    message,
                })?;
        }
        if let Some(value) = lookup(HARNESS_FAILURE_POLICY) {
            settings.failure_policy =
                value
                    .parse::<FailurePolicy>()
                    .map_err(|message| ConfigError::InvalidValue {
                        name: HARNESS_FAILURE_POLICY,
                        message,
                    })?;
        }

        if let Some(secs) = parse_u64(&lookup, HARNESS_READY_TIMEOUT_SECS)? {
            settings.readiness.timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_u64(&lookup, HARNESS_POLL_INTERVAL_MS)? {
            settings.readiness.initial_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(&lookup, HARNESS_POLL_MAX_INTERVAL_MS)? {
            settings.readiness.max_interval = Duration::from_millis(ms);
        }

        settings
            .readiness
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                name: readiness_variable(&settings.readiness, &lookup),
                message: e.to_string(),
            })?;

        Ok(settings)
    }
}

fn parse_u64<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|source| ConfigError::InvalidNumber { name, source })
        })
        .transpose()
}

/// The variable responsible for an invalid readiness policy.
///
/// Only the timeout and the two intervals are read from the environment.
fn readiness_variable<F>(policy: &ReadinessPolicy, lookup: &F) -> &'static str
where
    F: Fn(&str) -> Option<String>,
{
    if policy.timeout.is_zero() {
        HARNESS_READY_TIMEOUT_SECS
    } else if lookup(HARNESS_POLL_INTERVAL_MS).is_some() {
        HARNESS_POLL_INTERVAL_MS
    } else {
        HARNESS_POLL_MAX_INTERVAL_MS
    }
}

/// Locate the workspace whose `target/release` and `log` directories are shared.
///
/// Searches upward from the current directory, then from the running
/// executable (which normally lives under `target/`), then from the
/// directory this crate was built from.
pub fn locate_workspace_root() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir()?;
    let mut starts = vec![cwd.clone()];
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        starts.push(dir);
    }
    starts.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")));

    starts
        .iter()
        .find_map(|start| find_workspace_root(start).ok())
        .ok_or(ConfigError::WorkspaceRootNotFound(cwd))
}

/// Find the workspace root by looking for Cargo.toml with [workspace] in `start` or its parents
pub fn find_workspace_root(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let cargo_toml = current.join("Cargo.toml");
        if let Ok(content) = std::fs::read_to_string(&cargo_toml) {
            if content.contains("[workspace]") {
                return Ok(current);
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Err(ConfigError::WorkspaceRootNotFound(start.to_path_buf())),
        }
    }
}
