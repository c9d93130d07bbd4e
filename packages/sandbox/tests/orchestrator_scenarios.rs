// ABOUTME: Scenario tests for the sandbox orchestrator against a recording control surface
// ABOUTME: Covers cold start, warm start, malformed listings, idempotence, and failure policies

use async_trait::async_trait;
use harness_sandbox::{
    ExecResult, FailurePolicy, HarnessSettings, RemoteCommand, Result, RunState, SandboxControl,
    SandboxError, SandboxHandle, SandboxOrchestrator, SharedResource,
};
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    List,
    Launch,
    Share {
        handle: String,
        writable: bool,
    },
    Exec {
        handle: String,
        label: String,
        run_as: &'static str,
    },
}

/// Control surface that replays scripted listing output and records every call
struct RecordingControl {
    listings: Mutex<VecDeque<String>>,
    /// Returned once the scripted listings run out
    steady_listing: String,
    exec_exit_codes: Mutex<VecDeque<i32>>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingControl {
    fn new(listings: &[&str], steady_listing: &str) -> Self {
        Self {
            listings: Mutex::new(listings.iter().map(|s| s.to_string()).collect()),
            steady_listing: steady_listing.to_string(),
            exec_exit_codes: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_exit_codes(self, codes: &[i32]) -> Self {
        *self.exec_exit_codes.lock().unwrap() = codes.iter().copied().collect();
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SandboxControl for RecordingControl {
    async fn list_instances(&self) -> Result<String> {
        self.record(Call::List);
        let next = self.listings.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.steady_listing.clone()))
    }

    async fn launch(&self) -> Result<()> {
        self.record(Call::Launch);
        Ok(())
    }

    async fn share(&self, handle: &SandboxHandle, resource: &SharedResource) -> Result<()> {
        self.record(Call::Share {
            handle: handle.to_string(),
            writable: resource.writable(),
        });
        Ok(())
    }

    async fn exec(&self, handle: &SandboxHandle, command: &RemoteCommand) -> Result<ExecResult> {
        self.record(Call::Exec {
            handle: handle.to_string(),
            label: command.label.clone(),
            run_as: command.run_as.as_arg(),
        });
        let exit_code = self.exec_exit_codes.lock().unwrap().pop_front().unwrap_or(0);
        Ok(ExecResult {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: if exit_code == 0 {
                String::new()
            } else {
                format!("exit {}", exit_code)
            },
        })
    }
}

fn test_settings(temp: &TempDir) -> HarnessSettings {
    let mut settings = HarnessSettings::for_workspace(temp.path());
    settings.readiness.initial_interval = Duration::from_millis(1);
    settings.readiness.max_interval = Duration::from_millis(5);
    settings.readiness.randomization_factor = 0.0;
    settings
}

fn exec_labels(calls: &[Call]) -> Vec<(String, String)> {
    calls
        .iter()
        .filter_map(|call| match call {
            Call::Exec { handle, label, .. } => Some((handle.clone(), label.clone())),
            _ => None,
        })
        .collect()
}

/// Scenario A: nothing running, launch, three polls until "sbx-1" appears
#[tokio::test]
async fn test_cold_start_provisions_then_deploys() {
    let temp = TempDir::new().unwrap();
    let control = Arc::new(RecordingControl::new(&["\n", "\n", "\n"], "sbx-1\n"));
    let orchestrator = SandboxOrchestrator::new(control.clone(), test_settings(&temp));

    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.handle, SandboxHandle::new("sbx-1"));
    assert!(report.freshly_launched);
    assert_eq!(
        control.calls(),
        vec![
            Call::List,
            Call::Launch,
            Call::List,
            Call::List,
            Call::List,
            Call::Share {
                handle: "sbx-1".into(),
                writable: false
            },
            Call::Share {
                handle: "sbx-1".into(),
                writable: true
            },
            Call::Exec {
                handle: "sbx-1".into(),
                label: "copy".into(),
                run_as: "ExistingLogin"
            },
            Call::Exec {
                handle: "sbx-1".into(),
                label: "register".into(),
                run_as: "ExistingLogin"
            },
        ]
    );
    assert_eq!(
        report.states,
        vec![
            RunState::Checking,
            RunState::Launching,
            RunState::WaitingReady,
            RunState::Provisioning,
            RunState::Ready,
            RunState::Deploying,
            RunState::Installing,
            RunState::Done,
        ]
    );
}

/// Scenario B: an instance is already running
#[tokio::test]
async fn test_warm_start_skips_launch_and_shares() {
    let temp = TempDir::new().unwrap();
    let control = Arc::new(RecordingControl::new(&[], "sbx-1\n"));
    let orchestrator = SandboxOrchestrator::new(control.clone(), test_settings(&temp));

    let report = orchestrator.run().await.unwrap();

    assert!(!report.freshly_launched);
    assert_eq!(control.count(|c| matches!(c, Call::Launch)), 0);
    assert_eq!(control.count(|c| matches!(c, Call::Share { .. })), 0);
    assert_eq!(
        exec_labels(&control.calls()),
        vec![
            ("sbx-1".to_string(), "copy".to_string()),
            ("sbx-1".to_string(), "register".to_string()),
        ]
    );
    assert_eq!(
        report.states,
        vec![
            RunState::Checking,
            RunState::Ready,
            RunState::Deploying,
            RunState::Installing,
            RunState::Done,
        ]
    );
}

/// Scenario C: the listing has zero lines
#[tokio::test]
async fn test_zero_line_listing_surfaces_external_tool_failure() {
    let temp = TempDir::new().unwrap();
    let control = Arc::new(RecordingControl::new(&[], ""));
    let orchestrator = SandboxOrchestrator::new(control.clone(), test_settings(&temp));

    let err = orchestrator.query_running_instance().await.unwrap_err();
    assert!(err.is_external_tool_failure(), "unexpected error: {}", err);

    let err = orchestrator.run().await.unwrap_err();
    assert!(err.is_external_tool_failure(), "unexpected error: {}", err);
    assert_eq!(control.count(|c| matches!(c, Call::Launch)), 0);
    assert_eq!(control.count(|c| matches!(c, Call::Exec { .. })), 0);
}

#[tokio::test]
async fn test_malformed_listing_while_waiting_is_fatal() {
    let temp = TempDir::new().unwrap();
    let control = Arc::new(RecordingControl::new(&["\n", "\n"], ""));
    let orchestrator = SandboxOrchestrator::new(control.clone(), test_settings(&temp));

    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, SandboxError::MalformedOutput(_)));
    assert_eq!(control.count(|c| matches!(c, Call::Share { .. })), 0);
}

#[tokio::test]
async fn test_ensure_instance_twice_does_not_reshare() {
    let temp = TempDir::new().unwrap();
    let control = Arc::new(RecordingControl::new(&["\n"], "sbx-1\n"));
    let orchestrator = SandboxOrchestrator::new(control.clone(), test_settings(&temp));

    let first = orchestrator.ensure_instance().await.unwrap();
    let second = orchestrator.ensure_instance().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(control.count(|c| matches!(c, Call::Launch)), 1);
    assert_eq!(control.count(|c| matches!(c, Call::Share { .. })), 2);
}

/// A relaunch that comes back with an already provisioned id keeps the earlier shares
#[tokio::test]
async fn test_relaunch_with_known_handle_skips_shares() {
    let temp = TempDir::new().unwrap();
    let control = Arc::new(RecordingControl::new(&["\n", "sbx-1\n", "\n"], "sbx-1\n"));
    let orchestrator = SandboxOrchestrator::new(control.clone(), test_settings(&temp));

    let first = orchestrator.ensure_instance().await.unwrap();
    let second = orchestrator.ensure_instance().await.unwrap();

    assert_eq!(first, SandboxHandle::new("sbx-1"));
    assert_eq!(second, first);
    assert_eq!(control.count(|c| matches!(c, Call::Launch)), 2);
    assert_eq!(
        control.calls(),
        vec![
            Call::List,
            Call::Launch,
            Call::List,
            Call::Share {
                handle: "sbx-1".into(),
                writable: false
            },
            Call::Share {
                handle: "sbx-1".into(),
                writable: true
            },
            Call::List,
            Call::Launch,
            Call::List,
        ]
    );
}

#[tokio::test]
async fn test_continue_policy_runs_both_steps_then_fails() {
    let temp = TempDir::new().unwrap();
    let control = Arc::new(RecordingControl::new(&[], "sbx-1\n").with_exit_codes(&[4, 0]));
    let orchestrator = SandboxOrchestrator::new(control.clone(), test_settings(&temp));

    let err = orchestrator.run().await.unwrap_err();

    match err {
        SandboxError::DeployFailed(steps) => {
            let summary: Vec<(String, Option<i32>, bool)> = steps
                .iter()
                .map(|s| (s.label.clone(), s.exit_code, s.succeeded))
                .collect();
            assert_eq!(
                summary,
                vec![
                    ("copy".to_string(), Some(4), false),
                    ("register".to_string(), Some(0), true),
                ]
            );
            assert_eq!(steps[0].stderr, "exit 4");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(control.count(|c| matches!(c, Call::Exec { .. })), 2);
}

#[tokio::test]
async fn test_abort_policy_skips_registration_after_failed_copy() {
    let temp = TempDir::new().unwrap();
    let mut settings = test_settings(&temp);
    settings.failure_policy = FailurePolicy::AbortOnFirstFailure;
    let control = Arc::new(RecordingControl::new(&[], "sbx-1\n").with_exit_codes(&[4]));
    let orchestrator = SandboxOrchestrator::new(control.clone(), settings);

    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, SandboxError::RemoteCommandFailed { .. }));
    assert_eq!(
        exec_labels(&control.calls()),
        vec![("sbx-1".to_string(), "copy".to_string())]
    );
}

#[tokio::test]
async fn test_ignore_policy_completes_despite_failures() {
    let temp = TempDir::new().unwrap();
    let mut settings = test_settings(&temp);
    settings.failure_policy = FailurePolicy::Ignore;
    let control = Arc::new(RecordingControl::new(&[], "sbx-1\n").with_exit_codes(&[1, 5]));
    let orchestrator = SandboxOrchestrator::new(control.clone(), settings);

    let report = orchestrator.run().await.unwrap();

    let codes: Vec<Option<i32>> = report.steps.iter().map(|s| s.exit_code).collect();
    assert_eq!(codes, vec![Some(1), Some(5)]);
    assert!(report.steps.iter().all(|s| !s.succeeded));
}

#[tokio::test(start_paused = true)]
async fn test_cold_start_times_out_without_sharing() {
    let temp = TempDir::new().unwrap();
    let mut settings = test_settings(&temp);
    settings.readiness.timeout = Duration::from_secs(10);
    let control = Arc::new(RecordingControl::new(&[], "\n"));
    let orchestrator = SandboxOrchestrator::new(control.clone(), settings);

    let err = orchestrator.run().await.unwrap_err();

    assert!(matches!(err, SandboxError::ReadinessTimeout { seconds: 10 }));
    assert_eq!(control.count(|c| matches!(c, Call::Launch)), 1);
    assert_eq!(control.count(|c| matches!(c, Call::Share { .. })), 0);
    assert_eq!(control.count(|c| matches!(c, Call::Exec { .. })), 0);
}

#[tokio::test]
async fn test_deploy_existing_uses_running_instance() {
    let temp = TempDir::new().unwrap();
    let control = Arc::new(RecordingControl::new(&[], "sbx-7\n"));
    let orchestrator = SandboxOrchestrator::new(control.clone(), test_settings(&temp));

    let report = orchestrator.deploy_existing().await.unwrap();

    assert_eq!(report.handle, SandboxHandle::new("sbx-7"));
    assert_eq!(control.count(|c| matches!(c, Call::Launch)), 0);
    assert_eq!(control.count(|c| matches!(c, Call::Exec { .. })), 2);
    assert!(report.finished_at >= report.started_at);
}
