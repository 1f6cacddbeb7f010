//! End-to-end scheduler scenarios against a scripted agent.

mod common;

use common::{harness, phase, resumed_harness, snapshot_names, test_config, ScriptedRun};
use specforge::domain::models::{AgentExit, BuildConfig, PhaseStatus};

#[tokio::test]
async fn test_happy_path_two_phases() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        test_config(),
        vec![
            phase("phase_1", "Foundation", &[]),
            phase("phase_2", "Data Layer", &["phase_1"]),
        ],
        vec![
            ScriptedRun::success("main.go", 0.01, 3),
            ScriptedRun::success("todo.go", 0.01, 3),
        ],
        dir.path(),
    );

    let outcome = h.scheduler.run().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.phases_run, 2);

    let memory = h.memory.read().await;
    for id in ["phase_1", "phase_2"] {
        let p = memory.phase(id).unwrap();
        assert_eq!(p.status, PhaseStatus::Success, "{id}");
        assert!(p.meets_success_criteria(), "{id}");
    }
    assert_eq!(memory.memory().completed_phases, vec!["phase_1", "phase_2"]);

    let summary = h.ledger.read().await.summary();
    assert!((summary.total_cost - 0.02).abs() < 1e-9);
    assert_eq!(summary.session_count, 2);

    let names = snapshot_names(dir.path());
    assert_eq!(
        names,
        vec!["completed_phase_1", "completed_phase_2", "final"]
    );
}

#[tokio::test]
async fn test_retry_on_transient_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        max_retries: 2,
        ..test_config()
    };
    let h = harness(
        config,
        vec![phase("phase_1", "Foundation", &[])],
        vec![
            ScriptedRun::crash("transient agent failure"),
            ScriptedRun::success("main.go", 0.01, 2),
        ],
        dir.path(),
    );

    let outcome = h.scheduler.run().await.unwrap();
    assert!(outcome.success);

    let memory = h.memory.read().await;
    let p = memory.phase("phase_1").unwrap();
    assert_eq!(p.status, PhaseStatus::Success);
    assert_eq!(p.retry_count, 1);
    // The first failure is in the error log even though the phase recovered.
    assert_eq!(memory.memory().error_log.len(), 1);
}

#[tokio::test]
async fn test_max_retries_zero_fails_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        test_config(),
        vec![phase("phase_1", "Foundation", &[])],
        vec![
            ScriptedRun::crash("boom"),
            // Never reached: no retry is allowed.
            ScriptedRun::success("main.go", 0.01, 1),
        ],
        dir.path(),
    );

    let outcome = h.scheduler.run().await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.exit_code, 1);

    let memory = h.memory.read().await;
    let p = memory.phase("phase_1").unwrap();
    assert_eq!(p.status, PhaseStatus::Failed);
    assert_eq!(p.retry_count, 0);
    assert!(p.error.as_deref().unwrap().contains("exited with code 1"));

    // A `failed` checkpoint marks the surfaced error.
    assert!(snapshot_names(dir.path()).contains(&"failed".to_string()));
}

#[tokio::test]
async fn test_skip_under_continue_on_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = BuildConfig {
        continue_on_error: true,
        ..test_config()
    };
    let h = harness(
        config,
        vec![
            phase("phase_a", "Foundation", &[]),
            phase("phase_b", "Data Layer", &["phase_a"]),
        ],
        vec![ScriptedRun::crash("permanently broken")],
        dir.path(),
    );

    let outcome = h.scheduler.run().await.unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert!(!outcome.success);
    assert_eq!(outcome.phases_failed, 1);
    assert_eq!(outcome.phases_skipped, 1);

    let memory = h.memory.read().await;
    assert_eq!(memory.phase("phase_a").unwrap().status, PhaseStatus::Failed);
    assert_eq!(memory.phase("phase_b").unwrap().status, PhaseStatus::Skipped);

    assert!(snapshot_names(dir.path()).contains(&"final".to_string()));
}

#[tokio::test]
async fn test_resume_after_interrupt() {
    let dir = tempfile::tempdir().unwrap();

    // First run: phase_1 completes, phase_2 is cancelled mid-stream.
    let h = harness(
        test_config(),
        vec![
            phase("phase_1", "Foundation", &[]),
            phase("phase_2", "Data Layer", &["phase_1"]),
            phase("phase_3", "Business Logic", &["phase_2"]),
        ],
        vec![
            ScriptedRun::success("main.go", 0.01, 3),
            ScriptedRun {
                lines: vec![r#"{"type":"system","subtype":"init","session_id":"S2"}"#.to_string()],
                exit: AgentExit::Cancelled,
            },
        ],
        dir.path(),
    );
    let outcome = h.scheduler.run().await.unwrap();
    assert!(outcome.interrupted);
    assert_eq!(outcome.exit_code, 130);
    {
        let memory = h.memory.read().await;
        assert_eq!(memory.memory().completed_phases, vec!["phase_1"]);
        assert_eq!(
            memory.phase("phase_2").unwrap().status,
            PhaseStatus::Cancelled
        );
    }
    assert!(snapshot_names(dir.path()).contains(&"interrupted".to_string()));

    // Second run resumes from the snapshot and completes the rest.
    let h2 = resumed_harness(
        test_config(),
        vec![
            ScriptedRun::success("todo.go", 0.01, 2),
            ScriptedRun::success("store.go", 0.01, 2),
        ],
        dir.path(),
    );
    let outcome = h2.scheduler.run().await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.phases_run, 2, "phase_1 is not re-run");

    let memory = h2.memory.read().await;
    assert_eq!(
        memory.memory().completed_phases,
        vec!["phase_1", "phase_2", "phase_3"]
    );

    // Only the cost events actually emitted in this run are counted.
    let summary = h2.ledger.read().await.summary();
    assert!((summary.total_cost - 0.02).abs() < 1e-9);
    assert_eq!(summary.session_count, 2);
}

#[tokio::test]
async fn test_timeout_retains_partial_files() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        test_config(),
        vec![phase("phase_1", "Foundation", &[])],
        vec![ScriptedRun {
            lines: vec![
                r#"{"type":"system","subtype":"init","session_id":"S"}"#.to_string(),
                r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Write","input":{"file_path":"partial.go"}}]}}"#
                    .to_string(),
            ],
            exit: AgentExit::TimedOut,
        }],
        dir.path(),
    );

    let outcome = h.scheduler.run().await.unwrap();
    assert!(!outcome.success);

    let memory = h.memory.read().await;
    let p = memory.phase("phase_1").unwrap();
    assert_eq!(p.status, PhaseStatus::Failed);
    assert!(p.error.as_deref().unwrap().contains("timed out"));
    // The partially-written file stays listed on the phase.
    assert_eq!(p.files_created, vec!["partial.go"]);
}

#[tokio::test]
async fn test_phase_without_files_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        test_config(),
        vec![phase("phase_1", "Foundation", &[])],
        vec![ScriptedRun {
            lines: vec![
                r#"{"type":"result","subtype":"success","cost_usd":0.01,"num_turns":1,"result":"did nothing"}"#
                    .to_string(),
            ],
            exit: AgentExit::Completed {
                exit_code: 0,
                stderr: String::new(),
            },
        }],
        dir.path(),
    );

    let outcome = h.scheduler.run().await.unwrap();
    assert!(!outcome.success);
    let memory = h.memory.read().await;
    let p = memory.phase("phase_1").unwrap();
    assert_eq!(p.status, PhaseStatus::Failed);
    assert!(p.error.as_deref().unwrap().contains("no files"));
}

#[tokio::test]
async fn test_error_max_turns_drives_failure() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        test_config(),
        vec![phase("phase_1", "Foundation", &[])],
        vec![ScriptedRun {
            lines: vec![
                r#"{"type":"result","subtype":"error_max_turns","num_turns":30}"#.to_string(),
            ],
            exit: AgentExit::Completed {
                exit_code: 0,
                stderr: String::new(),
            },
        }],
        dir.path(),
    );

    let outcome = h.scheduler.run().await.unwrap();
    assert!(!outcome.success);
    let memory = h.memory.read().await;
    assert_eq!(
        memory.phase("phase_1").unwrap().error.as_deref(),
        Some("maximum turns exceeded")
    );
}

#[tokio::test]
async fn test_event_order_reflected_in_registry() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        test_config(),
        vec![phase("phase_1", "Foundation", &[])],
        vec![ScriptedRun::success("main.go", 0.01, 3)],
        dir.path(),
    );
    h.scheduler.run().await.unwrap();

    let registry = h.registry.read().await;
    let stats = registry.statistics();
    assert_eq!(stats.total_calls, 1);
    assert_eq!(stats.calls_by_name["Write"], 1);
    assert_eq!(registry.success_rate("Write"), Some(1.0));

    let memory = h.memory.read().await;
    assert_eq!(
        memory.phase("phase_1").unwrap().tool_call_ids,
        vec!["t-main.go"]
    );
}
