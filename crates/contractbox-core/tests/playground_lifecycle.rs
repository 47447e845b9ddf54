//! End-to-end playground flow over the scripted runtime: boot, run the
//! file-agent example, parse the captured stream, render it.

use std::sync::Arc;
use std::time::Duration;

use contractbox_core::bootstrap::BootstrapConfig;
use contractbox_core::playground::{Playground, RunRequest};
use contractbox_core::render::{grouped_view, OutputBlock, Severity};
use contractbox_core::runtime::fakes::{FakeLoader, RunScript, ScriptedRuntime};
use contractbox_core::stage::RuntimeStage;
use contractbox_core::{parse_lines, OutputLine};

/// What the guard library would emit for the file-agent example: a denied
/// read of `/app/.env` followed by an executed read of `README.md`, with the
/// user's own prints interleaved.
fn file_agent_output() -> String {
    let denied = r#"{"schema_version": 1, "action": "call_denied", "tool_name": "read_file", "reason": "Sensitive file '/app/.env' blocked.", "decision_source": "contract", "decision_name": "block-sensitive-reads", "tool_success": null, "contracts_evaluated": [{"name": "block-sensitive-reads", "type": "pre", "passed": false, "message": "Sensitive file '/app/.env' blocked."}]}"#;
    let executed = r#"{"schema_version": 1, "action": "call_executed", "tool_name": "read_file", "reason": null, "decision_source": null, "decision_name": null, "tool_success": true, "contracts_evaluated": [{"name": "block-sensitive-reads", "type": "pre", "passed": true, "message": null}]}"#;
    format!(
        "{denied}\nDENIED: Sensitive file '/app/.env' blocked.\n{executed}\nOK: Contents of README.md\n"
    )
}

fn scripted_playground() -> (Arc<ScriptedRuntime>, Playground) {
    let runtime = Arc::new(ScriptedRuntime::new());
    let loader = Arc::new(FakeLoader::new(runtime.clone()));
    let playground = Playground::new(loader, BootstrapConfig::default());
    (runtime, playground)
}

#[tokio::test]
async fn test_deny_scenario_end_to_end() {
    let (runtime, playground) = scripted_playground();
    runtime.push_run(RunScript {
        stdout: file_agent_output(),
        stderr: String::new(),
        raise: None,
    });

    playground.start().await.unwrap();
    assert_eq!(playground.stage().stage, RuntimeStage::Ready);
    assert_eq!(runtime.installed(), vec!["covenant[yaml]".to_string()]);

    let report = match playground.run().await {
        RunRequest::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };
    assert!(report.outcome.runtime_error.is_none());

    let lines = parse_lines(&report.outcome.output);

    // Exactly one denial, and it references the sensitive path.
    let denials: Vec<_> = lines
        .iter()
        .filter_map(|line| match line {
            OutputLine::Audit { event } if event.action == "call_denied" => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(denials.len(), 1);
    assert!(denials[0].reason.as_deref().unwrap().contains(".env"));

    // The README read executed; it was not denied.
    let executed: Vec<_> = lines
        .iter()
        .filter_map(|line| match line {
            OutputLine::Audit { event } if event.action == "call_executed" => Some(event),
            _ => None,
        })
        .collect();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].tool_success, Some(true));

    // Grouped rendering keeps input order and buckets severities.
    let blocks = grouped_view(&lines);
    assert_eq!(blocks.len(), 4);
    match (&blocks[0], &blocks[1], &blocks[2], &blocks[3]) {
        (
            OutputBlock::Card(deny),
            OutputBlock::Text(denied_text),
            OutputBlock::Card(exec),
            OutputBlock::Text(ok_text),
        ) => {
            assert_eq!(deny.severity, Severity::Deny);
            assert_eq!(deny.label, "DENIED");
            assert!(denied_text.starts_with("DENIED:"));
            assert_eq!(exec.severity, Severity::Ok);
            assert_eq!(exec.label, "EXECUTED");
            assert_eq!(ok_text, "OK: Contents of README.md");
        }
        other => panic!("unexpected block shapes: {other:?}"),
    }
}

#[tokio::test]
async fn test_runs_are_isolated_and_stage_recovers() {
    let (runtime, playground) = scripted_playground();
    runtime.push_run(RunScript {
        stdout: "first\n".to_string(),
        stderr: String::new(),
        raise: Some("RuntimeError: boom".to_string()),
    });
    runtime.push_run(RunScript {
        stdout: "second\n".to_string(),
        stderr: String::new(),
        raise: None,
    });

    playground.start().await.unwrap();

    // A raising run is a normal outcome; the stage returns to ready.
    let first = match playground.run().await {
        RunRequest::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(first.outcome.runtime_error.as_deref(), Some("RuntimeError: boom"));
    assert_eq!(playground.stage().stage, RuntimeStage::Ready);

    // Nothing from the first run leaks into the second capture.
    let second = match playground.run().await {
        RunRequest::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(second.outcome.output, "second\n");
    assert!(runtime.channels_restored());
}

#[tokio::test]
async fn test_bootstrap_failure_blocks_runs_until_retry() {
    let runtime = Arc::new(ScriptedRuntime::new());
    let loader = Arc::new(FakeLoader::new(runtime));
    loader.set_fail_load(true);
    let playground = Playground::new(loader.clone(), BootstrapConfig::default());

    assert!(playground.start().await.is_err());
    let snapshot = playground.stage();
    assert_eq!(snapshot.stage, RuntimeStage::Error);
    assert!(snapshot.error.is_some());

    // Runs are dropped while the stage is in error.
    assert!(matches!(
        playground.run().await,
        RunRequest::Skipped {
            stage: RuntimeStage::Error
        }
    ));

    // Explicit re-invocation retries and recovers.
    loader.set_fail_load(false);
    playground.start().await.unwrap();
    assert_eq!(playground.stage().stage, RuntimeStage::Ready);
}

#[tokio::test]
async fn test_switch_while_running_uses_pre_switch_snapshot() {
    let (runtime, playground) = scripted_playground();
    runtime.push_run(RunScript {
        stdout: "OK: Contents of README.md\n".to_string(),
        stderr: String::new(),
        raise: None,
    });
    playground.start().await.unwrap();
    runtime.set_run_delay(Duration::from_millis(150));

    // Switch examples while the source block is still executing.
    let (request, _) = tokio::join!(playground.run(), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(playground.stage().stage, RuntimeStage::Running);
        playground.select_example("devops-agent").await.unwrap();
    });

    let report = match request {
        RunRequest::Completed(report) => report,
        other => panic!("expected completion, got {other:?}"),
    };

    // The in-flight run saw only the pre-switch texts.
    assert_eq!(report.example, "file-agent");
    let files = runtime.written_files();
    assert!(files[0].1.contains("block-sensitive-reads"));
    let sources = runtime.executed_sources();
    assert!(sources[0].contains("/app/.env"));
    assert_eq!(report.outcome.output, "OK: Contents of README.md\n");

    // The editing surface moved on independently.
    assert_eq!(playground.selected_example().await, "devops-agent");
    let buffers = playground.buffers().await;
    assert!(buffers.contract_yaml.contains("prod-requires-ticket"));
}

#[tokio::test]
async fn test_mid_lifecycle_example_switch_does_not_mix_texts() {
    let (runtime, playground) = scripted_playground();
    runtime.push_run(RunScript::default());
    playground.start().await.unwrap();

    playground.select_example("devops-agent").await.unwrap();
    playground.run().await;

    // The run saw the devops texts, both of them.
    let files = runtime.written_files();
    assert!(files[0].1.contains("prod-requires-ticket"));
    let sources = runtime.executed_sources();
    assert!(sources[0].contains("Principal"));
}
