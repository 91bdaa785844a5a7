use std::collections::BTreeMap;
use std::time::Duration;

use rstest::rstest;
use tempfile::TempDir;

use super::*;

fn shell(name: &str, script: &str) -> ProcessAction {
    let argv = vec![String::from("sh"), String::from("-c"), script.to_owned()];
    ProcessAction::new(
        LaunchSpec::new(name, argv).expect("launch"),
        DEFAULT_OUTPUT_CEILING,
    )
}

fn finish(action: &mut ProcessAction) -> i32 {
    action
        .wait_for(Duration::from_secs(10))
        .expect("wait")
        .expect("process should finish")
}

#[test]
fn captures_stdout_and_exit_code() {
    let mut action = shell("echo", "printf 'hello'; exit 3");
    action.start().expect("start");
    assert_eq!(action.status(), ActionStatus::Started);

    assert_eq!(finish(&mut action), 3);
    assert_eq!(action.status(), ActionStatus::Finished);
    assert_eq!(action.exit_code(), Some(3));
    assert_eq!(action.finish_output(), "hello");
}

#[test]
fn stdout_precedes_stderr_in_final_output() {
    let mut action = shell("both", "printf err >&2; printf out");
    action.start().expect("start");
    finish(&mut action);
    assert_eq!(action.finish_output(), "outerr");
}

#[test]
fn draining_twice_yields_nothing_new() {
    let mut action = shell("echo", "printf 'once'");
    action.start().expect("start");
    finish(&mut action);
    let mut first = action.finish_output();
    first.push_str(&action.stdout_text());
    assert_eq!(first, "once");
    assert_eq!(action.stdout_text(), "");
    assert_eq!(action.stderr_text(), "");
}

/// `kill -0` succeeds only while the pid names a live process.
fn process_is_running(pid: u32) -> bool {
    std::process::Command::new("sh")
        .args(["-c", "kill -0 \"$1\"", "sh", pid.to_string().as_str()])
        .stderr(std::process::Stdio::null())
        .status()
        .expect("run kill")
        .success()
}

#[test]
fn destroyed_processes_are_no_longer_running() {
    let mut action = shell("sleep", "exec sleep 5");
    action.start().expect("start");
    let pid = action.pid().expect("started process has a pid");
    assert!(process_is_running(pid));

    action.destroy().expect("destroy");
    assert!(!process_is_running(pid), "process {pid} survived destroy");
}

#[test]
fn wait_times_out_for_long_running_processes() {
    let mut action = shell("sleep", "sleep 5");
    action.start().expect("start");
    let waited = action.wait_for(Duration::from_millis(50)).expect("wait");
    assert_eq!(waited, None);
    assert_eq!(action.status(), ActionStatus::Started);

    action.destroy().expect("destroy");
    assert_eq!(action.status(), ActionStatus::Interrupted);
    assert_eq!(action.exit_code(), None);
    assert_eq!(action.finish_output(), "");
}

#[test]
fn output_is_bounded_by_the_ceiling() {
    let argv = vec![
        String::from("sh"),
        String::from("-c"),
        String::from("i=0; while [ $i -lt 200 ]; do printf '0123456789'; i=$((i+1)); done"),
    ];
    let launch = LaunchSpec::new("flood", argv).expect("launch");
    let mut action = ProcessAction::new(launch, 64);
    action.start().expect("start");
    finish(&mut action);
    let output = action.finish_output();
    assert_eq!(output.len(), 64);
    assert!(output.ends_with("0123456789"));
}

#[test]
fn applies_environment_and_directory() {
    let dir = TempDir::new().expect("temp dir");
    let mut environment = BTreeMap::new();
    environment.insert(String::from("PROCD_GREETING"), String::from("hi"));
    let argv = vec![
        String::from("sh"),
        String::from("-c"),
        String::from("printf '%s ' \"$PROCD_GREETING\"; [ -n \"$PATH\" ] && pwd"),
    ];
    let launch = LaunchSpec::new("env", argv)
        .expect("launch")
        .with_environment(environment)
        .with_directory(dir.path());
    let mut action = ProcessAction::new(launch, DEFAULT_OUTPUT_CEILING);
    action.start().expect("start");
    assert_eq!(finish(&mut action), 0);

    let output = action.finish_output();
    let canonical = dir.path().canonicalize().expect("canonical temp dir");
    assert_eq!(output.trim_end(), format!("hi {}", canonical.display()));
}

#[test]
fn spawn_failure_marks_the_action() {
    let launch = LaunchSpec::new("missing", vec![String::from("/nonexistent/procd-binary")])
        .expect("launch");
    let mut action = ProcessAction::new(launch, DEFAULT_OUTPUT_CEILING);
    let error = action.start().expect_err("spawn must fail");
    assert!(matches!(error, ActionError::Spawn { .. }));
    assert_eq!(action.status(), ActionStatus::FailedToStart);
}

#[rstest]
#[case::empty(Vec::new())]
#[case::blank_program(vec![String::new(), String::from("arg")])]
fn rejects_empty_command_lines(#[case] argv: Vec<String>) {
    let error = LaunchSpec::new("blank", argv).expect_err("empty argv");
    assert!(matches!(error, ActionError::EmptyCommand { .. }));
}

#[test]
fn starting_twice_is_illegal() {
    let mut action = shell("echo", "true");
    action.start().expect("start");
    let error = action.start().expect_err("second start");
    assert!(matches!(
        error,
        ActionError::IllegalState {
            operation: "start",
            status: ActionStatus::Started,
            ..
        }
    ));
    finish(&mut action);
}

#[test]
fn destroy_requires_a_running_process() {
    let mut unstarted = shell("idle", "true");
    assert!(matches!(
        unstarted.destroy(),
        Err(ActionError::IllegalState {
            status: ActionStatus::NotStarted,
            ..
        })
    ));
    assert!(unstarted.wait_for(Duration::from_millis(1)).is_err());

    let mut finished = shell("done", "true");
    finished.start().expect("start");
    finish(&mut finished);
    assert!(matches!(
        finished.destroy(),
        Err(ActionError::IllegalState {
            status: ActionStatus::Finished,
            ..
        })
    ));
    assert_eq!(
        finished.wait_for(Duration::ZERO).expect("recorded"),
        Some(0)
    );
}

#[test]
fn signalled_processes_report_minus_one() {
    let mut action = shell("self-kill", "kill -9 $$");
    action.start().expect("start");
    assert_eq!(finish(&mut action), -1);
}

#[test]
fn kinds_reject_unregistered_keys() {
    let kinds = ActionKinds::builtin(128);
    assert!(kinds.contains(OS_COMMAND_KIND));
    assert!(!kinds.contains("java_class"));

    let launch = LaunchSpec::new("x", vec![String::from("true")]).expect("launch");
    assert!(kinds.create("java_class", launch.clone()).is_none());
    let action = kinds.create(OS_COMMAND_KIND, launch).expect("os command");
    assert_eq!(action.status(), ActionStatus::NotStarted);
    assert_eq!(kinds.keys().collect::<Vec<_>>(), vec![OS_COMMAND_KIND]);
}
