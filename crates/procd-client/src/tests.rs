//! Tests for the `procctl` runtime.

use std::ffi::OsString;
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use procd_protocol::{FrameLimits, Handle, RequestFrame, ResponseFrame};
use rstest::rstest;

use super::*;

struct Outcome {
    code: ExitCode,
    stdout: String,
    stderr: String,
}

fn invoke(args: &[&str]) -> Outcome {
    let args: Vec<OsString> = std::iter::once("procctl")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let code = run(args, &mut stdout, &mut stderr);
    Outcome {
        code,
        stdout: String::from_utf8(stdout).expect("utf-8 stdout"),
        stderr: String::from_utf8(stderr).expect("utf-8 stderr"),
    }
}

fn serve_once(response: ResponseFrame) -> (String, JoinHandle<RequestFrame>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let port = listener.local_addr().expect("address").port().to_string();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let request =
            RequestFrame::read_from(&mut stream, FrameLimits::default()).expect("request");
        response.write_to(&mut stream).expect("response");
        request
    });
    (port, server)
}

fn closed_port() -> String {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    listener.local_addr().expect("address").port().to_string()
}

#[test]
fn help_goes_to_stdout() {
    let outcome = invoke(&["--help"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("procctl"));
    assert!(outcome.stdout.contains("exec"));
}

#[test]
fn missing_port_is_a_usage_error() {
    let outcome = invoke(&["get", "a.txt"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("--port"));
}

#[test]
fn get_prints_the_file_text() {
    let (port, server) = serve_once(ResponseFrame::success("line one"));
    let outcome = invoke(&["--port", &port, "get", "notes.txt"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert_eq!(outcome.stdout, "line one\n");
    assert_eq!(server.join().expect("server").command(), "get");
}

#[test]
fn daemon_failures_exit_with_failure() {
    let (port, server) = serve_once(ResponseFrame::new(-4, "path '../x' escapes the daemon root"));
    let outcome = invoke(&["--port", &port, "rm", "../x"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("invalid path"));
    assert!(outcome.stdout.is_empty());
    server.join().expect("server");
}

#[test]
fn unreachable_daemons_report_transport_failures() {
    let port = closed_port();
    let outcome = invoke(&["--port", &port, "--connect-timeout-ms", "500", "exists", "x"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("transport failure"));
}

#[test]
fn exec_sends_definitions_and_prints_the_result() {
    let finished = ProcessResult::finished("echo", 0, "hi");
    let (port, server) =
        serve_once(ResponseFrame::success(finished.to_document().expect("document")));
    let outcome = invoke(&[
        "--port",
        &port,
        "exec",
        "echo",
        "--wait-millis",
        "250",
        "--terminate",
        "-D",
        "MSG=hi there",
        "--define",
        "EMPTY=",
    ]);
    assert_eq!(outcome.code, ExitCode::SUCCESS, "stderr: {}", outcome.stderr);
    let printed = ProcessResult::from_document(outcome.stdout.trim().as_bytes()).expect("json");
    assert_eq!(printed, finished);

    let sent = server.join().expect("server");
    let request = ProcessRequest::from_document(&sent.parameters()[0]).expect("request");
    assert_eq!(request.wait_millis(), 250);
    assert!(request.terminate());
    assert_eq!(
        request.parameters().get("MSG").map(String::as_str),
        Some("hi there")
    );
    assert_eq!(request.parameters().get("EMPTY").map(String::as_str), Some(""));
}

#[rstest]
#[case("NOVALUE")]
#[case("=value")]
fn malformed_definitions_fail_before_connecting(#[case] definition: &str) {
    let port = closed_port();
    let outcome = invoke(&["--port", &port, "exec", "echo", "-D", definition]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("invalid parameter definition"));
}

#[test]
fn wait_parses_the_handle() {
    let result = ProcessResult::terminated("sleep", "");
    let (port, server) =
        serve_once(ResponseFrame::success(result.to_document().expect("document")));
    let outcome = invoke(&["--port", &port, "wait", "3", "--timeout-ms", "20"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("terminated"));

    let sent = server.join().expect("server");
    let expected = Handle::new(3).expect("handle").to_string();
    assert_eq!(sent.parameters()[0], expected.as_bytes());
}

#[test]
fn put_binary_reports_missing_local_files() {
    let port = closed_port();
    let outcome = invoke(&["--port", &port, "put-binary", "blob", "/nonexistent/file.bin"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("failed to read local file"));
}
