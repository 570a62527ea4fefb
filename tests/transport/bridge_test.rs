//! Tests for the spawn / request / read / reap cycle.

#![cfg(unix)]

use std::time::{Duration, Instant};

use aider_mcp_client::transport::{
    communicate, deadline_after, read_response, Exchange, ExchangeState, ServerProcess,
    ToolRequest, TransportOutcome, STARTUP_BANNER,
};
use serde_json::{json, Map};

fn request() -> ToolRequest {
    let mut args = Map::new();
    args.insert("libraryName".to_string(), json!("react"));
    ToolRequest::new("resolve-library-id", args).unwrap()
}

async fn run_sh(script: &str, timeout: Duration) -> Exchange {
    communicate(
        "sh",
        &["-c".to_string(), script.to_string()],
        &request(),
        timeout,
    )
    .await
    .unwrap()
}

/// True while `pid` is a live process. Zombies awaiting reaping count as gone.
fn is_running(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = Pid::from_raw(i32::try_from(pid).unwrap());
    if kill(raw, None).is_err() {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

fn assert_not_alive(exchange: &Exchange) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let pid = exchange.pid.expect("child had a pid");
    let pid = Pid::from_raw(i32::try_from(pid).unwrap());
    assert!(
        kill(pid, None).is_err(),
        "child {pid} still alive after bridge returned"
    );
    assert_eq!(exchange.state, ExchangeState::Done);
}

#[tokio::test]
async fn terminal_response_returned() {
    let exchange = run_sh(r#"echo '{"result":"facebook/react"}'"#, Duration::from_secs(5)).await;

    assert_eq!(
        exchange.outcome,
        TransportOutcome::Success(json!({"result": "facebook/react"}))
    );
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn malformed_line_then_terminal() {
    let exchange = run_sh(
        r#"printf 'not json\n{"result":"x"}\n'"#,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(
        exchange.outcome,
        TransportOutcome::Success(json!({"result": "x"}))
    );
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn malformed_only_output_is_no_response() {
    let exchange = run_sh("echo 'garbage'; echo '{broken'", Duration::from_secs(5)).await;

    assert_eq!(exchange.outcome, TransportOutcome::NoResponse);
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn immediate_exit_is_no_response() {
    let exchange = communicate("true", &[], &request(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(exchange.outcome, TransportOutcome::NoResponse);
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn silent_child_times_out_promptly() {
    let start = Instant::now();
    let exchange = communicate(
        "sleep",
        &["30".to_string()],
        &request(),
        Duration::from_secs(1),
    )
    .await
    .unwrap();

    assert_eq!(exchange.outcome, TransportOutcome::Timeout);
    assert!(
        start.elapsed() < Duration::from_secs(4),
        "took {:?}",
        start.elapsed()
    );
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn server_kept_alive_after_answer_is_terminated() {
    let start = Instant::now();
    let exchange = run_sh(
        r#"echo '{"log":"starting"}'; echo '{"library":"org/lib"}'; exec sleep 30"#,
        Duration::from_secs(10),
    )
    .await;

    assert_eq!(
        exchange.outcome,
        TransportOutcome::Success(json!({"library": "org/lib"}))
    );
    assert!(start.elapsed() < Duration::from_secs(8));
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn ignoring_sigterm_gets_killed() {
    let start = Instant::now();
    let exchange = run_sh(
        r#"trap '' TERM; echo '{"result":"x"}'; while true; do sleep 1; done"#,
        Duration::from_secs(10),
    )
    .await;

    assert!(exchange.outcome.is_success());
    assert!(start.elapsed() < Duration::from_secs(8));
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn request_reaches_stdin_and_stdin_is_closed() {
    // cat only exits once stdin hits EOF
    let exchange = communicate("cat", &[], &request(), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(
        exchange.outcome,
        TransportOutcome::Success(json!({
            "tool": "resolve-library-id",
            "args": {"libraryName": "react"}
        }))
    );
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn progress_only_output_still_succeeds() {
    let exchange = run_sh(r#"echo '{"progress":1}'; echo '{"progress":2}'"#, Duration::from_secs(5)).await;

    assert_eq!(
        exchange.outcome,
        TransportOutcome::Success(json!({"progress": 2}))
    );
}

#[tokio::test]
async fn banner_on_stderr_is_benign() {
    let script = format!(
        r#"echo '{STARTUP_BANNER}' >&2; read line; echo '{{"library":"a/b"}}'"#
    );
    let exchange = run_sh(&script, Duration::from_secs(5)).await;

    assert_eq!(
        exchange.outcome,
        TransportOutcome::Success(json!({"library": "a/b"}))
    );
    assert!(exchange.diagnostics.banner_only());
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn stderr_errors_do_not_change_outcome() {
    let exchange = run_sh(
        r#"echo 'Error: something odd' >&2; echo '{"result":"x"}'"#,
        Duration::from_secs(5),
    )
    .await;

    assert!(exchange.outcome.is_success());
    assert!(exchange.diagnostics.has_errors());
    assert!(exchange.diagnostics.stderr.contains("something odd"));
}

#[tokio::test]
async fn large_request_to_unread_stdin_times_out() {
    let mut args = Map::new();
    args.insert("topic".to_string(), json!("x".repeat(300_000)));
    let request = ToolRequest::new("get-library-docs", args).unwrap();

    let start = Instant::now();
    let exchange = tokio::time::timeout(
        Duration::from_secs(10),
        communicate("sleep", &["30".to_string()], &request, Duration::from_secs(1)),
    )
    .await
    .expect("bridge blocked on the request write")
    .unwrap();

    assert_eq!(exchange.outcome, TransportOutcome::Timeout);
    assert_eq!(exchange.state, ExchangeState::Done);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn invalid_utf8_on_stderr_keeps_child_running() {
    let exchange = run_sh(
        r#"printf '\377\n' >&2; sleep 0.3; echo 'more log' >&2; echo '{"result":"x"}'"#,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(
        exchange.outcome,
        TransportOutcome::Success(json!({"result": "x"}))
    );
    assert!(exchange.diagnostics.stderr.contains("more log"));
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn huge_timeout_is_clamped() {
    let exchange = communicate(
        "echo",
        &[r#"{"result":"org/lib"}"#.to_string()],
        &request(),
        Duration::from_secs(u64::MAX),
    )
    .await
    .unwrap();

    assert_eq!(
        exchange.outcome,
        TransportOutcome::Success(json!({"result": "org/lib"}))
    );
    assert_not_alive(&exchange);
}

#[tokio::test]
async fn dropped_read_kills_child() {
    let process = ServerProcess::spawn("sleep", &["30".to_string()]).unwrap();
    let pid = process.id().expect("child had a pid");
    let line = request().encode().unwrap();

    let read = async move {
        let mut process = process;
        read_response(&mut process, &line, deadline_after(Duration::from_secs(60))).await
    };
    assert!(tokio::time::timeout(Duration::from_millis(300), read)
        .await
        .is_err());

    let start = Instant::now();
    while is_running(pid) && start.elapsed() < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!is_running(pid), "child {pid} outlived the dropped read");
}
