//! Wire-level tests: framing, error codes, out-of-order responses and the
//! PID file lifecycle.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use agentek_core::config_loader::SignerPaths;
use agentek_core::types::{PolicyConfig, RequireApproval};
use agentek_signer::server::pidfile::read_pid;
use agentek_signer::server::{
    daemon_status, error_codes, DaemonError, DaemonOptions, PidStatus, SignerDaemon, StaticApprover,
};
use serde_json::{json, Value};

use crate::common::{
    exchange_bytes, exchange_lines, request_line, temp_base_dir, test_payload, transfer, TestDaemon, TEST_ADDRESS,
};

fn error_code(response: &Value) -> i64 {
    response["error"]["code"].as_i64().expect("expected an error response")
}

#[tokio::test]
async fn test_ping_and_address_over_socket() {
    let test = TestDaemon::start(PolicyConfig::default(), StaticApprover::deny_all());

    let responses = exchange_lines(
        test.socket(),
        &[
            request_line("ping", Value::Null, 1),
            request_line("get_address", Value::Null, 2),
        ],
    )
    .await;
    assert_eq!(responses.len(), 2);

    for response in &responses {
        assert_eq!(response["jsonrpc"], "2.0");
        match response["id"].as_i64() {
            Some(1) => assert_eq!(response["result"], "pong"),
            Some(2) => assert_eq!(response["result"], TEST_ADDRESS),
            other => panic!("unexpected id {other:?}"),
        }
    }
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_slow_approval_does_not_block_the_connection() {
    let policy = PolicyConfig::default().with_require_approval(RequireApproval::Always);
    let approver = StaticApprover::approve_all().with_delay(Duration::from_millis(500));
    let test = TestDaemon::start(policy, approver);

    let responses = exchange_lines(
        test.socket(),
        &[
            request_line("sign_message", json!({"message": "slow"}), 1),
            request_line("ping", Value::Null, 2),
        ],
    )
    .await;

    let ids: Vec<_> = responses.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![2, 1]);
    assert_eq!(responses[0]["result"], "pong");
    assert_eq!(responses[1]["result"].as_str().unwrap().len(), 2 + 130);
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_protocol_errors() {
    let test = TestDaemon::start(PolicyConfig::default(), StaticApprover::deny_all());

    let responses = exchange_lines(
        test.socket(),
        &[
            "{not json".to_string(),
            json!({"jsonrpc": "1.0", "method": "ping", "id": "old"}).to_string(),
            request_line("eth_sendTransaction", json!({}), 3),
            request_line("sign_message", json!({"msg": "typo"}), 4),
            String::new(),
        ],
    )
    .await;
    assert_eq!(responses.len(), 4, "blank lines are skipped");

    let find = |id: &Value| {
        responses
            .iter()
            .find(|r| &r["id"] == id)
            .unwrap_or_else(|| panic!("no response for id {id}"))
    };
    assert_eq!(error_code(find(&Value::Null)), i64::from(error_codes::PARSE_ERROR));
    assert_eq!(error_code(find(&json!("old"))), i64::from(error_codes::INVALID_REQUEST));
    assert_eq!(error_code(find(&json!(3))), i64::from(error_codes::METHOD_NOT_FOUND));
    assert_eq!(error_code(find(&json!(4))), i64::from(error_codes::INVALID_PARAMS));
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_invalid_utf8_is_reported_and_later_requests_still_answered() {
    let test = TestDaemon::start(PolicyConfig::default(), StaticApprover::deny_all());

    let mut bytes = br#"{"jsonrpc":"2.0","method":"ping","id":1,"x":""#.to_vec();
    bytes.push(0xff);
    bytes.extend_from_slice(b"\"}\n");
    bytes.extend_from_slice(request_line("ping", Value::Null, 2).as_bytes());
    bytes.push(b'\n');

    let responses = exchange_bytes(test.socket(), &bytes).await;
    assert_eq!(responses.len(), 2);

    let rejected = responses
        .iter()
        .find(|r| r["id"].is_null())
        .expect("undecodable line is answered");
    assert_eq!(error_code(rejected), i64::from(error_codes::PARSE_ERROR));

    let pong = responses
        .iter()
        .find(|r| r["id"] == json!(2))
        .expect("request after the bad line is answered");
    assert_eq!(pong["result"], json!("pong"));
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_policy_denial_names_the_chain() {
    let approver = StaticApprover::approve_all();
    let test = TestDaemon::start(PolicyConfig::default(), approver);

    let responses = exchange_lines(
        test.socket(),
        &[request_line("sign_transaction", transfer(999_999, "1"), 1)],
    )
    .await;
    assert_eq!(error_code(&responses[0]), i64::from(error_codes::POLICY_DENIED));
    assert!(responses[0]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("999999"));
    assert_eq!(test.approver.times_asked(), 0);
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_approval_denied_and_timed_out() {
    let denied = TestDaemon::start(PolicyConfig::default(), StaticApprover::deny_all());
    // 0.06 ETH is above the default 0.05 ETH approval threshold
    let responses = exchange_lines(
        denied.socket(),
        &[request_line("sign_transaction", transfer(1, "60000000000000000"), 1)],
    )
    .await;
    assert_eq!(error_code(&responses[0]), i64::from(error_codes::APPROVAL_DENIED));
    assert_eq!(denied.approver.times_asked(), 1);
    denied.daemon.stop().await;

    let slow = TestDaemon::start_with(
        PolicyConfig::default(),
        StaticApprover::approve_all().with_delay(Duration::from_secs(30)),
        |options| options.with_approval_timeout(Duration::from_millis(100)),
    );
    let responses = exchange_lines(
        slow.socket(),
        &[request_line("sign_message", json!({"message": "hello"}), 1)],
    )
    .await;
    assert_eq!(error_code(&responses[0]), i64::from(error_codes::APPROVAL_DENIED));
    assert!(responses[0]["error"]["message"]
        .as_str()
        .unwrap()
        .contains("timed out"));
    slow.daemon.stop().await;
}

#[tokio::test]
async fn test_oversized_line_closes_connection() {
    let test = TestDaemon::start_with(
        PolicyConfig::default(),
        StaticApprover::deny_all(),
        |mut options| {
            options.max_request_bytes = 256;
            options
        },
    );

    let huge = request_line("sign_message", json!({"message": "x".repeat(1024)}), 1);
    let responses = exchange_lines(
        test.socket(),
        &[huge, request_line("ping", Value::Null, 2)],
    )
    .await;

    assert_eq!(responses.len(), 1, "nothing is read after the oversized line");
    assert_eq!(error_code(&responses[0]), i64::from(error_codes::INVALID_REQUEST));
    assert_eq!(responses[0]["id"], Value::Null);

    // The daemon itself keeps serving.
    let responses = exchange_lines(test.socket(), &[request_line("ping", Value::Null, 3)]).await;
    assert_eq!(responses[0]["result"], "pong");
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_second_daemon_is_refused_and_stop_cleans_up() {
    let test = TestDaemon::start(PolicyConfig::default(), StaticApprover::deny_all());
    let paths = test.paths().clone();
    assert_eq!(read_pid(&paths.pid_file).unwrap(), Some(std::process::id()));

    let second = SignerDaemon::new(
        test_payload(PolicyConfig::default()),
        DaemonOptions::new(paths.clone(), Arc::new(StaticApprover::deny_all())),
    )
    .unwrap();
    assert!(matches!(
        second.start(),
        Err(DaemonError::AlreadyRunning { .. })
    ));
    // The refused daemon must not touch the running one's files.
    second.stop().await;
    assert!(paths.socket.exists());
    assert!(paths.pid_file.exists());

    test.daemon.stop().await;
    assert!(!paths.socket.exists());
    assert!(!paths.pid_file.exists());
    assert_eq!(daemon_status(&paths).unwrap(), PidStatus::NotRunning);
}

#[test]
fn test_stale_pid_file_reads_as_not_running() {
    let dir = temp_base_dir();
    let paths = SignerPaths::new(dir.path());
    std::fs::write(&paths.pid_file, "999999999\n").unwrap();

    assert_eq!(daemon_status(&paths).unwrap(), PidStatus::NotRunning);
    assert!(!paths.pid_file.exists());
}
