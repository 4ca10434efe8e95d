//! `SignerClient` and `RemoteAccount` against a running daemon.
//!
//! Signing is deterministic (RFC 6979), so everything the daemon signs is
//! compared byte for byte with a `LocalAccount` holding the same key.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use agentek_core::types::{PolicyConfig, RequireApproval};
use agentek_crypto::{
    Account, LocalAccount, Secp256k1KeyPair, SecretKey, SignableMessage, TransactionRequest,
    TypedData,
};
use agentek_signer::client::{
    get_daemon_address, is_daemon_reachable, ClientError, RemoteAccount, SignerClient,
};
use agentek_signer::server::{error_codes, StaticApprover};

use crate::common::{mail_typed_data, temp_base_dir, transfer, TestDaemon, TEST_ADDRESS, TEST_KEY};

fn local_account() -> LocalAccount {
    let secret = SecretKey::from_hex(TEST_KEY).unwrap();
    LocalAccount::new(Secp256k1KeyPair::from_secret_key(&secret).unwrap())
}

fn quiet_policy() -> PolicyConfig {
    PolicyConfig::default().with_require_approval(RequireApproval::Never)
}

#[tokio::test]
async fn test_remote_account_matches_local_signatures() {
    let test = TestDaemon::start(quiet_policy(), StaticApprover::deny_all());
    let remote = RemoteAccount::connect(test.client()).await.unwrap();
    let local = local_account();

    assert_eq!(remote.address().to_checksum(None), TEST_ADDRESS);
    assert_eq!(remote.address(), local.address());

    for message in [
        SignableMessage::from("hello agent"),
        SignableMessage::Raw {
            raw: vec![0xde, 0xad, 0xbe, 0xef].into(),
        },
    ] {
        assert_eq!(
            remote.sign_message(&message).await.unwrap(),
            local.sign_message(&message).await.unwrap()
        );
    }

    let typed_data: TypedData = serde_json::from_value(mail_typed_data()).unwrap();
    assert_eq!(
        remote.sign_typed_data(&typed_data).await.unwrap(),
        local.sign_typed_data(&typed_data).await.unwrap()
    );

    let tx: TransactionRequest =
        serde_json::from_value(transfer(1, "10000000000000000")["transaction"].clone()).unwrap();
    let signed = remote.sign_transaction(&tx).await.unwrap();
    assert_eq!(signed, local.sign_transaction(&tx).await.unwrap());
    assert_eq!(signed[0], 0x02, "EIP-1559 envelope");

    assert_eq!(test.approver.times_asked(), 0);
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_denials_surface_as_rpc_errors() {
    let test = TestDaemon::start(PolicyConfig::default(), StaticApprover::deny_all());
    let remote = RemoteAccount::connect(test.client()).await.unwrap();

    let off_chain: TransactionRequest =
        serde_json::from_value(transfer(999_999, "1")["transaction"].clone()).unwrap();
    let err = remote.sign_transaction(&off_chain).await.unwrap_err();
    assert_eq!(err.rpc_code(), Some(error_codes::POLICY_DENIED));

    let err = remote
        .sign_message(&SignableMessage::from("needs a human"))
        .await
        .unwrap_err();
    match err {
        ClientError::Rpc { code, message } => {
            assert_eq!(code, error_codes::APPROVAL_DENIED);
            assert!(message.contains("rejected"));
        }
        other => panic!("expected an RPC error, got {other:?}"),
    }
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_client_times_out_waiting_for_approval() {
    let policy = PolicyConfig::default().with_require_approval(RequireApproval::Always);
    let approver = StaticApprover::approve_all().with_delay(Duration::from_secs(30));
    let test = TestDaemon::start(policy, approver);

    let client = test.client().with_timeout(Duration::from_millis(200));
    let err = client
        .call("sign_message", serde_json::json!({"message": "hello"}))
        .await
        .unwrap_err();
    match err {
        ClientError::Timeout { method, timeout } => {
            assert_eq!(method, "sign_message");
            assert_eq!(timeout, Duration::from_millis(200));
        }
        other => panic!("expected a timeout, got {other:?}"),
    }

    // A timed-out call does not poison the client.
    client.ping().await.unwrap();
    test.daemon.stop().await;
}

#[tokio::test]
async fn test_reachability() {
    let test = TestDaemon::start(PolicyConfig::default(), StaticApprover::deny_all());
    assert!(is_daemon_reachable(test.socket()).await);
    assert_eq!(
        get_daemon_address(test.socket()).await.unwrap().to_checksum(None),
        TEST_ADDRESS
    );

    let socket = test.socket().to_path_buf();
    test.daemon.stop().await;
    assert!(!is_daemon_reachable(&socket).await);
    assert!(matches!(
        SignerClient::new(&socket).address().await,
        Err(ClientError::Connect { .. })
    ));
}

#[tokio::test]
async fn test_missing_socket_is_a_connect_error() {
    let dir = temp_base_dir();
    let client = SignerClient::new(dir.path().join("signer.sock"));
    let err = client.ping().await.unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
    assert_eq!(err.rpc_code(), None);
}
