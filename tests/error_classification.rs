//! Every outcome lands in exactly one kind of the taxonomy.

mod common;

use api_resilience::client::ApiRequest;
use api_resilience::utils::ManualClock;
use api_resilience::{classify, AuthSession, Error, ErrorKind, RecoveryPolicy, RefreshPhase};
use common::{builder, status, MockTransport};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

async fn outcome_kind(code: u16, body: serde_json::Value) -> Option<ErrorKind> {
    let transport = MockTransport::new(move |_, _| Ok(status(code, body.clone())));
    let clock = ManualClock::new();
    let client = builder(transport, &clock).build().unwrap();
    client.get("/api/contacts/42").await.unwrap_err().kind()
}

#[tokio::test]
async fn test_status_and_code_mapping() {
    let cases = [
        (404, json!({}), ErrorKind::ResourceNotFound),
        (400, json!({"code": "CONTACT_NOT_FOUND"}), ErrorKind::ResourceNotFound),
        (409, json!({"error": {"code": "conversation_not_found"}}), ErrorKind::ResourceNotFound),
        (500, json!({}), ErrorKind::ServerError),
        (503, json!("Service Unavailable"), ErrorKind::ServerError),
        (400, json!({"code": "VALIDATION_FAILED"}), ErrorKind::RequestRejected),
        (403, json!({}), ErrorKind::RequestRejected),
        (429, json!({}), ErrorKind::ServerRateLimited),
    ];
    for (code, body, expected) in cases {
        assert_eq!(
            outcome_kind(code, body.clone()).await,
            Some(expected),
            "HTTP {code} {body}"
        );
    }
}

#[tokio::test]
async fn test_network_failure() {
    let transport = MockTransport::new(|_, _| Err(Error::network("connection refused")));
    let clock = ManualClock::new();
    let client = builder(transport, &clock).build().unwrap();

    let err = assert_err!(client.get("/api/contacts").await);
    assert_eq!(err.kind(), Some(ErrorKind::NetworkError));
    assert_eq!(err.kind().map(|k| k.policy()), Some(RecoveryPolicy::Surface));
}

#[tokio::test]
async fn test_unrecognized_401_ends_session() {
    let transport = MockTransport::new(|_, _| Ok(status(401, json!({"code": "ACCOUNT_DISABLED"}))));
    let clock = ManualClock::new();
    let client = builder(transport, &clock).build().unwrap();
    assert_ok!(
        client
            .login(AuthSession::new("a").with_refresh_token("r"))
            .await
    );

    let err = client
        .send(ApiRequest::get("/api/me").authenticated())
        .await
        .unwrap_err();
    match err {
        Error::Remote {
            status, kind, code, ..
        } => {
            assert_eq!(status, 401);
            assert_eq!(kind, ErrorKind::UnhandledAuthError);
            assert_eq!(code.as_deref(), Some("ACCOUNT_DISABLED"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!client.is_authenticated());
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::LoggedOut);
}

#[test]
fn test_policies_cover_taxonomy() {
    assert_eq!(classify(401, Some("TOKEN_EXPIRED"), false).policy(), RecoveryPolicy::RefreshAndReplay);
    assert_eq!(classify(401, Some("INVALID_TOKEN"), false).policy(), RecoveryPolicy::TerminateSession);
    assert_eq!(classify(429, None, false).policy(), RecoveryPolicy::Backoff);
    assert_eq!(classify(502, None, false).policy(), RecoveryPolicy::Surface);
}
