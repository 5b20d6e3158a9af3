//! Single-flight token refresh and terminal auth failures through the client.

mod common;

use api_resilience::auth::{AuthEvent, BroadcastAuthObserver, MemorySessionStore, SessionStore};
use api_resilience::client::{ApiRequest, Method};
use api_resilience::utils::ManualClock;
use api_resilience::{ApiClient, AuthSession, Error, ErrorKind, RefreshPhase};
use common::{builder, bump, counter, ok, status, token_expired, MockTransport};
use futures::future::join_all;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const REFRESH: &str = "/api/auth/refresh";

/// Backend that accepts only `fresh-N` tokens and hands out `fresh-N` on refresh.
fn backend(refreshes: Arc<AtomicUsize>, refresh_ok: bool) -> Arc<MockTransport> {
    MockTransport::with_delay(Duration::from_millis(15), move |req, bearer| {
        if req.descriptor().path == REFRESH {
            let n = bump(&refreshes);
            if !refresh_ok {
                return Ok(status(401, json!({"code": "INVALID_TOKEN"})));
            }
            return Ok(ok(json!({
                "accessToken": format!("fresh-{n}"),
                "refreshToken": format!("refresh-{n}"),
            })));
        }
        match bearer {
            Some(t) if t.starts_with("fresh-") => Ok(ok(json!({"path": req.path}))),
            Some(_) => Ok(token_expired()),
            None => Ok(ok(json!({"public": true}))),
        }
    })
}

async fn logged_in(
    transport: Arc<MockTransport>,
    observer: Arc<BroadcastAuthObserver>,
) -> (ApiClient, Arc<MemorySessionStore>) {
    let clock = ManualClock::new();
    let store = Arc::new(MemorySessionStore::new());
    let client = builder(transport, &clock)
        .session_store(store.clone())
        .auth_observer(observer)
        .build()
        .unwrap();
    client
        .login(
            AuthSession::new("stale")
                .with_refresh_token("refresh-0")
                .with_user(json!({"id": 1})),
        )
        .await
        .unwrap();
    (client, store)
}

#[tokio::test]
async fn test_concurrent_expiry_triggers_one_refresh() {
    let refreshes = counter();
    let transport = backend(refreshes.clone(), true);
    let observer = Arc::new(BroadcastAuthObserver::default());
    let mut events = observer.subscribe();
    let (client, store) = logged_in(transport.clone(), observer).await;

    let requests = (0..5).map(|i| {
        client.send(ApiRequest::post(format!("/api/conversations/{i}/read")).body(json!({})))
    });
    let results = join_all(requests).await;
    for r in results {
        r.unwrap();
    }

    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(client.session().unwrap().access_token, "fresh-1");
    assert_eq!(client.session().unwrap().user, Some(json!({"id": 1})));
    assert_eq!(
        store.load().await.unwrap().unwrap().refresh_token.as_deref(),
        Some("refresh-1")
    );
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::Idle);

    // Each request was sent once with the stale token and replayed once
    let calls = transport.calls();
    let replays = calls
        .iter()
        .filter(|c| c.bearer.as_deref() == Some("fresh-1"))
        .count();
    assert_eq!(replays, 5);

    let refresh_call = calls.iter().find(|c| c.path == REFRESH).unwrap();
    assert_eq!(refresh_call.body, Some(json!({"refreshToken": "refresh-0"})));
    assert!(refresh_call.bearer.is_none());

    assert_eq!(
        events.recv().await.unwrap(),
        AuthEvent::TokenRefreshed {
            access_token: "fresh-1".into()
        }
    );
}

#[tokio::test]
async fn test_later_expiry_starts_a_new_refresh_cycle() {
    let refreshes = counter();
    // Only the most recently issued token is accepted; `None` revokes it.
    let valid: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let (r, v) = (refreshes.clone(), valid.clone());
    let transport = MockTransport::with_delay(Duration::from_millis(5), move |req, bearer| {
        if req.descriptor().path == REFRESH {
            let n = bump(&r);
            *v.lock().unwrap() = Some(format!("fresh-{n}"));
            return Ok(ok(json!({
                "accessToken": format!("fresh-{n}"),
                "refreshToken": format!("refresh-{n}"),
            })));
        }
        let current = v.lock().unwrap().clone();
        match (bearer, current) {
            (Some(t), Some(c)) if t == c => Ok(ok(json!({"path": req.path}))),
            _ => Ok(token_expired()),
        }
    });
    let observer = Arc::new(BroadcastAuthObserver::default());
    let (client, _store) = logged_in(transport.clone(), observer).await;

    client
        .send(ApiRequest::post("/api/conversations/1/read").body(json!({})))
        .await
        .unwrap();
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::Idle);

    // The server revokes fresh-1 well after the first cycle settled
    *valid.lock().unwrap() = None;

    client
        .send(ApiRequest::post("/api/conversations/2/read").body(json!({})))
        .await
        .unwrap();
    assert_eq!(refreshes.load(Ordering::SeqCst), 2);
    assert_eq!(client.session().unwrap().access_token, "fresh-2");
    assert_eq!(client.refresh_coordinator().refresh_count(), 2);
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::Idle);

    let bearers = |path: &str| -> Vec<Option<String>> {
        transport
            .calls()
            .into_iter()
            .filter(|c| c.path == path)
            .map(|c| c.bearer)
            .collect()
    };
    assert_eq!(
        bearers("/api/conversations/1/read"),
        vec![Some("stale".to_string()), Some("fresh-1".to_string())]
    );
    assert_eq!(
        bearers("/api/conversations/2/read"),
        vec![Some("fresh-1".to_string()), Some("fresh-2".to_string())]
    );
    let refresh_bodies: Vec<_> = transport
        .calls()
        .into_iter()
        .filter(|c| c.path == REFRESH)
        .map(|c| c.body)
        .collect();
    assert_eq!(
        refresh_bodies,
        vec![
            Some(json!({"refreshToken": "refresh-0"})),
            Some(json!({"refreshToken": "refresh-1"})),
        ]
    );
}

#[tokio::test]
async fn test_refresh_failure_logs_out_once() {
    let refreshes = counter();
    let transport = backend(refreshes.clone(), false);
    let observer = Arc::new(BroadcastAuthObserver::default());
    let mut events = observer.subscribe();
    let (client, store) = logged_in(transport.clone(), observer).await;

    let results = join_all(
        (0..3).map(|i| client.send(ApiRequest::delete(format!("/api/contacts/{i}")))),
    )
    .await;
    for r in &results {
        assert!(matches!(r, Err(Error::AuthenticationFailed { .. })));
    }

    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert!(client.session().is_none());
    assert!(store.load().await.unwrap().is_none());
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::LoggedOut);
    assert_eq!(events.recv().await.unwrap(), AuthEvent::AuthenticationFailed);
    assert!(events.try_recv().is_err());

    // Unauthenticated reads keep working while logged out
    let public = client.get("/api/status").await.unwrap();
    assert_eq!(public.body["public"], json!(true));
}

#[tokio::test]
async fn test_login_after_logout_resets_phase() {
    let refreshes = counter();
    let transport = backend(refreshes.clone(), false);
    let observer = Arc::new(BroadcastAuthObserver::default());
    let (client, _) = logged_in(transport.clone(), observer).await;

    assert!(client.delete("/api/contacts/1").await.is_err());
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::LoggedOut);

    client
        .login(AuthSession::new("fresh-9").with_refresh_token("r"))
        .await
        .unwrap();
    assert_eq!(client.refresh_coordinator().phase(), RefreshPhase::Idle);
    client.delete("/api/contacts/1").await.unwrap();
}

#[tokio::test]
async fn test_malformed_token_terminates_without_refresh() {
    let refreshes = counter();
    let r = refreshes.clone();
    let transport = MockTransport::with_delay(Duration::from_millis(10), move |req, _| {
        if req.descriptor().path == REFRESH {
            bump(&r);
        }
        Ok(status(401, json!({"error": {"code": "MALFORMED_TOKEN"}})))
    });
    let observer = Arc::new(BroadcastAuthObserver::default());
    let mut events = observer.subscribe();
    let (client, _) = logged_in(transport, observer).await;

    let results = join_all(
        (0..3).map(|i| client.send(ApiRequest::get(format!("/api/profile/{i}")).authenticated())),
    )
    .await;
    for r in &results {
        assert_eq!(r.as_ref().unwrap_err().kind(), Some(ErrorKind::MalformedToken));
    }

    assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    assert!(client.session().is_none());
    assert_eq!(events.recv().await.unwrap(), AuthEvent::AuthenticationFailed);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_second_expiry_on_replay_is_surfaced() {
    let refreshes = counter();
    let r = refreshes.clone();
    let transport = MockTransport::new(move |req, _| {
        if req.descriptor().path == REFRESH {
            bump(&r);
            return Ok(ok(json!({"accessToken": "a2", "refreshToken": "r2"})));
        }
        Ok(token_expired())
    });
    let observer = Arc::new(BroadcastAuthObserver::default());
    let (client, _) = logged_in(transport.clone(), observer).await;

    let err = client
        .send(ApiRequest::get("/api/profile").authenticated())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TokenExpired));
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(transport.calls_to(Method::Get, "/api/profile"), 2);
    // The refreshed session stays in place
    assert_eq!(client.session().unwrap().access_token, "a2");
}

#[tokio::test]
async fn test_bearer_attached_only_where_needed() {
    let transport = MockTransport::new(|_, _| Ok(ok(json!({}))));
    let clock = ManualClock::new();
    let client = builder(transport.clone(), &clock).build().unwrap();
    client
        .login(AuthSession::new("tok").with_refresh_token("r"))
        .await
        .unwrap();

    client.get("/api/employees").await.unwrap();
    client.get("/api/media/proxy?url=x").await.unwrap();
    client.send(ApiRequest::get("/api/me").authenticated()).await.unwrap();
    client.post("/api/contacts", &json!({})).await.unwrap();

    let bearers: Vec<Option<String>> = transport.calls().into_iter().map(|c| c.bearer).collect();
    assert_eq!(
        bearers,
        vec![
            None,
            Some("tok".to_string()),
            Some("tok".to_string()),
            Some("tok".to_string())
        ]
    );
}

#[tokio::test]
async fn test_refresh_counts_against_auth_class_but_is_not_gated() {
    let refreshes = counter();
    let transport = backend(refreshes.clone(), true);
    let observer = Arc::new(BroadcastAuthObserver::default());
    let (client, _) = logged_in(transport, observer).await;

    // Exhaust the auth class budget (10 per minute)
    for _ in 0..10 {
        client.get("/api/auth/providers").await.unwrap();
    }
    assert!(matches!(
        client.get("/api/auth/providers").await,
        Err(Error::RateLimitExceeded { ref class }) if class == "auth"
    ));

    // The refresh still goes out and is recorded
    client.post("/api/conversations/1/read", &json!({})).await.unwrap();
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(client.signals().rate_limit("auth").unwrap().count, 11);
}

#[tokio::test]
async fn test_restore_session_from_store() {
    let store = Arc::new(MemorySessionStore::new());
    store
        .save(&AuthSession::new("fresh-3").with_refresh_token("r"))
        .await
        .unwrap();
    let transport = backend(counter(), true);
    let clock = ManualClock::new();
    let client = builder(transport.clone(), &clock)
        .session_store(store)
        .build()
        .unwrap();

    assert!(!client.is_authenticated());
    assert!(client.restore_session().await.unwrap());
    client.delete("/api/contacts/5").await.unwrap();
    assert_eq!(transport.calls()[0].bearer.as_deref(), Some("fresh-3"));

    client.logout().await;
    assert!(!client.is_authenticated());
}
