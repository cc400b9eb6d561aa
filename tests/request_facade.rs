//! End-to-end behavior of the request façade: coalescing, stale fallback,
//! session recovery and persistence across restarts.

use std::sync::Arc;
use std::time::Duration;

use campus_access::classify::ReloginCause;
use campus_access::config::AccessConfig;
use campus_access::facade::{Freshness, Query, RequestOptions, ViewState};
use campus_access::reauth::ReauthError;
use campus_access::session::SessionState;
use campus_access::storage::{FileStorage, StableKey};
use campus_access::{
    AccessEvent, AccessLayer, BackendId, CacheKey, Credential, RejectError, RejectKind,
};
use futures_util::future::join_all;

mod common;
use common::{layer_with, FakeCall, FakeStrategy};

fn cached(key: &str, stale_time: Duration) -> RequestOptions {
    RequestOptions::new()
        .cached(CacheKey::persisted(StableKey::new(key).unwrap()))
        .stale_time(stale_time)
}

#[tokio::test]
async fn test_concurrent_cached_requests_share_one_call() {
    let layer = layer_with(Arc::new(FakeStrategy::issuing("unused"))).await;
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t1").with_delay(Duration::from_millis(50)));

    let results = join_all((0..5).map(|_| {
        layer.facade().request(
            call.clone(),
            "grades".to_string(),
            cached("grades", Duration::from_secs(60)),
        )
    }))
    .await;

    assert_eq!(call.calls(), 1);
    for result in results {
        assert_eq!(result.unwrap().data, "grades@t1");
    }

    // Still fresh: served without another call.
    let again = layer
        .facade()
        .request(call.clone(), "grades".to_string(), cached("grades", Duration::from_secs(60)))
        .await
        .unwrap();
    assert!(!again.is_stale());
    assert_eq!(call.calls(), 1);
}

#[tokio::test]
async fn test_stale_data_served_when_offline() {
    let layer = layer_with(Arc::new(FakeStrategy::issuing("unused"))).await;
    let mut events = layer.events().subscribe();
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t1"));

    let first = layer
        .facade()
        .request(call.clone(), "timetable".to_string(), cached("timetable", Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(first.freshness, Freshness::Fresh);

    call.set_offline(true);
    let second = layer
        .facade()
        .request(call.clone(), "timetable".to_string(), cached("timetable", Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(call.calls(), 2);
    assert_eq!(second.data, "timetable@t1");
    assert!(second.is_stale());

    match events.recv().await.unwrap() {
        AccessEvent::StaleServed { backend, cause, .. } => {
            assert_eq!(backend, BackendId::Primary);
            assert_eq!(cause, RejectError::NetworkError.kind());
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_business_failure_serves_cached_value() {
    let layer = layer_with(Arc::new(FakeStrategy::issuing("unused"))).await;
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t1"));
    layer
        .facade()
        .request(call.clone(), "V".to_string(), cached("k", Duration::ZERO))
        .await
        .unwrap();

    let mut events = layer.events().subscribe();
    call.fail_with_code("40010");
    let fetched = layer
        .facade()
        .request(call.clone(), "V".to_string(), cached("k", Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(fetched.data, "V@t1");
    assert!(matches!(fetched.freshness, Freshness::Stale { .. }));
    match events.recv().await.unwrap() {
        AccessEvent::StaleServed { cause, .. } => assert_eq!(cause, RejectKind::BizFailed),
        other => panic!("unexpected event {other:?}"),
    }

    // Nothing cached under another key: the business error surfaces.
    let err = layer
        .facade()
        .request(call, "V".to_string(), cached("other", Duration::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, RejectError::BizFailed { ref code, .. } if code == "40010"));
}

#[tokio::test]
async fn test_offline_without_cached_value_fails() {
    let layer = layer_with(Arc::new(FakeStrategy::issuing("unused"))).await;
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t1"));
    call.set_offline(true);

    let err = layer
        .facade()
        .request(call, "exams".to_string(), cached("exams", Duration::ZERO))
        .await
        .unwrap_err();
    assert_eq!(err, RejectError::NetworkError);
}

#[tokio::test]
async fn test_expired_credential_recovered_once_for_concurrent_requests() {
    let strategy = Arc::new(FakeStrategy::issuing("t2").with_delay(Duration::from_millis(50)));
    let layer = layer_with(strategy.clone()).await;
    let mut events = layer.events().subscribe();
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t2"));

    let results = join_all((0..5).map(|i| {
        layer
            .facade()
            .request(call.clone(), format!("q{i}"), RequestOptions::new())
    }))
    .await;

    assert_eq!(strategy.calls(), 1);
    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(result.unwrap().data, format!("q{i}@t2"));
    }

    let session = layer.sessions().get(BackendId::Primary);
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.credential().map(Credential::expose), Some("t2"));
    assert_eq!(
        events.recv().await.unwrap(),
        AccessEvent::ReloginSucceeded {
            backend: BackendId::Primary
        }
    );
}

#[tokio::test]
async fn test_unreachable_login_keeps_expired_session() {
    let strategy = Arc::new(FakeStrategy::failing(ReauthError::Unreachable(
        "captcha service down".into(),
    )));
    let layer = layer_with(strategy.clone()).await;
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t2"));

    let err = layer
        .facade()
        .request(call.clone(), "q".to_string(), RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RejectError::ReLoginFailed {
            cause: ReloginCause::Unreachable,
            ..
        }
    ));
    assert!(err.allows_stale_fallback());
    let session = layer.sessions().get(BackendId::Primary);
    assert_eq!(session.state(), SessionState::Expired);
    assert_eq!(session.credential().map(Credential::expose), Some("t1"));

    // A later request makes exactly one new attempt.
    let _ = layer
        .facade()
        .request(call, "q".to_string(), RequestOptions::new())
        .await;
    assert_eq!(strategy.calls(), 2);
}

#[tokio::test]
async fn test_invalid_credentials_require_sign_in_and_skip_stale() {
    let strategy = Arc::new(FakeStrategy::failing(ReauthError::InvalidCredentials(
        "password changed".into(),
    )));
    let layer = layer_with(strategy).await;
    let mut events = layer.events().subscribe();
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t1"));

    layer
        .facade()
        .request(call.clone(), "q".to_string(), cached("profile", Duration::ZERO))
        .await
        .unwrap();

    // The backend stops accepting t1.
    let rejecting = Arc::new(FakeCall::new(BackendId::Primary, "t9"));
    let err = layer
        .facade()
        .request(rejecting, "q".to_string(), cached("profile", Duration::ZERO))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RejectError::ReLoginFailed {
            cause: ReloginCause::InvalidCredentials,
            ..
        }
    ));
    assert_eq!(
        layer.sessions().get(BackendId::Primary).state(),
        SessionState::Anonymous
    );

    let mut saw_sign_in = false;
    while let Ok(event) = events.try_recv() {
        saw_sign_in |= event
            == AccessEvent::SignInRequired {
                backend: BackendId::Primary,
            };
    }
    assert!(saw_sign_in);
}

#[tokio::test]
async fn test_rejected_retry_is_terminal() {
    let strategy = Arc::new(FakeStrategy::issuing("t2"));
    let layer = layer_with(strategy.clone()).await;
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t3"));

    let err = layer
        .facade()
        .request(call.clone(), "q".to_string(), RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RejectError::ReLoginFailed {
            cause: ReloginCause::RetryRejected,
            ..
        }
    ));
    assert_eq!(strategy.calls(), 1);
    assert_eq!(call.calls(), 2);
}

#[tokio::test]
async fn test_auth_retry_can_be_disabled() {
    let strategy = Arc::new(FakeStrategy::issuing("t2"));
    let layer = layer_with(strategy.clone()).await;
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t2"));

    let err = layer
        .facade()
        .request(call, "q".to_string(), RequestOptions::new().without_auth_retry())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RejectError::AuthFailed {
            backend: BackendId::Primary
        }
    );
    assert_eq!(strategy.calls(), 0);
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let mut config = AccessConfig::default();
    config.timeouts.request_ms = 50;
    let layer = AccessLayer::builder(config)
        .storage(Arc::new(campus_access::storage::MemoryStorage::new()))
        .build()
        .await
        .unwrap();
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t1").with_delay(Duration::from_millis(300)));

    let err = layer
        .facade()
        .request(call, "q".to_string(), RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err, RejectError::Timeout);
}

#[tokio::test]
async fn test_sessions_and_cache_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AccessConfig::default();
    config.storage.path = dir.path().join("state.json");

    {
        let layer = AccessLayer::init(config.clone()).await.unwrap();
        layer
            .sessions()
            .set(BackendId::Primary, Credential::new("t1"))
            .await
            .unwrap();
        layer
            .sessions()
            .set(BackendId::Booking, Credential::new("booking"))
            .await
            .unwrap();
        let call = Arc::new(FakeCall::new(BackendId::Primary, "t1"));
        layer
            .facade()
            .request(call, "courses".to_string(), cached("courses", Duration::ZERO))
            .await
            .unwrap();
        layer.dispose().await.unwrap();
    }

    let storage = FileStorage::open(dir.path().join("state.json")).await.unwrap();
    let layer = AccessLayer::builder(config)
        .storage(Arc::new(storage))
        .build()
        .await
        .unwrap();

    let primary = layer.sessions().get(BackendId::Primary);
    assert_eq!(primary.state(), SessionState::Active);
    assert_eq!(primary.credential().map(Credential::expose), Some("t1"));
    // Booking is not in the persisted set.
    assert_eq!(
        layer.sessions().get(BackendId::Booking).state(),
        SessionState::Anonymous
    );

    let call = Arc::new(FakeCall::new(BackendId::Primary, "t1"));
    call.set_offline(true);
    let fetched = layer
        .facade()
        .request(call, "courses".to_string(), cached("courses", Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(fetched.data, "courses@t1");
    assert!(fetched.is_stale());
}

#[tokio::test]
async fn test_query_tracks_fetch_state() {
    let layer = layer_with(Arc::new(FakeStrategy::issuing("unused"))).await;
    layer
        .sessions()
        .set(BackendId::Primary, Credential::new("t1"))
        .await
        .unwrap();
    let call = Arc::new(FakeCall::new(BackendId::Primary, "t1"));
    let query = Query::new(
        layer.facade().clone(),
        call.clone(),
        "news".to_string(),
        cached("news", Duration::ZERO),
    );
    assert_eq!(query.state().view_state(String::is_empty), ViewState::Loading);

    query.refetch().await;
    let state = query.state();
    assert!(!state.is_fetching);
    assert_eq!(state.data.as_deref(), Some("news@t1"));
    assert_eq!(state.view_state(String::is_empty), ViewState::Content);

    call.set_offline(true);
    query.refetch().await;
    let state = query.state();
    assert!(state.stale);
    assert!(state.error.is_none());
    assert_eq!(state.data.as_deref(), Some("news@t1"));
}
