//! HTTP integrations against mock backends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use campus_access::backends::TokenPair;
use campus_access::classify::ReloginCause;
use campus_access::config::AccessConfig;
use campus_access::facade::RequestOptions;
use campus_access::session::{Account, SessionState};
use campus_access::storage::MemoryStorage;
use campus_access::{AccessLayer, BackendId, Credential, RejectError};
use reqwest::Method;
use serde_json::{json, Value};

mod common;
use common::{start_mock_backend, MockResponse};

fn envelope(code: &str, message: &str, data: Value) -> MockResponse {
    MockResponse::json(200, json!({ "code": code, "message": message, "data": data }))
}

async fn layer_for(addr: SocketAddr) -> AccessLayer {
    let mut config = AccessConfig::default();
    config.backends.primary_url = format!("http://{addr}/");
    config.backends.booking_url = format!("http://{addr}/api/ibs/");
    config.backends.sso_exchange_url = format!("http://{addr}/authorize");
    config.backends.identity_url = format!("http://{addr}/api/qr/");
    AccessLayer::builder(config)
        .storage(Arc::new(MemoryStorage::new()))
        .build()
        .await
        .unwrap()
}

fn primary_tokens(layer: &AccessLayer) -> Option<TokenPair> {
    layer
        .sessions()
        .get(BackendId::Primary)
        .credential()
        .and_then(TokenPair::from_credential)
}

#[tokio::test]
async fn test_envelope_data_decoded_and_rotated_tokens_stored() {
    let (addr, log) = start_mock_backend(|_| {
        envelope("10000", "ok", json!({ "name": "Lin" })).with_header("access-token", "a2")
    })
    .await;
    let layer = layer_for(addr).await;
    layer
        .sessions()
        .set(BackendId::Primary, TokenPair::new("a1", "r1").to_credential())
        .await
        .unwrap();

    let call = layer.primary_call::<Vec<(String, String)>, Value>(Method::GET, "/api/v1/user");
    let fetched = layer
        .facade()
        .request(
            call,
            vec![("term".to_string(), "202401".to_string())],
            RequestOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(fetched.data, json!({ "name": "Lin" }));
    let requests = log.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/api/v1/user?term=202401");
    assert_eq!(requests[0].header("authorization"), Some("a1"));
    assert_eq!(requests[0].header("access-token"), Some("a1"));

    assert_eq!(primary_tokens(&layer), Some(TokenPair::new("a2", "r1")));
}

#[tokio::test]
async fn test_expired_token_refreshed_and_request_retried() {
    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = refreshes.clone();
    let (addr, _log) = start_mock_backend(move |req| {
        if req.path.starts_with("/api/v1/login/refresh-token") {
            counter.fetch_add(1, Ordering::SeqCst);
            return if req.header("authorization") == Some("r1") {
                envelope("10000", "ok", Value::Null)
                    .with_header("access-token", "a2")
                    .with_header("refresh-token", "r2")
            } else {
                envelope("30002", "refresh token expired", Value::Null)
            };
        }
        match req.header("authorization") {
            Some("a2") => envelope("10000", "ok", json!([1, 2, 3])),
            _ => envelope("30001", "token expired", Value::Null),
        }
    })
    .await;
    let layer = layer_for(addr).await;
    layer
        .sessions()
        .set(BackendId::Primary, TokenPair::new("a1", "r1").to_credential())
        .await
        .unwrap();

    let call = layer.primary_call::<(), Vec<u32>>(Method::POST, "/api/v1/scores");
    let fetched = layer
        .facade()
        .request(call, (), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(fetched.data, vec![1, 2, 3]);
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(primary_tokens(&layer), Some(TokenPair::new("a2", "r2")));
}

#[tokio::test]
async fn test_rejected_refresh_token_requires_sign_in() {
    let (addr, _log) = start_mock_backend(|req| {
        if req.path.starts_with("/api/v1/login/refresh-token") {
            envelope("30002", "refresh token expired", Value::Null)
        } else {
            envelope("30001", "token expired", Value::Null)
        }
    })
    .await;
    let layer = layer_for(addr).await;
    layer
        .sessions()
        .set(BackendId::Primary, TokenPair::new("a1", "r1").to_credential())
        .await
        .unwrap();

    let call = layer.primary_call::<(), Value>(Method::GET, "/api/v1/scores");
    let err = layer
        .facade()
        .request(call, (), RequestOptions::new())
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
}

#[tokio::test]
async fn test_envelope_codes_classified() {
    let (addr, _log) = start_mock_backend(|req| {
        if req.path.starts_with("/academic") {
            envelope("50001", "academic session expired", Value::Null)
        } else {
            envelope("40001", "term not open", json!({ "term": "202401" }))
        }
    })
    .await;
    let layer = layer_for(addr).await;

    let academic = layer.primary_call::<(), Value>(Method::GET, "/academic/grades");
    let err = layer
        .facade()
        .request(academic, (), RequestOptions::new().without_auth_retry())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RejectError::AuthFailed {
            backend: BackendId::Academic
        }
    );

    let business = layer.primary_call::<(), Value>(Method::GET, "/api/v1/course");
    let err = layer
        .facade()
        .request(business, (), RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RejectError::BizFailed {
            code: "40001".into(),
            message: "term not open".into(),
            data: json!({ "term": "202401" }),
        }
    );
}

#[tokio::test]
async fn test_academic_expiry_without_login_flow_fails_relogin() {
    let (addr, _log) =
        start_mock_backend(|_| envelope("50001", "academic session expired", Value::Null)).await;
    let layer = layer_for(addr).await;

    let call = layer.primary_call::<(), Value>(Method::GET, "/academic/grades");
    let err = layer
        .facade()
        .request(call, (), RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RejectError::ReLoginFailed {
            cause: ReloginCause::NoStrategy,
            ..
        }
    ));
}

#[tokio::test]
async fn test_booking_token_exchanged_through_sso_redirects() {
    let (addr, log) = start_mock_backend(|req| match req.path.as_str() {
        "/authorize" if req.header("cookie") == Some("TGC=abc") => {
            MockResponse::redirect("/sso/callback").with_header("Set-Cookie", "SESSION=s1; Path=/")
        }
        "/sso/callback" if req.header("cookie") == Some("TGC=abc; SESSION=s1") => {
            MockResponse::redirect("/api/admin/sso/getIbsToken?token=bk2")
        }
        "/api/ibs/spaces" if req.header("token") == Some("bk2") => {
            MockResponse::json(200, json!({ "code": "0", "data": ["A1", "A2"] }))
        }
        "/api/ibs/spaces" => MockResponse::json(500, json!({ "msg": "token invalid" })),
        _ => MockResponse::json(404, json!({})),
    })
    .await;
    let layer = layer_for(addr).await;
    layer
        .sessions()
        .set(BackendId::Sso, Credential::new("TGC=abc"))
        .await
        .unwrap();
    layer
        .sessions()
        .set(BackendId::Booking, Credential::new("bk1"))
        .await
        .unwrap();

    let call = layer.booking_call::<Value, Vec<String>>("spaces");
    let fetched = layer
        .facade()
        .request(call, json!({ "floor": 4 }), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(fetched.data, vec!["A1".to_string(), "A2".to_string()]);
    assert_eq!(
        layer
            .sessions()
            .get(BackendId::Booking)
            .credential()
            .map(Credential::expose),
        Some("bk2")
    );

    let paths: Vec<String> = log.lock().unwrap().iter().map(|r| r.path.clone()).collect();
    assert_eq!(
        paths,
        vec!["/api/ibs/spaces", "/authorize", "/sso/callback", "/api/ibs/spaces"]
    );
}

#[tokio::test]
async fn test_booking_exchange_without_sso_session_requires_sign_in() {
    let (addr, _log) = start_mock_backend(|_| MockResponse::json(500, json!({}))).await;
    let layer = layer_for(addr).await;

    let call = layer.booking_call::<Value, Value>("spaces");
    let err = layer
        .facade()
        .request(call, json!({}), RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RejectError::ReLoginFailed {
            cause: ReloginCause::InvalidCredentials,
            ..
        }
    ));
}

fn identity_backend(req: &common::MockRequest) -> MockResponse {
    match req.path.as_str() {
        "/api/qr/login/getAccessToken" => {
            let body: Value = serde_json::from_str(&req.body).unwrap_or_default();
            if body["username"] == "102301" && body["password"] == "pw" {
                MockResponse::json(
                    200,
                    json!({ "code": 0, "data": { "name": "Lin", "access_token": "tok2" } }),
                )
            } else {
                MockResponse::json(200, json!({ "code": 1, "msg": "wrong password" }))
            }
        }
        "/api/qr/deal/getQrCode" if req.header("authorization") == Some("Bearer tok2") => {
            MockResponse::json(
                200,
                json!({ "code": 0, "data": [{ "devId": "d1", "prePayId": "p1" }] }),
            )
        }
        "/api/qr/deal/getQrCode" => MockResponse::json(401, json!({ "error": "token expired" })),
        _ => MockResponse::json(404, json!({})),
    }
}

#[tokio::test]
async fn test_expired_identity_token_relogs_in_with_stored_account() {
    let (addr, log) = start_mock_backend(identity_backend).await;
    let layer = layer_for(addr).await;
    layer
        .sessions()
        .set(BackendId::Identity, Credential::new("tok1"))
        .await
        .unwrap();
    layer
        .accounts()
        .remember(BackendId::Identity, &Account::new("102301", "pw"))
        .await
        .unwrap();

    let call = layer.identity_call::<Value, Value>("deal/getQrCode");
    let fetched = layer
        .facade()
        .request(call, json!({}), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(fetched.data, json!([{ "devId": "d1", "prePayId": "p1" }]));
    assert_eq!(
        layer
            .sessions()
            .get(BackendId::Identity)
            .credential()
            .map(Credential::expose),
        Some("tok2")
    );

    let requests = log.lock().unwrap().clone();
    let paths: Vec<&str> = requests.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["/api/qr/deal/getQrCode", "/api/qr/login/getAccessToken", "/api/qr/deal/getQrCode"]
    );
    assert_eq!(requests[0].header("authorization"), Some("Bearer tok1"));
    let login: Value = serde_json::from_str(&requests[1].body).unwrap();
    assert_eq!(login["isNotPermanent"], "false");
}

#[tokio::test]
async fn test_identity_wrong_password_requires_sign_in() {
    let (addr, _log) = start_mock_backend(identity_backend).await;
    let layer = layer_for(addr).await;
    layer
        .sessions()
        .set(BackendId::Identity, Credential::new("tok1"))
        .await
        .unwrap();
    layer
        .accounts()
        .remember(BackendId::Identity, &Account::new("102301", "changed"))
        .await
        .unwrap();

    let call = layer.identity_call::<Value, Value>("deal/getQrCode");
    let err = layer
        .facade()
        .request(call, json!({}), RequestOptions::new())
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
        layer.sessions().get(BackendId::Identity).state(),
        SessionState::Anonymous
    );
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let layer = layer_for(addr).await;

    let call = layer.primary_call::<(), Value>(Method::GET, "/api/v1/user");
    let err = layer
        .facade()
        .request(call, (), RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err, RejectError::NetworkError);
}
