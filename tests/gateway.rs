mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use tower::ServiceExt;

use common::*;
use donut_lib::commands::proxy::bearer_policy;
use donut_lib::modules::oauth::{OidcClient, CLIENT_ID};
use donut_lib::proxy::middleware::BearerPolicy;
use donut_lib::AppError;

const TOKEN: &str = "Bearer access-1";

#[tokio::test]
async fn test_investor_account_is_rewritten_to_external_path() {
    let (engine, recorder) = spawn_recorder(StatusCode::ACCEPTED).await;
    let (withdrawal, withdrawals) = spawn_recorder(StatusCode::ACCEPTED).await;
    let (_server, base) = spawn_gateway(&gateway_config(engine, withdrawal), BearerPolicy::Presence).await;

    let payload = r#"{"assetAccountId":"AA1111","ownerId":"owner-1","type":"IBAN","intermediaryId":"INT","withdrawalAllowed":true}"#;
    let response = reqwest::Client::new()
        .post(format!("{}/api/assetAccount/investor", base))
        .header("authorization", TOKEN)
        .header("content-type", "application/json")
        .body(payload)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.text().await.unwrap(), payload);

    let call = recorder.last();
    assert_eq!(call.method, "POST");
    assert_eq!(call.uri, "/api/externalAssetAccount/investor");
    assert_eq!(call.body, payload.as_bytes());
    assert_eq!(call.headers["authorization"], TOKEN);
    assert_eq!(call.headers["content-type"], "application/json");
    assert_eq!(call.headers["host"], engine.to_string().as_str());
    assert!(withdrawals.calls().is_empty());
}

#[tokio::test]
async fn test_close_keeps_method_and_status() {
    let (engine, recorder) = spawn_recorder(StatusCode::ACCEPTED).await;
    let withdrawal = closed_port().await;
    let (_server, base) = spawn_gateway(&gateway_config(engine, withdrawal), BearerPolicy::Presence).await;

    let response = reqwest::Client::new()
        .patch(format!("{}/api/assetAccount/AA1111/close", base))
        .header("authorization", TOKEN)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let call = recorder.last();
    assert_eq!(call.method, "PATCH");
    assert_eq!(call.uri, "/api/externalAssetAccount/AA1111/close");
}

#[tokio::test]
async fn test_withdraw_goes_to_withdrawal_backend_unchanged() {
    let (engine, engine_calls) = spawn_recorder(StatusCode::ACCEPTED).await;
    let (withdrawal, recorder) = spawn_recorder(StatusCode::ACCEPTED).await;
    let (_server, base) = spawn_gateway(&gateway_config(engine, withdrawal), BearerPolicy::Presence).await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/assetAccount/AA1111/withdraw", base))
        .header("authorization", TOKEN)
        .json(&serde_json::json!({ "assetAccountId": "AA1111", "amount": 10 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(recorder.last().uri, "/api/assetAccount/AA1111/withdraw");
    assert_eq!(recorder.last().headers["host"], withdrawal.to_string().as_str());
    assert!(engine_calls.calls().is_empty());
}

#[tokio::test]
async fn test_bodiless_get_keeps_query_and_sends_no_body() {
    let (engine, recorder) = spawn_recorder(StatusCode::OK).await;
    let withdrawal = closed_port().await;
    let (_server, base) = spawn_gateway(&gateway_config(engine, withdrawal), BearerPolicy::Presence).await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/user/u-1?expand=accounts&x=%20y", base))
        .header("authorization", TOKEN)
        .header("content-type", "application/json")
        .body("ignored")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let call = recorder.last();
    assert_eq!(call.uri, "/api/user/u-1?expand=accounts&x=%20y");
    assert!(call.body.is_empty());
    assert!(call.headers.get("content-type").is_none());
}

#[tokio::test]
async fn test_large_body_round_trips_byte_for_byte() {
    let (engine, recorder) = spawn_recorder(StatusCode::OK).await;
    let withdrawal = closed_port().await;
    let (_server, base) = spawn_gateway(&gateway_config(engine, withdrawal), BearerPolicy::Presence).await;

    // Several copy-buffer lengths, not a multiple of one
    let payload: Vec<u8> = (0..1_000_003u32).map(|i| (i % 251) as u8).collect();
    let response = reqwest::Client::new()
        .put(format!("{}/api/assetAccount/AA1/documents", base))
        .header("authorization", TOKEN)
        .body(payload.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = response.bytes().await.unwrap();
    assert_eq!(echoed.len(), payload.len());
    assert!(echoed == payload);
    assert_eq!(recorder.last().body.len(), payload.len());
}

#[tokio::test]
async fn test_backend_headers_reach_client_without_transfer_encoding() {
    let backend = Router::new().route(
        "/api/user/stream",
        get(|| async {
            let chunks = futures::stream::iter(
                ["first,", "second,", "third"].map(|c| Ok::<_, std::io::Error>(Bytes::from(c))),
            );
            (
                [("x-request-id", "r-42"), ("cache-control", "no-store")],
                Body::from_stream(chunks),
            )
        }),
    );
    let engine = spawn(backend).await;
    let config = gateway_config(engine, closed_port().await);

    let response = gateway_router(&config, BearerPolicy::Presence)
        .oneshot(
            Request::builder()
                .uri("/api/user/stream")
                .header("authorization", TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "r-42");
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert!(response.headers().get("transfer-encoding").is_none());

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "first,second,third");
}

#[tokio::test]
async fn test_backend_cors_headers_pass_through_untouched() {
    let backend = Router::new().route(
        "/api/user/u-1",
        get(|| async {
            (
                [
                    ("access-control-allow-origin", "https://app.example"),
                    ("access-control-allow-credentials", "true"),
                ],
                "{}",
            )
        }),
    );
    let engine = spawn(backend).await;
    let config = gateway_config(engine, closed_port().await);

    let response = gateway_router(&config, BearerPolicy::Presence)
        .oneshot(
            Request::builder()
                .uri("/api/user/u-1")
                .header("authorization", TOKEN)
                .header("origin", "https://other.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let origins: Vec<_> = response
        .headers()
        .get_all("access-control-allow-origin")
        .iter()
        .collect();
    assert_eq!(origins, vec!["https://app.example"]);
    assert_eq!(response.headers()["access-control-allow-credentials"], "true");
    assert!(response.headers().get("vary").is_none());
}

#[tokio::test]
async fn test_platform_answers_cross_origin_callers() {
    let config = gateway_config(closed_port().await, closed_port().await);

    let response = gateway_router(&config, BearerPolicy::Presence)
        .oneshot(
            Request::builder()
                .uri("/platform")
                .header("origin", "https://app.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_unknown_path_is_not_forwarded() {
    let (engine, recorder) = spawn_recorder(StatusCode::OK).await;
    let config = gateway_config(engine, closed_port().await);

    let response = gateway_router(&config, BearerPolicy::Presence)
        .oneshot(
            Request::builder()
                .uri("/api/assetAccounts/AA1")
                .header("authorization", TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_missing_bearer_is_rejected_before_forwarding() {
    let (engine, recorder) = spawn_recorder(StatusCode::OK).await;
    let config = gateway_config(engine, closed_port().await);
    let router = gateway_router(&config, BearerPolicy::Presence);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/user")
                .method("POST")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], "Bearer");
    assert!(recorder.calls().is_empty());

    let platform = router
        .oneshot(Request::builder().uri("/platform").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(platform.status(), StatusCode::OK);
    let body = axum::body::to_bytes(platform.into_body(), usize::MAX).await.unwrap();
    let info: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(info["title"], "donut");
    assert!(info["processId"].as_u64().is_some());
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let config = gateway_config(closed_port().await, closed_port().await);

    let response = gateway_router(&config, BearerPolicy::Disabled)
        .oneshot(
            Request::builder()
                .uri("/api/user/u-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_client_disconnect_stops_backend_stream() {
    let (dropped_tx, dropped_rx) = tokio::sync::oneshot::channel::<()>();
    let dropped_tx = std::sync::Arc::new(std::sync::Mutex::new(Some(dropped_tx)));

    // Endless body that reports when the gateway stops reading it
    struct OnDrop(std::sync::Arc<std::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>>);
    impl Drop for OnDrop {
        fn drop(&mut self) {
            if let Some(tx) = self.0.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }
    }

    let backend = Router::new().route(
        "/api/user/feed",
        get(move || {
            let guard = OnDrop(dropped_tx.clone());
            async move {
                let ticks = futures::stream::unfold(guard, |guard| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Some((Ok::<_, std::io::Error>(Bytes::from_static(&[b'x'; 1024])), guard))
                });
                Body::from_stream(ticks)
            }
        }),
    );
    let engine = spawn(backend).await;
    let config = gateway_config(engine, closed_port().await);
    let (_server, base) = spawn_gateway(&config, BearerPolicy::Presence).await;

    let response = reqwest::Client::new()
        .get(format!("{}/api/user/feed", base))
        .header("authorization", TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut stream = response.bytes_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert!(!first.is_empty());
    drop(stream);

    tokio::time::timeout(Duration::from_secs(10), dropped_rx)
        .await
        .expect("backend stream still running after client left")
        .unwrap();
}

async fn discovered(authority: &str) -> Arc<OidcClient> {
    Arc::new(
        OidcClient::discover(reqwest::Client::new(), authority, CLIENT_ID)
            .await
            .unwrap(),
    )
}

fn get_user(token: &str) -> Request<Body> {
    Request::builder()
        .uri("/api/user/u-1")
        .header("authorization", token)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_userinfo_policy_forwards_only_accepted_tokens() {
    let auth = spawn_authority(Arc::new(Mutex::new(Vec::new())), StatusCode::OK).await;
    let (engine, recorder) = spawn_recorder(StatusCode::OK).await;
    let config = gateway_config(engine, closed_port().await);
    let router = gateway_router(&config, BearerPolicy::UserInfo(discovered(&auth.base).await));

    let rejected = router.clone().oneshot(get_user("Bearer access-1")).await.unwrap();
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(rejected.headers()["www-authenticate"], "Bearer");
    assert!(recorder.calls().is_empty());

    let accepted = router.oneshot(get_user("Bearer access-2")).await.unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    let call = recorder.last();
    assert_eq!(call.uri, "/api/user/u-1");
    assert_eq!(call.headers["authorization"], "Bearer access-2");
}

#[tokio::test]
async fn test_userinfo_policy_unreachable_authority_is_bad_gateway() {
    // Discovery succeeds but the userinfo endpoint is down
    let dead = closed_port().await;
    let discovery = Router::new().route(
        "/.well-known/openid-configuration",
        get(move || async move {
            axum::Json(serde_json::json!({
                "issuer": "http://authority",
                "authorization_endpoint": "http://authority/connect/authorize",
                "token_endpoint": "http://authority/connect/token",
                "userinfo_endpoint": format!("http://{}/connect/userinfo", dead),
            }))
        }),
    );
    let authority = format!("http://{}", spawn(discovery).await);
    let (engine, recorder) = spawn_recorder(StatusCode::OK).await;
    let config = gateway_config(engine, closed_port().await);

    let response = gateway_router(&config, BearerPolicy::UserInfo(discovered(&authority).await))
        .oneshot(get_user("Bearer access-2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_configured_authority_selects_token_validation() {
    let auth = spawn_authority(Arc::new(Mutex::new(Vec::new())), StatusCode::OK).await;
    let mut config = gateway_config(closed_port().await, closed_port().await);

    assert!(matches!(bearer_policy(&config).await.unwrap(), BearerPolicy::Presence));

    config.authority = Some(auth.base.clone());
    match bearer_policy(&config).await.unwrap() {
        BearerPolicy::UserInfo(oidc) => assert_eq!(oidc.authority(), auth.base),
        _ => panic!("Expected userinfo validation"),
    }

    config.require_bearer = false;
    assert!(matches!(bearer_policy(&config).await.unwrap(), BearerPolicy::Disabled));
}

#[tokio::test]
async fn test_undiscoverable_authority_stops_startup() {
    let mut config = gateway_config(closed_port().await, closed_port().await);
    config.authority = Some(format!("http://{}", closed_port().await));

    assert!(matches!(
        bearer_policy(&config).await,
        Err(AppError::AuthDiscoveryFailed(_))
    ));
}
