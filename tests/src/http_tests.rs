//! The HTTP adapter driven through `create_router` with `oneshot`.

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sponsor_relayer::{create_router, AppState, Config};
use std::sync::Arc;
use tower::ServiceExt;

use crate::utils::{encode, not_send_many, Harness, HarnessBuilder, Verdict, SPONSOR_A, SPONSOR_B};

fn router(h: Harness, api_key: &str) -> Router {
    let config = Config {
        api_key: api_key.into(),
        testnet_sponsors: format!("{SPONSOR_A},{SPONSOR_B}"),
        ..Config::default()
    };
    create_router(Arc::new(AppState::new(config, h.relay)))
}

fn sponsor_call(program: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/sponsor/{program}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn not_body(fee: u64) -> Value {
    json!({
        "txHex": format!("0x{}", hex::encode(encode(&not_send_many(SPONSOR_A, fee.into())))),
        "network": "testnet",
        "feesInNot": fee,
    })
}

async fn read_json(resp: axum::response::Response) -> Result<Value> {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn test_sponsor_endpoint_success() -> Result<()> {
    let app = router(HarnessBuilder::default().chain_nonce(SPONSOR_A, 42).build()?, "");
    let resp = app.oneshot(sponsor_call("not", not_body(10_000))).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = read_json(resp).await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["nonce"], 42);
    assert_eq!(body["sponsorAddress"], SPONSOR_A);
    assert_eq!(body["policy"]["detail"]["amountForSponsor"], 10_000);
    Ok(())
}

#[tokio::test]
async fn test_broadcast_rejection_body() -> Result<()> {
    let h = HarnessBuilder::default()
        .script(vec![Verdict::Reject("NotEnoughFunds".into())])
        .build()?;
    let app = router(h, "");
    let resp = app.oneshot(sponsor_call("not", not_body(10_000))).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body = read_json(resp).await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "broadcast");
    assert_eq!(body["reason"], "NotEnoughFunds");
    Ok(())
}

#[tokio::test]
async fn test_exhausted_pool_is_503() -> Result<()> {
    let h = HarnessBuilder::default()
        .sponsors(&[SPONSOR_A])
        .chaining_limit(1)
        .script(vec![Verdict::Hang])
        .build()?;
    let broadcaster = h.broadcaster.clone();
    let app = router(h, "");

    let first = tokio::spawn(app.clone().oneshot(sponsor_call("not", not_body(10_000))));
    while broadcaster.sent() == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let resp = app.clone().oneshot(sponsor_call("not", not_body(10_000))).await?;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(read_json(resp).await?["kind"], "exhausted");

    broadcaster.release.notify_waiters();
    let resp = first.await??;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let resp = app
        .oneshot(Request::get("/nonces").body(Body::empty())?)
        .await?;
    let body = read_json(resp).await?;
    assert_eq!(body["pools"]["testnet"]["sponsors"][0]["reserved"], 0);
    assert_eq!(body["pools"]["testnet"]["sponsors"][0]["nextNonce"], 0);
    Ok(())
}

#[tokio::test]
async fn test_check_endpoint_reports_mismatch() -> Result<()> {
    let app = router(HarnessBuilder::default().build()?, "");
    let mut body = not_body(10_000);
    body["feesInNot"] = json!("12000");
    let req = Request::builder()
        .method("POST")
        .uri("/check/not")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))?;

    let resp = app.oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["policy"]["eligible"], false);
    assert_eq!(body["policy"]["reasonCode"], "feeMismatch");
    Ok(())
}

#[tokio::test]
async fn test_api_key_required_when_configured() -> Result<()> {
    let app = router(HarnessBuilder::default().build()?, "k3y");

    let resp = app.clone().oneshot(sponsor_call("not", not_body(10_000))).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let mut req = sponsor_call("not", not_body(10_000));
    req.headers_mut().insert("x-api-key", "wrong".parse()?);
    assert_eq!(app.clone().oneshot(req).await?.status(), StatusCode::UNAUTHORIZED);

    let mut req = sponsor_call("not", not_body(10_000));
    req.headers_mut().insert("x-api-key", "k3y".parse()?);
    assert_eq!(app.clone().oneshot(req).await?.status(), StatusCode::OK);

    let resp = app.oneshot(Request::get("/health").body(Body::empty())?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    Ok(())
}
