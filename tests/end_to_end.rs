//! Full stack: config → service → router → fake renderer process.
#![cfg(unix)]

mod common;
use crate::common::builders::{ConfigFileBuilder, test_settings};
use crate::common::fake_backend::{FakeBackend, FakeBehaviour, release, service_with};
use crate::common::fake_renderer::{FakeRenderer, Scenario};
use crate::common::{TestResult, eventually, init_tracing, job_dirs, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use tower::ServiceExt;

use tlr_avatar::build_service;
use tlr_avatar::engine::ConcurrencyGate;
use tlr_avatar::http::{AppState, router};
use tlr_avatar::types::OverloadPolicy;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

fn post_avatar(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/avatar")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

#[tokio::test]
async fn deterministic_renderer_returns_png() -> TestResult {
    init_tracing();
    let fake = FakeRenderer::install(Scenario::Succeed)?;
    let work = tempfile::tempdir()?;
    let cfg = ConfigFileBuilder::new()
        .program(&fake.program())
        .work_root(work.path())
        .timeout_ms(10_000)
        .build();
    let app = router(AppState::new(Arc::new(build_service(&cfg)), fake.program()));

    let response = with_timeout(send(
        &app,
        post_avatar(json!({ "seed": 42, "height": 1.7, "format": "png" })),
    ))
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-avatar-seed"], "42");
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    assert!(bytes.starts_with(PNG_SIGNATURE));
    assert_eq!(&bytes[12..16], b"IHDR");

    let args = fake.last_args().expect("renderer ran");
    assert!(args.windows(2).any(|w| w == ["--seed", "42"]));
    // Streaming finished, so the job directory is gone.
    assert!(eventually(Duration::from_secs(2), || job_dirs(work.path()) == 0).await);
    Ok(())
}

#[tokio::test]
async fn out_of_range_height_is_rejected_without_spawning() -> TestResult {
    init_tracing();
    let fake = FakeRenderer::install(Scenario::Succeed)?;
    let work = tempfile::tempdir()?;
    let cfg = ConfigFileBuilder::new()
        .program(&fake.program())
        .work_root(work.path())
        .build();
    let app = router(AppState::new(Arc::new(build_service(&cfg)), fake.program()));

    let response = send(&app, post_avatar(json!({ "height": -5 }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body["error"]["kind"], "invalid_parameter");
    assert_eq!(body["error"]["field"], "height");

    assert_eq!(fake.invocations(), 0);
    assert_eq!(job_dirs(work.path()), 0);
    Ok(())
}

async fn burst(policy: OverloadPolicy) -> TestResult {
    init_tracing();
    const BOUND: usize = 2;
    let work = tempfile::tempdir()?;
    let backend = FakeBackend::new(work.path(), FakeBehaviour::Succeed).held();
    let stats = backend.stats();
    let releaser = backend.releaser().expect("held backend");
    let service = service_with(
        Arc::new(backend),
        ConcurrencyGate::new(BOUND, BOUND, policy),
        test_settings(Duration::from_secs(10)),
    );
    let app = router(AppState::new(Arc::clone(&service), "/nonexistent/blender"));

    let tasks: Vec<_> = (0..2 * BOUND)
        .map(|seed| {
            let app = app.clone();
            tokio::spawn(async move {
                send(&app, post_avatar(json!({ "seed": seed, "height": 1.7 })))
                    .await
                    .status()
            })
        })
        .collect();

    assert!(eventually(Duration::from_secs(2), || stats.started() == BOUND).await);
    let expected_queued = match policy {
        OverloadPolicy::Queue => BOUND,
        OverloadPolicy::Reject => 0,
    };
    assert!(eventually(Duration::from_secs(2), || service.stats().queued == expected_queued).await);
    assert_eq!(stats.running(), BOUND);

    release(&releaser, 2 * BOUND);
    let mut ok = 0;
    let mut rejected = 0;
    for task in tasks {
        match with_timeout(task).await? {
            StatusCode::OK => ok += 1,
            StatusCode::SERVICE_UNAVAILABLE => rejected += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(ok + rejected, 2 * BOUND);
    assert_eq!(stats.max_running(), BOUND);
    match policy {
        OverloadPolicy::Queue => assert_eq!(ok, 2 * BOUND),
        OverloadPolicy::Reject => assert_eq!((ok, rejected), (BOUND, BOUND)),
    }
    Ok(())
}

#[tokio::test]
async fn burst_of_twice_the_bound_queues() -> TestResult {
    burst(OverloadPolicy::Queue).await
}

#[tokio::test]
async fn burst_of_twice_the_bound_rejects_the_excess() -> TestResult {
    burst(OverloadPolicy::Reject).await
}
