//! HTTP surface tests (feature `http-server`).
#![cfg(feature = "http-server")]

mod support;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use support::{date, ramp_csv};
use tower::ServiceExt;
use wbr_engine::http::{create_router, AppState};

fn app() -> axum::Router {
    create_router(AppState::new(std::path::PathBuf::from("tests/scenarios")))
}

fn multipart_body(boundary: &str, parts: &[(&str, &str, &str)]) -> String {
    let mut body = String::new();
    for (name, filename, contents) in parts {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{}\r\n",
            boundary, name, filename, contents
        ));
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    body
}

#[tokio::test]
async fn health_endpoint_responds() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn report_endpoint_builds_a_deck() {
    let config = r#"
setup:
  weekEnding: 25-SEP-2021
  weekNumber: 38
  title: Over HTTP
metrics:
  Impressions:
    column: Impressions
    aggf: sum
deck:
  - uiType: 6_12Graph
    title: Impressions
    metrics:
      Impressions: ~
"#;
    let csv = ramp_csv(date(2021, 9, 25), 730, &["Impressions"]);
    let boundary = "wbrtestboundary";
    let body = multipart_body(
        boundary,
        &[
            ("configfile", "config.yaml", config),
            ("csvfile", "daily.csv", &csv),
        ],
    );

    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/report?tooltip=true")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let deck: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(deck["title"], "Over HTTP");
    assert_eq!(deck["weekEnding"], "25 September 2021");
    assert_eq!(deck["blocks"][0]["plotStyle"], "6_12_chart");
    // The query override turned tooltips on.
    assert_eq!(deck["blocks"][0]["tooltip"], true);
}

#[tokio::test]
async fn report_endpoint_rejects_missing_config() {
    let boundary = "wbrtestboundary";
    let body = multipart_body(boundary, &[("csvfile", "daily.csv", "Date,A\n2021-09-01,1\n")]);
    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/report")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_yaml_returns_starter_config() {
    let csv = ramp_csv(date(2021, 9, 25), 40, &["Impressions"]);
    let boundary = "wbrtestboundary";
    let body = multipart_body(boundary, &[("csvfile", "daily.csv", &csv)]);

    let response = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/download_yaml")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("Impressions"));
    assert!(text.contains("uiType"));
}
