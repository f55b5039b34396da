//! HTTP handlers.
//!
//! Each handler extracts the multipart upload, delegates to the service
//! layer, and maps failures through [`AppError`].

use axum::extract::{Multipart, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::info;

use super::dto::ReportQuery;
use super::error::AppError;
use super::state::AppState;
use crate::io::loaders::load_daily_csv_from_bytes;
use crate::models::config::Config;
use crate::models::deck::Deck;
use crate::services::harness::{run_scenarios, HarnessReport};
use crate::services::pipeline::build_deck;
use crate::services::starter::starter_yaml;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

struct ReportUpload {
    config_text: String,
    csv_bytes: Option<Vec<u8>>,
}

async fn read_upload(mut multipart: Multipart) -> Result<ReportUpload, AppError> {
    let mut config_text: Option<String> = None;
    let mut csv_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("configfile") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("unreadable configfile: {}", e)))?;
                config_text = Some(text);
            }
            Some("csvfile") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("unreadable csvfile: {}", e)))?;
                if !bytes.is_empty() {
                    csv_bytes = Some(bytes.to_vec());
                }
            }
            _ => {}
        }
    }

    let config_text = config_text
        .ok_or_else(|| AppError::BadRequest("missing 'configfile' upload field".to_string()))?;
    Ok(ReportUpload {
        config_text,
        csv_bytes,
    })
}

/// POST /report (also mounted as /get-wbr-metrics)
///
/// Accepts a YAML config plus an optional CSV upload; query parameters
/// override setup values. Returns the deck document.
pub async fn build_report(
    State(_state): State<AppState>,
    Query(query): Query<ReportQuery>,
    multipart: Multipart,
) -> HandlerResult<Deck> {
    let upload = read_upload(multipart).await?;

    let mut cfg = Config::from_yaml_str(&upload.config_text).map_err(AppError::Engine)?;
    query.apply_to(&mut cfg.setup);

    let uploaded_table = match upload.csv_bytes {
        Some(bytes) => Some(load_daily_csv_from_bytes(bytes).map_err(AppError::Engine)?),
        None => None,
    };

    info!(
        has_upload = uploaded_table.is_some(),
        week_ending = %cfg.setup.week_ending,
        "building report"
    );
    let deck = build_deck(&cfg, uploaded_table).await?;
    Ok(Json(deck))
}

/// POST /download_yaml
///
/// Takes a CSV upload and returns a starter YAML configuration.
pub async fn download_yaml(mut multipart: Multipart) -> Result<Response, AppError> {
    let mut csv_bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("csvfile") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("unreadable csvfile: {}", e)))?;
            csv_bytes = Some(bytes.to_vec());
        }
    }
    let csv_bytes =
        csv_bytes.ok_or_else(|| AppError::BadRequest("missing 'csvfile' upload field".into()))?;

    let table = load_daily_csv_from_bytes(csv_bytes).map_err(AppError::Engine)?;
    let yaml = starter_yaml(&table).map_err(AppError::Engine)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-yaml"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"wbr-config.yaml\"",
            ),
        ],
        yaml,
    )
        .into_response())
}

/// GET /wbr-unit-test
///
/// Runs the scenario harness over the configured suite directory.
pub async fn wbr_unit_test(State(state): State<AppState>) -> HandlerResult<HarnessReport> {
    let report = run_scenarios(&state.test_suite_dir).await?;
    Ok(Json(report))
}
