use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, get, post, web};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use vigil_service::Orchestrator;

macros_utils::routes! {
    route status_route,
    route history_route,
    route service_history_route,
    route uptime_route,
    route check_route,
}

const DEFAULT_DAYS: u32 = 7;
const MAX_DAYS: u32 = 365;

/// Response envelope shared by every API route
#[derive(Debug, Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope { success: true, data: Some(data), error: None })
}

#[derive(Debug, Error)]
#[error("{0:#}")]
pub struct ApiError(#[from] anyhow::Error);

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(Envelope::<()> {
            success: false,
            data: None,
            error: Some(self.to_string()),
        })
    }
}

/// `?days=N` lookback window
#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    days: Option<String>,
}

impl WindowQuery {
    /// Days in the window. Missing or unparsable values fall back to the
    /// default; the result is clamped to `1..=365`.
    fn days(&self) -> u32 {
        self.days
            .as_deref()
            .and_then(|days| days.trim().parse::<i64>().ok())
            .and_then(|days| u32::try_from(days.clamp(1, i64::from(MAX_DAYS))).ok())
            .unwrap_or(DEFAULT_DAYS)
    }
}

/// Latest status for all services
#[get("/api/status")]
pub async fn status_route(monitor: web::Data<Orchestrator>) -> Result<HttpResponse, ApiError> {
    let status = monitor.latest_status().await.inspect_err(|e| error!("Error fetching status: {e:#}"))?;
    Ok(ok(status))
}

/// Status history for all services
#[get("/api/history")]
pub async fn history_route(
    monitor: web::Data<Orchestrator>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, ApiError> {
    let history = monitor
        .all_history(query.days())
        .await
        .inspect_err(|e| error!("Error fetching history: {e:#}"))?;
    Ok(ok(history))
}

/// Status history for one service
#[get("/api/history/{service}")]
pub async fn service_history_route(
    monitor: web::Data<Orchestrator>,
    service: web::Path<String>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, ApiError> {
    let history = monitor
        .history(&service, query.days())
        .await
        .inspect_err(|e| error!("Error fetching service history: {e:#}"))?;
    Ok(ok(history))
}

/// Uptime for every configured service
#[get("/api/uptime")]
pub async fn uptime_route(
    monitor: web::Data<Orchestrator>,
    query: web::Query<WindowQuery>,
) -> Result<HttpResponse, ApiError> {
    let uptime = monitor
        .all_uptime(query.days())
        .await
        .inspect_err(|e| error!("Error calculating uptime: {e:#}"))?;
    Ok(ok(uptime))
}

/// Run every check now and answer with the fresh status
#[post("/api/check")]
pub async fn check_route(monitor: web::Data<Orchestrator>) -> Result<HttpResponse, ApiError> {
    let status = monitor.check_now().await.inspect_err(|e| error!("Error triggering health check: {e:#}"))?;
    Ok(ok(status))
}
