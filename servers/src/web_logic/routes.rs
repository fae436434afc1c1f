//! # HTTP Routes
//!
//! - `GET /data`: the latest reading (through the cache) plus the row count.
//! - `GET /data/all?limit=N`: up to `N` readings, newest first (default 1000).
//! - `GET /replace`: server-sent events, one per new reading.
//! - `GET /health`: database round-trip.
//!
//! Failures answer with `{ "error": "..." }`. The event stream never fails as
//! a whole; lookup errors arrive as error events.

use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{Method, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use chrono::Local;
use futures_util::StreamExt;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::web_logic::model::{
    AllDataResponse, DEFAULT_LIMIT, DataResponse, EmptyResponse, ErrorBody, HealthResponse, LimitQuery,
};
use crate::web_logic::state::AppState;
use lib_sensor::connections::DbError;
use lib_sensor::models::reading::iso_timestamp;

/// # Application Error
///
/// Handler failures and the status code each one maps to.
#[derive(Debug, Error)]
pub enum AppError {
    /// A read query failed (500).
    #[error("Failed to read data: {0}")]
    Query(#[source] DbError),
    /// The health round-trip failed (503).
    #[error("Database error: {0}")]
    Unavailable(#[source] DbError),
    /// Invalid query parameters (400).
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        if status.is_server_error() {
            error!(%status, "{}", self);
        } else {
            warn!(%status, "{}", self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CACHE_CONTROL]);

    Router::new()
        .route("/data", get(get_data))
        .route("/data/all", get(get_all_data))
        .route("/replace", get(stream_replace))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

fn now_iso() -> String {
    iso_timestamp(Local::now().naive_local())
}

async fn get_data(State(state): State<AppState>) -> Result<Response, AppError> {
    let Some(snapshot) = state.cache().get().await.map_err(AppError::Query)? else {
        let empty = EmptyResponse {
            message: "No data in the database".to_string(),
            data: Vec::new(),
        };
        return Ok(Json(empty).into_response());
    };

    // The count is informative; a failure here does not fail the request.
    let total_records = match state.query().count().await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Failed to count readings");
            0
        }
    };

    Ok(Json(DataResponse {
        status: "success".to_string(),
        latest_data: snapshot.latest_data,
        last_updated: snapshot.last_updated,
        total_records,
    })
    .into_response())
}

async fn get_all_data(
    State(state): State<AppState>,
    params: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<AllDataResponse>, AppError> {
    let Query(params) = params.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit < 0 {
        return Err(AppError::BadRequest(format!("limit must not be negative (got {})", limit)));
    }

    let data = state.query().recent(limit).await.map_err(AppError::Query)?;
    Ok(Json(AllDataResponse {
        status: "success".to_string(),
        total_records: data.len(),
        data,
        last_updated: now_iso(),
    }))
}

async fn stream_replace(State(state): State<AppState>) -> impl IntoResponse {
    let events = state
        .publisher()
        .into_stream()
        .take_until(state.shutdown_token().cancelled_owned())
        .map(|event| Event::default().json_data(&event));

    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(state.stream_interval()));
    ([(header::CACHE_CONTROL, "no-cache")], sse)
}

async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    state.query().ping().await.map_err(AppError::Unavailable)?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        database: "connected".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use lib_sensor::LatestData;
    use lib_sensor::connections::ReadingQuery;
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tower::ServiceExt;

    #[derive(Default)]
    struct StubQuery {
        rows: Vec<LatestData>,
        failing: bool,
        last_limit: Mutex<Option<i64>>,
    }

    impl StubQuery {
        fn fail<T>(&self) -> Result<T, DbError> {
            Err(DbError::Connection("connection refused".into()))
        }
    }

    #[async_trait]
    impl ReadingQuery for StubQuery {
        async fn latest(&self) -> Result<Option<LatestData>, DbError> {
            if self.failing {
                return self.fail();
            }
            Ok(self.rows.first().cloned())
        }

        async fn recent(&self, limit: i64) -> Result<Vec<LatestData>, DbError> {
            if self.failing {
                return self.fail();
            }
            *self.last_limit.lock().unwrap() = Some(limit);
            Ok(self.rows.iter().take(limit as usize).cloned().collect())
        }

        async fn count(&self) -> Result<i64, DbError> {
            if self.failing {
                return self.fail();
            }
            Ok(self.rows.len() as i64)
        }

        async fn ping(&self) -> Result<(), DbError> {
            if self.failing {
                return self.fail();
            }
            Ok(())
        }
    }

    fn row(ts: &str) -> LatestData {
        LatestData {
            timestamp: Some(ts.to_string()),
            ph_value: Some("7.02".into()),
            orp_value: Some("350".into()),
            ntu_value: Some("12".into()),
        }
    }

    fn stocked() -> Arc<StubQuery> {
        Arc::new(StubQuery {
            rows: vec![row("2024-05-01T12:00:10"), row("2024-05-01T12:00:05"), row("2024-05-01T12:00:00")],
            ..Default::default()
        })
    }

    fn app(query: Arc<StubQuery>) -> Router {
        router(AppState::new(query, Duration::from_secs(5), Duration::from_secs(5)))
    }

    async fn call(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn data_returns_latest_and_count() {
        let (status, body) = call(app(stocked()), "/data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["latest_data"]["timestamp"], "2024-05-01T12:00:10");
        assert_eq!(body["latest_data"]["ph_value"], "7.02");
        assert_eq!(body["total_records"], 3);
        assert!(body["last_updated"].is_string());
    }

    #[tokio::test]
    async fn data_on_empty_table_is_not_an_error() {
        let (status, body) = call(app(Arc::new(StubQuery::default())), "/data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], Value::Array(vec![]));
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn data_failure_is_500_with_cause() {
        let query = Arc::new(StubQuery {
            failing: true,
            ..Default::default()
        });
        let (status, body) = call(app(query), "/data").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn all_data_honours_limit() {
        let query = stocked();
        let (status, body) = call(app(query.clone()), "/data/all?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_records"], 2);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(*query.last_limit.lock().unwrap(), Some(2));
    }

    #[tokio::test]
    async fn all_data_defaults_to_a_thousand() {
        let query = stocked();
        let (status, body) = call(app(query.clone()), "/data/all").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_records"], 3);
        assert_eq!(*query.last_limit.lock().unwrap(), Some(DEFAULT_LIMIT));
    }

    #[tokio::test]
    async fn bad_limits_are_rejected() {
        let (status, body) = call(app(stocked()), "/data/all?limit=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = call(app(stocked()), "/data/all?limit=many").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn health_reports_database_state() {
        let (status, body) = call(app(stocked()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "connected");

        let query = Arc::new(StubQuery {
            failing: true,
            ..Default::default()
        });
        let (status, body) = call(app(query), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn replace_streams_the_latest_reading() {
        let response = app(stocked())
            .oneshot(
                Request::builder()
                    .uri("/replace")
                    .header(header::ORIGIN, "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.contains("\"status\":\"success\""));
        assert!(text.contains("2024-05-01T12:00:10"));
    }

    #[tokio::test]
    async fn replace_stream_ends_on_shutdown() {
        let state = AppState::new(stocked(), Duration::from_secs(5), Duration::from_secs(5));
        let token = state.shutdown_token();
        let response = router(state)
            .oneshot(Request::builder().uri("/replace").body(Body::empty()).unwrap())
            .await
            .unwrap();

        token.cancel();
        // Whatever was already produced, the body must now finish.
        let collected = tokio::time::timeout(Duration::from_secs(1), to_bytes(response.into_body(), usize::MAX)).await;
        assert!(collected.is_ok());
    }
}
