use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::news::{FetchStatus, NewsView, RunOutcome};

#[derive(Debug, Deserialize)]
pub(crate) struct NewsParams {
    limit: Option<String>,
}

/// Parsed `limit`: missing, malformed or non-positive values give `default`
pub fn resolve_limit(raw: Option<&str>, default: u32, max: u32) -> u32 {
    match raw.and_then(|s| s.trim().parse::<i64>().ok()) {
        Some(n) if n > 0 => n.min(i64::from(max)) as u32,
        _ => default.min(max),
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NewsListResponse {
    success: bool,
    data: Vec<NewsView>,
    count: usize,
}

pub(crate) async fn list_news(
    State(state): State<AppState>,
    Query(params): Query<NewsParams>,
) -> Json<NewsListResponse> {
    let limit = resolve_limit(params.limit.as_deref(), state.default_limit, state.max_limit);
    let data = state.query.get_active_news(limit).await;

    Json(NewsListResponse {
        success: true,
        count: data.len(),
        data,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusData {
    last_fetch: Option<DateTime<Utc>>,
    news_count: u64,
    latest_news: Option<NewsView>,
    fetch_status: FetchStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusResponse {
    success: bool,
    data: StatusData,
}

pub(crate) async fn news_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let last_fetch = state.query.last_fetch_time().await;
    let news_count = state.query.count_active().await;
    let latest_news = state.query.get_active_news(1).await.into_iter().next();

    Json(StatusResponse {
        success: true,
        data: StatusData {
            last_fetch,
            news_count,
            latest_news,
            fetch_status: state.pipeline.fetch_status(),
        },
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    count: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    skipped: bool,
}

pub(crate) async fn refresh_news(
    State(state): State<AppState>,
) -> (StatusCode, Json<RefreshResponse>) {
    let outcome = state.pipeline.run().await;
    let report = outcome.report();

    let status = match outcome {
        RunOutcome::Saved { .. } => StatusCode::OK,
        ref o if o.is_skip() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = if report.success {
        RefreshResponse {
            success: true,
            message: Some(format!("{} notícias atualizadas com sucesso", report.count)),
            error: None,
            count: report.count,
            skipped: false,
        }
    } else {
        RefreshResponse {
            success: false,
            message: None,
            error: report.error,
            count: 0,
            skipped: report.skipped,
        }
    };

    (status, Json(body))
}
