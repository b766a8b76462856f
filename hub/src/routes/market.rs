use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::error::ApiError;
use crate::series::{OhlcvRow, PredictionRow};
use crate::state::AppState;
use crate::store::query::{MEASUREMENT_OHLCV, MEASUREMENT_PREDICTION};
use crate::store::{NoDataReason, QueryResult};

const HISTORY_LOOKBACK_DAYS: u32 = 30;
/// Covers freshly written forecasts plus recent history near the boundary.
const PREDICTION_LOOKBACK_DAYS: u32 = 2;
const PREDICTION_SOURCE: &str = "InfluxDB (Pre-computed)";

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    symbol: String,
    count: usize,
    execution_time: f64,
    data: Vec<OhlcvRow>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    symbol: String,
    source: &'static str,
    execution_time: f64,
    forecast: Vec<PredictionRow>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/history/{*symbol}", get(api_history))
        .route("/predict/{*symbol}", get(api_predict))
}

/// Seconds since `started`, rounded to 4 decimals.
fn elapsed_secs(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 10_000.0).round() / 10_000.0
}

pub(crate) fn require_symbol(symbol: &str) -> Result<(), ApiError> {
    if symbol.trim().is_empty() {
        return Err(ApiError::BadRequest("symbol is required".to_string()));
    }
    Ok(())
}

fn store_unavailable() -> ApiError {
    ApiError::ServiceUnavailable("Data store unavailable. Retry later.".to_string())
}

/// GET /history/{symbol}: last 30 days of candles.
async fn api_history(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let started = Instant::now();
    require_symbol(&symbol)?;

    let frame = match state
        .query
        .query(&symbol, MEASUREMENT_OHLCV, HISTORY_LOOKBACK_DAYS)
        .await
    {
        QueryResult::Rows(frame) => frame,
        QueryResult::NoData(NoDataReason::Unavailable) => return Err(store_unavailable()),
        QueryResult::NoData(NoDataReason::Empty) => {
            return Err(ApiError::NotFound(format!("No history data for {symbol}")));
        }
    };

    let data: Vec<OhlcvRow> = frame.rows().iter().map(OhlcvRow::from).collect();
    Ok(Json(HistoryResponse {
        symbol,
        count: data.len(),
        execution_time: elapsed_secs(started),
        data,
    }))
}

/// GET /predict/{symbol}: forecast points still ahead of now.
async fn api_predict(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<Json<PredictResponse>, ApiError> {
    let started = Instant::now();
    require_symbol(&symbol)?;

    let frame = match state
        .query
        .query(&symbol, MEASUREMENT_PREDICTION, PREDICTION_LOOKBACK_DAYS)
        .await
    {
        QueryResult::Rows(frame) => frame,
        QueryResult::NoData(NoDataReason::Unavailable) => return Err(store_unavailable()),
        // The worker has never written anything for this symbol.
        QueryResult::NoData(NoDataReason::Empty) => {
            return Err(ApiError::NotFound("No prediction data found.".to_string()));
        }
    };

    let now = state.clock.now();
    let forecast: Vec<PredictionRow> = frame
        .rows()
        .iter()
        .filter(|r| r.timestamp > now)
        .map(PredictionRow::from)
        .collect();

    // Rows exist but all are in the past: the worker stopped producing.
    if forecast.is_empty() {
        let last = frame.rows().last().map(|r| r.timestamp);
        tracing::warn!(symbol = %symbol, last = ?last, "prediction pipeline stale");
        return Err(ApiError::ServiceUnavailable(
            "System outdated. Worker is down.".to_string(),
        ));
    }

    Ok(Json(PredictResponse {
        symbol,
        source: PREDICTION_SOURCE,
        execution_time: elapsed_secs(started),
        forecast,
    }))
}
