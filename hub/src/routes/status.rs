use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::market::require_symbol;
use crate::error::ApiError;
use crate::freshness::{Freshness, FreshnessError, DEFAULT_TIMEFRAME};
use crate::snapshot::{self, SnapshotError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(default = "default_timeframe")]
    timeframe: String,
}

fn default_timeframe() -> String {
    DEFAULT_TIMEFRAME.to_string()
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(liveness))
        .route("/status/{*symbol}", get(api_status))
}

/// GET /: liveness plus the symbols (`BTC/USDT` form) that have a forecast artifact.
async fn liveness(State(state): State<Arc<AppState>>) -> Json<Value> {
    let models = snapshot::list_snapshot_symbols(&state.config.static_dir).await;
    Json(json!({ "status": "ok", "models_loaded": models }))
}

/// GET /status/{symbol}?timeframe=: freshness of the latest snapshot.
///
/// Reads only the snapshot file, so it answers even when the store is down.
async fn api_status(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(q): Query<StatusQuery>,
) -> Result<Json<Value>, ApiError> {
    require_symbol(&symbol)?;
    let timeframe = match q.timeframe.trim() {
        "" => DEFAULT_TIMEFRAME,
        tf => tf,
    };

    let snap = match snapshot::read_snapshot(&state.config.static_dir, &symbol).await {
        Ok(snap) => snap,
        Err(SnapshotError::Missing(path)) => {
            tracing::info!(symbol = %symbol, "no snapshot at {}", path.display());
            return Err(ApiError::ServiceUnavailable("Not initialized yet.".to_string()));
        }
        Err(SnapshotError::Corrupt(e)) => {
            tracing::warn!(symbol = %symbol, "snapshot corrupted: {e}");
            return Err(ApiError::ServiceUnavailable("Data corruption detected".to_string()));
        }
        Err(SnapshotError::MissingTimestamp) => {
            tracing::warn!(symbol = %symbol, "snapshot lacks updated_at");
            return Err(ApiError::ServiceUnavailable("Invalid data format".to_string()));
        }
        Err(e @ SnapshotError::Io(_)) => {
            tracing::error!(symbol = %symbol, "Status Check Error: {e}");
            return Err(ApiError::Internal("Internal Server Error".to_string()));
        }
    };
    tracing::debug!(symbol = %symbol, extra_fields = snap.extra.len(), "snapshot loaded");

    match state
        .thresholds
        .validate(timeframe, &snap.updated_at, state.clock.now())
    {
        Ok(Freshness::Fresh) => Ok(Json(json!({
            "status": "ok",
            "updated_at": snap.updated_at,
        }))),
        Ok(Freshness::Stale(elapsed)) => {
            tracing::info!(
                symbol = %symbol,
                timeframe,
                age_min = elapsed.num_minutes(),
                "snapshot stale"
            );
            Err(ApiError::ServiceUnavailable(format!(
                "Data is stale. Last updated: {}",
                snap.updated_at
            )))
        }
        Err(FreshnessError::Format(raw)) => {
            tracing::warn!(symbol = %symbol, "unparseable updated_at {raw:?}");
            Err(ApiError::ServiceUnavailable("Invalid timestamp format".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{get, test_app};
    use axum::http::StatusCode;
    use std::fs;

    // Store is never contacted on these paths.
    const NO_STORE: &str = "http://127.0.0.1:9";
    const NOW: &str = "2024-05-01T09:00:00Z";

    fn write_snapshot(dir: &std::path::Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn fresh_snapshot_is_ok() {
        let (app, dir) = test_app(NO_STORE, NOW);
        write_snapshot(dir.path(), "prediction_BTC_USDT.json", r#"{"updated_at":"2024-05-01T07:56:00"}"#);

        let (status, body) = get(app, "/status/BTC/USDT?timeframe=1h").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["updated_at"], "2024-05-01T07:56:00");
    }

    #[tokio::test]
    async fn stale_snapshot_is_unavailable() {
        let (app, dir) = test_app(NO_STORE, NOW);
        write_snapshot(dir.path(), "prediction_BTC_USDT.json", r#"{"updated_at":"2024-05-01T07:54:00"}"#);

        let (status, body) = get(app, "/status/BTC/USDT").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Data is stale. Last updated: 2024-05-01T07:54:00");
    }

    #[tokio::test]
    async fn wider_timeframe_tolerates_older_snapshot() {
        let (app, dir) = test_app(NO_STORE, NOW);
        write_snapshot(dir.path(), "prediction_BTC_USDT.json", r#"{"updated_at":"2024-05-01T06:00:00"}"#);

        let (status, _) = get(app.clone(), "/status/BTC/USDT?timeframe=4h").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = get(app.clone(), "/status/BTC/USDT?timeframe=1h").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        // Unknown label falls back to the hourly threshold.
        let (status, _) = get(app, "/status/BTC/USDT?timeframe=3w").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn missing_snapshot_is_not_initialized() {
        let (app, _dir) = test_app(NO_STORE, NOW);
        let (status, body) = get(app, "/status/BTC/USDT").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Not initialized yet.");
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_unavailable_not_internal() {
        let (app, dir) = test_app(NO_STORE, NOW);
        write_snapshot(dir.path(), "prediction_BTC_USDT.json", r#"{"updated_at": "2024-05"#);

        let (status, body) = get(app, "/status/BTC/USDT").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Data corruption detected");
    }

    #[tokio::test]
    async fn snapshot_without_timestamp_is_invalid_format() {
        let (app, dir) = test_app(NO_STORE, NOW);
        write_snapshot(dir.path(), "prediction_BTC_USDT.json", r#"{"model":"prophet"}"#);

        let (status, body) = get(app, "/status/BTC/USDT").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Invalid data format");
    }

    #[tokio::test]
    async fn malformed_timestamp_is_unavailable() {
        let (app, dir) = test_app(NO_STORE, NOW);
        write_snapshot(dir.path(), "prediction_BTC_USDT.json", r#"{"updated_at":"May 1st"}"#);

        let (status, _) = get(app, "/status/BTC/USDT").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn unreadable_snapshot_is_internal_error() {
        let (app, dir) = test_app(NO_STORE, NOW);
        // A directory where the file should be makes the read fail with a non-NotFound error.
        fs::create_dir(dir.path().join("prediction_BTC_USDT.json")).unwrap();

        let (status, body) = get(app, "/status/BTC/USDT").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Internal Server Error");
    }

    #[tokio::test]
    async fn liveness_lists_snapshot_symbols() {
        let (app, dir) = test_app(NO_STORE, NOW);
        write_snapshot(dir.path(), "prediction_ETH_USDT.json", "{}");
        write_snapshot(dir.path(), "prediction_BTC_USDT.json", "{}");

        let (status, body) = get(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["models_loaded"], serde_json::json!(["BTC/USDT", "ETH/USDT"]));
    }
}
