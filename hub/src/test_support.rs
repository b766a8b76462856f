//! Fixtures shared by the route, query and client tests.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get as get_route, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::clock::FixedClock;
use crate::config::HubConfig;
use crate::state::AppState;
use crate::store::InfluxClient;

pub fn test_config(influx_url: &str, static_dir: &Path) -> HubConfig {
    HubConfig {
        bind: "127.0.0.1".to_string(),
        port: 0,
        influx_url: influx_url.to_string(),
        influx_token: String::new(),
        influx_org: String::new(),
        influx_bucket: "coin".to_string(),
        store_timeout: Duration::from_secs(2),
        store_retries: 1,
        static_dir: static_dir.to_path_buf(),
        cache_ttl: Duration::ZERO,
    }
}

/// Router wired to `influx_url` with the clock pinned at `now` (RFC 3339).
/// The returned directory is the snapshot directory; keep it alive.
pub fn test_app(influx_url: &str, now: &str) -> (Router, TempDir) {
    test_app_with(influx_url, now, |_| {})
}

/// Like [`test_app`], with a hook to adjust the config before wiring.
pub fn test_app_with(
    influx_url: &str,
    now: &str,
    tweak: impl FnOnce(&mut HubConfig),
) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(influx_url, dir.path());
    tweak(&mut cfg);
    let store = Arc::new(
        InfluxClient::connect(&cfg)
            .unwrap()
            .with_backoff_base(Duration::from_millis(5)),
    );
    let now: DateTime<Utc> = DateTime::parse_from_rfc3339(now).unwrap().with_timezone(&Utc);
    let state = AppState::new(cfg, store, Arc::new(FixedClock(now)));
    (crate::routes::app(state), dir)
}

/// Issue a GET and decode the JSON body.
pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

const OHLCV_HEADER: &str = ",result,table,_start,_stop,_time,_measurement,symbol,close,high,low,open,volume";
const PREDICTION_HEADER: &str = ",result,table,_start,_stop,_time,_measurement,symbol,yhat,yhat_lower,yhat_upper";

/// Pivoted OHLCV response; `close` varies, the other fields are fixed.
pub fn ohlcv_csv(rows: &[(&str, f64)]) -> String {
    let mut out = format!("{OHLCV_HEADER}\r\n");
    for (time, close) in rows {
        out.push_str(&format!(
            ",_result,0,2024-04-01T00:00:00Z,2024-05-03T00:00:00Z,{time},ohlcv,BTC/USDT,{close},{high},{low},{open},10\r\n",
            high = close + 0.5,
            low = close - 0.5,
            open = close - 0.25,
        ));
    }
    out.push_str("\r\n");
    out
}

pub fn prediction_csv(times: &[&str]) -> String {
    let mut out = format!("{PREDICTION_HEADER}\r\n");
    for time in times {
        out.push_str(&format!(
            ",_result,0,2024-04-29T00:00:00Z,2024-05-03T00:00:00Z,{time},prediction,BTC/USDT,100,95,105\r\n"
        ));
    }
    out.push_str("\r\n");
    out
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub org: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Default)]
struct Shared {
    hits: AtomicUsize,
    fail_remaining: AtomicUsize,
    last: Mutex<Option<SeenRequest>>,
}

/// In-process stand-in for the InfluxDB query API.
///
/// Answers by measurement, can inject failing statuses and latency, and
/// records what it was asked.
#[derive(Clone, Default)]
pub struct FakeInflux {
    ohlcv: String,
    prediction: String,
    fail_status: Option<StatusCode>,
    delay: Duration,
    shared: Arc<Shared>,
}

impl FakeInflux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ohlcv(mut self, csv: String) -> Self {
        self.ohlcv = csv;
        self
    }

    pub fn with_prediction(mut self, csv: String) -> Self {
        self.prediction = csv;
        self
    }

    pub fn fail_first(mut self, n: usize, status: StatusCode) -> Self {
        self.fail_status = Some(status);
        self.shared.fail_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    /// Query requests received so far (pings excluded).
    pub fn hits(&self) -> usize {
        self.shared.hits.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<SeenRequest> {
        self.shared.last.lock().unwrap().clone()
    }

    /// Serve on an ephemeral port; returns the base URL.
    pub async fn spawn(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/api/v2/query", post(fake_query))
            .route("/ping", get_route(|| async { StatusCode::NO_CONTENT }))
            .with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}

async fn fake_query(
    State(fake): State<FakeInflux>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    fake.shared.hits.fetch_add(1, Ordering::SeqCst);
    *fake.shared.last.lock().unwrap() = Some(SeenRequest {
        org: params.get("org").cloned(),
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: body.clone(),
    });

    if !fake.delay.is_zero() {
        tokio::time::sleep(fake.delay).await;
    }

    if let Some(status) = fake.fail_status {
        let failing = fake
            .shared
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            let err = json!({ "code": "internal error", "message": "injected failure" });
            return (status, Json(err)).into_response();
        }
    }

    let query = body["query"].as_str().unwrap_or("");
    let csv = if query.contains(r#"r["_measurement"] == "prediction""#) {
        fake.prediction.clone()
    } else if query.contains(r#"r["_measurement"] == "ohlcv""#) {
        fake.ohlcv.clone()
    } else {
        String::new()
    };
    ([(CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response()
}
