use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::cache::{CacheKey, QueryCache};
use super::client::InfluxClient;
use super::flux::FluxQuery;
use super::frame::{parse_flux_csv, FrameShape, SeriesFrame};
use crate::clock::Clock;

pub const MEASUREMENT_OHLCV: &str = "ohlcv";
pub const MEASUREMENT_PREDICTION: &str = "prediction";
pub const SYMBOL_TAG: &str = "symbol";

/// How far past "now" the window reaches, so forecasts written ahead of
/// time are not cut off.
const FORWARD_WINDOW_DAYS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoDataReason {
    /// Empty result, or several tables nothing could reconcile.
    Empty,
    /// The store failed, timed out or exhausted its retries.
    Unavailable,
}

/// Outcome of a series query: ordered rows or an explicit "no data".
#[derive(Debug, Clone)]
pub enum QueryResult {
    Rows(SeriesFrame),
    NoData(NoDataReason),
}

impl QueryResult {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::NoData(NoDataReason::Unavailable))
    }
}

/// Window `[now - lookback_days, now + 2d)` over one measurement/symbol.
pub fn series_query(
    bucket: &str,
    symbol: &str,
    measurement: &str,
    lookback_days: u32,
    now: DateTime<Utc>,
) -> FluxQuery {
    let start = now - Duration::days(i64::from(lookback_days));
    let stop = now + Duration::days(FORWARD_WINDOW_DAYS);
    FluxQuery::from_bucket(bucket, start, stop)
        .filter_eq("_measurement", measurement)
        .filter_eq(SYMBOL_TAG, symbol)
        .pivot_fields()
        .sort_by_time()
}

/// Range queries against the shared store client.
///
/// Never returns an error: store failures are logged and surface as
/// `NoData(Unavailable)`.
pub struct QueryLayer {
    store: Arc<InfluxClient>,
    bucket: String,
    clock: Arc<dyn Clock>,
    cache: Option<QueryCache>,
}

impl QueryLayer {
    pub fn new(
        store: Arc<InfluxClient>,
        bucket: String,
        clock: Arc<dyn Clock>,
        cache_ttl: std::time::Duration,
    ) -> Self {
        let cache = (!cache_ttl.is_zero()).then(|| QueryCache::new(cache_ttl));
        Self {
            store,
            bucket,
            clock,
            cache,
        }
    }

    pub async fn query(&self, symbol: &str, measurement: &str, lookback_days: u32) -> QueryResult {
        match &self.cache {
            Some(cache) => {
                let key = CacheKey {
                    symbol: symbol.to_string(),
                    measurement: measurement.to_string(),
                    lookback_days,
                };
                cache
                    .get_or_fetch(key, || self.fetch(symbol, measurement, lookback_days))
                    .await
            }
            None => self.fetch(symbol, measurement, lookback_days).await,
        }
    }

    async fn fetch(&self, symbol: &str, measurement: &str, lookback_days: u32) -> QueryResult {
        let flux = series_query(&self.bucket, symbol, measurement, lookback_days, self.clock.now()).render();

        let body = match self.store.query_csv(&flux).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(symbol, measurement, "DB query failed: {e}");
                return QueryResult::NoData(NoDataReason::Unavailable);
            }
        };

        match parse_flux_csv(&body) {
            Ok(FrameShape::Single(frame)) => {
                tracing::debug!(symbol, measurement, rows = frame.len(), "query ok");
                QueryResult::Rows(frame)
            }
            Ok(FrameShape::Empty) => QueryResult::NoData(NoDataReason::Empty),
            Ok(FrameShape::MultiTable(n)) => {
                tracing::debug!(symbol, measurement, tables = n, "heterogeneous result treated as no data");
                QueryResult::NoData(NoDataReason::Empty)
            }
            Err(e) => {
                tracing::warn!(symbol, measurement, "DB result unreadable: {e}");
                QueryResult::NoData(NoDataReason::Unavailable)
            }
        }
    }
}
