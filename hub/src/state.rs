use std::sync::Arc;

use crate::clock::Clock;
use crate::config::HubConfig;
use crate::freshness::FreshnessThresholds;
use crate::store::{InfluxClient, QueryLayer};

/// Shared application state, passed to all route handlers via `axum::extract::State`.
///
/// Built once at startup; handlers only read from it.
pub struct AppState {
    pub config: HubConfig,
    pub query: QueryLayer,
    pub clock: Arc<dyn Clock>,
    pub thresholds: FreshnessThresholds,
}

impl AppState {
    pub fn new(config: HubConfig, store: Arc<InfluxClient>, clock: Arc<dyn Clock>) -> Arc<Self> {
        let query = QueryLayer::new(
            store,
            config.influx_bucket.clone(),
            Arc::clone(&clock),
            config.cache_ttl,
        );

        Arc::new(Self {
            config,
            query,
            clock,
            thresholds: FreshnessThresholds::default(),
        })
    }
}
