use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::collections::HashMap;

/// Layout the training worker writes into `updated_at` (naive, UTC assumed).
pub const UPDATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Most granular timeframe; used when a status request names none.
pub const DEFAULT_TIMEFRAME: &str = "1h";

/// Allowed staleness per timeframe label.
///
/// Each threshold is wider than the nominal interval so scheduler jitter does
/// not flip a symbol between fresh and stale on every borderline tick.
#[derive(Debug, Clone)]
pub struct FreshnessThresholds {
    limits: HashMap<String, Duration>,
    fallback: Duration,
}

impl Default for FreshnessThresholds {
    fn default() -> Self {
        let limits = HashMap::from([
            ("1h".to_string(), Duration::minutes(65)),
            ("4h".to_string(), Duration::minutes(250)),
            ("1d".to_string(), Duration::hours(25)),
        ]);
        Self {
            limits,
            fallback: Duration::minutes(65),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FreshnessError {
    #[error("unparseable timestamp {0:?}")]
    Format(String),
}

impl FreshnessThresholds {
    /// Threshold for `timeframe`, or the narrowest one for unknown labels.
    pub fn limit(&self, timeframe: &str) -> Duration {
        self.limits
            .get(timeframe.trim())
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Classify `updated_at` against the threshold for `timeframe`.
    ///
    /// An age equal to the threshold already counts as stale.
    pub fn validate(
        &self,
        timeframe: &str,
        updated_at: &str,
        now: DateTime<Utc>,
    ) -> Result<Freshness, FreshnessError> {
        let updated = parse_updated_at(updated_at)?;
        let elapsed = now - updated;
        if elapsed >= self.limit(timeframe) {
            Ok(Freshness::Stale(elapsed))
        } else {
            Ok(Freshness::Fresh)
        }
    }
}

pub fn parse_updated_at(raw: &str) -> Result<DateTime<Utc>, FreshnessError> {
    NaiveDateTime::parse_from_str(raw.trim(), UPDATED_AT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| FreshnessError::Format(raw.to_string()))
}
