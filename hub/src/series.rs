use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::frame::SeriesRow;

/// Candle as served by `/history`.  Fields the store did not return are
/// omitted rather than zero-filled.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OhlcvRow {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl From<&SeriesRow> for OhlcvRow {
    fn from(row: &SeriesRow) -> Self {
        Self {
            timestamp: row.timestamp,
            open: row.get("open"),
            high: row.get("high"),
            low: row.get("low"),
            close: row.get("close"),
            volume: row.get("volume"),
        }
    }
}

/// Forecast point with its confidence band.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionRow {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yhat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yhat_lower: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yhat_upper: Option<f64>,
}

impl From<&SeriesRow> for PredictionRow {
    fn from(row: &SeriesRow) -> Self {
        Self {
            timestamp: row.timestamp,
            yhat: row.get("yhat"),
            yhat_lower: row.get("yhat_lower"),
            yhat_upper: row.get("yhat_upper"),
        }
    }
}
