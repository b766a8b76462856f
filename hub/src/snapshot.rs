use serde_json::Value;
use std::path::{Path, PathBuf};

const SNAPSHOT_PREFIX: &str = "prediction_";
const SNAPSHOT_SUFFIX: &str = ".json";

/// Per-symbol status record written by the training worker.
///
/// Only `updated_at` is interpreted here; other fields are opaque.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub updated_at: String,
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {0}")]
    Missing(PathBuf),
    #[error("snapshot is not valid JSON: {0}")]
    Corrupt(#[source] serde_json::Error),
    #[error("snapshot has no usable updated_at field")]
    MissingTimestamp,
    #[error("snapshot read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// File name for a symbol's snapshot; the pair separator becomes `_`.
pub fn snapshot_file_name(symbol: &str) -> String {
    format!("{SNAPSHOT_PREFIX}{}{SNAPSHOT_SUFFIX}", symbol.replace('/', "_"))
}

pub fn snapshot_path(static_dir: &Path, symbol: &str) -> PathBuf {
    static_dir.join(snapshot_file_name(symbol))
}

/// Read and decode the snapshot for `symbol`.
pub async fn read_snapshot(static_dir: &Path, symbol: &str) -> Result<StatusSnapshot, SnapshotError> {
    let path = snapshot_path(static_dir, symbol);
    let raw = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SnapshotError::Missing(path));
        }
        Err(e) => return Err(e.into()),
    };
    decode_snapshot(&raw)
}

pub fn decode_snapshot(raw: &[u8]) -> Result<StatusSnapshot, SnapshotError> {
    let value: Value = serde_json::from_slice(raw).map_err(SnapshotError::Corrupt)?;

    // Valid JSON that is not an object carries no timestamp either.
    let Value::Object(mut map) = value else {
        return Err(SnapshotError::MissingTimestamp);
    };

    let updated_at = match map.remove("updated_at") {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        _ => return Err(SnapshotError::MissingTimestamp),
    };

    Ok(StatusSnapshot {
        updated_at,
        extra: map,
    })
}

/// Inverse of [`snapshot_file_name`] for pair stems: `BTC_USDT` maps back to
/// `BTC/USDT`.  Stems with no `_` or more than one are left as-is.
pub fn symbol_from_stem(stem: &str) -> String {
    match stem.split_once('_') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('_') => {
            format!("{base}/{quote}")
        }
        _ => stem.to_string(),
    }
}

/// API symbols that have a snapshot in `static_dir`, sorted.
///
/// A missing or unreadable directory yields an empty list.
pub async fn list_snapshot_symbols(static_dir: &Path) -> Vec<String> {
    let mut symbols = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(static_dir).await else {
        return symbols;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(sym) = name
            .strip_prefix(SNAPSHOT_PREFIX)
            .and_then(|s| s.strip_suffix(SNAPSHOT_SUFFIX))
        {
            if !sym.is_empty() {
                symbols.push(symbol_from_stem(sym));
            }
        }
    }
    symbols.sort();
    symbols
}
