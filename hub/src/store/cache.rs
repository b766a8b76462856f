use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

use super::query::QueryResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: String,
    pub measurement: String,
    pub lookback_days: u32,
}

/// A flight's outcome and when it landed.  The TTL counts from completion,
/// so a cell whose fetch is still running never expires.
type Cell = Arc<OnceCell<(QueryResult, Instant)>>;

/// Time-boxed query cache with single-flight semantics.
///
/// Callers racing on the same key share one in-flight store query, however
/// long it runs.  An `Unavailable` outcome reaches everyone waiting on that
/// flight but is not kept, so the next request goes back to the store.
pub struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Cell>>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn is_live(&self, cell: &Cell, now: Instant) -> bool {
        match cell.get() {
            None => true,
            Some((_, done)) => now.duration_since(*done) < self.ttl,
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> QueryResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            match entries.get(&key) {
                Some(cell) if self.is_live(cell, now) => Arc::clone(cell),
                _ => {
                    entries.retain(|_, cell| self.is_live(cell, now));
                    let cell: Cell = Arc::new(OnceCell::new());
                    entries.insert(key.clone(), Arc::clone(&cell));
                    cell
                }
            }
        };

        let result = cell
            .get_or_init(|| async move { (fetch().await, Instant::now()) })
            .await
            .0
            .clone();

        if result.is_unavailable() {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if entries.get(&key).is_some_and(|e| Arc::ptr_eq(e, &cell)) {
                entries.remove(&key);
            }
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
