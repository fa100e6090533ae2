//! Latest Quote Cache
//!
//! Most recent snapshot per symbol. Writes come only from the stream task and
//! replace the whole snapshot; reads come from any number of callers and never
//! touch the network.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::quote::{QuoteSnapshot, Symbol, TickerEvent};

/// Thread-safe map of symbol to latest snapshot.
///
/// Snapshots are stored behind `Arc` and swapped atomically under the write
/// lock, so a reader sees either the old snapshot or the new one.
#[derive(Debug, Default)]
pub struct QuoteCache {
    latest: RwLock<HashMap<Symbol, Arc<QuoteSnapshot>>>,
}

impl QuoteCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a decoded event.
    ///
    /// Heartbeats and events without a usable symbol are ignored. Returns the
    /// symbol that was written, if any.
    pub fn apply(&self, event: &TickerEvent, received_at: DateTime<Utc>) -> Option<Symbol> {
        if event.is_heartbeat() {
            return None;
        }
        let symbol = event.symbol()?;
        let snapshot = Arc::new(QuoteSnapshot::from_event(symbol.clone(), event, received_at));

        self.latest.write().insert(symbol.clone(), snapshot);
        Some(symbol)
    }

    /// Latest snapshot for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<Arc<QuoteSnapshot>> {
        self.latest.read().get(symbol).cloned()
    }

    /// Latest snapshots for several symbols, read under a single lock.
    #[must_use]
    pub fn get_many<'a>(
        &self,
        symbols: impl IntoIterator<Item = &'a Symbol>,
    ) -> BTreeMap<Symbol, Option<Arc<QuoteSnapshot>>> {
        let latest = self.latest.read();
        symbols
            .into_iter()
            .map(|symbol| (symbol.clone(), latest.get(symbol).cloned()))
            .collect()
    }

    /// Number of cached symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest.read().len()
    }

    /// Check if nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest.read().is_empty()
    }
}
