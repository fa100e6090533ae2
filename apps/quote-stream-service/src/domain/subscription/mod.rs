//! Subscription Registry
//!
//! Owns the set of symbols that should be streamed. The live connection's
//! server-side subscription only lags behind this set: it is resent in full on
//! every (re)connect and topped up incrementally while connected.
//!
//! # Design
//!
//! - `add` returns the delta (symbols not already present) so the caller can
//!   send only those upstream.
//! - `remove` returns nothing to send. Removals take effect on the next
//!   reconnect only; no upstream unsubscribe is ever issued.

use std::collections::{BTreeSet, HashSet};

use parking_lot::RwLock;

use super::quote::Symbol;

/// Thread-safe set of symbols of interest.
///
/// # Example
///
/// ```rust
/// use quote_stream_service::domain::quote::Symbol;
/// use quote_stream_service::domain::subscription::SubscriptionRegistry;
///
/// let registry = SubscriptionRegistry::new();
///
/// let added = registry.add(Symbol::parse_all(["aapl", "msft"]));
/// assert_eq!(added.len(), 2);
///
/// // Already present - nothing new to send upstream
/// let added = registry.add(Symbol::parse_all(["AAPL"]));
/// assert!(added.is_empty());
///
/// registry.remove(&Symbol::parse_all(["msft"]));
/// assert_eq!(registry.snapshot(), Symbol::parse_all(["AAPL"]).into_iter().collect::<Vec<_>>());
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    symbols: RwLock<HashSet<Symbol>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add symbols to the set.
    ///
    /// Returns the symbols that were not already subscribed, in sorted order.
    pub fn add(&self, symbols: impl IntoIterator<Item = Symbol>) -> Vec<Symbol> {
        let mut set = self.symbols.write();
        let added: BTreeSet<Symbol> = symbols
            .into_iter()
            .filter(|symbol| set.insert(symbol.clone()))
            .collect();
        added.into_iter().collect()
    }

    /// Remove symbols from the set.
    ///
    /// Returns how many symbols were actually removed.
    pub fn remove<'a>(&self, symbols: impl IntoIterator<Item = &'a Symbol>) -> usize {
        let mut set = self.symbols.write();
        symbols
            .into_iter()
            .filter(|symbol| set.remove(*symbol))
            .count()
    }

    /// Sorted copy of the current set.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.symbols.read().iter().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Check membership.
    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.read().contains(symbol)
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    /// Check if nothing is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn symbols(raw: &[&str]) -> BTreeSet<Symbol> {
        Symbol::parse_all(raw.iter().copied())
    }

    fn names(symbols: &[Symbol]) -> Vec<&str> {
        symbols.iter().map(Symbol::as_str).collect()
    }

    #[test]
    fn add_returns_only_new_symbols() {
        let registry = SubscriptionRegistry::new();

        let added = registry.add(symbols(&["AAPL"]));
        assert_eq!(names(&added), vec!["AAPL"]);

        let added = registry.add(symbols(&["aapl", "msft"]));
        assert_eq!(names(&added), vec!["MSFT"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn add_is_idempotent() {
        let registry = SubscriptionRegistry::new();

        registry.add(symbols(&["AAPL"]));
        let added = registry.add(symbols(&["AAPL"]));

        assert!(added.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_unknown_symbol_is_noop() {
        let registry = SubscriptionRegistry::new();
        registry.add(symbols(&["AAPL"]));

        let removed = registry.remove(&symbols(&["TSLA"]));

        assert_eq!(removed, 0);
        assert!(registry.contains(&Symbol::parse("AAPL").unwrap()));
    }

    #[test]
    fn snapshot_is_sorted() {
        let registry = SubscriptionRegistry::new();
        registry.add(symbols(&["msft", "aapl", "goog"]));

        assert_eq!(names(&registry.snapshot()), vec!["AAPL", "GOOG", "MSFT"]);
    }

    #[test]
    fn subscribe_after_unsubscribe_is_new_again() {
        let registry = SubscriptionRegistry::new();
        registry.add(symbols(&["AAPL"]));
        registry.remove(&symbols(&["AAPL"]));

        assert!(registry.is_empty());
        assert_eq!(names(&registry.add(symbols(&["AAPL"]))), vec!["AAPL"]);
    }

    #[test]
    fn thread_safety_concurrent_adds_and_removes() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(symbols(&["DROP0", "DROP1", "DROP2", "DROP3", "DROP4"]));

        let mut handles = vec![];
        for i in 0..10 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.add(Symbol::parse_all([format!("SYM{i}"), "SHARED".to_string()]));
                if i < 5 {
                    r.remove(&Symbol::parse_all([format!("DROP{i}")]));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // SYM0-SYM9 + SHARED, every DROP removed
        assert_eq!(registry.len(), 11);
        assert!(registry.snapshot().iter().all(|s| !s.as_str().starts_with("DROP")));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(Vec<String>),
        Remove(Vec<String>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let batch = prop::collection::vec("[a-dA-D]{1,2}", 0..4);
        prop_oneof![batch.clone().prop_map(Op::Add), batch.prop_map(Op::Remove)]
    }

    proptest! {
        #[test]
        fn serial_ops_match_set_model(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let registry = SubscriptionRegistry::new();
            let mut model: BTreeSet<Symbol> = BTreeSet::new();

            for op in ops {
                match op {
                    Op::Add(raw) => {
                        let batch = Symbol::parse_all(&raw);
                        let expected: Vec<Symbol> = batch.difference(&model).cloned().collect();
                        let added = registry.add(batch.clone());
                        prop_assert_eq!(added, expected);
                        model.extend(batch);
                    }
                    Op::Remove(raw) => {
                        let batch = Symbol::parse_all(&raw);
                        registry.remove(&batch);
                        model.retain(|s| !batch.contains(s));
                    }
                }
            }

            prop_assert_eq!(registry.snapshot(), model.into_iter().collect::<Vec<_>>());
        }
    }
}
