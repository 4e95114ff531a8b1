//! LRU cache for settled invoices.
//!
//! Settlement never reverses, so a settled invoice can be served from memory
//! on every later request instead of querying the payment node again.
//! Unsettled invoices are never cached.

use crate::invoice::{Invoice, PaymentHash};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// LRU cache of settled invoices keyed by payment hash.
#[derive(Clone)]
pub struct SettledInvoiceCache {
    inner: Arc<Mutex<LruCache<PaymentHash, Invoice>>>,
    stats: Arc<Mutex<CacheStats>>,
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries added.
    pub additions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl SettledInvoiceCache {
    /// Create a new cache with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new cache with the specified capacity (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Look up a settled invoice.
    pub fn get(&self, payment_hash: &PaymentHash) -> Option<Invoice> {
        let found = self.inner.lock().get(payment_hash).cloned();

        let mut stats = self.stats.lock();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        found
    }

    /// Remember an invoice if it is settled. Returns whether it was stored.
    pub fn insert(&self, invoice: &Invoice) -> bool {
        if !invoice.is_settled() {
            return false;
        }
        self.inner.lock().put(invoice.payment_hash, invoice.clone());
        self.stats.lock().additions += 1;
        true
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get the current number of entries in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for SettledInvoiceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn invoice(tag: u8, settled: bool) -> Invoice {
        Invoice {
            payment_hash: PaymentHash([tag; 32]),
            payment_request: format!("lnbc{tag}"),
            amount_requested: 10,
            amount_paid: settled.then_some(10),
            created_at: Utc::now(),
            settled_at: settled.then(Utc::now),
            expires_at: None,
            description: String::new(),
        }
    }

    #[test]
    fn test_cache_basic_operations() {
        let cache = SettledInvoiceCache::new();
        let first = invoice(1, true);
        let second = invoice(2, true);

        assert!(cache.is_empty());
        assert!(cache.get(&first.payment_hash).is_none());

        assert!(cache.insert(&first));
        assert_eq!(cache.get(&first.payment_hash), Some(first.clone()));
        assert!(cache.get(&second.payment_hash).is_none());
        assert_eq!(cache.len(), 1);

        cache.insert(&second);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_unsettled_never_cached() {
        let cache = SettledInvoiceCache::new();
        let pending = invoice(1, false);
        assert!(!cache.insert(&pending));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().additions, 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = SettledInvoiceCache::new();
        let inv = invoice(1, true);

        assert!(cache.get(&inv.payment_hash).is_none());
        cache.insert(&inv);
        assert!(cache.get(&inv.payment_hash).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.additions, 1);
        assert!((stats.hit_rate() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_cache_lru_eviction() {
        let cache = SettledInvoiceCache::with_capacity(2);
        let (a, b, c) = (invoice(1, true), invoice(2, true), invoice(3, true));

        cache.insert(&a);
        cache.insert(&b);
        cache.insert(&c);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a.payment_hash).is_none());
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let cache = SettledInvoiceCache::with_capacity(0);
        cache.insert(&invoice(1, true));
        cache.insert(&invoice(2, true));
        assert_eq!(cache.len(), 1);
        assert!(cache.stats().hit_rate().abs() < f64::EPSILON);
    }
}
