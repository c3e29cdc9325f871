//! Usage and cost accounting for vendors that split prompt tokens into
//! cache hits and misses. Prices are USD per million tokens, looked up by
//! model name with a fallback row.

use crate::types::CacheInfo;
use std::collections::HashMap;
use std::sync::Mutex;

const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrices {
    pub cache_hit: f64,
    pub cache_miss: f64,
    pub output: f64,
}

/// Per-model price rows with a fallback for unknown models.
#[derive(Debug, Clone)]
pub struct PriceTable {
    rows: HashMap<String, ModelPrices>,
    fallback: ModelPrices,
}

impl PriceTable {
    pub fn new(fallback: ModelPrices) -> Self {
        Self { rows: HashMap::new(), fallback }
    }

    pub fn with_model(mut self, model: &str, prices: ModelPrices) -> Self {
        self.rows.insert(model.to_string(), prices);
        self
    }

    pub fn lookup(&self, model: &str) -> ModelPrices {
        self.rows.get(model).copied().unwrap_or(self.fallback)
    }

    /// Published DeepSeek price rows; `deepseek-chat` doubles as the
    /// fallback.
    pub fn deepseek() -> Self {
        let chat = ModelPrices { cache_hit: 0.07, cache_miss: 0.27, output: 1.10 };
        let reasoner = ModelPrices { cache_hit: 0.14, cache_miss: 0.55, output: 2.19 };
        Self::new(chat)
            .with_model("deepseek-chat", chat)
            .with_model("deepseek-reasoner", reasoner)
    }
}

/// Per-call cache accounting: the hit rate over prompt tokens and the
/// savings versus paying the cache-miss price for all of them.
pub fn cache_info(hit_tokens: u64, miss_tokens: u64, prices: ModelPrices) -> CacheInfo {
    let total = hit_tokens + miss_tokens;
    let hit_rate = if total == 0 { 0.0 } else { hit_tokens as f64 / total as f64 };

    let theoretical = total as f64 * prices.cache_miss / TOKENS_PER_PRICE_UNIT;
    let actual = (hit_tokens as f64 * prices.cache_hit
        + miss_tokens as f64 * prices.cache_miss)
        / TOKENS_PER_PRICE_UNIT;

    CacheInfo {
        hit_tokens,
        miss_tokens,
        hit_rate,
        estimated_savings: (theoretical - actual).max(0.0),
    }
}

/// Counters at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub hit_tokens: u64,
    pub miss_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
}

/// Lifetime totals combined with a price row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerReport {
    pub requests: u64,
    pub hit_tokens: u64,
    pub miss_tokens: u64,
    pub output_tokens: u64,
    pub hit_rate: f64,
    pub estimated_savings: f64,
}

/// Cumulative usage counters for one adapter instance.
///
/// The mutex keeps `snapshot` and `reset` atomic with respect to
/// concurrent `record` calls; critical sections never await.
#[derive(Debug, Default)]
pub struct UsageLedger {
    inner: Mutex<LedgerSnapshot>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerSnapshot> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one successfully billed call. A retried call contributes
    /// counts only once, from the attempt that succeeded.
    pub fn record(&self, hit_tokens: u64, miss_tokens: u64, output_tokens: u64) {
        let mut inner = self.lock();
        inner.hit_tokens += hit_tokens;
        inner.miss_tokens += miss_tokens;
        inner.output_tokens += output_tokens;
        inner.requests += 1;
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        *self.lock()
    }

    /// Zero all counters in one step.
    pub fn reset(&self) {
        tracing::debug!("resetting usage ledger");
        *self.lock() = LedgerSnapshot::default();
    }

    /// Lifetime report priced with `prices`.
    pub fn report(&self, prices: ModelPrices) -> LedgerReport {
        let snapshot = self.snapshot();
        let info = cache_info(snapshot.hit_tokens, snapshot.miss_tokens, prices);
        LedgerReport {
            requests: snapshot.requests,
            hit_tokens: snapshot.hit_tokens,
            miss_tokens: snapshot.miss_tokens,
            output_tokens: snapshot.output_tokens,
            hit_rate: info.hit_rate,
            estimated_savings: info.estimated_savings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_prices() -> ModelPrices {
        PriceTable::deepseek().lookup("deepseek-chat")
    }

    #[test]
    fn hit_rate_zero_when_no_prompt_tokens() {
        let info = cache_info(0, 0, chat_prices());
        assert_eq!(info.hit_rate, 0.0);
        assert_eq!(info.estimated_savings, 0.0);
    }

    #[test]
    fn hit_rate_stays_in_unit_interval() {
        for (hit, miss) in [(0, 100), (50, 50), (100, 0), (7, 3)] {
            let info = cache_info(hit, miss, chat_prices());
            assert!((0.0..=1.0).contains(&info.hit_rate), "hit_rate {}", info.hit_rate);
        }
        assert_eq!(cache_info(100, 0, chat_prices()).hit_rate, 1.0);
    }

    #[test]
    fn savings_non_negative_when_hit_cheaper_than_miss() {
        let prices = ModelPrices { cache_hit: 0.07, cache_miss: 0.27, output: 1.1 };
        for (hit, miss) in [(0, 0), (0, 1_000_000), (1_000_000, 0), (250_000, 750_000)] {
            assert!(cache_info(hit, miss, prices).estimated_savings >= 0.0);
        }
    }

    #[test]
    fn savings_formula_matches_price_delta() {
        // 1M hit tokens at 0.07 instead of 0.27 saves exactly 0.20.
        let info = cache_info(1_000_000, 0, chat_prices());
        assert!((info.estimated_savings - 0.20).abs() < 1e-9);
    }

    #[test]
    fn price_table_falls_back_for_unknown_models() {
        let table = PriceTable::deepseek();
        assert_eq!(table.lookup("some-future-model"), table.lookup("deepseek-chat"));
        assert_ne!(table.lookup("deepseek-reasoner"), table.lookup("deepseek-chat"));
    }

    #[test]
    fn ledger_accumulates_and_resets() {
        let ledger = UsageLedger::new();
        ledger.record(10, 90, 40);
        ledger.record(30, 70, 60);

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.hit_tokens, 40);
        assert_eq!(snapshot.miss_tokens, 160);
        assert_eq!(snapshot.output_tokens, 100);
        assert_eq!(snapshot.requests, 2);

        ledger.reset();
        assert_eq!(ledger.snapshot(), LedgerSnapshot::default());
    }

    #[test]
    fn ledger_report_prices_totals() {
        let ledger = UsageLedger::new();
        ledger.record(1_000_000, 1_000_000, 0);
        let report = ledger.report(chat_prices());
        assert_eq!(report.requests, 1);
        assert_eq!(report.hit_rate, 0.5);
        assert!((report.estimated_savings - 0.20).abs() < 1e-9);
    }

    #[test]
    fn ledger_is_safe_under_concurrent_recording() {
        let ledger = std::sync::Arc::new(UsageLedger::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let ledger = std::sync::Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    ledger.record(1, 2, 3);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.requests, 4000);
        assert_eq!(snapshot.hit_tokens, 4000);
        assert_eq!(snapshot.miss_tokens, 8000);
        assert_eq!(snapshot.output_tokens, 12000);
    }
}
