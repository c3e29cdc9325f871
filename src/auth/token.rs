//! Token exchange with caching: a long-lived key/secret pair is traded for
//! a short-lived bearer token, reused until close to expiry. Refresh is
//! single-flight: the mutex is held across the exchange future, so
//! concurrent callers that find the cache empty wait for the first
//! exchange instead of issuing their own.

use crate::providers::ProviderError;
use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use tokio::sync::Mutex;

/// Refresh this long before the vendor-reported expiry, to tolerate clock
/// skew against a typical 30-day token lifetime.
const REFRESH_MARGIN_HOURS: i64 = 24;

/// A freshly exchanged token and its vendor-reported lifetime.
#[derive(Debug, Clone)]
pub struct ExchangedToken {
    pub token: String,
    pub expires_in_secs: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Single-flight cache for one adapter's short-lived bearer token. Never
/// shared across adapters; discarded with the adapter at process end.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn margin() -> Duration {
        Duration::hours(REFRESH_MARGIN_HOURS)
    }

    /// Return the cached token while `now < expiry - margin`, otherwise run
    /// `exchange` and cache its result. An exchange failure leaves the slot
    /// untouched so the next caller retries.
    pub async fn get_or_exchange<F, Fut>(&self, exchange: F) -> Result<String, ProviderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ExchangedToken, ProviderError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if Utc::now() < cached.expires_at - Self::margin() {
                return Ok(cached.token.clone());
            }
        }

        tracing::debug!("token cache empty or near expiry, exchanging");
        let fresh = exchange().await?;
        let expires_at = Utc::now() + Duration::seconds(fresh.expires_in_secs);
        let token = fresh.token.clone();
        *slot = Some(CachedToken { token: fresh.token, expires_at });
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const THIRTY_DAYS_SECS: i64 = 30 * 24 * 60 * 60;

    #[tokio::test]
    async fn concurrent_first_calls_trigger_one_exchange() {
        let cache = Arc::new(TokenCache::new());
        let exchanges = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..2 {
            let cache = Arc::clone(&cache);
            let exchanges = Arc::clone(&exchanges);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_exchange(|| async move {
                        exchanges.fetch_add(1, Ordering::SeqCst);
                        // A small pause widens the race window.
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok(ExchangedToken {
                            token: "tok-1".into(),
                            expires_in_secs: THIRTY_DAYS_SECS,
                        })
                    })
                    .await
            }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
        assert_eq!(tokens[0], tokens[1]);
    }

    #[tokio::test]
    async fn cached_token_is_reused_while_fresh() {
        let cache = TokenCache::new();
        let exchanges = AtomicU32::new(0);

        for _ in 0..3 {
            let token = cache
                .get_or_exchange(|| async {
                    exchanges.fetch_add(1, Ordering::SeqCst);
                    Ok(ExchangedToken {
                        token: "tok-1".into(),
                        expires_in_secs: THIRTY_DAYS_SECS,
                    })
                })
                .await
                .unwrap();
            assert_eq!(token, "tok-1");
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn token_inside_refresh_margin_is_exchanged_again() {
        let cache = TokenCache::new();
        let exchanges = AtomicU32::new(0);

        // Expires in an hour, well inside the 24h margin.
        for _ in 0..2 {
            cache
                .get_or_exchange(|| async {
                    exchanges.fetch_add(1, Ordering::SeqCst);
                    Ok(ExchangedToken { token: "tok".into(), expires_in_secs: 3600 })
                })
                .await
                .unwrap();
        }
        assert_eq!(exchanges.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_exchange_leaves_slot_retryable() {
        let cache = TokenCache::new();

        let err = cache
            .get_or_exchange(|| async {
                Err(ProviderError::Auth {
                    provider: "ernie".into(),
                    message: "bad secret".into(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth { .. }));

        let token = cache
            .get_or_exchange(|| async {
                Ok(ExchangedToken {
                    token: "tok-2".into(),
                    expires_in_secs: THIRTY_DAYS_SECS,
                })
            })
            .await
            .unwrap();
        assert_eq!(token, "tok-2");
    }
}
