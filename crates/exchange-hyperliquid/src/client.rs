//! Rate-limited client for the venue's `/info` endpoint.
//!
//! Every operation is a POST with a JSON body whose `type` field selects
//! the call. The client owns the rate discipline: a semaphore caps
//! in-flight requests at `requests_per_second` and a governor limiter
//! enforces the minimum spacing between request starts, so the budget
//! holds even when several components share one client.

use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use liqmap_core::config::ApiConfig;
use liqmap_core::retry::{retry, RetryPolicy};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::{HyperliquidError, Result};
use crate::types::{AssetCtx, BookLevel, ClearinghouseState, L2Book, Meta, Position, Trade};

pub struct HyperliquidClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>>,
    in_flight: Arc<Semaphore>,
    retry_policy: RetryPolicy,
}

impl HyperliquidClient {
    /// Creates a new client from the API section of the config.
    ///
    /// # Panics
    /// Panics if the HTTP client or rate limiter quota cannot be created.
    #[must_use]
    pub fn new(config: &ApiConfig) -> Self {
        let per_second = NonZeroU32::new(config.requests_per_second.max(1)).unwrap();
        // Burst of one turns the quota into a pure pacer: one request start
        // per replenish interval (100 ms at the default 10 req/s).
        let quota = Quota::per_second(per_second).allow_burst(NonZeroU32::new(1).unwrap());

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http_client,
            base_url: config.api_url.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            in_flight: Arc::new(Semaphore::new(config.requests_per_second.max(1) as usize)),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Sends one rate-limited request to the info endpoint.
    async fn info(&self, body: &Value) -> Result<Value> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| HyperliquidError::Network("client closed".to_string()))?;
        self.rate_limiter.until_ready().await;

        let response = self
            .http_client
            .post(format!("{}/info", self.base_url))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(HyperliquidError::api(status.as_u16(), message));
        }

        Ok(response.json().await?)
    }

    /// Info request with transient-failure retry. Semantic 4xx and decode
    /// failures propagate immediately.
    async fn info_with_retry(&self, body: Value) -> Result<Value> {
        retry(self.retry_policy, HyperliquidError::is_transient, || {
            self.info(&body)
        })
        .await
    }

    /// Fetches the tradable universe with leverage limits and precision.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn meta(&self) -> Result<Meta> {
        let value = self.info_with_retry(json!({"type": "meta"})).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetches mid prices for all assets. Venue-internal keys (leading
    /// `@`) are filtered; unparseable entries are skipped.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response is not an object.
    pub async fn all_mids(&self) -> Result<HashMap<String, f64>> {
        let value = self.info_with_retry(json!({"type": "allMids"})).await?;
        Self::parse_mids(value)
    }

    /// Fetches metadata and per-asset contexts, positionally aligned with
    /// `meta.universe`. A malformed context element decodes to an empty
    /// context rather than failing the call.
    ///
    /// # Errors
    /// Returns an error if the request fails or the top-level shape is wrong.
    pub async fn meta_and_asset_ctxs(&self) -> Result<(Meta, Vec<AssetCtx>)> {
        let value = self
            .info_with_retry(json!({"type": "metaAndAssetCtxs"}))
            .await?;

        let Value::Array(parts) = value else {
            return Err(HyperliquidError::Decode(
                "metaAndAssetCtxs response is not an array".to_string(),
            ));
        };
        let mut parts = parts.into_iter();
        let meta_value = parts.next().ok_or_else(|| {
            HyperliquidError::Decode("metaAndAssetCtxs response missing meta".to_string())
        })?;
        let ctxs_value = parts.next().ok_or_else(|| {
            HyperliquidError::Decode("metaAndAssetCtxs response missing contexts".to_string())
        })?;

        let meta: Meta = serde_json::from_value(meta_value)?;

        let Value::Array(raw_ctxs) = ctxs_value else {
            return Err(HyperliquidError::Decode(
                "asset contexts are not an array".to_string(),
            ));
        };
        let ctxs = raw_ctxs
            .into_iter()
            .map(|raw| {
                serde_json::from_value::<AssetCtx>(raw).unwrap_or_else(|e| {
                    tracing::warn!("skipping malformed asset context: {}", e);
                    AssetCtx::default()
                })
            })
            .collect();

        Ok((meta, ctxs))
    }

    /// Fetches a wallet's margin state.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn clearinghouse_state(&self, wallet: &str) -> Result<ClearinghouseState> {
        let value = self
            .info_with_retry(json!({"type": "clearinghouseState", "user": wallet}))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetches and parses a wallet's positions, skipping dust.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn user_positions(&self, wallet: &str) -> Result<Vec<Position>> {
        let state = self.clearinghouse_state(wallet).await?;
        Ok(Position::from_state(wallet, state))
    }

    /// Fetches recent trades for an asset; each trade carries a `users`
    /// counterparty pair.
    ///
    /// # Errors
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn recent_trades(&self, coin: &str) -> Result<Vec<Trade>> {
        let value = self
            .info_with_retry(json!({"type": "recentTrades", "coin": coin}))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetches the order book: (bids descending, asks ascending).
    ///
    /// # Errors
    /// Returns an error if the request fails or the book has fewer than two sides.
    pub async fn l2_book(&self, coin: &str) -> Result<(Vec<BookLevel>, Vec<BookLevel>)> {
        let value = self
            .info_with_retry(json!({"type": "l2Book", "coin": coin}))
            .await?;
        let book: L2Book = serde_json::from_value(value)?;
        Self::split_book(book)
    }

    fn parse_mids(value: Value) -> Result<HashMap<String, f64>> {
        let Value::Object(entries) = value else {
            return Err(HyperliquidError::Decode(
                "allMids response is not an object".to_string(),
            ));
        };

        let mut mids = HashMap::with_capacity(entries.len());
        for (coin, raw) in entries {
            if coin.starts_with('@') {
                continue;
            }
            let parsed = match &raw {
                Value::String(s) => s.parse::<f64>().ok(),
                Value::Number(n) => n.as_f64(),
                _ => None,
            };
            match parsed {
                Some(price) => {
                    mids.insert(coin, price);
                }
                None => tracing::debug!("skipping unparseable mid for {}: {}", coin, raw),
            }
        }
        Ok(mids)
    }

    fn split_book(book: L2Book) -> Result<(Vec<BookLevel>, Vec<BookLevel>)> {
        let mut sides = book.levels.into_iter();
        let bids = sides.next();
        let asks = sides.next();
        match (bids, asks) {
            (Some(bids), Some(asks)) => Ok((bids, asks)),
            _ => Err(HyperliquidError::Decode(
                "l2Book response missing a side".to_string(),
            )),
        }
    }
}
