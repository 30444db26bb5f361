use crate::cache::{self, QuoteCache};
use crate::ebay::config::credentials_configured;
use crate::ebay::{BrowseClient, SearchOptions};
use crate::heuristic;
use crate::llm::{LlmClient, LlmConfig};
use crate::metrics;
use crate::models::{
    ItemDescriptor, MarketSummary, PriceEstimate, PriceItemRequest, PriceSource,
};
use crate::ratelimit::{MinIntervalGate, TokenBucket};
use crate::supabase::SupabaseClient;
use std::{env, fmt, sync::Arc, time::Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Price-estimation pipeline: cache, outbound throttling, and the ordered
/// fallback chain marketplace → LLM → heuristic. One instance is built at
/// startup and shared by every request handler; tests build fresh instances
/// so the cache and limiter state start clean.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    llm: Arc<LlmClient>,
    browse: Arc<BrowseClient>,
    supabase: Option<SupabaseClient>,
    cache: Arc<Mutex<QuoteCache>>,
    bucket: Arc<Mutex<TokenBucket>>,
    search_gate: Arc<Mutex<MinIntervalGate>>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cache_ttl_ms: i64,
    pub bucket_capacity: u32,
    pub bucket_interval_ms: i64,
    pub search_min_interval_ms: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: cache::DEFAULT_TTL_MS,
            bucket_capacity: 20,
            bucket_interval_ms: 60_000,
            search_min_interval_ms: 10_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl_ms: env_i64("PRICE_CACHE_TTL_MS", defaults.cache_ttl_ms),
            bucket_capacity: env_u32("RATE_LIMIT_CAPACITY", defaults.bucket_capacity),
            bucket_interval_ms: env_i64("RATE_LIMIT_INTERVAL_MS", defaults.bucket_interval_ms),
            search_min_interval_ms: env_i64(
                "SEARCH_MIN_INTERVAL_MS",
                defaults.search_min_interval_ms,
            ),
        }
    }
}

fn env_i64(key: &str, fallback: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(fallback)
}

fn env_u32(key: &str, fallback: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(fallback)
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let llm = LlmClient::new(LlmConfig::from_env());
        let supabase = SupabaseClient::from_env();
        let cache = QuoteCache::new(config.cache_ttl_ms);
        let bucket = TokenBucket::new(config.bucket_capacity, config.bucket_interval_ms);
        let search_gate = MinIntervalGate::new(config.search_min_interval_ms);
        Self {
            config: Arc::new(config),
            llm: Arc::new(llm),
            browse: Arc::new(BrowseClient::new()),
            supabase,
            cache: Arc::new(Mutex::new(cache)),
            bucket: Arc::new(Mutex::new(bucket)),
            search_gate: Arc::new(Mutex::new(search_gate)),
        }
    }

    pub fn from_env() -> Self {
        Self::new(PipelineConfig::from_env())
    }

    /// The catch-all answer: pricing must never hard-fail a submission flow,
    /// so anything unexpected degrades to a fixed figure.
    pub fn default_estimate() -> PriceEstimate {
        PriceEstimate::simple("$50".into(), PriceSource::Default)
    }

    /// Resolve a price for one submission. The only error surfaced to the
    /// caller is invalid input; every downstream failure degrades through
    /// the fallback chain instead.
    pub async fn price(&self, request: &PriceItemRequest) -> Result<PriceEstimate, PipelineError> {
        let item = descriptor_from(request)?;
        let started = Instant::now();
        let estimate = self.resolve(&item).await;
        metrics::price_resolved(estimate.source.as_str(), started.elapsed().as_millis());
        info!(
            target = "bluberry.pricing",
            source = estimate.source.as_str(),
            price = %estimate.price,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "price_resolved"
        );
        Ok(estimate)
    }

    async fn resolve(&self, item: &ItemDescriptor) -> PriceEstimate {
        let key = cache::fingerprint(&item.description);
        if let Some(price) = self.cache.lock().await.get(&key) {
            return PriceEstimate::simple(price, PriceSource::Cache);
        }

        // strictly ordered fallback chain; strategies never race
        let estimate = match self.attempt_market(item).await {
            Ok(estimate) => estimate,
            Err(skip) => {
                debug!(target = "bluberry.pricing", reason = %skip, "market_path_skipped");
                match self.attempt_llm(item).await {
                    Ok(estimate) => estimate,
                    Err(skip) => {
                        debug!(target = "bluberry.pricing", reason = %skip, "llm_path_skipped");
                        self.attempt_heuristic(item)
                    }
                }
            }
        };

        let mut cache = self.cache.lock().await;
        cache.put(key, estimate.price.clone());
        debug!(
            target = "bluberry.pricing",
            cache_entries = cache.len(),
            "price_cached"
        );
        estimate
    }

    async fn attempt_market(&self, item: &ItemDescriptor) -> Result<PriceEstimate, Skip> {
        if !credentials_configured() {
            return Err(Skip::NotConfigured);
        }
        {
            let mut bucket = self.bucket.lock().await;
            if !bucket.try_acquire(1) {
                debug!(
                    target = "bluberry.pricing",
                    remaining = bucket.remaining(),
                    "market_bucket_drained"
                );
                return Err(Skip::RateLimited);
            }
        }
        if !self.search_gate.lock().await.try_pass() {
            return Err(Skip::RateLimited);
        }

        let query = market_query(item);
        let summary = self
            .browse
            .search(&query, &SearchOptions::default())
            .await;
        if summary.sample_size == 0 || summary.average_price <= 0.0 {
            return Err(Skip::NoComparables);
        }

        Ok(PriceEstimate {
            price: format!("${}", summary.average_price.round() as i64),
            source: PriceSource::Ebay,
            item_count: Some(summary.sample_size),
            confidence: Some(summary.confidence),
            min_price: Some(summary.min_price),
            max_price: Some(summary.max_price),
        })
    }

    async fn attempt_llm(&self, item: &ItemDescriptor) -> Result<PriceEstimate, Skip> {
        if !self.llm.is_configured() {
            return Err(Skip::NotConfigured);
        }
        match self.llm.estimate_price(item).await {
            Ok(price) => Ok(PriceEstimate::simple(price, PriceSource::Openai)),
            Err(err) => Err(Skip::Upstream(err.to_string())),
        }
    }

    fn attempt_heuristic(&self, item: &ItemDescriptor) -> PriceEstimate {
        let price = heuristic::generate_price(&item.combined_text());
        PriceEstimate::simple(price, PriceSource::Algorithm)
    }

    /// Market-comparison variant used by `GET /price-estimate`. Shares the
    /// bucket and gate with the pipeline, but a refusal here surfaces as a
    /// rate-limit error instead of falling through.
    pub async fn market_summary(
        &self,
        title: &str,
        include_shipping: bool,
    ) -> Result<MarketSummary, PipelineError> {
        if title.trim().is_empty() {
            return Err(PipelineError::invalid_input(
                "market_search",
                "Title is required",
            ));
        }
        if !self.bucket.lock().await.try_acquire(1) {
            return Err(PipelineError::rate_limited("market_search"));
        }
        if !self.search_gate.lock().await.try_pass() {
            return Err(PipelineError::rate_limited("market_search"));
        }
        Ok(self
            .browse
            .search(title.trim(), &SearchOptions { include_shipping })
            .await)
    }

    /// Best-effort persistence of a resolved price against a submission
    /// record; the external write never affects the response.
    pub async fn persist_price(&self, item_id: &str, estimate: &PriceEstimate) {
        let Some(client) = &self.supabase else {
            return;
        };
        let Ok(id) = Uuid::parse_str(item_id.trim()) else {
            warn!(
                target = "bluberry.supabase",
                item_id = item_id,
                "invalid_item_id"
            );
            return;
        };
        if let Err(err) = client
            .update_item_price(id, &estimate.price, estimate.source.as_str())
            .await
        {
            warn!(
                target = "bluberry.supabase",
                item_id = %id,
                error = %err,
                "price_persist_failed"
            );
        }
    }
}

fn descriptor_from(request: &PriceItemRequest) -> Result<ItemDescriptor, PipelineError> {
    let description = request
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| PipelineError::invalid_input("validate", "Description is required"))?;
    Ok(ItemDescriptor {
        name: request.name.clone(),
        description: description.to_string(),
        condition: request.condition.clone(),
        issues: request.issues.clone(),
    })
}

/// Search query for the comparator: the item name when present, otherwise a
/// bounded prefix of the description.
fn market_query(item: &ItemDescriptor) -> String {
    if let Some(name) = item.name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.trim().to_string();
    }
    item.description
        .split_whitespace()
        .take(8)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Why a fallback strategy produced no usable result. Internal to the chain;
/// never surfaced to callers.
#[derive(Debug)]
enum Skip {
    NotConfigured,
    RateLimited,
    NoComparables,
    Upstream(String),
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Skip::NotConfigured => write!(f, "not configured"),
            Skip::RateLimited => write!(f, "rate limited"),
            Skip::NoComparables => write!(f, "no usable comparables"),
            Skip::Upstream(detail) => write!(f, "upstream failure: {detail}"),
        }
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    RateLimited,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn rate_limited(stage: &'static str) -> Self {
        Self {
            stage,
            message: "Rate limit exceeded, try again later".into(),
            kind: PipelineErrorKind::RateLimited,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request(description: &str) -> PriceItemRequest {
        PriceItemRequest {
            description: Some(description.to_string()),
            name: None,
            condition: Some("Good".to_string()),
            issues: None,
            item_id: None,
        }
    }

    #[test]
    fn missing_description_is_invalid_input() {
        let err = descriptor_from(&PriceItemRequest::default()).expect_err("should reject");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        assert_eq!(err.detail(), "Description is required");

        let blank = sample_request("   ");
        let err = descriptor_from(&blank).expect_err("should reject");
        assert_eq!(err.detail(), "Description is required");
    }

    #[test]
    fn market_query_prefers_name_then_truncates_description() {
        let named = ItemDescriptor {
            name: Some("iPhone 13".into()),
            description: "long description".into(),
            condition: None,
            issues: None,
        };
        assert_eq!(market_query(&named), "iPhone 13");

        let wordy = ItemDescriptor {
            name: None,
            description: "one two three four five six seven eight nine ten".into(),
            condition: None,
            issues: None,
        };
        assert_eq!(
            market_query(&wordy),
            "one two three four five six seven eight"
        );
    }

    #[tokio::test]
    async fn unconfigured_pipeline_falls_back_to_heuristic() {
        // no eBay credentials and no OpenAI key in the test environment, so
        // the chain must land on the rule-based model
        let pipeline = Pipeline::new(PipelineConfig::default());
        let estimate = pipeline
            .price(&sample_request("solid oak coffee table"))
            .await
            .expect("price");
        assert_eq!(estimate.source, PriceSource::Algorithm);
        assert!(estimate.price.starts_with('$'));
        assert!(estimate.item_count.is_none());
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let request = sample_request("a well loved reclining armchair");
        let first = pipeline.price(&request).await.expect("first price");
        let second = pipeline.price(&request).await.expect("second price");
        assert_eq!(second.source, PriceSource::Cache);
        // identical figure despite the heuristic jitter
        assert_eq!(second.price, first.price);
    }

    #[tokio::test]
    async fn distinct_descriptions_do_not_share_cache_entries() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        pipeline
            .price(&sample_request("mountain bike, front suspension"))
            .await
            .expect("price one");
        let other = pipeline
            .price(&sample_request("electric lawn mower"))
            .await
            .expect("price two");
        assert_ne!(other.source, PriceSource::Cache);
    }

    #[tokio::test]
    async fn market_summary_requires_title() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let err = pipeline
            .market_summary("   ", false)
            .await
            .expect_err("should reject");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        assert_eq!(err.detail(), "Title is required");
    }

    #[tokio::test]
    async fn drained_bucket_rejects_market_summary() {
        let pipeline = Pipeline::new(PipelineConfig {
            bucket_capacity: 0,
            ..PipelineConfig::default()
        });
        let err = pipeline
            .market_summary("iphone 13", false)
            .await
            .expect_err("should rate limit");
        assert_eq!(err.kind(), PipelineErrorKind::RateLimited);
        assert_eq!(err.detail(), "Rate limit exceeded, try again later");
    }

    #[tokio::test]
    async fn min_interval_gate_blocks_back_to_back_searches() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        // first pass claims the gate even though the search itself finds
        // nothing without credentials
        pipeline
            .market_summary("vintage camera", false)
            .await
            .expect("first search");
        let err = pipeline
            .market_summary("vintage camera", false)
            .await
            .expect_err("should rate limit");
        assert_eq!(err.kind(), PipelineErrorKind::RateLimited);
    }

    #[test]
    fn default_estimate_is_the_fixed_fallback() {
        let estimate = Pipeline::default_estimate();
        assert_eq!(estimate.price, "$50");
        assert_eq!(estimate.source, PriceSource::Default);
    }
}
