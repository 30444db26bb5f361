use crate::ebay::auth::{AppTokenProvider, EbayAuthError};
use crate::ebay::config::{BROWSE_SEARCH_URL, MARKETPLACE_ID};
use crate::http::build_client;
use crate::metrics;
use crate::models::{MarketAnalysis, MarketItem, MarketSummary, PriceDistribution};
use crate::stats;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tokio::time::{Duration, sleep};
use tracing::warn;
use urlencoding::encode;

/// Titles scoring below this against the query are not comparables.
const RELEVANCE_THRESHOLD: f64 = 3.0;
/// Query tokens shorter than this carry no signal.
const MIN_TOKEN_LEN: usize = 3;
/// At most this many listings go back to the caller.
const MAX_DISPLAY_ITEMS: usize = 15;
/// Spacing between the sequential search strategies.
const STRATEGY_DELAY_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum EbayBrowseError {
    #[error(transparent)]
    Auth(#[from] EbayAuthError),
    #[error("browse request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub include_shipping: bool,
}

struct Strategy {
    name: &'static str,
    q: String,
    sort: Option<&'static str>,
    limit: u32,
}

/// Three passes over the marketplace, broadest coverage without bursting:
/// exact phrase for precision, plain keywords sorted by price for volume,
/// and the first three words for recall on long descriptions.
fn strategies(query: &str) -> Vec<Strategy> {
    let broad: String = query
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        Strategy {
            name: "exact_phrase",
            q: format!("\"{query}\""),
            sort: None,
            limit: 30,
        },
        Strategy {
            name: "keyword",
            q: query.to_string(),
            sort: Some("price"),
            limit: 50,
        },
        Strategy {
            name: "broad",
            q: broad,
            sort: Some("newlyListed"),
            limit: 20,
        },
    ]
}

#[derive(Debug, Deserialize)]
struct BrowseResponse {
    #[serde(default, rename = "itemSummaries")]
    item_summaries: Vec<ItemSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ItemSummary {
    #[serde(rename = "itemId")]
    item_id: Option<String>,
    title: Option<String>,
    price: Option<Money>,
    condition: Option<String>,
    #[serde(rename = "itemWebUrl")]
    item_web_url: Option<String>,
    #[serde(default, rename = "shippingOptions")]
    shipping_options: Vec<ShippingOption>,
}

#[derive(Debug, Clone, Deserialize)]
struct Money {
    value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShippingOption {
    #[serde(rename = "shippingCost")]
    shipping_cost: Option<Money>,
}

/// Live-marketplace comparator. `search` fails softly: any auth, network, or
/// decode trouble collapses to an explicit empty summary so the pricing
/// pipeline can fall through to its next strategy.
pub struct BrowseClient {
    token: AppTokenProvider,
    http: reqwest::Client,
}

impl BrowseClient {
    pub fn new() -> Self {
        Self {
            token: AppTokenProvider::new(),
            http: build_client(),
        }
    }

    pub async fn search(&self, query: &str, opts: &SearchOptions) -> MarketSummary {
        match self.search_inner(query, opts).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(
                    target = "bluberry.ebay",
                    query = query,
                    error = %err,
                    "browse_search_failed"
                );
                MarketSummary::empty("marketplace search unavailable")
            }
        }
    }

    async fn search_inner(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<MarketSummary, EbayBrowseError> {
        let mut raw: Vec<ItemSummary> = Vec::new();
        let mut last_error = None;
        for (idx, strategy) in strategies(query).iter().enumerate() {
            if idx > 0 {
                sleep(Duration::from_millis(STRATEGY_DELAY_MS)).await;
            }
            match self.run_strategy(strategy).await {
                Ok(mut items) => {
                    metrics::search_strategy(strategy.name, items.len());
                    raw.append(&mut items);
                }
                Err(err) => {
                    // partial coverage is fine; the other strategies still run
                    warn!(
                        target = "bluberry.ebay",
                        strategy = strategy.name,
                        error = %err,
                        "search_strategy_failed"
                    );
                    last_error = Some(err);
                }
            }
        }
        // nothing at all AND every strategy errored: that is an outage, not
        // an empty marketplace
        if raw.is_empty()
            && let Some(err) = last_error
        {
            return Err(err);
        }
        Ok(summarize_listings(raw, query, opts))
    }

    async fn run_strategy(&self, strategy: &Strategy) -> Result<Vec<ItemSummary>, EbayBrowseError> {
        let token = self.token.bearer().await?;
        let response = self.dispatch(strategy, &token).await?;

        // a 401 means the cached token went bad; refresh once, retry once
        let response = if response.status() == StatusCode::UNAUTHORIZED {
            self.token.invalidate().await;
            let token = self.token.bearer().await?;
            self.dispatch(strategy, &token).await?
        } else {
            response
        };

        if !response.status().is_success() {
            return Err(EbayBrowseError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let payload: BrowseResponse = response
            .json()
            .await
            .map_err(|err| EbayBrowseError::Request(err.to_string()))?;
        Ok(payload.item_summaries)
    }

    async fn dispatch(
        &self,
        strategy: &Strategy,
        token: &str,
    ) -> Result<reqwest::Response, EbayBrowseError> {
        let mut url = format!(
            "{}?q={}&limit={}",
            *BROWSE_SEARCH_URL,
            encode(&strategy.q),
            strategy.limit
        );
        if let Some(sort) = strategy.sort {
            url.push_str("&sort=");
            url.push_str(sort);
        }
        self.http
            .get(&url)
            .bearer_auth(token)
            .header("X-EBAY-C-MARKETPLACE-ID", MARKETPLACE_ID.as_str())
            .send()
            .await
            .map_err(|err| EbayBrowseError::Request(err.to_string()))
    }
}

impl Default for BrowseClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge, de-duplicate, score, and aggregate raw listings into the summary
/// the callers consume. Pure so the whole reduction is testable offline.
fn summarize_listings(raw: Vec<ItemSummary>, query: &str, opts: &SearchOptions) -> MarketSummary {
    if raw.is_empty() {
        return MarketSummary::empty("no items found");
    }

    let mut seen = HashSet::new();
    let mut relevant: Vec<MarketItem> = Vec::new();
    for summary in raw {
        let Some(id) = summary.item_id.clone() else {
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(title) = summary.title.clone().filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        let relevance = relevance_score(query, &title);
        if relevance < RELEVANCE_THRESHOLD {
            continue;
        }
        let Some(price) = extract_price(&summary, opts.include_shipping) else {
            continue;
        };
        relevant.push(MarketItem {
            item_id: id,
            title,
            price,
            condition: summary.condition,
            item_web_url: summary.item_web_url,
            relevance,
        });
    }

    if relevant.is_empty() {
        return MarketSummary::empty("found items but none relevant");
    }
    relevant.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));

    let prices: Vec<f64> = relevant.iter().map(|item| item.price).collect();
    let Some(filtered) = stats::summarize_filtered(&prices) else {
        return MarketSummary::empty("found items but none relevant");
    };
    let price_stats = &filtered.stats;
    let confidence = stats::confidence(price_stats);

    let mut condition_breakdown: BTreeMap<String, usize> = BTreeMap::new();
    for item in &relevant {
        let label = item
            .condition
            .clone()
            .unwrap_or_else(|| "Unspecified".to_string());
        *condition_breakdown.entry(label).or_insert(0) += 1;
    }

    let items = relevant
        .into_iter()
        .take(MAX_DISPLAY_ITEMS)
        .collect::<Vec<_>>();

    MarketSummary {
        average_price: round_cents(price_stats.mean),
        median_price: round_cents(price_stats.median),
        min_price: round_cents(price_stats.min),
        max_price: round_cents(price_stats.max),
        price_range: format!(
            "${:.2} - ${:.2}",
            round_cents(price_stats.min),
            round_cents(price_stats.max)
        ),
        confidence,
        sample_size: price_stats.sample_size,
        items,
        analysis: MarketAnalysis {
            outliers: filtered.outliers,
            price_distribution: PriceDistribution {
                q1: round_cents(price_stats.q1),
                median: round_cents(price_stats.median),
                q3: round_cents(price_stats.q3),
            },
            condition_breakdown,
        },
        message: None,
    }
}

/// Listed price, optionally plus the first shipping option. Non-numeric,
/// absent, or non-positive prices disqualify the listing.
fn extract_price(summary: &ItemSummary, include_shipping: bool) -> Option<f64> {
    let base: f64 = summary
        .price
        .as_ref()
        .and_then(|money| money.value.as_deref())
        .and_then(|value| value.trim().parse().ok())?;
    if base <= 0.0 {
        return None;
    }
    let shipping = if include_shipping {
        summary
            .shipping_options
            .first()
            .and_then(|opt| opt.shipping_cost.as_ref())
            .and_then(|money| money.value.as_deref())
            .and_then(|value| value.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    } else {
        0.0
    };
    Some(base + shipping)
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN)
        .map(|token| token.to_string())
        .collect()
}

/// Two points per exact token match, one per substring match, plus a bonus
/// proportional to the share of query tokens matched exactly.
pub(crate) fn relevance_score(query: &str, title: &str) -> f64 {
    let query_tokens = tokenize(query);
    let title_tokens = tokenize(title);
    if query_tokens.is_empty() {
        return 0.0;
    }

    let mut score = 0.0;
    let mut exact_matches = 0usize;
    for q in &query_tokens {
        if title_tokens.iter().any(|t| t == q) {
            score += 2.0;
            exact_matches += 1;
        } else if title_tokens
            .iter()
            .any(|t| t.contains(q.as_str()) || q.contains(t.as_str()))
        {
            score += 1.0;
        }
    }
    score + (exact_matches as f64 / query_tokens.len() as f64) * 5.0
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
