use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `POST /price-item`. Everything except `description` is optional;
/// the pipeline rejects a missing or blank description before doing any work.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceItemRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub issues: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
}

/// Validated pipeline input. `description` is guaranteed non-blank.
#[derive(Debug, Clone)]
pub struct ItemDescriptor {
    pub name: Option<String>,
    pub description: String,
    pub condition: Option<String>,
    pub issues: Option<String>,
}

impl ItemDescriptor {
    /// All free-text fields joined into one lowercase-ready blob, the signal
    /// the heuristic model classifies on.
    pub fn combined_text(&self) -> String {
        let mut text = String::new();
        for part in [
            self.name.as_deref(),
            Some(self.description.as_str()),
            self.condition.as_deref(),
            self.issues.as_deref(),
        ]
        .into_iter()
        .flatten()
        {
            if !part.trim().is_empty() {
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(part.trim());
            }
        }
        text
    }
}

/// Provenance of a resolved price, disclosed to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Ebay,
    Openai,
    Algorithm,
    Cache,
    Default,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Ebay => "ebay",
            PriceSource::Openai => "openai",
            PriceSource::Algorithm => "algorithm",
            PriceSource::Cache => "cache",
            PriceSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Result of one price request, also the `POST /price-item` response body.
/// The marketplace-only fields are omitted on the fallback paths.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEstimate {
    pub price: String,
    pub source: PriceSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

impl PriceEstimate {
    pub fn simple(price: String, source: PriceSource) -> Self {
        Self {
            price,
            source,
            item_count: None,
            confidence: None,
            min_price: None,
            max_price: None,
        }
    }
}

/// Query parameters of `GET /price-estimate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEstimateParams {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub include_shipping: bool,
}

/// One comparable listing surfaced to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketItem {
    pub item_id: String,
    pub title: String,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_web_url: Option<String>,
    pub relevance: f64,
}

/// Aggregate answer of the marketplace comparator, response body of
/// `GET /price-estimate`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub average_price: f64,
    pub median_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_range: String,
    pub confidence: Confidence,
    pub sample_size: usize,
    pub items: Vec<MarketItem>,
    pub analysis: MarketAnalysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MarketSummary {
    /// Explicit empty result; `message` distinguishes "no items at all" from
    /// "found items but none relevant".
    pub fn empty(message: &str) -> Self {
        Self {
            average_price: 0.0,
            median_price: 0.0,
            min_price: 0.0,
            max_price: 0.0,
            price_range: "$0 - $0".to_string(),
            confidence: Confidence::Low,
            sample_size: 0,
            items: Vec::new(),
            analysis: MarketAnalysis {
                outliers: 0,
                price_distribution: PriceDistribution {
                    q1: 0.0,
                    median: 0.0,
                    q3: 0.0,
                },
                condition_breakdown: BTreeMap::new(),
            },
            message: Some(message.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAnalysis {
    pub outliers: usize,
    pub price_distribution: PriceDistribution,
    pub condition_breakdown: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceDistribution {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_text_skips_blank_fields() {
        let item = ItemDescriptor {
            name: Some("iPhone 13".into()),
            description: "128gb, blue".into(),
            condition: Some("   ".into()),
            issues: None,
        };
        assert_eq!(item.combined_text(), "iPhone 13 128gb, blue");
    }

    #[test]
    fn price_source_serializes_lowercase() {
        let json = serde_json::to_string(&PriceSource::Ebay).unwrap();
        assert_eq!(json, "\"ebay\"");
        assert_eq!(PriceSource::Algorithm.as_str(), "algorithm");
    }

    #[test]
    fn estimate_omits_marketplace_fields_when_absent() {
        let estimate = PriceEstimate::simple("$75".into(), PriceSource::Algorithm);
        let value = serde_json::to_value(&estimate).unwrap();
        assert_eq!(value["price"], "$75");
        assert_eq!(value["source"], "algorithm");
        assert!(value.get("itemCount").is_none());
        assert!(value.get("confidence").is_none());
    }

    #[test]
    fn request_accepts_camel_case_item_id() {
        let req: PriceItemRequest =
            serde_json::from_str(r#"{"description":"a lamp","itemId":"abc"}"#).unwrap();
        assert_eq!(req.item_id.as_deref(), Some("abc"));
    }
}
