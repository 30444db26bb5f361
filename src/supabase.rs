use crate::http::build_client;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Thin writer for the submissions table. Price persistence is a courtesy
/// side effect of `/price-item`; failures are logged by the caller and never
/// reach the end user.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    http: Client,
}

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("request failed: {0}")]
    Request(String),
}

impl SupabaseClient {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            http: build_client(),
        })
    }

    pub async fn update_item_price(
        &self,
        item_id: Uuid,
        price: &str,
        source: &str,
    ) -> Result<(), SupabaseError> {
        let url = format!("{}/rest/v1/items?id=eq.{}", self.base_url, item_id);
        let response = self
            .http
            .patch(url)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Prefer", "return=minimal")
            .json(&json!({
                "estimated_price": price,
                "price_source": source,
            }))
            .send()
            .await
            .map_err(|err| SupabaseError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SupabaseError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}
