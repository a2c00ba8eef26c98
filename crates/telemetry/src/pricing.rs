//! Per-model token pricing with a time-bounded cache.
//!
//! Prices are in USD per 1 million tokens. Entries come from a
//! [`PricingSource`] (usually [`HttpPricingSource`]) and are cached in a
//! shared [`PricingCache`]; when nothing is known the default rate applies.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::TelemetryError;

/// Default input rate, USD per 1M tokens.
pub const DEFAULT_INPUT_PER_M: f64 = 3.0;
/// Default output rate, USD per 1M tokens.
pub const DEFAULT_OUTPUT_PER_M: f64 = 15.0;
/// Default cache freshness window.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn usd() -> String {
    "USD".into()
}

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub provider: String,
    #[serde(alias = "modelName", alias = "name")]
    pub model: String,
    /// Price per 1M input tokens.
    #[serde(alias = "inputPerM", alias = "inputPerMillion", alias = "input_per_million")]
    pub input_per_m: f64,
    /// Price per 1M output tokens.
    #[serde(alias = "outputPerM", alias = "outputPerMillion", alias = "output_per_million")]
    pub output_per_m: f64,
    #[serde(default = "usd")]
    pub currency: String,
}

impl ModelPricing {
    /// Create a new USD pricing entry.
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        input_per_m: f64,
        output_per_m: f64,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            input_per_m,
            output_per_m,
            currency: usd(),
        }
    }

    /// The fallback rate for a model nobody has priced.
    pub fn default_for(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new(provider, model, DEFAULT_INPUT_PER_M, DEFAULT_OUTPUT_PER_M)
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Locate the catalog entry for a provider/model.
///
/// Tries an exact provider+model match, then the model alone, then the
/// longest catalog model name that prefixes the requested one
/// (`gpt-4o-mini-2024-07-18` matches `gpt-4o-mini`).
pub fn find_in_catalog<'a>(
    catalog: &'a [ModelPricing],
    provider: &str,
    model: &str,
) -> Option<&'a ModelPricing> {
    if let Some(p) = catalog
        .iter()
        .find(|p| p.provider.eq_ignore_ascii_case(provider) && p.model == model)
    {
        return Some(p);
    }

    if let Some(p) = catalog.iter().find(|p| p.model == model) {
        return Some(p);
    }

    let model_lower = model.to_lowercase();
    catalog
        .iter()
        .filter(|p| !p.model.is_empty() && model_lower.starts_with(&p.model.to_lowercase()))
        .max_by_key(|p| p.model.len())
}

struct CachedPricing {
    pricing: ModelPricing,
    fetched_at: Instant,
}

/// Thread-safe pricing cache keyed by provider+model.
///
/// Shared between executions via `Arc`. Concurrent refills are
/// last-write-wins.
pub struct PricingCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedPricing>>,
}

impl PricingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn key(provider: &str, model: &str) -> String {
        format!("{provider}/{model}")
    }

    /// Fresh pricing for a provider/model, if cached.
    pub fn get(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&Self::key(provider, model))
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.pricing.clone())
    }

    /// Store pricing under a provider/model key.
    pub fn insert(&self, provider: &str, model: &str, pricing: ModelPricing) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            Self::key(provider, model),
            CachedPricing {
                pricing,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Number of cached entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached pricing, or fetch the catalog and cache the matching entry.
    pub async fn resolve(
        &self,
        source: &dyn PricingSource,
        provider: &str,
        model: &str,
    ) -> Result<Option<ModelPricing>, TelemetryError> {
        if let Some(hit) = self.get(provider, model) {
            debug!(provider, model, "Pricing cache hit");
            return Ok(Some(hit));
        }

        let catalog = source.fetch_catalog().await?;
        let found = find_in_catalog(&catalog, provider, model).cloned();
        match &found {
            Some(pricing) => self.insert(provider, model, pricing.clone()),
            None => debug!(provider, model, entries = catalog.len(), "No catalog entry for model"),
        }
        Ok(found)
    }
}

impl Default for PricingCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Start a background pricing lookup.
///
/// Failures are logged and resolve to `None`, so callers fall back to the
/// default rate.
pub fn spawn_fetch(
    cache: Arc<PricingCache>,
    source: Arc<dyn PricingSource>,
    provider: String,
    model: String,
) -> JoinHandle<Option<ModelPricing>> {
    tokio::spawn(async move {
        match cache.resolve(source.as_ref(), &provider, &model).await {
            Ok(found) => found,
            Err(e) => {
                warn!(provider = %provider, model = %model, error = %e, "Pricing fetch failed, using default rate");
                None
            }
        }
    })
}

/// Where pricing catalogs come from.
#[async_trait]
pub trait PricingSource: Send + Sync {
    /// Fetch the full pricing catalog.
    async fn fetch_catalog(&self) -> Result<Vec<ModelPricing>, TelemetryError>;
}

/// Catalog body: a bare array or `{ "models": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogBody {
    List(Vec<ModelPricing>),
    Wrapped { models: Vec<ModelPricing> },
}

impl CatalogBody {
    fn into_models(self) -> Vec<ModelPricing> {
        match self {
            CatalogBody::List(models) | CatalogBody::Wrapped { models } => models,
        }
    }
}

/// Parse a pricing catalog document.
pub fn parse_catalog(text: &str) -> Result<Vec<ModelPricing>, TelemetryError> {
    serde_json::from_str::<CatalogBody>(text)
        .map(CatalogBody::into_models)
        .map_err(|e| TelemetryError::InvalidCatalog(e.to_string()))
}

/// Fetches the catalog with an HTTP GET.
pub struct HttpPricingSource {
    url: String,
    client: reqwest::Client,
}

impl HttpPricingSource {
    pub fn new(url: impl Into<String>) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TelemetryError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl PricingSource for HttpPricingSource {
    async fn fetch_catalog(&self) -> Result<Vec<ModelPricing>, TelemetryError> {
        debug!(url = %self.url, "Fetching pricing catalog");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TelemetryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Http(format!(
                "pricing source returned {status}"
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| TelemetryError::Http(e.to_string()))?;
        parse_catalog(&text)
    }
}
