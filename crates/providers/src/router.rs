//! Provider router: selects the correct adapter for a model configuration.
//!
//! The provider id in the manifest picks the vendor family; credentials come
//! from the [`CredentialSet`] and are checked here, before any request is made.

use std::sync::Arc;

use agentrun_config::{CredentialSet, ProviderCredentials};
use agentrun_core::error::ProviderError;
use agentrun_core::manifest::ModelConfig;
use agentrun_core::provider::Provider;
use tracing::debug;

use crate::anthropic::AnthropicProvider;
use crate::bedrock::{AwsCredentials, BedrockProvider};
use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Vendor families, by wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Any `/chat/completions` endpoint
    OpenAiCompat,
    Anthropic,
    Gemini,
    Bedrock,
}

impl ProviderKind {
    /// Map a manifest provider id to its vendor family.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "openai" | "openrouter" | "groq" | "deepseek" | "together" | "fireworks"
            | "mistral" | "xai" | "ollama" | "vllm" => Some(Self::OpenAiCompat),
            "anthropic" => Some(Self::Anthropic),
            "gemini" | "google" => Some(Self::Gemini),
            "bedrock" => Some(Self::Bedrock),
            _ => None,
        }
    }
}

/// Providers that run locally and need no API key.
fn is_keyless(id: &str) -> bool {
    matches!(id, "ollama" | "vllm")
}

/// Credentials for `id`, honoring the gemini/google alias.
fn credentials_for<'a>(credentials: &'a CredentialSet, id: &str) -> Option<&'a ProviderCredentials> {
    credentials.get(id).or_else(|| match id {
        "google" => credentials.get("gemini"),
        "gemini" => credentials.get("google"),
        _ => None,
    })
}

fn required(value: Option<&String>, provider: &str, field: &str) -> Result<String, ProviderError> {
    value
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ProviderError::NotConfigured(format!("{provider}: missing {field}")))
}

/// Build the adapter for a model configuration.
///
/// Fails with [`ProviderError::Unsupported`] for unknown provider ids and
/// [`ProviderError::NotConfigured`] when the required credentials are absent.
pub fn build_provider(
    model: &ModelConfig,
    credentials: &CredentialSet,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let id = model.provider.as_str();
    let kind = ProviderKind::from_id(id).ok_or_else(|| ProviderError::Unsupported(id.to_string()))?;

    let empty = ProviderCredentials::default();
    let creds = match credentials_for(credentials, id) {
        Some(creds) => creds,
        None if is_keyless(id) => &empty,
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "{id}: no credentials configured"
            )));
        }
    };
    let params = model.vendor_params();

    debug!(provider = id, model = %model.model, kind = ?kind, "Building provider");

    let provider: Arc<dyn Provider> = match kind {
        ProviderKind::OpenAiCompat => {
            let api_key = if is_keyless(id) {
                creds.api_key.clone()
            } else {
                Some(required(creds.api_key.as_ref(), id, "api_key")?)
            };
            let base_url = creds
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(id));
            Arc::new(OpenAiCompatProvider::new(id, base_url, api_key, &model.model)?.with_params(params))
        }
        ProviderKind::Anthropic => {
            let api_key = required(creds.api_key.as_ref(), id, "api_key")?;
            let mut p = AnthropicProvider::new(api_key, &model.model)?.with_params(params);
            if let Some(url) = &creds.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ProviderKind::Gemini => {
            let api_key = required(creds.api_key.as_ref(), id, "api_key")?;
            let mut p = GeminiProvider::new(api_key, &model.model)?.with_params(params);
            if let Some(url) = &creds.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ProviderKind::Bedrock => {
            let region = required(creds.region.as_ref(), id, "region")?;
            let aws = AwsCredentials {
                access_key_id: required(creds.access_key_id.as_ref(), id, "access_key_id")?,
                secret_access_key: required(
                    creds.secret_access_key.as_ref(),
                    id,
                    "secret_access_key",
                )?,
                session_token: creds.session_token.clone().filter(|t| !t.is_empty()),
            };
            let mut p = BedrockProvider::new(region, aws, &model.model)?.with_params(params);
            if let Some(url) = &creds.api_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
    };

    Ok(provider)
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "mistral" => "https://api.mistral.ai/v1".into(),
        "xai" => "https://api.x.ai/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
