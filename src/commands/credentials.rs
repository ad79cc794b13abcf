use crate::ai::{CredentialManager, ProviderKind};
use serde::Serialize;

/// API provider status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub provider: ProviderKind,
    pub configured: bool,
}

fn parse_provider(provider: &str) -> Result<ProviderKind, String> {
    provider.parse()
}

/// Set API key for a provider.
///
/// Takes effect for the next session; running provider adapters keep the
/// key they were built with.
pub fn set_api_key(provider: &str, api_key: &str) -> Result<(), String> {
    let provider = parse_provider(provider)?;
    CredentialManager::store_api_key(provider, api_key).map_err(|e| e.to_string())
}

/// Delete API key for a provider
pub fn delete_api_key(provider: &str) -> Result<(), String> {
    let provider = parse_provider(provider)?;
    CredentialManager::delete_api_key(provider).map_err(|e| e.to_string())
}

/// Check which providers are configured
pub fn get_configured_providers() -> Vec<ProviderStatus> {
    [ProviderKind::Gemini, ProviderKind::OpenAi]
        .into_iter()
        .map(|provider| ProviderStatus {
            provider,
            configured: CredentialManager::has_api_key(provider),
        })
        .collect()
}
