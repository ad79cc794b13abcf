use crate::error::CredentialError;
use keyring::Entry;

use super::provider::ProviderKind;

const SERVICE_NAME: &str = "org.verum-omnis.case-intake";

/// Credential manager using the OS keychain with environment fallback.
///
/// Lookup order for a provider key: keychain entry, then the provider's
/// environment variables (populated from `.env` by `dotenvy` at startup).
pub struct CredentialManager;

impl CredentialManager {
    /// Environment variables consulted for a provider, in order
    pub fn env_vars(provider: ProviderKind) -> &'static [&'static str] {
        match provider {
            ProviderKind::Gemini => &["GEMINI_API_KEY", "API_KEY", "GOOGLE_API_KEY"],
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
        }
    }

    /// Store an API key in the keychain
    pub fn store_api_key(provider: ProviderKind, api_key: &str) -> Result<(), CredentialError> {
        validate_api_key(provider, api_key)?;
        let entry = Entry::new(SERVICE_NAME, provider.as_str())?;
        entry.set_password(api_key.trim())?;
        tracing::info!(provider = %provider, "Stored API key in keychain");
        Ok(())
    }

    /// Get an API key from the keychain or the environment
    pub fn get_api_key(provider: ProviderKind) -> Result<String, CredentialError> {
        match Entry::new(SERVICE_NAME, provider.as_str()).and_then(|e| e.get_password()) {
            Ok(password) if !password.trim().is_empty() => {
                tracing::debug!(provider = %provider, "Retrieved API key from keychain");
                return Ok(password);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(provider = %provider, error = %e, "Keychain lookup missed");
            }
        }

        Self::env_vars(provider)
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| CredentialError::NotFound(provider.to_string()))
    }

    /// Resolve a key, turning "not configured" into `None`
    pub fn resolve(provider: ProviderKind) -> Option<String> {
        match Self::get_api_key(provider) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(provider = %provider, error = %e, "Provider will be skipped");
                None
            }
        }
    }

    /// Delete an API key from the keychain
    pub fn delete_api_key(provider: ProviderKind) -> Result<(), CredentialError> {
        let entry = Entry::new(SERVICE_NAME, provider.as_str())?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                tracing::info!(provider = %provider, "Deleted API key from keychain");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check if an API key is configured
    pub fn has_api_key(provider: ProviderKind) -> bool {
        Self::get_api_key(provider).is_ok()
    }
}

/// Cheap format check before a key is persisted
pub fn validate_api_key(provider: ProviderKind, api_key: &str) -> Result<(), CredentialError> {
    let key = api_key.trim();
    let invalid = |reason: &str| CredentialError::Invalid {
        provider: provider.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(invalid("key contains whitespace"));
    }
    match provider {
        ProviderKind::OpenAi if !key.starts_with("sk-") => Err(invalid("expected an sk- prefix")),
        ProviderKind::Gemini if key.len() < 20 => Err(invalid("key is too short")),
        _ => Ok(()),
    }
}
