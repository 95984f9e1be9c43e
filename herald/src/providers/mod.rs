//! Remote speech providers.
//!
//! Three HTTP backends are supported:
//!
//! | Provider | Input | Auth |
//! |----------|-------|------|
//! | [`ObservatoryProvider`] | markup | `User-Id` header from registration |
//! | [`AzureProvider`] | markup | `Ocp-Apim-Subscription-Key` |
//! | [`OpenAiProvider`] | plain text | bearer token |
//!
//! All requests share a five second timeout. Failures are classified the
//! same way everywhere: 401/403 are `Unauthorized`, 400/422 and empty
//! bodies are `Malformed`, and everything else (transport errors, timeouts,
//! 5xx, 429) is `Unavailable`. There is no fallback between providers.

pub mod azure;
pub mod observatory;
pub mod openai;

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

pub use azure::AzureProvider;
pub use observatory::ObservatoryProvider;
pub use openai::OpenAiProvider;

use crate::errors::ProviderError;
use crate::settings::HeraldSettings;
use crate::traits::SpeechProvider;
use crate::types::SpeechApi;

/// Timeout applied to every provider request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const USER_AGENT: &str = concat!("Herald/", env!("CARGO_PKG_VERSION"));

/// Longest server message kept in an error.
const MAX_DETAIL_LEN: usize = 200;

/// The provider selected in settings.
#[derive(Debug)]
pub enum SpeechClient {
    /// Observatory proxy.
    Observatory(ObservatoryProvider),
    /// Azure speech service.
    Azure(AzureProvider),
    /// OpenAI-compatible endpoint.
    OpenAi(OpenAiProvider),
}

impl SpeechClient {
    /// Build the provider chosen by `settings.api`.
    ///
    /// ## Errors
    ///
    /// Returns `ProviderError::Unauthorized` if the chosen provider has no
    /// credentials configured, or `Unavailable` if the HTTP client cannot be
    /// built.
    pub fn from_settings(settings: &HeraldSettings) -> Result<Self, ProviderError> {
        match settings.api {
            SpeechApi::Observatory => Ok(Self::Observatory(ObservatoryProvider::new(
                &settings.observatory_endpoint,
                settings.user_id.clone(),
            )?)),
            SpeechApi::Azure => {
                let azure = &settings.azure;
                if azure.subscription_key.trim().is_empty() || azure.region.trim().is_empty() {
                    return Err(ProviderError::Unauthorized {
                        provider: azure::PROVIDER.to_string(),
                        message: "subscription key and region must be configured".to_string(),
                    });
                }
                Ok(Self::Azure(AzureProvider::new(&azure.region, &azure.subscription_key)?))
            }
            SpeechApi::OpenAi => {
                let openai = &settings.openai;
                if openai.key.trim().is_empty() {
                    return Err(ProviderError::Unauthorized {
                        provider: openai::PROVIDER.to_string(),
                        message: "API key must be configured".to_string(),
                    });
                }
                Ok(Self::OpenAi(
                    OpenAiProvider::new(&openai.key)?
                        .with_endpoint(&openai.endpoint)
                        .with_model(&openai.model)
                        .with_voice(&openai.voice),
                ))
            }
        }
    }
}

impl SpeechProvider for SpeechClient {
    fn name(&self) -> &'static str {
        match self {
            Self::Observatory(p) => p.name(),
            Self::Azure(p) => p.name(),
            Self::OpenAi(p) => p.name(),
        }
    }

    fn accepts_markup(&self) -> bool {
        match self {
            Self::Observatory(p) => p.accepts_markup(),
            Self::Azure(p) => p.accepts_markup(),
            Self::OpenAi(p) => p.accepts_markup(),
        }
    }

    async fn synthesize(&self, input: &str) -> Result<Vec<u8>, ProviderError> {
        match self {
            Self::Observatory(p) => p.synthesize(input).await,
            Self::Azure(p) => p.synthesize(input).await,
            Self::OpenAi(p) => p.synthesize(input).await,
        }
    }
}

// ============================================================================
// Shared HTTP plumbing
// ============================================================================

pub(crate) fn http_client(provider: &str) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::Unavailable {
            provider: provider.to_string(),
            message: format!("could not build HTTP client: {e}"),
        })
}

pub(crate) fn transport_error(provider: &str, error: &reqwest::Error) -> ProviderError {
    let message = if error.is_timeout() {
        format!("request timed out after {}s", REQUEST_TIMEOUT.as_secs())
    } else {
        error.to_string()
    };
    ProviderError::Unavailable {
        provider: provider.to_string(),
        message,
    }
}

pub(crate) fn classify_status(provider: &str, status: StatusCode, detail: &str) -> ProviderError {
    let provider = provider.to_string();
    let message = if detail.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {detail}")
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::Unauthorized { provider, message }
        }
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ProviderError::Malformed { provider, message }
        }
        _ => ProviderError::Unavailable { provider, message },
    }
}

/// Fail on a non-success status, otherwise hand the response back.
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail: String = body.trim().chars().take(MAX_DETAIL_LEN).collect();
    tracing::debug!(provider, status = %status, "Provider request failed");
    Err(classify_status(provider, status, &detail))
}

/// Read an audio body, rejecting failures and empty responses.
pub(crate) async fn read_audio(provider: &str, response: Response) -> Result<Vec<u8>, ProviderError> {
    let response = check_status(provider, response).await?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    if bytes.is_empty() {
        return Err(ProviderError::Malformed {
            provider: provider.to_string(),
            message: "response contained no audio".to_string(),
        });
    }
    Ok(bytes.to_vec())
}

/// `https://host/api` and `https://host/api/` both become `https://host/api/`.
pub(crate) fn with_trailing_slash(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
