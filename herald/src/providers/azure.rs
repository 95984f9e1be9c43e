//! Azure Cognitive Services speech endpoint.

use reqwest::Client;

use super::{http_client, read_audio, transport_error};
use crate::errors::ProviderError;
use crate::traits::SpeechProvider;

pub(crate) const PROVIDER: &str = "azure";

/// Audio format requested from Azure; matches the cache's `.mp3` files.
const OUTPUT_FORMAT: &str = "audio-16khz-128kbitrate-mono-mp3";

/// Direct client for the Azure speech REST API.
#[derive(Clone)]
pub struct AzureProvider {
    client: Client,
    url: String,
    subscription_key: String,
}

impl std::fmt::Debug for AzureProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureProvider")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl AzureProvider {
    /// Create a client for the regional endpoint (e.g. `eastus`).
    ///
    /// ## Errors
    ///
    /// Returns `ProviderError::Unavailable` if the HTTP client cannot be built.
    pub fn new(region: &str, subscription_key: &str) -> Result<Self, ProviderError> {
        Self::with_url(
            format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                region.trim()
            ),
            subscription_key,
        )
    }

    /// Create a client for an explicit synthesis URL.
    ///
    /// Useful for testing with mock servers.
    ///
    /// ## Errors
    ///
    /// Returns `ProviderError::Unavailable` if the HTTP client cannot be built.
    pub fn with_url(url: impl Into<String>, subscription_key: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(PROVIDER)?,
            url: url.into(),
            subscription_key: subscription_key.trim().to_string(),
        })
    }

    /// The synthesis URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SpeechProvider for AzureProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn accepts_markup(&self) -> bool {
        true
    }

    async fn synthesize(&self, input: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .header("X-Microsoft-ProjectName", "Herald")
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .body(input.to_string())
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        read_audio(PROVIDER, response).await
    }
}
