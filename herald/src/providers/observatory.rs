//! The Observatory speech proxy.
//!
//! Observatory forwards markup to Azure on behalf of registered users. A
//! user ID is obtained once from `NewUserId` and sent with every request in
//! the `User-Id` header; the service answers 403 until that user is
//! authorised.

use reqwest::Client;

use super::{check_status, http_client, read_audio, transport_error, with_trailing_slash};
use crate::errors::ProviderError;
use crate::traits::SpeechProvider;
use crate::voices::VoiceInfo;

pub(crate) const PROVIDER: &str = "observatory";

/// Default proxy endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.observatory.xjph.net/";

/// Client for the Observatory proxy.
#[derive(Debug, Clone)]
pub struct ObservatoryProvider {
    client: Client,
    endpoint: String,
    user_id: Option<String>,
}

impl ObservatoryProvider {
    /// Create a client for `endpoint`, optionally already registered.
    ///
    /// ## Errors
    ///
    /// Returns `ProviderError::Unavailable` if the HTTP client cannot be built.
    pub fn new(endpoint: &str, user_id: Option<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(PROVIDER)?,
            endpoint: with_trailing_slash(endpoint),
            user_id: user_id.filter(|id| !id.trim().is_empty()),
        })
    }

    /// The user ID sent with synthesis requests.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Ask the service for a fresh user ID.
    ///
    /// ## Errors
    ///
    /// Returns `ProviderError` if the request fails or the body is empty.
    pub async fn new_user_id(&self) -> Result<String, ProviderError> {
        let url = format!("{}NewUserId", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;
        let body = check_status(PROVIDER, response)
            .await?
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        let user_id = body.trim().trim_matches('"').to_string();
        if user_id.is_empty() {
            return Err(ProviderError::Malformed {
                provider: PROVIDER.to_string(),
                message: "registration returned an empty user ID".to_string(),
            });
        }
        tracing::info!("Registered new Observatory user");
        Ok(user_id)
    }

    /// Fetch the full voice list (all locales, unfiltered).
    ///
    /// ## Errors
    ///
    /// Returns `ProviderError` if the request fails or the body is not a
    /// JSON array of voices.
    pub async fn list_voices(&self) -> Result<Vec<VoiceInfo>, ProviderError> {
        let url = format!("{}AzureVoice/List", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;
        let body = check_status(PROVIDER, response)
            .await?
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        serde_json::from_str(&body).map_err(|e| ProviderError::Malformed {
            provider: PROVIDER.to_string(),
            message: format!("voice list is not valid JSON: {e}"),
        })
    }
}

impl SpeechProvider for ObservatoryProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn accepts_markup(&self) -> bool {
        true
    }

    async fn synthesize(&self, input: &str) -> Result<Vec<u8>, ProviderError> {
        let Some(user_id) = self.user_id.as_deref() else {
            return Err(ProviderError::Unauthorized {
                provider: PROVIDER.to_string(),
                message: "no user ID; register first".to_string(),
            });
        };

        let url = format!("{}AzureVoice/Speak", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("User-Id", user_id)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(input.to_string())
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        read_audio(PROVIDER, response).await
    }
}
