//! OpenAI-compatible `/audio/speech` endpoint.
//!
//! These endpoints take plain text rather than markup, so voice, style and
//! rate from the notification are not sent; the voice comes from settings.

use reqwest::Client;
use serde::Serialize;

use super::{http_client, read_audio, transport_error};
use crate::errors::ProviderError;
use crate::traits::SpeechProvider;

pub(crate) const PROVIDER: &str = "openai";

/// Default speech endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";

/// Default model.
pub const DEFAULT_MODEL: &str = "tts-1";

/// Default voice.
pub const DEFAULT_VOICE: &str = "alloy";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Client for an OpenAI-compatible speech endpoint.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Create a client with the default endpoint, model and voice.
    ///
    /// ## Errors
    ///
    /// Returns `ProviderError::Unavailable` if the HTTP client cannot be built.
    pub fn new(api_key: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            client: http_client(PROVIDER)?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
        })
    }

    /// Use a different endpoint. Blank keeps the current one.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        if !endpoint.trim().is_empty() {
            self.endpoint = endpoint.trim().to_string();
        }
        self
    }

    /// Use a different model. Blank keeps the current one.
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        if !model.trim().is_empty() {
            self.model = model.trim().to_string();
        }
        self
    }

    /// Use a different voice. Blank keeps the current one.
    #[must_use]
    pub fn with_voice(mut self, voice: &str) -> Self {
        if !voice.trim().is_empty() {
            self.voice = voice.trim().to_string();
        }
        self
    }
}

impl SpeechProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn accepts_markup(&self) -> bool {
        false
    }

    async fn synthesize(&self, input: &str) -> Result<Vec<u8>, ProviderError> {
        let request = SpeechRequest {
            model: &self.model,
            input,
            voice: &self.voice,
            response_format: "mp3",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, &e))?;

        read_audio(PROVIDER, response).await
    }
}
