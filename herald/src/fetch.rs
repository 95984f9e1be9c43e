//! Cache-first audio fetching.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio_cache::{AudioCache, KeyPin};
use crate::content_key::ContentKey;
use crate::errors::{HeraldError, ProviderError};
use crate::ssml::{apply_voice, plain_text_markup};
use crate::traits::SpeechProvider;
use crate::types::{Fragment, VoiceSelection};

/// Resolves a fragment to a playable file, calling the provider only on a
/// cache miss.
#[derive(Debug)]
pub struct FetchOrchestrator<P> {
    provider: P,
    cache: Arc<AudioCache>,
}

/// Cached audio that stays safe from eviction while this value is alive.
#[derive(Debug)]
pub struct FetchedAudio {
    path: PathBuf,
    pin: KeyPin,
}

impl FetchedAudio {
    /// The audio file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cache key of the audio.
    pub fn key(&self) -> &ContentKey {
        self.pin.key()
    }

    /// Release the pin and keep only the path.
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

impl<P> FetchOrchestrator<P> {
    /// Pair a provider with the cache it fills.
    pub fn new(provider: P, cache: Arc<AudioCache>) -> Self {
        Self { provider, cache }
    }

    /// The underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The audio cache.
    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.cache
    }
}

impl<P: SpeechProvider> FetchOrchestrator<P> {
    /// Return the path of the audio for `fragment` spoken with `selection`.
    ///
    /// The audio is not pinned; see [`get_pinned_audio`](Self::get_pinned_audio).
    ///
    /// ## Errors
    ///
    /// Same as [`get_pinned_audio`](Self::get_pinned_audio).
    pub async fn get_audio(
        &self,
        fragment: &Fragment,
        selection: &VoiceSelection,
    ) -> Result<PathBuf, HeraldError> {
        Ok(self.get_pinned_audio(fragment, selection).await?.into_path())
    }

    /// Resolve `fragment` spoken with `selection` to cached audio.
    ///
    /// The final markup (voice, style and rate applied) is hashed into the
    /// cache key. On a hit the cached file is returned; on a miss the
    /// provider is asked for audio, which is stored before returning. Either
    /// way the access is recorded and the cache trimmed to its budget.
    ///
    /// The key is pinned before anything else happens and stays pinned until
    /// the returned value is dropped, so concurrent fetches cannot evict it.
    ///
    /// ## Errors
    ///
    /// - `MalformedSynthesisInput` if the fragment's markup is unusable
    /// - `Provider` if synthesis fails or returns no audio
    /// - `Cache` if the audio cannot be read or written
    pub async fn get_pinned_audio(
        &self,
        fragment: &Fragment,
        selection: &VoiceSelection,
    ) -> Result<FetchedAudio, HeraldError> {
        let base = match &fragment.markup {
            Some(markup) => markup.clone(),
            None => plain_text_markup(&fragment.text),
        };
        let markup = apply_voice(&base, selection)?;
        let key = ContentKey::from_markup(&markup);

        let pin = self.cache.pin(&key);
        let _key_guard = self.cache.lock_key(&key).await;

        let (path, is_new) = match self.cache.lookup(&key)? {
            Some(path) => (path, false),
            None => {
                let input = if self.provider.accepts_markup() {
                    markup.as_str()
                } else {
                    fragment.text.as_str()
                };

                tracing::debug!(
                    provider = self.provider.name(),
                    key = %key,
                    kind = ?fragment.kind,
                    "Fetching audio"
                );
                let audio = self.provider.synthesize(input).await?;
                if audio.is_empty() {
                    return Err(ProviderError::Malformed {
                        provider: self.provider.name().to_string(),
                        message: "response contained no audio".to_string(),
                    }
                    .into());
                }
                (self.cache.store(&key, &audio)?, true)
            }
        };

        self.cache.record_access(&key, is_new);
        self.cache.enforce_size_limit(&key);
        Ok(FetchedAudio { path, pin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Notification;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingProvider {
        markup: bool,
        empty: bool,
        inputs: Mutex<Vec<String>>,
    }

    impl SpeechProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn accepts_markup(&self) -> bool {
            self.markup
        }

        async fn synthesize(&self, input: &str) -> Result<Vec<u8>, ProviderError> {
            self.inputs.lock().unwrap().push(input.to_string());
            tokio::task::yield_now().await;
            if self.empty {
                Ok(Vec::new())
            } else {
                Ok(format!("audio:{input}").into_bytes())
            }
        }
    }

    fn orchestrator(dir: &TempDir, provider: RecordingProvider) -> FetchOrchestrator<RecordingProvider> {
        let cache = Arc::new(AudioCache::open_with_max_bytes(dir.path(), 1 << 20).unwrap());
        FetchOrchestrator::new(provider, cache)
    }

    fn title(text: &str) -> Fragment {
        Notification::new(text, "").fragments().remove(0)
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let fetcher = orchestrator(&dir, RecordingProvider::default());
        let selection = VoiceSelection::new("en-US-ChristopherNeural");

        let first = fetcher.get_audio(&title("Jump"), &selection).await.unwrap();
        let second = fetcher.get_audio(&title("Jump"), &selection).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.provider().inputs.lock().unwrap().len(), 1);

        let key = ContentKey::from_file_name(first.file_name().unwrap().to_str().unwrap()).unwrap();
        assert_eq!(fetcher.cache().entry(&key).unwrap().hit_count, 2);
    }

    #[tokio::test]
    async fn test_markup_provider_gets_final_markup() {
        let dir = TempDir::new().unwrap();
        let provider = RecordingProvider {
            markup: true,
            ..Default::default()
        };
        let fetcher = orchestrator(&dir, provider);
        let selection = VoiceSelection::new("en-GB-RyanNeural").with_rate("1.25");

        fetcher.get_audio(&title("Jump"), &selection).await.unwrap();

        let inputs = fetcher.provider().inputs.lock().unwrap();
        assert!(inputs[0].contains("name=\"en-GB-RyanNeural\""));
        assert!(inputs[0].contains("<prosody rate=\"1.25\">Jump</prosody>"));
    }

    #[tokio::test]
    async fn test_text_provider_gets_plain_text() {
        let dir = TempDir::new().unwrap();
        let fetcher = orchestrator(&dir, RecordingProvider::default());
        fetcher
            .get_audio(&title("Jump"), &VoiceSelection::new("alloy"))
            .await
            .unwrap();
        assert_eq!(fetcher.provider().inputs.lock().unwrap()[0], "Jump");
    }

    #[tokio::test]
    async fn test_rate_change_misses_cache() {
        let dir = TempDir::new().unwrap();
        let fetcher = orchestrator(&dir, RecordingProvider::default());
        let voice = VoiceSelection::new("en-US-ChristopherNeural");

        let a = fetcher.get_audio(&title("Jump"), &voice.clone().with_rate("1.0")).await.unwrap();
        let b = fetcher.get_audio(&title("Jump"), &voice.with_rate("1.5")).await.unwrap();

        assert_ne!(a, b);
        assert_eq!(fetcher.provider().inputs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_audio_is_malformed_and_not_cached() {
        let dir = TempDir::new().unwrap();
        let provider = RecordingProvider {
            empty: true,
            ..Default::default()
        };
        let fetcher = orchestrator(&dir, provider);

        let err = fetcher
            .get_audio(&title("Jump"), &VoiceSelection::new("v"))
            .await
            .unwrap_err();
        assert!(matches!(err, HeraldError::Provider(ProviderError::Malformed { .. })));
        assert!(fetcher.cache().is_empty());
    }

    #[tokio::test]
    async fn test_bad_markup_never_reaches_provider() {
        let dir = TempDir::new().unwrap();
        let fetcher = orchestrator(&dir, RecordingProvider::default());
        let fragment = Notification::new("Jump", "")
            .with_title_markup("<speak>no voice</speak>")
            .fragments()
            .remove(0);

        let err = fetcher.get_audio(&fragment, &VoiceSelection::new("v")).await.unwrap_err();
        assert!(matches!(err, HeraldError::MalformedSynthesisInput { .. }));
        assert!(fetcher.provider().inputs.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_fetches_synthesize_once() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(orchestrator(&dir, RecordingProvider::default()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fetcher = Arc::clone(&fetcher);
                tokio::spawn(async move {
                    fetcher.get_audio(&title("Jump"), &VoiceSelection::new("v")).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(fetcher.provider().inputs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pinned_audio_holds_pin_until_dropped() {
        let dir = TempDir::new().unwrap();
        let fetcher = orchestrator(&dir, RecordingProvider::default());

        let audio = fetcher
            .get_pinned_audio(&title("Jump"), &VoiceSelection::new("v"))
            .await
            .unwrap();
        let key = audio.key().clone();
        assert!(fetcher.cache().is_pinned(&key));
        assert!(audio.path().exists());

        drop(audio);
        assert!(!fetcher.cache().is_pinned(&key));
    }

    #[tokio::test]
    async fn test_failed_fetch_releases_pin() {
        let dir = TempDir::new().unwrap();
        let provider = RecordingProvider {
            empty: true,
            ..Default::default()
        };
        let fetcher = orchestrator(&dir, provider);
        let fragment = title("Jump");
        let selection = VoiceSelection::new("v");

        assert!(fetcher.get_pinned_audio(&fragment, &selection).await.is_err());

        let markup = apply_voice(&plain_text_markup("Jump"), &selection).unwrap();
        assert!(!fetcher.cache().is_pinned(&ContentKey::from_markup(&markup)));
    }
}
