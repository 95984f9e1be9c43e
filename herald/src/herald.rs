//! The top-level entry point.
//!
//! [`Herald`] owns the settings, the voice catalog and the notification
//! queue. Hosts feed it notifications through [`Herald::notify`]; everything
//! else (caching, fetching, ordering, playback) happens behind the queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio_cache::AudioCache;
use crate::errors::HeraldError;
use crate::fetch::FetchOrchestrator;
use crate::playback::SystemPlayer;
use crate::providers::{ObservatoryProvider, SpeechClient};
use crate::queue::NotificationQueue;
use crate::report::TracingReporter;
use crate::settings::HeraldSettings;
use crate::traits::{ErrorReporter, PlaybackSink, SpeechProvider};
use crate::types::{Notification, Rendering, VoiceSelection};
use crate::voices::VoiceCatalog;

/// Title of the notification queued by [`Herald::test_voice`].
pub const TEST_VOICE_TITLE: &str = "Herald voice testing";

/// Speaks notifications with the configured voice.
#[derive(Debug)]
pub struct Herald<P = SpeechClient, S = SystemPlayer, R = TracingReporter> {
    settings: HeraldSettings,
    catalog: VoiceCatalog,
    queue: NotificationQueue<P, S, R>,
    batch_reading: AtomicBool,
}

impl Herald {
    /// Build Herald from settings with the system audio player.
    ///
    /// Opens (and reconciles) the cache directory and the configured provider.
    ///
    /// ## Errors
    ///
    /// - `Settings` if no cache directory can be determined
    /// - `Cache` if the cache directory cannot be opened
    /// - `Provider` if the configured provider lacks credentials
    pub fn from_settings(settings: HeraldSettings) -> Result<Self, HeraldError> {
        let cache_dir = settings
            .resolved_cache_dir()
            .ok_or_else(|| HeraldError::Settings {
                path: PathBuf::new(),
                message: "no cache directory is configured and the platform has none".to_string(),
            })?;
        let cache = Arc::new(AudioCache::open(cache_dir, settings.effective_cache_size_mb())?);
        let provider = SpeechClient::from_settings(&settings)?;

        Ok(Self::new(
            settings,
            NotificationQueue::new(FetchOrchestrator::new(provider, cache), SystemPlayer::new(), TracingReporter),
        ))
    }

    /// Build Herald from settings and load the voice catalog.
    ///
    /// If the voice list cannot be fetched, the built-in catalog is kept and
    /// a warning is logged; only the default voice and raw provider voice
    /// names resolve until [`refresh_voices`](Self::refresh_voices) succeeds.
    ///
    /// ## Errors
    ///
    /// Same as [`from_settings`](Self::from_settings).
    pub async fn connect(settings: HeraldSettings) -> Result<Self, HeraldError> {
        let mut herald = Self::from_settings(settings)?;
        if let Err(e) = herald.refresh_voices().await {
            tracing::warn!(error = %e, "Could not load the voice list; using the built-in catalog");
        }
        Ok(herald)
    }
}

impl<P, S, R> Herald<P, S, R> {
    /// Replace the catalog with the provider's voice list.
    ///
    /// The list always comes from the Observatory endpoint, whichever provider
    /// synthesizes. Returns the number of catalog entries.
    ///
    /// ## Errors
    ///
    /// Returns `HeraldError::Provider` if the list cannot be fetched.
    pub async fn refresh_voices(&mut self) -> Result<usize, HeraldError> {
        let observatory = ObservatoryProvider::new(&self.settings.observatory_endpoint, None)?;
        let voices = observatory.list_voices().await?;
        self.catalog = VoiceCatalog::from_voices(voices);
        tracing::info!(voices = self.catalog.len(), "Loaded voice catalog");
        Ok(self.catalog.len())
    }

    /// The active settings.
    pub fn settings(&self) -> &HeraldSettings {
        &self.settings
    }

    /// The voice catalog.
    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// The notification queue.
    pub fn queue(&self) -> &NotificationQueue<P, S, R> {
        &self.queue
    }

    /// The audio cache.
    pub fn cache(&self) -> &Arc<AudioCache> {
        self.queue.cache()
    }

    /// Tell Herald whether the host is replaying old events in bulk.
    /// Notifications are ignored while this is set.
    pub fn set_batch_reading(&self, batch_reading: bool) {
        self.batch_reading.store(batch_reading, Ordering::SeqCst);
    }

    /// Whether notifications are currently being ignored.
    pub fn is_batch_reading(&self) -> bool {
        self.batch_reading.load(Ordering::SeqCst)
    }

    /// Use a specific catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: VoiceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// The voice selection derived from settings.
    ///
    /// ## Errors
    ///
    /// Returns `HeraldError::UnknownVoice` if the selected voice is not in
    /// the catalog.
    pub fn voice_selection(&self) -> Result<VoiceSelection, HeraldError> {
        self.catalog
            .resolve(&self.settings.selected_voice, self.settings.rate)
    }

    /// Wait until every queued notification has been played (or failed).
    pub async fn drained(&self) {
        self.queue.drained().await;
    }
}

impl<P, S, R> Herald<P, S, R>
where
    P: SpeechProvider + 'static,
    S: PlaybackSink + 'static,
    R: ErrorReporter + 'static,
{
    /// Wrap an existing queue.
    pub fn new(settings: HeraldSettings, queue: NotificationQueue<P, S, R>) -> Self {
        Self {
            settings,
            catalog: VoiceCatalog::builtin(),
            queue,
            batch_reading: AtomicBool::new(false),
        }
    }

    /// Handle a notification from the host.
    ///
    /// Returns `Ok(false)` without queueing anything while batch reading or
    /// when the notification is not meant to be spoken.
    ///
    /// ## Errors
    ///
    /// Returns `HeraldError::UnknownVoice` if the selected voice cannot be
    /// resolved.
    pub fn notify(&self, notification: Notification, rendering: Rendering) -> Result<bool, HeraldError> {
        if self.is_batch_reading() {
            tracing::trace!(title = %notification.title, "Ignoring notification during batch read");
            return Ok(false);
        }
        if !rendering.vocal {
            return Ok(false);
        }

        let selection = self.voice_selection()?;
        self.queue.enqueue(notification, selection);
        Ok(true)
    }

    /// Queue a notification with an explicit voice, bypassing settings.
    pub fn speak(&self, notification: Notification, selection: VoiceSelection) {
        self.queue.enqueue(notification, selection);
    }

    /// Queue a short sample in the selected voice.
    ///
    /// ## Errors
    ///
    /// Returns `HeraldError::UnknownVoice` if the selected voice cannot be
    /// resolved.
    pub fn test_voice(&self) -> Result<(), HeraldError> {
        let selection = self.voice_selection()?;
        let detail = format!("This is {}.", voice_local_name(&self.settings.selected_voice));
        self.queue
            .enqueue(Notification::new(TEST_VOICE_TITLE, detail), selection);
        Ok(())
    }
}

/// `"British - Sonia - cheerful"` → `"Sonia"`; raw voice names are returned as-is.
fn voice_local_name(display_name: &str) -> &str {
    display_name
        .split(" - ")
        .nth(1)
        .unwrap_or(display_name)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct EchoProvider;

    impl SpeechProvider for EchoProvider {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn accepts_markup(&self) -> bool {
            false
        }

        async fn synthesize(&self, input: &str) -> Result<Vec<u8>, ProviderError> {
            Ok(input.as_bytes().to_vec())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        played: Arc<Mutex<Vec<String>>>,
    }

    impl PlaybackSink for RecordingSink {
        async fn play(&self, path: &Path) -> Result<(), HeraldError> {
            let spoken = std::fs::read_to_string(path).unwrap_or_default();
            self.played.lock().unwrap().push(spoken);
            Ok(())
        }
    }

    fn herald(dir: &TempDir, settings: HeraldSettings, sink: RecordingSink) -> Herald<EchoProvider, RecordingSink, TracingReporter> {
        let cache = Arc::new(AudioCache::open_with_max_bytes(dir.path(), 1 << 20).unwrap());
        let queue = NotificationQueue::with_debounce(
            FetchOrchestrator::new(EchoProvider, cache),
            sink,
            TracingReporter,
            Duration::from_millis(10),
        );
        Herald::new(settings, queue)
    }

    #[test]
    fn test_voice_local_name() {
        assert_eq!(voice_local_name("British - Sonia - cheerful"), "Sonia");
        assert_eq!(voice_local_name("American - Christopher"), "Christopher");
        assert_eq!(voice_local_name("en-IE-EmilyNeural"), "en-IE-EmilyNeural");
    }

    #[tokio::test]
    async fn test_notify_speaks_vocal_notifications() {
        let dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let herald = herald(&dir, HeraldSettings::default(), sink.clone());

        assert!(herald.notify(Notification::new("Jump", ""), Rendering::ALL).unwrap());
        herald.drained().await;
        assert_eq!(*sink.played.lock().unwrap(), vec!["Jump"]);
    }

    #[tokio::test]
    async fn test_notify_ignores_visual_only() {
        let dir = TempDir::new().unwrap();
        let herald = herald(&dir, HeraldSettings::default(), RecordingSink::default());

        assert!(!herald.notify(Notification::new("Jump", ""), Rendering::VISUAL).unwrap());
        assert_eq!(herald.queue().pending_len(), 0);
    }

    #[tokio::test]
    async fn test_notify_ignores_batch_reading() {
        let dir = TempDir::new().unwrap();
        let herald = herald(&dir, HeraldSettings::default(), RecordingSink::default());

        herald.set_batch_reading(true);
        assert!(!herald.notify(Notification::new("Jump", ""), Rendering::VOCAL).unwrap());
        herald.set_batch_reading(false);
        assert!(herald.notify(Notification::new("Jump", ""), Rendering::VOCAL).unwrap());
        herald.drained().await;
    }

    #[tokio::test]
    async fn test_notify_unknown_voice() {
        let dir = TempDir::new().unwrap();
        let settings = HeraldSettings {
            selected_voice: "Martian - Zork".into(),
            ..HeraldSettings::default()
        };
        let herald = herald(&dir, settings, RecordingSink::default());

        let err = herald
            .notify(Notification::new("Jump", ""), Rendering::VOCAL)
            .unwrap_err();
        assert!(matches!(err, HeraldError::UnknownVoice { .. }));
    }

    #[tokio::test]
    async fn test_test_voice_queues_sample() {
        let dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let herald = herald(&dir, HeraldSettings::default(), sink.clone());

        herald.test_voice().unwrap();
        herald.drained().await;
        assert_eq!(
            *sink.played.lock().unwrap(),
            vec!["Herald voice testing", "This is Christopher."]
        );
    }

    #[test]
    fn test_voice_selection_uses_rate() {
        let dir = TempDir::new().unwrap();
        let settings = HeraldSettings {
            rate: crate::types::RatePreset::Slowest,
            ..HeraldSettings::default()
        };
        let herald = herald(&dir, settings, RecordingSink::default());
        let selection = herald.voice_selection().unwrap();
        assert_eq!(selection.voice, "en-US-ChristopherNeural");
        assert_eq!(selection.rate(), Some("0.5"));
    }

    const VOICE_LIST: &str = r#"[
        {"ShortName": "en-US-ChristopherNeural", "LocalName": "Christopher", "Locale": "en-US"},
        {"ShortName": "en-GB-SoniaNeural", "LocalName": "Sonia", "Locale": "en-GB", "StyleList": ["cheerful"]}
    ]"#;

    async fn voice_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/AzureVoice/List"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VOICE_LIST))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_refreshed_catalog_resolves_styled_voice() {
        let server = voice_server().await;
        let dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let settings = HeraldSettings {
            selected_voice: "British - Sonia - cheerful".into(),
            observatory_endpoint: server.uri(),
            ..HeraldSettings::default()
        };
        let mut herald = herald(&dir, settings, sink.clone());
        assert!(matches!(
            herald.voice_selection(),
            Err(HeraldError::UnknownVoice { .. })
        ));

        assert_eq!(herald.refresh_voices().await.unwrap(), 3);

        let selection = herald.voice_selection().unwrap();
        assert_eq!(selection.voice, "en-GB-SoniaNeural");
        assert_eq!(selection.style(), Some("cheerful"));
        assert!(herald.notify(Notification::new("Jump", ""), Rendering::VOCAL).unwrap());
        herald.drained().await;
        assert_eq!(*sink.played.lock().unwrap(), vec!["Jump"]);
    }

    #[tokio::test]
    async fn test_connect_loads_voice_list() {
        let server = voice_server().await;
        let dir = TempDir::new().unwrap();
        let settings = HeraldSettings {
            selected_voice: "British - Sonia".into(),
            observatory_endpoint: server.uri(),
            cache_dir: Some(dir.path().to_path_buf()),
            ..HeraldSettings::default()
        };

        let herald = Herald::connect(settings).await.unwrap();

        assert_eq!(herald.catalog().len(), 3);
        assert_eq!(herald.voice_selection().unwrap().voice, "en-GB-SoniaNeural");
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_builtin_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/AzureVoice/List"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let settings = HeraldSettings {
            observatory_endpoint: server.uri(),
            cache_dir: Some(dir.path().to_path_buf()),
            ..HeraldSettings::default()
        };

        let herald = Herald::connect(settings).await.unwrap();

        assert_eq!(herald.catalog().len(), 1);
        assert_eq!(herald.voice_selection().unwrap().voice, "en-US-ChristopherNeural");
    }
}
