//! Herald
//!
//! Reads notifications aloud through a remote text-to-speech service.
//!
//! ## Features
//!
//! - **Content-addressed audio cache**: every spoken fragment is cached on
//!   disk under the hash of its final markup, with a size budget enforced by
//!   evicting the least-played (then oldest) audio
//! - **Self-healing index**: a lost or corrupt index is rebuilt from the files
//!   on disk
//! - **Ordered playback**: notifications are debounced, deduplicated by title,
//!   fetched concurrently per fragment and played strictly in order
//! - **Three providers**: the Observatory proxy, Azure speech and any
//!   OpenAI-compatible endpoint
//!
//! ## Quick Start
//!
//! ```ignore
//! use herald::{Herald, HeraldSettings, Notification, Rendering};
//!
//! let settings = HeraldSettings::load(&HeraldSettings::default_path().unwrap())?;
//! let herald = Herald::connect(settings).await?;
//!
//! herald.notify(Notification::new("Jump", "Into hyperspace"), Rendering::VOCAL)?;
//! herald.drained().await;
//! ```
//!
//! ## Module Structure
//!
//! - [`audio_cache`] - On-disk audio cache and its index
//! - [`fetch`] - Cache-first audio fetching
//! - [`queue`] - Debounced, ordered notification playback
//! - [`providers`] - HTTP speech providers
//! - [`ssml`] - Markup construction and voice injection
//! - [`settings`] - Persisted configuration

pub mod audio_cache;
pub mod content_key;
pub mod errors;
pub mod fetch;
pub mod herald;
pub mod playback;
pub mod providers;
pub mod queue;
pub mod report;
pub mod settings;
pub mod ssml;
pub mod traits;
pub mod types;
pub mod voices;

// Re-export main types at crate root for convenience
pub use audio_cache::{AudioCache, CacheEntry, CacheStats, KeyPin};
pub use content_key::ContentKey;
pub use errors::{CacheError, HeraldError, ProviderError};
pub use fetch::{FetchOrchestrator, FetchedAudio};
pub use herald::Herald;
pub use playback::SystemPlayer;
pub use providers::{AzureProvider, ObservatoryProvider, OpenAiProvider, SpeechClient};
pub use queue::NotificationQueue;
pub use report::TracingReporter;
pub use settings::HeraldSettings;
pub use traits::{ErrorReporter, PlaybackSink, SpeechProvider};
pub use types::{
    Fragment, FragmentKind, Notification, RatePreset, Rendering, SpeechApi, Suppression,
    VoiceSelection,
};
pub use voices::{VoiceCatalog, VoiceInfo};
