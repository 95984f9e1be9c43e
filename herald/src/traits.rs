//! Seams between the queue and the outside world.
//!
//! The queue only ever talks to a [`SpeechProvider`] (remote synthesis), a
//! [`PlaybackSink`] (the speakers) and an [`ErrorReporter`]. Production code
//! plugs in the HTTP providers, [`SystemPlayer`](crate::playback::SystemPlayer)
//! and [`TracingReporter`](crate::report::TracingReporter); tests plug in
//! recorders.
//!
//! ## Native Async Traits
//!
//! Async methods use native async functions in traits and spell out the
//! `Send` bound on the returned future so implementations can be driven
//! from spawned tasks. No `async-trait` crate is needed.

use std::future::Future;
use std::path::Path;

use crate::errors::{HeraldError, ProviderError};

/// A remote text-to-speech service.
///
/// ## Examples
///
/// ```ignore
/// use herald::{ProviderError, SpeechProvider};
///
/// struct Silence;
///
/// impl SpeechProvider for Silence {
///     fn name(&self) -> &'static str { "silence" }
///     fn accepts_markup(&self) -> bool { true }
///     async fn synthesize(&self, _input: &str) -> Result<Vec<u8>, ProviderError> {
///         Ok(vec![0xFF, 0xFB])
///     }
/// }
/// ```
pub trait SpeechProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether [`synthesize`](Self::synthesize) wants markup (`true`) or
    /// plain text (`false`).
    fn accepts_markup(&self) -> bool;

    /// Turn markup or text into encoded audio.
    ///
    /// ## Errors
    ///
    /// Returns `ProviderError` classified as unauthorized, unavailable or
    /// malformed.
    fn synthesize(
        &self,
        input: &str,
    ) -> impl Future<Output = Result<Vec<u8>, ProviderError>> + Send;
}

/// Something that can play an audio file to completion.
pub trait PlaybackSink: Send + Sync {
    /// Play the file and resolve once playback has finished.
    ///
    /// ## Errors
    ///
    /// Returns `HeraldError` if no player is available or playback fails.
    fn play(&self, path: &Path) -> impl Future<Output = Result<(), HeraldError>> + Send;
}

/// Receives failures that the queue swallows so it can keep going.
pub trait ErrorReporter: Send + Sync {
    /// Report an error along with a short description of what was happening.
    fn report(&self, error: &HeraldError, context: &str);
}

// ============================================================================
// Tests
// ============================================================================
