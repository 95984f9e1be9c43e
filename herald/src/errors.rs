//! Error types for speech synthesis, caching and playback.

use std::path::PathBuf;

/// Errors returned by a speech provider.
///
/// Every variant names the provider so that a report taken from deep inside
/// the queue still says which backend failed.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider refused our credentials. Terminal for the fetch and
    /// something the user has to fix (log in, rotate a key, ...).
    #[error("{provider} rejected the request as unauthorized: {message}")]
    Unauthorized {
        /// Provider name.
        provider: String,
        /// Status line or server message.
        message: String,
    },

    /// The provider could not be reached or answered with a server error.
    #[error("{provider} is unavailable: {message}")]
    Unavailable {
        /// Provider name.
        provider: String,
        /// Transport error or status line.
        message: String,
    },

    /// The provider rejected the input or answered with unusable audio.
    #[error("{provider} returned a malformed response: {message}")]
    Malformed {
        /// Provider name.
        provider: String,
        /// What was wrong with the request or the response.
        message: String,
    },
}

/// Errors that can occur while reading or writing the audio cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An audio file for this key already exists on disk.
    #[error("Cache file already exists: {}", path.display())]
    WriteConflict {
        /// The file that was in the way.
        path: PathBuf,
    },

    /// Disk failure while touching a cache file.
    #[error("Cache I/O failed for {}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted index could not be parsed.
    ///
    /// Only ever logged: loading falls back to an empty index instead.
    #[error("Cache index at {} is corrupt", path.display())]
    IndexCorrupt {
        /// The index file.
        path: PathBuf,
        /// The parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur anywhere in Herald.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum HeraldError {
    /// A speech provider failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The audio cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The synthesis markup could not be parsed or lacks a `speak/voice` element.
    #[error("Malformed synthesis input: {reason}")]
    MalformedSynthesisInput {
        /// What was wrong with the markup.
        reason: String,
    },

    /// No audio player was found on the system.
    #[error("No audio player found (install mpv, ffplay or sox)")]
    NoAudioPlayer,

    /// The audio player process could not be started.
    #[error("Failed to spawn {player}")]
    ProcessSpawnFailed {
        /// The player binary.
        player: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The audio player exited unsuccessfully.
    #[error("Audio playback with {player} failed: {stderr}")]
    PlaybackFailed {
        /// The player binary.
        player: String,
        /// Whatever the player wrote to stderr.
        stderr: String,
    },

    /// The settings file could not be read or written.
    #[error("Settings error at {}: {message}", path.display())]
    Settings {
        /// The settings file.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A voice display name is not in the voice catalog.
    #[error("Unknown voice: {name}")]
    UnknownVoice {
        /// The requested display name.
        name: String,
    },

    /// A background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl HeraldError {
    pub(crate) fn malformed(reason: impl std::fmt::Display) -> Self {
        HeraldError::MalformedSynthesisInput {
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_names_provider() {
        let err = ProviderError::Unauthorized {
            provider: "observatory".into(),
            message: "403 Forbidden".into(),
        };
        assert!(err.to_string().contains("observatory"));
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn test_provider_error_converts_transparently() {
        let err: HeraldError = ProviderError::Unavailable {
            provider: "azure".into(),
            message: "timed out".into(),
        }
        .into();
        assert_eq!(err.to_string(), "azure is unavailable: timed out");
    }

    #[test]
    fn test_cache_io_keeps_source() {
        use std::error::Error;

        let err = CacheError::io(
            "/tmp/nope.mp3",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/tmp/nope.mp3"));
    }
}
