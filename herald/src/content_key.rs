//! Content keys for cached audio.
//!
//! A [`ContentKey`] is the BLAKE3 hash of the exact markup sent to the
//! speech provider. Voice, style and rate are all baked into that markup
//! before hashing, so the same text spoken by the same voice at the same
//! rate always lands on the same cache file, and changing any one of them
//! produces a different file.
//!
//! ## Examples
//!
//! ```
//! use herald::ContentKey;
//!
//! let key = ContentKey::from_markup("<speak>...</speak>");
//! assert_eq!(key.as_str().len(), 64);
//! assert_eq!(key.file_name(), format!("{}.mp3", key.as_str()));
//! ```

use std::fmt;

/// Extension used for cached audio files.
pub const AUDIO_EXTENSION: &str = "mp3";

/// Length of a hex-encoded 256-bit hash.
const KEY_LEN: usize = 64;

/// Stable identifier of a piece of synthesized audio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey(String);

impl ContentKey {
    /// Hash the final synthesis markup into a key.
    pub fn from_markup(markup: &str) -> Self {
        Self(blake3::hash(markup.as_bytes()).to_hex().to_string())
    }

    /// Accept an existing key, e.g. one read back from the index or a file name.
    ///
    /// Returns `None` unless the input is exactly 64 lowercase hex characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == KEY_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(raw.to_string()))
    }

    /// Recover the key from an audio file name like `<key>.mp3`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(AUDIO_EXTENSION)?.strip_suffix('.')?;
        Self::parse(stem)
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the audio for this key.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, AUDIO_EXTENSION)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
