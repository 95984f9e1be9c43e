//! The voice catalog offered in settings.
//!
//! The provider publishes a list of voices; Herald keeps the English-speaking
//! ones and gives each a display name of the form
//! `"<Demonym> - <LocalName>"`, plus one `"<Demonym> - <LocalName> - <Style>"`
//! entry per expressive style the voice supports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::HeraldError;
use crate::types::{RatePreset, VoiceSelection};

/// Display name of the voice used until the user picks one.
pub const DEFAULT_VOICE: &str = "American - Christopher";

const DEFAULT_VOICE_SHORT_NAME: &str = "en-US-ChristopherNeural";

const SEPARATOR: &str = " - ";

/// One voice as published by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceInfo {
    /// Provider voice name, e.g. `en-GB-SoniaNeural`.
    pub short_name: String,
    /// Human name, e.g. `Sonia`.
    pub local_name: String,
    /// Primary locale, e.g. `en-GB`.
    pub locale: String,
    /// Other locales the voice can speak.
    #[serde(default)]
    pub secondary_locale_list: Vec<String>,
    /// Expressive styles, e.g. `cheerful`.
    #[serde(default)]
    pub style_list: Vec<String>,
}

impl VoiceInfo {
    /// Whether the voice speaks any English locale.
    pub fn speaks_english(&self) -> bool {
        self.locale.starts_with("en-")
            || self
                .secondary_locale_list
                .iter()
                .any(|locale| locale.starts_with("en-"))
    }
}

/// A selectable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceOption {
    /// Provider voice name.
    pub voice: String,
    /// Style baked into this entry, if any.
    pub style: Option<String>,
}

/// English-speaking voices keyed by display name.
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    options: BTreeMap<String, VoiceOption>,
}

impl VoiceCatalog {
    /// A catalog holding only the default voice, for use before the real
    /// list has been fetched.
    pub fn builtin() -> Self {
        let mut options = BTreeMap::new();
        options.insert(
            DEFAULT_VOICE.to_string(),
            VoiceOption {
                voice: DEFAULT_VOICE_SHORT_NAME.to_string(),
                style: None,
            },
        );
        Self { options }
    }

    /// Build the catalog from the provider's voice list.
    ///
    /// Non-English voices are skipped. When two entries produce the same
    /// display name the first one wins.
    pub fn from_voices(voices: impl IntoIterator<Item = VoiceInfo>) -> Self {
        let mut options = BTreeMap::new();

        for voice in voices.into_iter().filter(VoiceInfo::speaks_english) {
            let base = format!("{}{SEPARATOR}{}", demonym(&voice.locale), voice.local_name);

            options.entry(base.clone()).or_insert_with(|| VoiceOption {
                voice: voice.short_name.clone(),
                style: None,
            });
            for style in &voice.style_list {
                options
                    .entry(format!("{base}{SEPARATOR}{style}"))
                    .or_insert_with(|| VoiceOption {
                        voice: voice.short_name.clone(),
                        style: Some(style.clone()),
                    });
            }
        }

        Self { options }
    }

    /// Look up a display name.
    pub fn get(&self, display_name: &str) -> Option<&VoiceOption> {
        self.options.get(display_name)
    }

    /// Turn a display name and rate preset into a voice selection.
    ///
    /// A name without `" - "` separators that is not in the catalog is taken
    /// to be a raw provider voice name (e.g. `en-IE-EmilyNeural`).
    ///
    /// ## Errors
    ///
    /// Returns `HeraldError::UnknownVoice` if a display name is not in the catalog.
    pub fn resolve(&self, display_name: &str, rate: RatePreset) -> Result<VoiceSelection, HeraldError> {
        let display_name = display_name.trim();
        let Some(option) = self.get(display_name) else {
            if !display_name.is_empty() && !display_name.contains(SEPARATOR) {
                return Ok(VoiceSelection::new(display_name).with_rate(rate.value()));
            }
            return Err(HeraldError::UnknownVoice {
                name: display_name.to_string(),
            });
        };

        let mut selection = VoiceSelection::new(&option.voice).with_rate(rate.value());
        let style = option
            .style
            .as_deref()
            .or_else(|| style_from_display_name(display_name));
        if let Some(style) = style {
            selection = selection.with_style(style);
        }
        Ok(selection)
    }

    /// Display names in sorted order.
    pub fn display_names(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }

    /// Entries in display-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VoiceOption)> {
        self.options.iter().map(|(name, option)| (name.as_str(), option))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

/// The style segment of a display name (the third `" - "` part), if any.
pub fn style_from_display_name(display_name: &str) -> Option<&str> {
    display_name
        .split(SEPARATOR)
        .nth(2)
        .map(str::trim)
        .filter(|style| !style.is_empty())
}

/// The demonym for a locale code; unknown locales are returned unchanged.
pub fn demonym(locale: &str) -> &str {
    match locale {
        "en-AU" => "Australian",
        "en-CA" => "Canadian",
        "en-GB" => "British",
        "en-HK" => "Hong Konger",
        "en-IE" => "Irish",
        "en-IN" => "Indian",
        "en-KE" => "Kenyan",
        "en-NG" => "Nigerian",
        "en-NZ" => "Kiwi",
        "en-PH" => "Filipino",
        "en-SG" => "Singaporean",
        "en-TZ" => "Tanzanian",
        "en-US" => "American",
        "en-ZA" => "South African",
        "de-DE" => "German",
        "fr-FR" => "French",
        "it-IT" => "Italian",
        "ja-JP" => "Japanese",
        "ko-KR" => "Korean",
        "es-ES" => "Spanish",
        "es-MX" => "Mexican",
        "pt-BR" => "Brazilian",
        "pt-PT" => "Portuguese",
        "zh-CN" => "Chinese",
        "zh-HK" => "Hong Konger",
        "zh-TW" => "Taiwanese",
        other => other,
    }
}
