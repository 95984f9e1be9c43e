//! Core types shared by the cache, the fetch path and the queue.

use serde::{Deserialize, Serialize};

// ============================================================================
// Voice Selection
// ============================================================================

/// Which voice, style and rate a notification should be spoken with.
///
/// Blank style or rate strings are treated as "not set" so that values
/// copied straight out of a settings form never produce empty markup
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VoiceSelection {
    /// Provider voice name (e.g. `en-US-ChristopherNeural`).
    pub voice: String,
    /// Expressive style (e.g. `cheerful`).
    pub style: Option<String>,
    /// Prosody rate multiplier (e.g. `1.25`).
    pub rate: Option<String>,
}

impl VoiceSelection {
    /// Select a voice with no style and the provider's default rate.
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            style: None,
            rate: None,
        }
    }

    /// Set the expressive style.
    #[must_use]
    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    /// Set the prosody rate.
    #[must_use]
    pub fn with_rate(mut self, rate: impl Into<String>) -> Self {
        self.rate = Some(rate.into());
        self
    }

    /// The style, unless blank.
    pub fn style(&self) -> Option<&str> {
        non_blank(self.style.as_deref())
    }

    /// The rate, unless blank.
    pub fn rate(&self) -> Option<&str> {
        non_blank(self.rate.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Rate Presets
// ============================================================================

/// Named speech rates offered in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RatePreset {
    /// 0.5x
    Slowest,
    /// 0.75x
    Slower,
    /// 1.0x
    #[default]
    Default,
    /// 1.25x
    Faster,
    /// 1.5x
    Fastest,
}

impl RatePreset {
    /// All presets, slowest first.
    pub const ALL: [RatePreset; 5] = [
        RatePreset::Slowest,
        RatePreset::Slower,
        RatePreset::Default,
        RatePreset::Faster,
        RatePreset::Fastest,
    ];

    /// The prosody rate value written into the markup.
    pub fn value(&self) -> &'static str {
        match self {
            RatePreset::Slowest => "0.5",
            RatePreset::Slower => "0.75",
            RatePreset::Default => "1.0",
            RatePreset::Faster => "1.25",
            RatePreset::Fastest => "1.5",
        }
    }

    /// Parse a preset name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|preset| format!("{preset:?}").eq_ignore_ascii_case(name.trim()))
    }
}

// ============================================================================
// Speech API
// ============================================================================

/// The speech provider Herald talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechApi {
    /// The Observatory proxy service.
    #[default]
    Observatory,
    /// Azure Cognitive Services speech endpoint.
    Azure,
    /// An OpenAI-compatible text-to-speech endpoint.
    OpenAi,
}

// ============================================================================
// Notifications
// ============================================================================

/// Which fragments of a notification must not be spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Suppression {
    /// Skip the title.
    pub title: bool,
    /// Skip the detail.
    pub detail: bool,
}

/// A notification to be read aloud.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Notification {
    /// Short headline, spoken first.
    pub title: String,
    /// Longer body, spoken after the title.
    pub detail: String,
    /// Pre-built markup for the title, used instead of `title` when present.
    pub title_markup: Option<String>,
    /// Pre-built markup for the detail, used instead of `detail` when present.
    pub detail_markup: Option<String>,
    /// Fragments that should stay silent.
    pub suppression: Suppression,
}

impl Notification {
    /// Create a notification from plain title and detail text.
    pub fn new(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            ..Default::default()
        }
    }

    /// Use custom markup for the title.
    #[must_use]
    pub fn with_title_markup(mut self, markup: impl Into<String>) -> Self {
        self.title_markup = Some(markup.into());
        self
    }

    /// Use custom markup for the detail.
    #[must_use]
    pub fn with_detail_markup(mut self, markup: impl Into<String>) -> Self {
        self.detail_markup = Some(markup.into());
        self
    }

    /// Keep the title silent.
    #[must_use]
    pub fn suppress_title(mut self) -> Self {
        self.suppression.title = true;
        self
    }

    /// Keep the detail silent.
    #[must_use]
    pub fn suppress_detail(mut self) -> Self {
        self.suppression.detail = true;
        self
    }

    /// The title as compared for duplicate suppression.
    pub fn normalized_title(&self) -> String {
        self.title.trim().to_lowercase()
    }

    /// The speakable fragments, title first.
    ///
    /// Suppressed and blank fragments are left out.
    pub fn fragments(&self) -> Vec<Fragment> {
        let mut fragments = Vec::with_capacity(2);
        if !self.suppression.title && !self.title.trim().is_empty() {
            fragments.push(Fragment {
                kind: FragmentKind::Title,
                text: self.title.clone(),
                markup: non_blank(self.title_markup.as_deref()).map(str::to_string),
            });
        }
        if !self.suppression.detail && !self.detail.trim().is_empty() {
            fragments.push(Fragment {
                kind: FragmentKind::Detail,
                text: self.detail.clone(),
                markup: non_blank(self.detail_markup.as_deref()).map(str::to_string),
            });
        }
        fragments
    }
}

/// How the host wants a notification presented.
///
/// Herald only speaks notifications that ask for vocal rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rendering {
    /// Show on screen.
    pub visual: bool,
    /// Read aloud.
    pub vocal: bool,
}

impl Rendering {
    /// Spoken only.
    pub const VOCAL: Rendering = Rendering {
        visual: false,
        vocal: true,
    };

    /// Shown only.
    pub const VISUAL: Rendering = Rendering {
        visual: true,
        vocal: false,
    };

    /// Shown and spoken.
    pub const ALL: Rendering = Rendering {
        visual: true,
        vocal: true,
    };
}

/// Which part of a notification a fragment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// The title.
    Title,
    /// The detail.
    Detail,
}

impl FragmentKind {
    /// Lowercase label for logs and error contexts.
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Title => "title",
            FragmentKind::Detail => "detail",
        }
    }
}

/// An independently speakable piece of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Title or detail.
    pub kind: FragmentKind,
    /// Plain text, used by providers that do not accept markup.
    pub text: String,
    /// Custom markup, if the notification supplied one.
    pub markup: Option<String>,
}
