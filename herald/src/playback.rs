//! MP3 playback through whatever command-line player the host has.
//!
//! Cached audio is always MP3, so only players that decode it are
//! considered. On Linux `paplay` and `aplay` are deliberately absent: they
//! only handle WAV/PCM and turn MP3 into static.

use std::path::Path;

use crate::errors::HeraldError;
use crate::traits::PlaybackSink;

#[cfg(target_os = "macos")]
const MP3_PLAYERS: &[&str] = &["afplay", "mpv", "ffplay"];

#[cfg(not(target_os = "macos"))]
const MP3_PLAYERS: &[&str] = &["mpv", "ffplay", "play"];

/// Find the first installed MP3 player, in priority order.
pub fn find_mp3_player() -> Option<&'static str> {
    MP3_PLAYERS
        .iter()
        .copied()
        .find(|player| which::which(player).is_ok())
}

/// Plays audio files by running a system player to completion.
#[derive(Debug, Clone, Default)]
pub struct SystemPlayer {
    player: Option<String>,
}

impl SystemPlayer {
    /// Detect a player on first use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always use the given player binary.
    pub fn with_player(player: impl Into<String>) -> Self {
        Self {
            player: Some(player.into()),
        }
    }

    fn resolve(&self) -> Result<String, HeraldError> {
        match &self.player {
            Some(player) => Ok(player.clone()),
            None => find_mp3_player()
                .map(str::to_string)
                .ok_or(HeraldError::NoAudioPlayer),
        }
    }
}

impl PlaybackSink for SystemPlayer {
    async fn play(&self, path: &Path) -> Result<(), HeraldError> {
        let player = self.resolve()?;
        let args = build_player_args(&player, path);

        tracing::debug!(player = %player, path = %path.display(), "Playing audio file");

        let output = tokio::process::Command::new(&player)
            .args(&args)
            .output()
            .await
            .map_err(|e| HeraldError::ProcessSpawnFailed {
                player: player.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(HeraldError::PlaybackFailed {
                player,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Build the command-line arguments for the audio player.
fn build_player_args(player: &str, path: &Path) -> Vec<String> {
    let path_str = path.to_string_lossy().to_string();

    let program = Path::new(player)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(player);

    match program {
        "ffplay" => vec![
            "-nodisp".to_string(),
            "-autoexit".to_string(),
            "-loglevel".to_string(),
            "quiet".to_string(),
            path_str,
        ],
        "mpv" => vec![
            "--no-video".to_string(),
            "--really-quiet".to_string(),
            path_str,
        ],
        "play" => vec!["-q".to_string(), path_str],
        // afplay and anything user-supplied
        _ => vec![path_str],
    }
}

// ============================================================================
// Tests
// ============================================================================
