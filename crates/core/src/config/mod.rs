use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

pub const VOLUME_RANGE: (u8, u8) = (0, 100);
pub const DIFFICULTY_RANGE: (u8, u8) = (1, 10);
pub const BUFFER_TIME_RANGE: (f64, f64) = (0.01, 0.5);

/// Maps a difficulty onto the minimum spacing, in seconds, between two
/// generated beats. Difficulty 1 gives 0.50 and difficulty 10 gives 0.05.
pub fn beat_frequency(difficulty: u8) -> f64 {
    let difficulty = difficulty.clamp(DIFFICULTY_RANGE.0, DIFFICULTY_RANGE.1);
    0.55 - 0.05 * f64::from(difficulty)
}

/// The fixed track list offered by the song selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Song {
    #[default]
    #[serde(rename = "City Escape")]
    CityEscape,
    #[serde(rename = "Unknown from M.E.")]
    UnknownFromMe,
    #[serde(rename = "E.G.G.M.A.N.")]
    Eggman,
    #[serde(rename = "Im Blue")]
    ImBlue,
    #[serde(rename = "Mr Blue Sky")]
    MrBlueSky,
}

impl Song {
    pub const ALL: [Song; 5] = [
        Song::CityEscape,
        Song::UnknownFromMe,
        Song::Eggman,
        Song::ImBlue,
        Song::MrBlueSky,
    ];

    /// Display title, which doubles as the asset file stem.
    pub fn title(self) -> &'static str {
        match self {
            Song::CityEscape => "City Escape",
            Song::UnknownFromMe => "Unknown from M.E.",
            Song::Eggman => "E.G.G.M.A.N.",
            Song::ImBlue => "Im Blue",
            Song::MrBlueSky => "Mr Blue Sky",
        }
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Song {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Song::ALL
            .into_iter()
            .find(|song| song.title().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EngineError::InvalidConfig(format!("unknown song `{wanted}`")))
    }
}

/// Values owned by the control panel and polled once per frame.
///
/// `score` flows the other way: the engine writes it every tick and the
/// panel only displays it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Controls {
    pub song: Song,
    pub volume: u8,
    pub difficulty: u8,
    pub buffer_time: f64,
    #[serde(skip)]
    pub score: u32,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            song: Song::CityEscape,
            volume: 50,
            difficulty: 5,
            buffer_time: 0.2,
            score: 0,
        }
    }
}

impl Controls {
    /// Returns a copy with every field clamped into its supported range.
    pub fn sanitized(&self) -> Self {
        let buffer_time = if self.buffer_time.is_finite() {
            self.buffer_time
                .clamp(BUFFER_TIME_RANGE.0, BUFFER_TIME_RANGE.1)
        } else {
            Controls::default().buffer_time
        };

        Self {
            song: self.song,
            volume: self.volume.clamp(VOLUME_RANGE.0, VOLUME_RANGE.1),
            difficulty: self.difficulty.clamp(DIFFICULTY_RANGE.0, DIFFICULTY_RANGE.1),
            buffer_time,
            score: self.score,
        }
    }

    pub fn beat_frequency(&self) -> f64 {
        beat_frequency(self.difficulty)
    }

    /// Linear gain for the shared gain node.
    pub fn gain(&self) -> f32 {
        f32::from(self.volume.min(VOLUME_RANGE.1)) / 100.0
    }
}

/// Engine constants that are not exposed on the control panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    pub fft_size: usize,
    pub smoothing: f32,
    /// How far the analyser runs ahead of the audible output.
    pub delay_seconds: f64,
    pub hit_radius: f32,
    pub points_per_hit: u32,
    /// Minimum per-bin rise between two snapshots that counts as an onset.
    pub onset_level: f32,
    /// Fraction of bins rising together that turns an onset into a slide.
    pub slide_spread: f32,
    /// Unhit beats expire after this many buffer windows.
    pub expiry_windows: f64,
    pub max_active_beats: usize,
    pub field_margin: f32,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            fft_size: 256,
            smoothing: 0.5,
            delay_seconds: 6.0,
            hit_radius: 40.0,
            points_per_hit: 1,
            onset_level: 0.2,
            slide_spread: 0.5,
            expiry_windows: 3.0,
            max_active_beats: 64,
            field_margin: 32.0,
        }
    }
}

impl EngineTuning {
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || !(32..=32_768).contains(&self.fft_size) {
            return Err(EngineError::InvalidConfig(format!(
                "fft_size must be a power of two in 32..=32768, got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(EngineError::InvalidConfig(
                "smoothing must lie in [0, 1)".to_string(),
            ));
        }
        if self.hit_radius <= 0.0 || self.onset_level <= 0.0 || self.expiry_windows <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "hit_radius, onset_level and expiry_windows must be positive".to_string(),
            ));
        }
        if self.max_active_beats == 0 {
            return Err(EngineError::InvalidConfig(
                "max_active_beats must be at least 1".to_string(),
            ));
        }
        if self.delay_seconds < 0.0 || self.field_margin < 0.0 {
            return Err(EngineError::InvalidConfig(
                "delay_seconds and field_margin must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub controls: Controls,
    pub tuning: EngineTuning,
}

impl AppConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(json)?;
        config.tuning.validate()?;
        Ok(Self {
            controls: config.controls.sanitized(),
            tuning: config.tuning,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
