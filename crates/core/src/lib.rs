//! Core library for the Beatmap rhythm game.
//!
//! Audio is analysed into frequency snapshots, snapshots are turned into
//! positioned beats, and clicks on those beats are scored. A frame
//! coordinator keeps playback, beat generation and scoring consistent while
//! the audio backend and track decoding run on their own schedule.

pub mod analysis;
pub mod audio;
pub mod beat;
pub mod config;
pub mod error;
pub mod frame;
pub mod playback;
pub mod render;
pub mod score;
pub mod timeline;

#[cfg(test)]
pub(crate) mod testing;

pub use analysis::{Analyser, SpectrumSource};
pub use audio::{AudioBackend, AudioGraph, ChainSpec, DecodedTrack, SoftwareBackend, SoftwareGraph};
pub use beat::{BeatEvent, BeatGenerator, BeatKind, BeatLayout, BeatSet};
pub use config::{
    beat_frequency, AppConfig, Controls, EngineTuning, Song, BUFFER_TIME_RANGE, DIFFICULTY_RANGE,
    VOLUME_RANGE,
};
pub use error::{EngineError, Result};
pub use frame::{FrameCoordinator, FrameView, PointerEvent};
pub use glam::Vec2;
pub use playback::{
    DecodeTicket, EngineContext, PlayCommand, PlaybackController, PlaybackState, TrackDecoder,
};
pub use render::{BeatInstance, RenderList, Renderer};
pub use score::{HitOutcome, PlayField, Rect, ScoreEngine, ScoreStats};
pub use timeline::{FrameClock, ManualClock, SystemClock, TimeSource};
