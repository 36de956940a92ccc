use glam::Vec2;

use crate::{BeatKind, FrameView, Result};

/// Rendering backend. Receives the frame after the tick has finished and may
/// only read it.
pub trait Renderer {
    fn draw(&mut self, frame: &FrameView<'_>) -> Result<()>;
}

/// One beat marker to draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatInstance {
    pub position: Vec2,
    pub kind: BeatKind,
    /// Seconds since the beat appeared, for fade-out effects.
    pub age: f32,
}

/// Reusable per-frame list of markers for unconsumed beats.
#[derive(Debug, Default)]
pub struct RenderList {
    instances: Vec<BeatInstance>,
}

impl RenderList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuild(&mut self, frame: &FrameView<'_>) -> &[BeatInstance] {
        self.instances.clear();
        self.instances.extend(frame.beats.active().map(|beat| BeatInstance {
            position: beat.position,
            kind: beat.kind,
            age: beat.age(frame.time).max(0.0) as f32,
        }));
        &self.instances
    }

    pub fn instances(&self) -> &[BeatInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
