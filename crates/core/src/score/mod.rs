use std::cmp::Ordering;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{BeatKind, BeatSet, EngineTuning, PlaybackState};

const TIME_EPSILON: f64 = 1e-9;

/// Axis-aligned rectangle in screen space, `y` growing downwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, point: Vec2) -> bool {
        !self.is_empty()
            && point.x >= self.x
            && point.x < self.right()
            && point.y >= self.y
            && point.y < self.bottom()
    }
}

/// Screen region where clicks are evaluated: the viewport minus the control
/// overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayField {
    pub viewport: Rect,
    pub overlay: Rect,
}

impl PlayField {
    pub fn new(viewport: Rect, overlay: Rect) -> Self {
        Self { viewport, overlay }
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.is_finite() && self.viewport.contains(point) && !self.overlay.contains(point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitOutcome {
    Scored,
    Miss,
    /// Not evaluated: outside the play field or not playing.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreStats {
    pub hits: u32,
    pub misses: u32,
    pub ignored: u32,
}

/// Matches clicks against beats and owns the running score.
#[derive(Debug, Clone)]
pub struct ScoreEngine {
    score: u32,
    hit_radius: f32,
    points_per_hit: u32,
    stats: ScoreStats,
}

impl ScoreEngine {
    pub fn new(tuning: &EngineTuning) -> Self {
        Self {
            score: 0,
            hit_radius: tuning.hit_radius,
            points_per_hit: tuning.points_per_hit,
            stats: ScoreStats::default(),
        }
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn stats(&self) -> ScoreStats {
        self.stats
    }

    pub fn hit_radius(&self) -> f32 {
        self.hit_radius
    }

    pub fn reset(&mut self) {
        self.score = 0;
        self.stats = ScoreStats::default();
    }

    /// Evaluates one click at engine time `now`.
    ///
    /// A beat qualifies when it is an unconsumed point, `now - created_at`
    /// lies in `[0, buffer_time]` and it is within the hit radius. The
    /// closest in time wins, then the closest in space. At most one beat is
    /// consumed and the score grows by at most one increment.
    pub fn register_hit(
        &mut self,
        beats: &mut BeatSet,
        field: &PlayField,
        state: PlaybackState,
        pointer: Vec2,
        now: f64,
        buffer_time: f64,
    ) -> HitOutcome {
        if state != PlaybackState::Playing || !field.contains(pointer) || !now.is_finite() {
            self.stats.ignored += 1;
            return HitOutcome::Ignored;
        }

        let best = beats
            .iter()
            .enumerate()
            .filter(|(_, beat)| !beat.consumed && beat.kind == BeatKind::Point)
            .filter_map(|(index, beat)| {
                let delta = beat.age(now);
                let distance = beat.position.distance(pointer);
                let in_time = delta >= -TIME_EPSILON && delta <= buffer_time + TIME_EPSILON;
                (in_time && distance <= self.hit_radius).then_some((index, delta, distance))
            })
            .min_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then(a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
            });

        match best {
            Some((index, delta, distance)) if beats.consume(index) => {
                self.score = self.score.saturating_add(self.points_per_hit);
                self.stats.hits += 1;
                tracing::debug!(index, delta, distance, score = self.score, "hit");
                HitOutcome::Scored
            }
            _ => {
                self.stats.misses += 1;
                HitOutcome::Miss
            }
        }
    }
}
