//! Simulated player that clicks on beats.

use std::collections::HashSet;

use beatmap_core::{BeatKind, FrameView, PointerEvent, Vec2};
use rand::{rngs::StdRng, Rng, SeedableRng};

#[derive(Debug)]
pub struct Autoplayer {
    rng: StdRng,
    reaction: f64,
    jitter: f32,
    miss_rate: f64,
    attempted: HashSet<(u64, usize)>,
}

impl Autoplayer {
    pub fn new(seed: u64, reaction: f64, jitter: f32, miss_rate: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            reaction: reaction.max(0.0),
            jitter: jitter.max(0.0),
            miss_rate: miss_rate.clamp(0.0, 1.0),
            attempted: HashSet::new(),
        }
    }

    /// Clicks to send this frame. Each point beat is attempted once, after
    /// the reaction delay.
    pub fn plan(&mut self, frame: &FrameView<'_>, timestamp: f64) -> Vec<PointerEvent> {
        let live: HashSet<(u64, usize)> = frame
            .beats
            .iter()
            .map(|beat| (beat.created_at.to_bits(), beat.bin))
            .collect();
        self.attempted.retain(|key| live.contains(key));

        let mut clicks = Vec::new();
        for beat in frame.beats.active() {
            if beat.kind != BeatKind::Point || beat.age(frame.time) < self.reaction {
                continue;
            }
            if !self.attempted.insert((beat.created_at.to_bits(), beat.bin)) {
                continue;
            }
            if self.rng.gen_bool(self.miss_rate) {
                continue;
            }

            let offset = if self.jitter > 0.0 {
                Vec2::new(
                    self.rng.gen_range(-self.jitter..=self.jitter),
                    self.rng.gen_range(-self.jitter..=self.jitter),
                )
            } else {
                Vec2::ZERO
            };
            clicks.push(PointerEvent {
                position: beat.position + offset,
                timestamp,
            });
        }
        clicks
    }
}
