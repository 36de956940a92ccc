//! Spectrum-driven beat generation.
//!
//! Each frame the generator compares the current spectrum snapshot with the
//! previous one. A bin whose magnitude rises by at least the onset level is an
//! onset candidate; candidates closer than `beat_frequency` seconds to the last
//! emitted beat are dropped. Because candidates do not depend on the spacing,
//! accepting the first candidate after each gap emits at least as many beats
//! for a shorter spacing as for a longer one.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{score::Rect, EngineTuning, BUFFER_TIME_RANGE};

const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeatKind {
    /// Single tap target.
    Point,
    /// Broadband sweep. Generated and rendered but there is no rule for
    /// scoring it, so it only ever expires.
    Slide,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeatEvent {
    pub position: Vec2,
    /// Engine time in seconds at which the beat was generated.
    pub created_at: f64,
    pub kind: BeatKind,
    pub consumed: bool,
    /// Spectrum bin the beat was derived from.
    pub bin: usize,
}

impl BeatEvent {
    pub fn age(&self, now: f64) -> f64 {
        now - self.created_at
    }
}

/// Beats in generation order. Only the generator inserts or removes; other
/// components may only consume.
#[derive(Debug, Default, Clone)]
pub struct BeatSet {
    events: Vec<BeatEvent>,
}

impl BeatSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BeatEvent> {
        self.events.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BeatEvent> {
        self.events.iter()
    }

    /// Unconsumed beats.
    pub fn active(&self) -> impl Iterator<Item = &BeatEvent> {
        self.events.iter().filter(|event| !event.consumed)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Marks a beat as consumed. Returns `false` if it was already consumed
    /// or does not exist.
    pub fn consume(&mut self, index: usize) -> bool {
        match self.events.get_mut(index) {
            Some(event) if !event.consumed => {
                event.consumed = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn push(&mut self, event: BeatEvent) {
        self.events.push(event);
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut BeatEvent> {
        self.events.iter_mut()
    }

    fn retain(&mut self, keep: impl FnMut(&BeatEvent) -> bool) {
        self.events.retain(keep);
    }

    fn drop_oldest(&mut self, count: usize) {
        let count = count.min(self.events.len());
        self.events.drain(0..count);
    }
}

/// Maps spectrum bins onto screen positions below the control overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatLayout {
    pub viewport: Rect,
    pub overlay: Rect,
    pub margin: f32,
}

impl BeatLayout {
    pub fn new(viewport: Rect, overlay: Rect, margin: f32) -> Self {
        Self {
            viewport,
            overlay,
            margin: margin.max(0.0),
        }
    }

    /// Bin index spreads left to right, louder bins sit higher up. Positions
    /// are snapped to whole pixels so identical onsets land on identical spots.
    pub fn position(&self, bin: usize, bins: usize, magnitude: f32) -> Vec2 {
        let top = if self.overlay.is_empty() {
            self.viewport.y
        } else {
            self.viewport.y.max(self.overlay.bottom())
        };
        let (left, right) = span(self.viewport.x, self.viewport.right(), self.margin);
        let (top, bottom) = span(top, self.viewport.bottom(), self.margin);

        let t = if bins > 1 {
            bin.min(bins - 1) as f32 / (bins - 1) as f32
        } else {
            0.5
        };
        let magnitude = magnitude.clamp(0.0, 1.0);

        Vec2::new(
            left + t * (right - left),
            bottom - magnitude * (bottom - top),
        )
        .round()
    }
}

fn span(start: f32, end: f32, margin: f32) -> (f32, f32) {
    if end - start > 2.0 * margin {
        (start + margin, end - margin)
    } else {
        let middle = (start + end) * 0.5;
        (middle, middle)
    }
}

#[derive(Debug, Clone, Copy)]
struct Onset {
    bin: usize,
    magnitude: f32,
    rising_bins: usize,
}

#[derive(Debug)]
pub struct BeatGenerator {
    layout: BeatLayout,
    onset_level: f32,
    slide_spread: f32,
    expiry_windows: f64,
    max_active_beats: usize,
    buffer_time: f64,
    beats: BeatSet,
    elapsed: f64,
    last_emit: Option<f64>,
    previous: Vec<f32>,
    emitted: u64,
}

impl BeatGenerator {
    pub fn new(layout: BeatLayout, tuning: &EngineTuning) -> Self {
        Self {
            layout,
            onset_level: tuning.onset_level,
            slide_spread: tuning.slide_spread,
            expiry_windows: tuning.expiry_windows,
            max_active_beats: tuning.max_active_beats.max(1),
            buffer_time: 0.2,
            beats: BeatSet::new(),
            elapsed: 0.0,
            last_emit: None,
            previous: Vec::new(),
            emitted: 0,
        }
    }

    pub fn beats(&self) -> &BeatSet {
        &self.beats
    }

    /// Mutable access for consumers that mark beats as hit.
    pub fn beats_mut(&mut self) -> &mut BeatSet {
        &mut self.beats
    }

    /// Engine time, advanced only while the generator is driven.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Total number of beats emitted since the last reset.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn buffer_time(&self) -> f64 {
        self.buffer_time
    }

    pub fn set_buffer_time(&mut self, buffer_time: f64) {
        if buffer_time.is_finite() {
            self.buffer_time = buffer_time.clamp(BUFFER_TIME_RANGE.0, BUFFER_TIME_RANGE.1);
        }
    }

    pub fn layout(&self) -> &BeatLayout {
        &self.layout
    }

    pub fn set_layout(&mut self, layout: BeatLayout) {
        self.layout = layout;
    }

    /// Age after which an unhit beat is retired.
    pub fn expiry(&self) -> f64 {
        self.expiry_windows * self.buffer_time
    }

    /// Drops every beat and restarts engine time at zero.
    pub fn reset(&mut self) {
        self.beats.clear();
        self.elapsed = 0.0;
        self.last_emit = None;
        self.previous.clear();
        self.emitted = 0;
    }

    /// Retires every live beat. Engine time is kept.
    pub fn retire_all(&mut self) {
        self.beats.clear();
    }

    /// Advances engine time, retires stale beats and emits at most one new
    /// beat for this snapshot. An empty or silent spectrum emits nothing.
    pub fn advance(&mut self, delta_time: f64, spectrum: &[f32], beat_frequency: f64) -> &BeatSet {
        if delta_time.is_finite() && delta_time > 0.0 {
            self.elapsed += delta_time;
        }

        self.expire();

        if let Some(onset) = self.detect_onset(spectrum) {
            let spacing = if beat_frequency.is_finite() {
                beat_frequency.max(0.0)
            } else {
                0.0
            };
            let gate_open = self
                .last_emit
                .map(|last| self.elapsed - last + TIME_EPSILON >= spacing)
                .unwrap_or(true);

            if gate_open {
                self.emit(onset, spectrum.len());
            }
        }

        &self.beats
    }

    fn expire(&mut self) {
        let now = self.elapsed;
        let expiry = self.expiry();
        for event in self.beats.iter_mut() {
            if !event.consumed && event.age(now) > expiry + TIME_EPSILON {
                event.consumed = true;
            }
        }
        self.beats.retain(|event| !event.consumed);
    }

    fn detect_onset(&mut self, spectrum: &[f32]) -> Option<Onset> {
        if spectrum.is_empty() {
            self.previous.clear();
            return None;
        }
        if self.previous.len() != spectrum.len() {
            self.previous = vec![0.0; spectrum.len()];
        }

        let mut best: Option<(usize, f32)> = None;
        let mut rising_bins = 0;
        for (bin, (current, previous)) in spectrum.iter().zip(&self.previous).enumerate() {
            let current = if current.is_finite() { current.max(0.0) } else { 0.0 };
            let rise = current - previous;
            if rise >= self.onset_level {
                rising_bins += 1;
                if best.map(|(_, best_rise)| rise > best_rise).unwrap_or(true) {
                    best = Some((bin, rise));
                }
            }
        }

        for (previous, current) in self.previous.iter_mut().zip(spectrum) {
            *previous = if current.is_finite() { current.max(0.0) } else { 0.0 };
        }

        best.map(|(bin, _)| Onset {
            bin,
            magnitude: self.previous[bin],
            rising_bins,
        })
    }

    fn emit(&mut self, onset: Onset, bins: usize) {
        let position = self.layout.position(onset.bin, bins, onset.magnitude);
        let now = self.elapsed;

        // One live beat per spot. Expiry bounds how long a spot stays taken.
        if self.beats.active().any(|event| event.position == position) {
            tracing::debug!(bin = onset.bin, "skipping duplicate beat");
            return;
        }

        let kind = if bins > 1 && onset.rising_bins as f32 / bins as f32 >= self.slide_spread {
            BeatKind::Slide
        } else {
            BeatKind::Point
        };

        self.beats.push(BeatEvent {
            position,
            created_at: now,
            kind,
            consumed: false,
            bin: onset.bin,
        });
        self.last_emit = Some(now);
        self.emitted += 1;
        tracing::trace!(bin = onset.bin, ?kind, time = now, "beat emitted");

        if self.beats.len() > self.max_active_beats {
            let overflow = self.beats.len() - self.max_active_beats;
            self.beats.drop_oldest(overflow);
        }
    }
}
