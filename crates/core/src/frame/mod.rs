use glam::Vec2;

use crate::{
    BeatGenerator, BeatLayout, BeatSet, Controls, EngineTuning, FrameClock, HitOutcome,
    PlayCommand, PlayField, PlaybackController, PlaybackState, Result, ScoreEngine, ScoreStats,
};

/// A click or press on the play surface, in screen space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: Vec2,
    /// Same time base as the timestamps handed to [`FrameCoordinator::tick`].
    pub timestamp: f64,
}

impl PointerEvent {
    pub fn new(x: f32, y: f32, timestamp: f64) -> Self {
        Self {
            position: Vec2::new(x, y),
            timestamp,
        }
    }
}

/// Read-only data handed to the renderer and the control panel each frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub beats: &'a BeatSet,
    pub score: u32,
    pub state: PlaybackState,
    /// Engine time of this frame.
    pub time: f64,
    pub field: PlayField,
}

/// Drives one frame at a time: applies control changes, advances the beat
/// generator while playing and routes clicks to the score engine.
///
/// Every method runs to completion on the caller's thread. The only input
/// from other threads is decode completions, which are drained at the start
/// of each tick.
#[derive(Debug)]
pub struct FrameCoordinator {
    playback: PlaybackController,
    generator: BeatGenerator,
    score: ScoreEngine,
    clock: FrameClock,
    field: PlayField,
    margin: f32,
    controls: Controls,
}

impl FrameCoordinator {
    pub fn new(
        playback: PlaybackController,
        tuning: &EngineTuning,
        field: PlayField,
        controls: &Controls,
    ) -> Self {
        let controls = controls.sanitized();
        let layout = BeatLayout::new(field.viewport, field.overlay, tuning.field_margin);
        let mut generator = BeatGenerator::new(layout, tuning);
        generator.set_buffer_time(controls.buffer_time);

        Self {
            playback,
            generator,
            score: ScoreEngine::new(tuning),
            clock: FrameClock::new(),
            field,
            margin: tuning.field_margin,
            controls,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn score(&self) -> u32 {
        self.score.score()
    }

    pub fn stats(&self) -> ScoreStats {
        self.score.stats()
    }

    pub fn beats(&self) -> &BeatSet {
        self.generator.beats()
    }

    pub fn engine_time(&self) -> f64 {
        self.generator.elapsed()
    }

    pub fn beat_frequency(&self) -> f64 {
        self.controls.beat_frequency()
    }

    pub fn buffer_time(&self) -> f64 {
        self.generator.buffer_time()
    }

    pub fn play_field(&self) -> PlayField {
        self.field
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    /// Follows a window resize or a change of the overlay bounds.
    pub fn set_play_field(&mut self, field: PlayField) {
        self.field = field;
        self.generator
            .set_layout(BeatLayout::new(field.viewport, field.overlay, self.margin));
    }

    /// Starts loading `controls.song`. Score and beats are reset even if the
    /// load itself fails.
    pub fn load(&mut self, controls: &mut Controls) -> Result<u64> {
        let next = controls.sanitized();
        self.score.reset();
        self.generator.reset();
        self.generator.set_buffer_time(next.buffer_time);
        controls.score = 0;
        self.controls = Controls { score: 0, ..next };

        self.playback.load(self.controls.song, self.controls.volume)
    }

    pub fn play_pause(&mut self) -> PlayCommand {
        self.playback.play_pause()
    }

    /// Runs one frame at timestamp `now` (seconds).
    pub fn tick(&mut self, now: f64, controls: &mut Controls) -> FrameView<'_> {
        self.playback.poll_decode();
        if self.playback.poll_finished() {
            // Nothing can be hit once the track is over.
            self.generator.retire_all();
        }
        self.apply_controls(controls);

        let delta = self.clock.advance(now);
        if self.playback.state() == PlaybackState::Playing {
            let beat_frequency = self.controls.beat_frequency();
            let spectrum = self.playback.spectrum();
            self.generator.advance(delta, spectrum, beat_frequency);
        }

        controls.score = self.score.score();
        self.view()
    }

    /// Evaluates a click. Only counts while playing and inside the play field.
    pub fn pointer_down(&mut self, event: PointerEvent) -> HitOutcome {
        let state = self.playback.state();
        let mut now = self.generator.elapsed();
        if state == PlaybackState::Playing {
            now += self.clock.since_last(event.timestamp);
        }
        let buffer_time = self.generator.buffer_time();

        self.score.register_hit(
            self.generator.beats_mut(),
            &self.field,
            state,
            event.position,
            now,
            buffer_time,
        )
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView {
            beats: self.generator.beats(),
            score: self.score.score(),
            state: self.playback.state(),
            time: self.generator.elapsed(),
            field: self.field,
        }
    }

    fn apply_controls(&mut self, controls: &Controls) {
        let next = controls.sanitized();

        self.playback.set_volume(next.volume);
        if next.difficulty != self.controls.difficulty {
            tracing::debug!(
                difficulty = next.difficulty,
                beat_frequency = next.beat_frequency(),
                "difficulty changed"
            );
        }
        self.generator.set_buffer_time(next.buffer_time);

        self.controls = Controls {
            score: self.score.score(),
            ..next
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{DeferredDecoder, GraphLog, ImmediateDecoder, MockBackend},
        ChainSpec, Rect, RenderList, Song, TrackDecoder,
    };

    const BINS: usize = 128;
    const FRAME: f64 = 1.0 / 60.0;

    fn field() -> PlayField {
        PlayField::new(
            Rect::new(0.0, 0.0, 800.0, 600.0),
            Rect::new(560.0, 0.0, 240.0, 320.0),
        )
    }

    fn coordinator_with(
        decoder: Box<dyn TrackDecoder>,
        controls: &Controls,
    ) -> (FrameCoordinator, GraphLog) {
        let tuning = EngineTuning::default();
        let backend = MockBackend::new();
        let log = backend.log();
        let playback =
            PlaybackController::new(Box::new(backend), decoder, ChainSpec::from_tuning(&tuning))
                .unwrap();
        (
            FrameCoordinator::new(playback, &tuning, field(), controls),
            log,
        )
    }

    fn burst(bin: usize) -> Vec<f32> {
        let mut spectrum = vec![0.0; BINS];
        spectrum[bin] = 0.9;
        spectrum
    }

    /// Loads, waits for the decode and starts playing at time zero.
    fn playing(controls: &mut Controls) -> (FrameCoordinator, GraphLog) {
        let (mut coordinator, log) = coordinator_with(Box::new(ImmediateDecoder::new()), controls);
        coordinator.load(controls).unwrap();
        coordinator.tick(0.0, controls);
        assert_eq!(coordinator.play_pause(), PlayCommand::Started);
        (coordinator, log)
    }

    /// Ticks frames `first..=last`, lighting up `bins` on the listed frames.
    fn run_frames(
        coordinator: &mut FrameCoordinator,
        log: &GraphLog,
        controls: &mut Controls,
        first: usize,
        last: usize,
        bursts: &[(usize, usize)],
    ) {
        for frame in first..=last {
            let spectrum = bursts
                .iter()
                .find(|(at, _)| *at == frame)
                .map(|(_, bin)| burst(*bin))
                .unwrap_or_else(|| vec![0.0; BINS]);
            log.set_spectrum(spectrum);
            coordinator.tick(frame as f64 * FRAME, controls);
        }
    }

    #[test]
    fn city_escape_session() {
        let mut controls = Controls {
            difficulty: 5,
            buffer_time: 0.5,
            ..Controls::default()
        };
        let (mut coordinator, log) = coordinator_with(Box::new(ImmediateDecoder::new()), &controls);
        assert!((coordinator.beat_frequency() - 0.30).abs() < 1e-9);

        coordinator.load(&mut controls).unwrap();
        coordinator.tick(0.0, &mut controls);
        assert_eq!(controls.score, 0);
        assert!(coordinator.beats().is_empty());
        assert_eq!(coordinator.state(), PlaybackState::Loaded);

        assert_eq!(coordinator.play_pause(), PlayCommand::Started);
        assert_eq!(coordinator.state(), PlaybackState::Playing);

        run_frames(&mut coordinator, &log, &mut controls, 1, 120, &[(96, 10), (117, 70)]);
        assert!((coordinator.engine_time() - 2.0).abs() < 1e-6);

        let active: Vec<_> = coordinator.beats().active().cloned().collect();
        assert_eq!(active.len(), 2);
        let first = active[0].position;

        let outcome = coordinator.pointer_down(PointerEvent {
            position: first,
            timestamp: 120.0 * FRAME,
        });
        assert_eq!(outcome, HitOutcome::Scored);
        assert_eq!(coordinator.score(), 1);

        let beats = coordinator.beats();
        assert!(beats.get(0).unwrap().consumed);
        assert!(!beats.get(1).unwrap().consumed);

        coordinator.tick(121.0 * FRAME, &mut controls);
        assert_eq!(controls.score, 1);
    }

    #[test]
    fn load_always_resets_score_and_beats() {
        let mut controls = Controls {
            buffer_time: 0.5,
            ..Controls::default()
        };
        let (mut coordinator, log) = playing(&mut controls);
        run_frames(&mut coordinator, &log, &mut controls, 1, 30, &[(10, 20), (29, 90)]);

        let target = coordinator.beats().get(1).unwrap().position;
        assert_eq!(
            coordinator.pointer_down(PointerEvent {
                position: target,
                timestamp: 30.0 * FRAME,
            }),
            HitOutcome::Scored
        );
        coordinator.tick(31.0 * FRAME, &mut controls);
        assert_eq!(controls.score, 1);
        assert!(coordinator.beats().active_count() > 0);

        controls.song = Song::MrBlueSky;
        coordinator.load(&mut controls).unwrap();
        assert_eq!(controls.score, 0);
        assert_eq!(coordinator.score(), 0);
        assert!(coordinator.beats().is_empty());
        assert_eq!(coordinator.engine_time(), 0.0);
        assert_eq!(coordinator.playback().context().unwrap().song(), Song::MrBlueSky);
    }

    #[test]
    fn paused_frames_do_not_generate() {
        let mut controls = Controls::default();
        let (mut coordinator, log) = playing(&mut controls);
        run_frames(&mut coordinator, &log, &mut controls, 1, 10, &[]);
        let time = coordinator.engine_time();

        assert_eq!(coordinator.play_pause(), PlayCommand::Paused);
        run_frames(&mut coordinator, &log, &mut controls, 11, 40, &[(20, 5)]);
        assert_eq!(coordinator.engine_time(), time);
        assert!(coordinator.beats().is_empty());

        let outcome = coordinator.pointer_down(PointerEvent::new(100.0, 500.0, 40.0 * FRAME));
        assert_eq!(outcome, HitOutcome::Ignored);
    }

    #[test]
    fn clicks_over_the_overlay_are_ignored() {
        let mut controls = Controls::default();
        let (mut coordinator, log) = playing(&mut controls);
        run_frames(&mut coordinator, &log, &mut controls, 1, 5, &[(5, 3)]);

        let outcome = coordinator.pointer_down(PointerEvent::new(600.0, 100.0, 5.0 * FRAME));
        assert_eq!(outcome, HitOutcome::Ignored);
        assert_eq!(coordinator.stats().ignored, 1);
        assert!(coordinator.beats().active().all(|beat| !beat.consumed));
    }

    #[test]
    fn late_pointer_timestamps_extend_engine_time() {
        let mut controls = Controls::default();
        let (mut coordinator, log) = playing(&mut controls);
        run_frames(&mut coordinator, &log, &mut controls, 1, 6, &[(6, 40)]);
        let target = coordinator.beats().get(0).unwrap().position;

        // 0.3 s after the last tick is outside the 0.2 s buffer.
        let outcome = coordinator.pointer_down(PointerEvent {
            position: target,
            timestamp: 6.0 * FRAME + 0.3,
        });
        assert_eq!(outcome, HitOutcome::Miss);
    }

    #[test]
    fn volume_changes_reach_the_gain_once() {
        let mut controls = Controls::default();
        let (mut coordinator, log) = playing(&mut controls);
        let writes = log.gain_writes();

        controls.volume = 70;
        coordinator.tick(FRAME, &mut controls);
        coordinator.tick(2.0 * FRAME, &mut controls);
        assert_eq!(log.gain_writes(), writes + 1);
        assert_eq!(log.gains().last(), Some(&0.7));
    }

    #[test]
    fn control_changes_apply_on_the_next_tick() {
        let mut controls = Controls::default();
        let (mut coordinator, _log) = playing(&mut controls);

        controls.difficulty = 10;
        controls.buffer_time = 0.4;
        coordinator.tick(FRAME, &mut controls);
        assert!((coordinator.beat_frequency() - 0.05).abs() < 1e-9);
        assert!((coordinator.buffer_time() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn commands_before_decode_are_queued() {
        let decoder = DeferredDecoder::new();
        let mut controls = Controls::default();
        let (mut coordinator, _log) = coordinator_with(Box::new(decoder.clone()), &controls);

        assert_eq!(coordinator.play_pause(), PlayCommand::Ignored);
        coordinator.load(&mut controls).unwrap();
        assert_eq!(coordinator.play_pause(), PlayCommand::Queued);
        coordinator.tick(0.0, &mut controls);
        assert_eq!(coordinator.state(), PlaybackState::Unloaded);

        decoder.complete_next(Ok(crate::testing::silent_track(1.0)));
        coordinator.tick(FRAME, &mut controls);
        assert_eq!(coordinator.state(), PlaybackState::Playing);
    }

    #[test]
    fn natural_end_stops_generation() {
        let mut controls = Controls::default();
        let (mut coordinator, log) = playing(&mut controls);
        log.set_finished(true);
        run_frames(&mut coordinator, &log, &mut controls, 1, 3, &[(2, 8)]);

        assert_eq!(coordinator.state(), PlaybackState::Ended);
        assert!(coordinator.beats().is_empty());
    }

    #[test]
    fn ending_retires_live_beats() {
        let mut controls = Controls::default();
        let (mut coordinator, log) = playing(&mut controls);
        run_frames(&mut coordinator, &log, &mut controls, 1, 3, &[(2, 8)]);
        assert_eq!(coordinator.beats().active_count(), 1);

        log.set_finished(true);
        let view = coordinator.tick(4.0 * FRAME, &mut controls);
        assert_eq!(view.state, PlaybackState::Ended);
        assert!(view.beats.is_empty());
        assert!(RenderList::new().rebuild(&view).is_empty());
    }

    #[test]
    fn resize_moves_future_beats() {
        let mut controls = Controls::default();
        let (mut coordinator, log) = playing(&mut controls);
        coordinator.set_play_field(PlayField::new(
            Rect::new(0.0, 0.0, 400.0, 300.0),
            Rect::default(),
        ));
        run_frames(&mut coordinator, &log, &mut controls, 1, 2, &[(2, 127)]);

        let position = coordinator.beats().get(0).unwrap().position;
        assert!(position.x <= 400.0 && position.y <= 300.0);
        assert!(coordinator.play_field().contains(position));
    }
}
