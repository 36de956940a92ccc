use std::{fmt, rc::Rc, sync::Arc};

use crate::{analysis::Analyser, EngineTuning, Result, SpectrumSource, TimeSource};

/// Mono PCM produced by a track decoder.
#[derive(Clone, PartialEq)]
pub struct DecodedTrack {
    pub sample_rate: u32,
    pub samples: Arc<[f32]>,
}

impl DecodedTrack {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            samples: samples.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Up to `len` samples ending at `seconds` into the track.
    pub fn window_ending_at(&self, seconds: f64, len: usize) -> &[f32] {
        let end = (seconds.max(0.0) * f64::from(self.sample_rate)) as usize;
        let end = end.min(self.samples.len());
        &self.samples[end.saturating_sub(len)..end]
    }
}

impl fmt::Debug for DecodedTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedTrack")
            .field("sample_rate", &self.sample_rate)
            .field("samples", &self.samples.len())
            .finish()
    }
}

/// Node chain built for every load: source, analyser, delay, gain, output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSpec {
    pub fft_size: usize,
    pub smoothing: f32,
    pub delay_seconds: f64,
}

impl ChainSpec {
    pub fn from_tuning(tuning: &EngineTuning) -> Self {
        Self {
            fft_size: tuning.fft_size,
            smoothing: tuning.smoothing,
            delay_seconds: tuning.delay_seconds,
        }
    }
}

/// One loaded track's audio routing graph. Treated as opaque by the playback
/// controller.
pub trait AudioGraph: SpectrumSource {
    fn connect_chain(&mut self, chain: &ChainSpec) -> Result<()>;
    fn set_buffer(&mut self, track: DecodedTrack);
    fn set_gain(&mut self, gain: f32);
    fn suspend(&mut self);
    fn resume(&mut self);
    fn start(&mut self, offset: f64);
    fn stop(&mut self);

    /// Whether the source has played through to the end.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Factory for audio graphs.
pub trait AudioBackend {
    /// Checks that the backend is usable. Failing here is fatal.
    fn probe(&self) -> Result<()>;
    fn create_graph(&mut self) -> Result<Box<dyn AudioGraph>>;
}

/// Headless backend that plays decoded PCM against a [`TimeSource`].
pub struct SoftwareBackend {
    clock: Rc<dyn TimeSource>,
}

impl SoftwareBackend {
    pub fn new(clock: Rc<dyn TimeSource>) -> Self {
        Self { clock }
    }
}

impl AudioBackend for SoftwareBackend {
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn create_graph(&mut self) -> Result<Box<dyn AudioGraph>> {
        Ok(Box::new(SoftwareGraph::new(self.clock.clone())?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Transport {
    Idle,
    Running { since: f64, offset: f64 },
    Suspended { position: f64 },
    Stopped,
}

pub struct SoftwareGraph {
    clock: Rc<dyn TimeSource>,
    analyser: Analyser,
    chain: ChainSpec,
    track: Option<DecodedTrack>,
    gain: f32,
    transport: Transport,
}

impl SoftwareGraph {
    pub fn new(clock: Rc<dyn TimeSource>) -> Result<Self> {
        let chain = ChainSpec::from_tuning(&EngineTuning::default());
        Ok(Self {
            clock,
            analyser: Analyser::new(chain.fft_size, chain.smoothing)?,
            chain,
            track: None,
            gain: 1.0,
            transport: Transport::Idle,
        })
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Seconds of the source consumed so far. The analyser sits before the
    /// delay node, so this runs `delay_seconds` ahead of what is heard.
    pub fn position(&self) -> f64 {
        match self.transport {
            Transport::Idle | Transport::Stopped => 0.0,
            Transport::Running { since, offset } => offset + (self.clock.now() - since).max(0.0),
            Transport::Suspended { position } => position,
        }
    }
}

impl SpectrumSource for SoftwareGraph {
    fn snapshot(&mut self) -> &[f32] {
        let Some(track) = &self.track else {
            return &[];
        };

        if let Transport::Running { .. } = self.transport {
            let position = self.position();
            let window = track.window_ending_at(position, self.chain.fft_size);
            if let Err(err) = self.analyser.process(window) {
                tracing::warn!(%err, "spectrum analysis failed");
            }
        }

        self.analyser.magnitudes()
    }
}

impl AudioGraph for SoftwareGraph {
    fn connect_chain(&mut self, chain: &ChainSpec) -> Result<()> {
        if chain.fft_size != self.analyser.fft_size() || chain.smoothing != self.chain.smoothing {
            self.analyser = Analyser::new(chain.fft_size, chain.smoothing)?;
        }
        self.chain = chain.clone();
        Ok(())
    }

    fn set_buffer(&mut self, track: DecodedTrack) {
        self.track = Some(track);
        self.analyser.reset();
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
    }

    fn suspend(&mut self) {
        if let Transport::Running { .. } = self.transport {
            self.transport = Transport::Suspended {
                position: self.position(),
            };
        }
    }

    fn resume(&mut self) {
        if let Transport::Suspended { position } = self.transport {
            self.transport = Transport::Running {
                since: self.clock.now(),
                offset: position,
            };
        }
    }

    fn start(&mut self, offset: f64) {
        if self.transport != Transport::Idle {
            tracing::debug!("source already started");
            return;
        }
        self.transport = Transport::Running {
            since: self.clock.now(),
            offset: offset.max(0.0),
        };
    }

    fn stop(&mut self) {
        self.transport = Transport::Stopped;
    }

    fn is_finished(&self) -> bool {
        match (&self.track, self.transport) {
            (Some(track), Transport::Running { .. }) => {
                self.position() >= track.duration() + self.chain.delay_seconds
            }
            _ => false,
        }
    }
}

impl fmt::Debug for SoftwareGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareGraph")
            .field("chain", &self.chain)
            .field("track", &self.track)
            .field("gain", &self.gain)
            .field("transport", &self.transport)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;
    use crate::ManualClock;

    fn graph(clock: &ManualClock) -> SoftwareGraph {
        let mut graph = SoftwareGraph::new(Rc::new(clock.clone())).unwrap();
        graph
            .connect_chain(&ChainSpec {
                fft_size: 64,
                smoothing: 0.0,
                delay_seconds: 1.0,
            })
            .unwrap();
        graph
    }

    fn tone(seconds: f64) -> DecodedTrack {
        let rate = 1_000u32;
        let len = (seconds * f64::from(rate)) as usize;
        let samples = (0..len)
            .map(|i| 0.05 * (2.0 * PI * 125.0 * i as f32 / rate as f32).sin())
            .collect();
        DecodedTrack::new(rate, samples)
    }

    #[test]
    fn windows_clamp_to_track_bounds() {
        let track = tone(1.0);
        assert_eq!(track.window_ending_at(0.0, 64).len(), 0);
        assert_eq!(track.window_ending_at(0.5, 64).len(), 64);
        assert_eq!(track.window_ending_at(0.01, 64).len(), 10);
        assert_eq!(track.window_ending_at(9.0, 64).len(), 64);
        assert!((track.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_snapshot_without_buffer() {
        let clock = ManualClock::new();
        let mut graph = graph(&clock);
        graph.start(0.0);
        clock.advance(0.5);
        assert!(graph.snapshot().is_empty());
    }

    #[test]
    fn playhead_follows_the_clock_and_freezes_when_suspended() {
        let clock = ManualClock::new();
        let mut graph = graph(&clock);
        graph.set_buffer(tone(2.0));

        assert_eq!(graph.position(), 0.0);
        graph.start(0.0);
        clock.advance(0.5);
        assert!((graph.position() - 0.5).abs() < 1e-9);

        let spectrum = graph.snapshot().to_vec();
        assert_eq!(spectrum.len(), 32);
        assert!(spectrum.iter().any(|m| *m > 0.0));

        graph.suspend();
        clock.advance(10.0);
        assert!((graph.position() - 0.5).abs() < 1e-9);
        assert_eq!(graph.snapshot(), spectrum.as_slice());

        graph.resume();
        clock.advance(0.25);
        assert!((graph.position() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn finishes_after_track_and_delay() {
        let clock = ManualClock::new();
        let mut graph = graph(&clock);
        graph.set_buffer(tone(1.0));
        graph.start(0.0);

        clock.advance(1.5);
        assert!(!graph.is_finished());
        clock.advance(0.6);
        assert!(graph.is_finished());

        graph.stop();
        assert!(!graph.is_finished());
    }

    #[test]
    fn start_is_one_shot_and_gain_is_clamped() {
        let clock = ManualClock::new();
        let mut graph = graph(&clock);
        graph.start(0.0);
        clock.advance(1.0);
        graph.start(0.0);
        assert!((graph.position() - 1.0).abs() < 1e-9);

        graph.set_gain(3.0);
        assert_eq!(graph.gain(), 1.0);
    }
}
