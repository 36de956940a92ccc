use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{EngineError, Result};

/// Decibel range mapped linearly onto the `[0, 1]` magnitude scale.
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

/// Anything that can hand out the current frequency-magnitude snapshot.
///
/// The snapshot reflects whatever the backend last analysed; callers must not
/// assume it is aligned with their own frame cadence.
pub trait SpectrumSource {
    /// Returns `fft_size / 2` non-negative magnitudes. An empty slice is a
    /// valid answer when nothing is playing.
    fn snapshot(&mut self) -> &[f32];
}

/// Frequency analyser modelled on a browser analyser node: Hann-windowed FFT,
/// temporal smoothing and a decibel scale squeezed into `[0, 1]`.
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    smoothed: Vec<f32>,
    magnitudes: Vec<f32>,
    fft: FftResources,
}

impl Analyser {
    pub fn new(fft_size: usize, smoothing: f32) -> Result<Self> {
        if !fft_size.is_power_of_two() || fft_size < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "analyser fft size must be a power of two, got {fft_size}"
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Ok(Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 0.999),
            smoothed: vec![0.0; fft_size / 2],
            magnitudes: vec![0.0; fft_size / 2],
            fft,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of magnitude bins produced per snapshot.
    pub fn bins(&self) -> usize {
        self.fft_size / 2
    }

    /// Latest magnitudes without running a new analysis pass.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    /// Forgets the smoothing history so the next window starts cold.
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.magnitudes.fill(0.0);
    }

    /// Analyses the most recent `fft_size` samples of `window`. Shorter
    /// windows are zero-padded at the front.
    pub fn process(&mut self, window: &[f32]) -> Result<&[f32]> {
        let len = self.fft_size;
        let tail = &window[window.len().saturating_sub(len)..];
        let pad = len - tail.len();

        self.fft.input[..pad].fill(0.0);
        for (offset, value) in tail.iter().enumerate() {
            let index = pad + offset;
            self.fft.input[index] = *value * hann_value(index, len);
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let scale = 1.0 / len as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (i, bin) in self.fft.spectrum.iter().take(self.bins()).enumerate() {
            let magnitude = bin.norm() * scale;
            let smoothed = self.smoothing * self.smoothed[i] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[i] = smoothed;

            let decibels = 20.0 * smoothed.max(1e-12).log10();
            self.magnitudes[i] = ((decibels - MIN_DECIBELS) / range).clamp(0.0, 1.0);
        }

        Ok(&self.magnitudes)
    }
}

impl SpectrumSource for Analyser {
    fn snapshot(&mut self) -> &[f32] {
        &self.magnitudes
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
