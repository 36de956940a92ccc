//! Track decoders used by the command line front end.

use std::{
    f32::consts::PI,
    path::{Path, PathBuf},
    thread,
};

use beatmap_core::{DecodeTicket, DecodedTrack, EngineError, Song, TrackDecoder};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Reads `<dir>/<title>.wav` on a worker thread.
#[derive(Debug, Clone)]
pub struct WavDecoder {
    dir: PathBuf,
}

impl WavDecoder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, song: Song) -> PathBuf {
        self.dir.join(format!("{}.wav", song.title()))
    }
}

impl TrackDecoder for WavDecoder {
    fn decode(&mut self, ticket: DecodeTicket) {
        let path = self.path_for(ticket.song());
        thread::spawn(move || {
            if !ticket.is_current() {
                return;
            }
            tracing::debug!(path = %path.display(), "decoding wav");
            let song = ticket.song();
            let result = read_wav(&path).map_err(|err| EngineError::decode(song, err.to_string()));
            ticket.complete(result);
        });
    }
}

/// Decodes any PCM or float WAV file into a mono track.
pub fn read_wav(path: &Path) -> Result<DecodedTrack, hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    Ok(DecodedTrack::new(spec.sample_rate, mono))
}

const SYNTH_RATE: u32 = 22_050;
const HIT_DECAY: f32 = 0.05;

/// Renders a percussive practice track for each song, so the game can run
/// without audio assets.
#[derive(Debug, Clone)]
pub struct SynthDecoder {
    seed: u64,
    seconds: f64,
}

impl SynthDecoder {
    pub fn new(seed: u64, seconds: f64) -> Self {
        Self {
            seed,
            seconds: seconds.max(1.0),
        }
    }
}

impl TrackDecoder for SynthDecoder {
    fn decode(&mut self, ticket: DecodeTicket) {
        let seed = self.seed;
        let seconds = self.seconds;
        thread::spawn(move || {
            if !ticket.is_current() {
                return;
            }
            let track = synthesise(ticket.song(), seed, seconds);
            ticket.complete(Ok(track));
        });
    }
}

fn tempo(song: Song) -> f32 {
    match song {
        Song::CityEscape => 150.0,
        Song::UnknownFromMe => 95.0,
        Song::Eggman => 130.0,
        Song::ImBlue => 128.0,
        Song::MrBlueSky => 89.0,
    }
}

pub fn synthesise(song: Song, seed: u64, seconds: f64) -> DecodedTrack {
    let index = Song::ALL.iter().position(|s| *s == song).unwrap_or(0) as u64;
    let mut rng = StdRng::seed_from_u64(seed ^ (index << 32));

    let rate = SYNTH_RATE as f32;
    let len = (seconds * f64::from(SYNTH_RATE)) as usize;
    let mut samples = vec![0.0f32; len];

    let beat = 60.0 / tempo(song);
    let hit_len = (HIT_DECAY * 8.0 * rate) as usize;
    let mut time = beat;
    while ((time * rate) as usize) < len {
        let pitch = rng.gen_range(200.0f32..5_000.0);
        let amplitude = rng.gen_range(0.2f32..0.4);
        let start = (time * rate) as usize;

        for (offset, sample) in samples[start..].iter_mut().take(hit_len).enumerate() {
            let t = offset as f32 / rate;
            *sample += amplitude * (-t / HIT_DECAY).exp() * (2.0 * PI * pitch * t).sin();
        }

        // Occasional off-beat hit.
        time += if rng.gen_bool(0.25) { beat * 0.5 } else { beat };
    }

    DecodedTrack::new(SYNTH_RATE, samples)
}
