use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc,
    },
};

use crate::{
    AudioBackend, AudioGraph, ChainSpec, DecodedTrack, EngineError, Result, Song, VOLUME_RANGE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackState {
    /// No track, or the current track is still decoding.
    #[default]
    Unloaded,
    Loaded,
    Playing,
    Paused,
    Ended,
}

/// What a play/pause press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayCommand {
    Started,
    Paused,
    Resumed,
    /// The track is still decoding; it will start as soon as it is ready.
    Queued,
    /// A second press while decoding withdrew the queued start.
    Unqueued,
    Ignored,
}

/// Result of one decode request, sent back to the frame loop.
pub struct DecodeCompletion {
    generation: u64,
    song: Song,
    result: Result<DecodedTrack>,
}

/// Handle a [`TrackDecoder`] completes once the PCM for a load is available.
///
/// Tickets may be completed from any thread. Completing a ticket whose load
/// has been superseded is harmless: the result is discarded on arrival.
pub struct DecodeTicket {
    generation: u64,
    song: Song,
    current: Arc<AtomicU64>,
    sender: Sender<DecodeCompletion>,
}

impl DecodeTicket {
    pub fn song(&self) -> Song {
        self.song
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer load has been issued since this ticket was created.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation
    }

    pub fn complete(self, result: Result<DecodedTrack>) {
        let completion = DecodeCompletion {
            generation: self.generation,
            song: self.song,
            result,
        };
        // The controller is gone; nobody is waiting for this track any more.
        let _ = self.sender.send(completion);
    }
}

impl fmt::Debug for DecodeTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeTicket")
            .field("generation", &self.generation)
            .field("song", &self.song)
            .finish()
    }
}

/// Fetches and decodes a named track, off the frame loop.
pub trait TrackDecoder {
    fn decode(&mut self, ticket: DecodeTicket);
}

/// Per-load state: built by `load`, torn down by the next `load`.
pub struct EngineContext {
    generation: u64,
    song: Song,
    graph: Box<dyn AudioGraph>,
    ready: bool,
    failed: bool,
    started: bool,
    start_queued: bool,
}

impl EngineContext {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn song(&self) -> Song {
        self.song
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_start_queued(&self) -> bool {
        self.start_queued
    }

    fn start(&mut self) {
        self.graph.start(0.0);
        self.started = true;
        self.start_queued = false;
    }
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("generation", &self.generation)
            .field("song", &self.song)
            .field("ready", &self.ready)
            .field("failed", &self.failed)
            .field("started", &self.started)
            .field("start_queued", &self.start_queued)
            .finish()
    }
}

/// Owns the play/pause/stop state machine and drives the audio graph.
pub struct PlaybackController {
    backend: Box<dyn AudioBackend>,
    decoder: Box<dyn TrackDecoder>,
    chain: ChainSpec,
    state: PlaybackState,
    context: Option<EngineContext>,
    generation: Arc<AtomicU64>,
    sender: Sender<DecodeCompletion>,
    receiver: Receiver<DecodeCompletion>,
    last_volume: Option<u8>,
}

impl PlaybackController {
    /// Probes the backend before anything else; a backend that cannot be used
    /// is reported as [`EngineError::UnsupportedBackend`].
    pub fn new(
        backend: Box<dyn AudioBackend>,
        decoder: Box<dyn TrackDecoder>,
        chain: ChainSpec,
    ) -> Result<Self> {
        if let Err(err) = backend.probe() {
            tracing::error!(%err, "audio backend unavailable");
            return Err(match err {
                EngineError::UnsupportedBackend(_) => err,
                other => EngineError::UnsupportedBackend(other.to_string()),
            });
        }

        let (sender, receiver) = mpsc::channel();
        Ok(Self {
            backend,
            decoder,
            chain,
            state: PlaybackState::Unloaded,
            context: None,
            generation: Arc::new(AtomicU64::new(0)),
            sender,
            receiver,
            last_volume: None,
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn context(&self) -> Option<&EngineContext> {
        self.context.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Tears down the current graph, builds a fresh one and requests the
    /// track. The state is `Unloaded` until the decode lands.
    pub fn load(&mut self, song: Song, volume: u8) -> Result<u64> {
        if let Some(mut previous) = self.context.take() {
            if previous.started {
                previous.graph.stop();
            }
        }
        self.state = PlaybackState::Unloaded;
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        let mut graph = self.backend.create_graph()?;
        graph.connect_chain(&self.chain)?;
        let volume = volume.min(VOLUME_RANGE.1);
        graph.set_gain(gain(volume));
        self.last_volume = Some(volume);

        self.context = Some(EngineContext {
            generation,
            song,
            graph,
            ready: false,
            failed: false,
            started: false,
            start_queued: false,
        });

        tracing::info!(%song, generation, "loading track");
        self.decoder.decode(DecodeTicket {
            generation,
            song,
            current: self.generation.clone(),
            sender: self.sender.clone(),
        });

        Ok(generation)
    }

    /// Applies finished decodes. Returns `true` when the current track became
    /// ready during this call.
    pub fn poll_decode(&mut self) -> bool {
        let mut became_ready = false;

        while let Ok(completion) = self.receiver.try_recv() {
            let context = match self.context.as_mut() {
                Some(context) if context.generation == completion.generation => context,
                _ => {
                    tracing::debug!(
                        song = %completion.song,
                        generation = completion.generation,
                        "discarding stale decode result"
                    );
                    continue;
                }
            };
            if context.ready || context.failed {
                continue;
            }

            match completion.result {
                Ok(track) => {
                    tracing::info!(
                        song = %completion.song,
                        seconds = track.duration(),
                        "track loaded"
                    );
                    context.graph.set_buffer(track);
                    context.ready = true;
                    self.state = PlaybackState::Loaded;
                    if context.start_queued {
                        context.start();
                        self.state = PlaybackState::Playing;
                        tracing::info!("starting queued playback");
                    }
                    became_ready = true;
                }
                Err(err) => {
                    tracing::warn!(%err, "error decoding audio data");
                    context.failed = true;
                    context.start_queued = false;
                }
            }
        }

        became_ready
    }

    /// Moves `Playing` to `Ended` once the source has run out.
    pub fn poll_finished(&mut self) -> bool {
        let finished = self.state == PlaybackState::Playing
            && self
                .context
                .as_ref()
                .map(|context| context.graph.is_finished())
                .unwrap_or(false);
        if finished {
            self.state = PlaybackState::Ended;
            tracing::info!("playback ended");
        }
        finished
    }

    pub fn play_pause(&mut self) -> PlayCommand {
        let Some(context) = self.context.as_mut() else {
            tracing::warn!("play requested before any track was loaded");
            return PlayCommand::Ignored;
        };

        let command = match self.state {
            PlaybackState::Unloaded if context.failed => PlayCommand::Ignored,
            PlaybackState::Unloaded => {
                context.start_queued = !context.start_queued;
                if context.start_queued {
                    PlayCommand::Queued
                } else {
                    PlayCommand::Unqueued
                }
            }
            PlaybackState::Loaded => {
                context.start();
                self.state = PlaybackState::Playing;
                PlayCommand::Started
            }
            PlaybackState::Playing => {
                context.graph.suspend();
                self.state = PlaybackState::Paused;
                PlayCommand::Paused
            }
            PlaybackState::Paused => {
                context.graph.resume();
                self.state = PlaybackState::Playing;
                PlayCommand::Resumed
            }
            PlaybackState::Ended => PlayCommand::Ignored,
        };

        tracing::debug!(?command, state = ?self.state, "play/pause");
        command
    }

    /// Writes the gain only when the volume differs from the last write.
    pub fn set_volume(&mut self, volume: u8) -> bool {
        let volume = volume.min(VOLUME_RANGE.1);
        if self.last_volume == Some(volume) {
            return false;
        }
        let Some(context) = self.context.as_mut() else {
            return false;
        };
        context.graph.set_gain(gain(volume));
        self.last_volume = Some(volume);
        true
    }

    /// Current spectrum of the loaded graph, empty when nothing is loaded.
    pub fn spectrum(&mut self) -> &[f32] {
        match self.context.as_mut() {
            Some(context) => context.graph.snapshot(),
            None => &[],
        }
    }
}

fn gain(volume: u8) -> f32 {
    f32::from(volume) / 100.0
}

impl fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state)
            .field("context", &self.context)
            .field("generation", &self.generation())
            .field("last_volume", &self.last_volume)
            .finish()
    }
}
