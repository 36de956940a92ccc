//! Mock collaborators shared by the unit tests.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use crate::{
    AudioBackend, AudioGraph, ChainSpec, DecodeTicket, DecodedTrack, EngineError, Result,
    SpectrumSource, TrackDecoder,
};

#[derive(Debug, Default)]
struct GraphRecord {
    chains: usize,
    gains: Vec<f32>,
    buffers: usize,
    starts: usize,
    suspends: usize,
    resumes: usize,
    stops: usize,
    finished: bool,
    spectrum: Vec<f32>,
}

/// Shared view of every call made on the graphs of a [`MockBackend`].
#[derive(Debug, Clone, Default)]
pub struct GraphLog {
    record: Rc<RefCell<GraphRecord>>,
}

impl GraphLog {
    pub fn chains(&self) -> usize {
        self.record.borrow().chains
    }

    pub fn gains(&self) -> Vec<f32> {
        self.record.borrow().gains.clone()
    }

    pub fn gain_writes(&self) -> usize {
        self.record.borrow().gains.len()
    }

    pub fn buffers(&self) -> usize {
        self.record.borrow().buffers
    }

    pub fn starts(&self) -> usize {
        self.record.borrow().starts
    }

    pub fn suspends(&self) -> usize {
        self.record.borrow().suspends
    }

    pub fn resumes(&self) -> usize {
        self.record.borrow().resumes
    }

    pub fn stops(&self) -> usize {
        self.record.borrow().stops
    }

    pub fn set_finished(&self, finished: bool) {
        self.record.borrow_mut().finished = finished;
    }

    /// Spectrum every graph reports from its next snapshot on.
    pub fn set_spectrum(&self, spectrum: Vec<f32>) {
        self.record.borrow_mut().spectrum = spectrum;
    }
}

pub struct MockGraph {
    log: GraphLog,
    current: Vec<f32>,
}

impl SpectrumSource for MockGraph {
    fn snapshot(&mut self) -> &[f32] {
        self.current.clone_from(&self.log.record.borrow().spectrum);
        &self.current
    }
}

impl AudioGraph for MockGraph {
    fn connect_chain(&mut self, _chain: &ChainSpec) -> Result<()> {
        self.log.record.borrow_mut().chains += 1;
        Ok(())
    }

    fn set_buffer(&mut self, _track: DecodedTrack) {
        self.log.record.borrow_mut().buffers += 1;
    }

    fn set_gain(&mut self, gain: f32) {
        self.log.record.borrow_mut().gains.push(gain);
    }

    fn suspend(&mut self) {
        self.log.record.borrow_mut().suspends += 1;
    }

    fn resume(&mut self) {
        self.log.record.borrow_mut().resumes += 1;
    }

    fn start(&mut self, _offset: f64) {
        self.log.record.borrow_mut().starts += 1;
    }

    fn stop(&mut self) {
        self.log.record.borrow_mut().stops += 1;
    }

    fn is_finished(&self) -> bool {
        self.log.record.borrow().finished
    }
}

pub struct MockBackend {
    log: GraphLog,
    supported: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            log: GraphLog::default(),
            supported: true,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn log(&self) -> GraphLog {
        self.log.clone()
    }
}

impl AudioBackend for MockBackend {
    fn probe(&self) -> Result<()> {
        if self.supported {
            Ok(())
        } else {
            Err(EngineError::UnsupportedBackend("no audio device".to_string()))
        }
    }

    fn create_graph(&mut self) -> Result<Box<dyn AudioGraph>> {
        Ok(Box::new(MockGraph {
            log: self.log.clone(),
            current: Vec::new(),
        }))
    }
}

pub fn silent_track(seconds: f64) -> DecodedTrack {
    let rate = 8_000;
    DecodedTrack::new(rate, vec![0.0; (seconds * f64::from(rate)) as usize])
}

/// Completes every ticket as soon as it is issued.
pub struct ImmediateDecoder;

impl ImmediateDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl TrackDecoder for ImmediateDecoder {
    fn decode(&mut self, ticket: DecodeTicket) {
        ticket.complete(Ok(silent_track(1.0)));
    }
}

/// Holds tickets until the test completes them.
#[derive(Clone, Default)]
pub struct DeferredDecoder {
    tickets: Rc<RefCell<VecDeque<DecodeTicket>>>,
}

impl DeferredDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.tickets.borrow().len()
    }

    pub fn take_next(&self) -> Option<DecodeTicket> {
        self.tickets.borrow_mut().pop_front()
    }

    pub fn complete_next(&self, result: Result<DecodedTrack>) {
        if let Some(ticket) = self.take_next() {
            ticket.complete(result);
        }
    }
}

impl TrackDecoder for DeferredDecoder {
    fn decode(&mut self, ticket: DecodeTicket) {
        self.tickets.borrow_mut().push_back(ticket);
    }
}
