//! An output rendered on demand by the caller instead of a device callback.
//!
//! Time only moves when [`OfflineOutput::render`] or [`OfflineOutput::advance`]
//! is called, which makes it the clock of choice for deterministic tests and
//! for rendering a stage mix without a sound card.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::graph::GraphId;
use crate::mixer::{Mixer, MixerHandle, ScheduledMix, mixer};
use crate::output::{AudioOutput, OutputError};

const RENDER_BLOCK: usize = 4096;

pub struct OfflineOutput {
    mixer: RefCell<Mixer>,
    handle: RefCell<MixerHandle>,
    suspended: Cell<bool>,
    connected: RefCell<HashMap<GraphId, usize>>,
}

impl OfflineOutput {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let (mixer, handle) = mixer(sample_rate, channels);
        Self {
            mixer: RefCell::new(mixer),
            handle: RefCell::new(handle),
            suspended: Cell::new(false),
            connected: RefCell::new(HashMap::new()),
        }
    }

    /// Render `frames` interleaved frames and return them.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let channels = self.channels().max(1) as usize;
        let mut out = vec![0.0f32; frames * channels];
        self.mixer.borrow_mut().render(&mut out);
        out
    }

    /// Move the clock forward by `seconds`, discarding the audio.
    pub fn advance(&self, seconds: f64) {
        let mut remaining = (seconds.max(0.0) * self.sample_rate() as f64).round() as usize;
        let channels = self.channels().max(1) as usize;
        let mut block = vec![0.0f32; RENDER_BLOCK * channels];
        let mut mixer = self.mixer.borrow_mut();
        while remaining > 0 {
            let frames = remaining.min(RENDER_BLOCK);
            mixer.render(&mut block[..frames * channels]);
            remaining -= frames;
        }
    }

    /// Hold the output the way a browser holds audio until a user gesture.
    pub fn set_suspended(&self, suspended: bool) {
        self.suspended.set(suspended);
    }

    /// Voices currently connected to this sink.
    pub fn connected_voices(&self) -> usize {
        self.connected.borrow().values().sum()
    }

    pub fn connected_graphs(&self) -> usize {
        self.connected.borrow().len()
    }
}

impl AudioOutput for OfflineOutput {
    fn sample_rate(&self) -> u32 {
        self.handle.borrow().sample_rate()
    }

    fn channels(&self) -> u16 {
        self.handle.borrow().channels()
    }

    fn current_time(&self) -> f64 {
        self.handle.borrow().current_time()
    }

    fn ensure_running(&self) -> Result<(), OutputError> {
        if self.suspended.get() {
            return Err(OutputError::Suspended(
                "output is waiting for a user gesture".to_string(),
            ));
        }
        Ok(())
    }

    fn connect(&self, mix: ScheduledMix) -> Result<(), OutputError> {
        let graph = mix.graph;
        let voices = mix.voices.len();
        self.handle.borrow_mut().connect(mix)?;
        self.connected.borrow_mut().insert(graph, voices);
        Ok(())
    }

    fn disconnect(&self, graph: GraphId) {
        self.handle.borrow_mut().disconnect(graph);
        self.connected.borrow_mut().remove(&graph);
    }

    fn master_gain(&self) -> f32 {
        self.handle.borrow().master_gain()
    }

    fn set_master_gain(&self, gain: f32) {
        self.handle.borrow().set_master_gain(gain);
    }
}
