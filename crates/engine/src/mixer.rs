//! Real-time mix core shared by every output.
//!
//! The control thread talks to the [`Mixer`] only through a [`MixerHandle`]:
//! scheduled mixes travel over an `rtrb` ring as `basedrop::Shared` values so
//! the audio thread never frees them, and the number of frames rendered so far
//! is published through an atomic. That frame counter is the transport clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use basedrop::{Collector, Shared};
use stemplay_transport::AudioArc;

use crate::graph::GraphId;
use crate::output::OutputError;

const COMMAND_CAPACITY: usize = 64;
const MAX_MIXES: usize = 8;

/// One source playing a window of a buffer through its own gain.
pub struct Voice {
    pub buffer: AudioArc,
    pub gain: f32,
    /// First buffer frame played, i.e. the start offset.
    pub first_frame: usize,
    /// Exclusive end frame; the voice stops itself here.
    pub end_frame: usize,
    pub stopped: Arc<AtomicBool>,
}

impl Voice {
    fn mix_into(&self, out: &mut [f32], elapsed: usize) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        let position = self.first_frame + elapsed;
        if position >= self.end_frame {
            self.stopped.store(true, Ordering::Release);
            return;
        }

        let channels = self.buffer.channels() as usize;
        let frame = &self.buffer.samples()[position * channels..(position + 1) * channels];
        for (ch, sample) in out.iter_mut().enumerate() {
            *sample += frame[ch % channels] * self.gain;
        }
    }
}

/// Voices that all begin on the same output frame.
pub struct ScheduledMix {
    pub graph: GraphId,
    pub start_frame: u64,
    pub voices: Vec<Voice>,
}

impl ScheduledMix {
    fn finished(&self) -> bool {
        self.voices
            .iter()
            .all(|voice| voice.stopped.load(Ordering::Acquire))
    }
}

pub enum MixerMessage {
    Connect(Shared<ScheduledMix>),
    Disconnect(GraphId),
}

/// Audio-thread half: sums every scheduled voice into the output.
pub struct Mixer {
    channels: usize,
    commands: rtrb::Consumer<MixerMessage>,
    mixes: Vec<Shared<ScheduledMix>>,
    clock: Arc<AtomicU64>,
    master_gain: Arc<AtomicU32>,
}

/// Control-thread half of a [`Mixer`].
pub struct MixerHandle {
    sample_rate: u32,
    channels: u16,
    commands: rtrb::Producer<MixerMessage>,
    clock: Arc<AtomicU64>,
    master_gain: Arc<AtomicU32>,
    collector: Collector,
}

pub fn mixer(sample_rate: u32, channels: u16) -> (Mixer, MixerHandle) {
    let (commands_tx, commands_rx) = rtrb::RingBuffer::<MixerMessage>::new(COMMAND_CAPACITY);
    let clock = Arc::new(AtomicU64::new(0));
    let master_gain = Arc::new(AtomicU32::new(1.0f32.to_bits()));

    let mixer = Mixer {
        channels: channels.max(1) as usize,
        commands: commands_rx,
        mixes: Vec::with_capacity(MAX_MIXES),
        clock: Arc::clone(&clock),
        master_gain: Arc::clone(&master_gain),
    };

    let handle = MixerHandle {
        sample_rate,
        channels,
        commands: commands_tx,
        clock,
        master_gain,
        collector: Collector::new(),
    };

    (mixer, handle)
}

impl Mixer {
    fn apply_commands(&mut self) {
        while let Ok(message) = self.commands.pop() {
            match message {
                MixerMessage::Connect(mix) => {
                    if self.mixes.len() == MAX_MIXES {
                        self.mixes.remove(0);
                    }
                    self.mixes.push(mix);
                }
                MixerMessage::Disconnect(graph) => {
                    self.mixes.retain(|mix| mix.graph != graph);
                }
            }
        }
    }

    /// Render interleaved frames into `out`, advancing the clock by one per frame.
    pub fn render(&mut self, out: &mut [f32]) {
        self.apply_commands();

        let master = f32::from_bits(self.master_gain.load(Ordering::Relaxed));
        let mut frame = self.clock.load(Ordering::Relaxed);

        for out_frame in out.chunks_mut(self.channels) {
            out_frame.fill(0.0);

            for mix in &self.mixes {
                let Some(elapsed) = frame.checked_sub(mix.start_frame) else {
                    continue;
                };
                for voice in &mix.voices {
                    voice.mix_into(out_frame, elapsed as usize);
                }
            }

            for sample in out_frame.iter_mut() {
                *sample *= master;
            }
            frame += 1;
        }

        self.clock.store(frame, Ordering::Release);
        self.mixes.retain(|mix| !mix.finished());
    }
}

impl MixerHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn current_frame(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    pub fn current_time(&self) -> f64 {
        self.current_frame() as f64 / self.sample_rate as f64
    }

    pub fn connect(&mut self, mix: ScheduledMix) -> Result<(), OutputError> {
        self.collector.collect();
        let shared = Shared::new(&self.collector.handle(), mix);
        self.commands
            .push(MixerMessage::Connect(shared))
            .map_err(|_| OutputError::QueueFull)
    }

    pub fn disconnect(&mut self, graph: GraphId) {
        if self.commands.push(MixerMessage::Disconnect(graph)).is_err() {
            tracing::warn!(graph = graph.0, "mixer queue full, graph left to finish on its own");
        }
        self.collector.collect();
    }

    pub fn master_gain(&self) -> f32 {
        f32::from_bits(self.master_gain.load(Ordering::Relaxed))
    }

    pub fn set_master_gain(&self, gain: f32) {
        let gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 1.0 };
        self.master_gain.store(gain.to_bits(), Ordering::Relaxed);
    }
}
