use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use stemplay_transport::{AudioArc, BufferFormat};
use tracing::debug;

use crate::mixer::{ScheduledMix, Voice};
use crate::output::{AudioOutput, OutputError};

static NEXT_GRAPH: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(pub u64);

impl GraphId {
    fn next() -> Self {
        Self(NEXT_GRAPH.fetch_add(1, Ordering::Relaxed))
    }
}

/// A resolved stem ready to become one chain of a graph.
#[derive(Debug, Clone)]
pub struct ChainSource {
    pub stem: String,
    pub buffer: AudioArc,
    /// The buffer is fallback silence rather than decoded audio.
    pub fallback: bool,
}

/// Plays one window of a buffer. Never restarted once stopped.
#[derive(Debug)]
pub struct SourceNode {
    buffer: AudioArc,
    first_frame: usize,
    end_frame: usize,
    stopped: Arc<AtomicBool>,
}

impl SourceNode {
    /// Stop the source. Returns false if it had already stopped, either
    /// explicitly or by reaching its end.
    pub fn stop(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn voice(&self, gain: f32) -> Voice {
        Voice {
            buffer: self.buffer.clone(),
            gain,
            first_frame: self.first_frame,
            end_frame: self.end_frame,
            stopped: Arc::clone(&self.stopped),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GainNode {
    pub gain: f32,
}

/// One (source, gain) pair, feeding the shared master gain.
#[derive(Debug)]
pub struct Chain {
    pub index: usize,
    pub stem: String,
    pub fallback: bool,
    pub source: SourceNode,
    pub gain: GainNode,
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("stage {stage} needs {needed} stems but only {available} are resolved")]
    MissingStage {
        stage: usize,
        needed: usize,
        available: usize,
    },

    #[error(
        "stem '{stem}' has {frames} frames of {channels}ch audio at {sample_rate} Hz, expected the stage format"
    )]
    FormatMismatch {
        stem: String,
        frames: usize,
        channels: u16,
        sample_rate: u32,
    },

    #[error("output runs at {output} Hz but stem buffers are {buffers} Hz")]
    SampleRateMismatch { output: u32, buffers: u32 },

    #[error("graph was already started; build a new one")]
    AlreadyStarted,

    #[error(transparent)]
    Output(#[from] OutputError),
}

/// The chains for stages `0..=stage`, all phase-locked to one start offset.
#[derive(Debug)]
pub struct Graph {
    id: GraphId,
    format: BufferFormat,
    start_offset: f64,
    chains: Vec<Chain>,
    started: bool,
    connected: bool,
}

/// Build one chain per stem index `0..=up_to_stage`.
///
/// Every source plays from `start_offset` to the end of its buffer. Since all
/// buffers share `format`, sources started together stay sample-aligned.
pub fn build_graph(
    sources: &[ChainSource],
    up_to_stage: usize,
    start_offset: f64,
    format: &BufferFormat,
    stem_gain: f32,
) -> Result<Graph, GraphError> {
    let needed = up_to_stage + 1;
    if sources.len() < needed {
        return Err(GraphError::MissingStage {
            stage: up_to_stage,
            needed,
            available: sources.len(),
        });
    }

    let start_offset = if start_offset.is_finite() {
        start_offset.clamp(0.0, format.duration_secs)
    } else {
        0.0
    };
    let first_frame = format.seconds_to_frames(start_offset);
    let end_frame = format.frames();

    let chains = sources[..needed]
        .iter()
        .enumerate()
        .map(|(index, source)| {
            if !source.buffer.matches(format) {
                return Err(GraphError::FormatMismatch {
                    stem: source.stem.clone(),
                    frames: source.buffer.frames(),
                    channels: source.buffer.channels(),
                    sample_rate: source.buffer.sample_rate(),
                });
            }
            Ok(Chain {
                index,
                stem: source.stem.clone(),
                fallback: source.fallback,
                source: SourceNode {
                    buffer: source.buffer.clone(),
                    first_frame,
                    end_frame,
                    stopped: Arc::new(AtomicBool::new(false)),
                },
                gain: GainNode { gain: stem_gain },
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let graph = Graph {
        id: GraphId::next(),
        format: *format,
        start_offset,
        chains,
        started: false,
        connected: false,
    };
    debug!(
        graph = graph.id.0,
        chains = graph.chains.len(),
        start_offset,
        "built mix graph"
    );
    Ok(graph)
}

impl Graph {
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Chains still connected to the output and not yet stopped.
    pub fn active_chains(&self) -> usize {
        if !self.connected {
            return 0;
        }
        self.chains
            .iter()
            .filter(|chain| !chain.source.is_stopped())
            .count()
    }

    /// Connect every chain to `output`, all starting at output time `when`.
    ///
    /// On failure nothing is left connected.
    pub fn start(&mut self, output: &dyn AudioOutput, when: f64) -> Result<(), GraphError> {
        if self.started {
            return Err(GraphError::AlreadyStarted);
        }
        if output.sample_rate() != self.format.sample_rate {
            return Err(GraphError::SampleRateMismatch {
                output: output.sample_rate(),
                buffers: self.format.sample_rate,
            });
        }

        let start_frame = (when.max(0.0) * self.format.sample_rate as f64).round() as u64;
        let voices = self
            .chains
            .iter()
            .map(|chain| chain.source.voice(chain.gain.gain))
            .collect();

        output.connect(ScheduledMix {
            graph: self.id,
            start_frame,
            voices,
        })?;

        self.started = true;
        self.connected = true;
        Ok(())
    }

    /// Stop every source and disconnect from `output`.
    ///
    /// Returns how many sources this call actually stopped; sources that already
    /// ended on their own are skipped.
    pub fn stop(&mut self, output: &dyn AudioOutput) -> usize {
        let mut stopped = 0;
        for chain in &self.chains {
            if chain.source.stop() {
                stopped += 1;
            }
        }

        if self.connected {
            output.disconnect(self.id);
            self.connected = false;
        }
        stopped
    }
}
