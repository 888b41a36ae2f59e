mod cpal_output;
mod graph;
mod mixer;
mod offline;
mod output;

pub use cpal_output::CpalOutput;
pub use graph::{Chain, ChainSource, GainNode, Graph, GraphError, GraphId, SourceNode, build_graph};
pub use mixer::{Mixer, MixerHandle, MixerMessage, ScheduledMix, Voice, mixer};
pub use offline::OfflineOutput;
pub use output::{AudioOutput, OutputError};
