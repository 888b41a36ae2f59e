use crate::graph::GraphId;
use crate::mixer::ScheduledMix;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The output exists but is not running, e.g. an autoplay policy holds it
    /// until the user interacts.
    #[error("audio output is suspended: {0}")]
    Suspended(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("mixer command queue is full")]
    QueueFull,
}

/// The process-wide audio sink: an output clock, a master gain and somewhere
/// to connect scheduled mixes.
///
/// Created once and shared by every song; control-plane calls happen on one
/// thread, hence `&self` methods without `Send`/`Sync` bounds.
pub trait AudioOutput {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Seconds of audio rendered so far. The authoritative transport clock.
    fn current_time(&self) -> f64;

    /// Make sure the output is producing audio, resuming it if needed.
    fn ensure_running(&self) -> Result<(), OutputError>;

    fn connect(&self, mix: ScheduledMix) -> Result<(), OutputError>;

    fn disconnect(&self, graph: GraphId);

    fn master_gain(&self) -> f32;

    fn set_master_gain(&self, gain: f32);
}
