use std::rc::Rc;

use stemplay_engine::{AudioOutput, ChainSource, Graph, build_graph};
use stemplay_transport::BufferFormat;
use tracing::{debug, info, warn};

use crate::error::PlaybackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PlaybackState::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// The segment reached the end of the stage and playback stopped.
    Ended,
}

/// Play/pause/seek state over one output clock.
///
/// Owns at most one live [`Graph`]. Elapsed time is derived from the output's
/// rendered-frame clock, never from wall time, so it cannot drift from what
/// was actually heard.
pub struct Transport {
    output: Rc<dyn AudioOutput>,
    format: BufferFormat,
    stem_gain: f32,
    state: PlaybackState,
    graph: Option<Graph>,
    /// Output time the live graph started at.
    anchor: f64,
    /// Buffer offset the live graph started from.
    start_offset: f64,
    pause_offset: f64,
    /// Offset stored by a seek while stopped, used by the next launch.
    pending_offset: f64,
    /// Set when the segment ran out, cleared by `poll` or the next launch.
    ended: bool,
}

impl Transport {
    pub fn new(output: Rc<dyn AudioOutput>, format: BufferFormat, stem_gain: f32) -> Self {
        Self {
            output,
            format,
            stem_gain,
            state: PlaybackState::Stopped,
            graph: None,
            anchor: 0.0,
            start_offset: 0.0,
            pause_offset: 0.0,
            pending_offset: 0.0,
            ended: false,
        }
    }

    /// A playing segment past its end reads as stopped before `settle` runs.
    pub fn state(&self) -> PlaybackState {
        if self.expired() {
            PlaybackState::Stopped
        } else {
            self.state
        }
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    pub fn duration(&self) -> f64 {
        self.format.duration_secs
    }

    /// Seconds into the stage: the pause offset while paused, 0 while stopped.
    pub fn elapsed(&self) -> f64 {
        match self.state() {
            PlaybackState::Stopped => 0.0,
            PlaybackState::Paused => self.pause_offset,
            PlaybackState::Playing => {
                let played = (self.output.current_time() - self.anchor).max(0.0);
                (self.start_offset + played).min(self.duration())
            }
        }
    }

    /// Offset a launch would start from in the current state.
    pub fn resume_offset(&self) -> f64 {
        match self.state() {
            PlaybackState::Stopped => self.pending_offset,
            PlaybackState::Paused => self.pause_offset,
            PlaybackState::Playing => self.elapsed(),
        }
    }

    /// Map a fraction of the stage to an offset in seconds.
    pub fn offset_for(&self, fraction: f64) -> f64 {
        if fraction.is_nan() {
            return 0.0;
        }
        fraction.clamp(0.0, 1.0) * self.duration()
    }

    pub fn active_chains(&self) -> usize {
        if self.expired() {
            return 0;
        }
        self.graph.as_ref().map_or(0, Graph::active_chains)
    }

    fn end_time(&self) -> f64 {
        self.anchor + (self.duration() - self.start_offset)
    }

    fn expired(&self) -> bool {
        self.state.is_playing() && self.output.current_time() >= self.end_time()
    }

    /// Stop a segment that has run to the end of the stage.
    ///
    /// Every state change goes through here first, so nothing acts on a
    /// segment that is no longer audible.
    pub fn settle(&mut self) {
        if self.expired() {
            debug!("stage segment reached its end");
            self.stop();
            self.ended = true;
        }
    }

    /// Build a graph over `sources` for stages `0..=stage` and start it at `offset`.
    ///
    /// Any live graph is torn down first. On failure the transport is stopped
    /// with nothing connected, and `offset` is kept for the next attempt.
    pub fn launch(
        &mut self,
        sources: &[ChainSource],
        stage: usize,
        offset: f64,
    ) -> Result<(), PlaybackError> {
        self.settle();
        self.teardown();
        self.ended = false;

        match self.start_graph(sources, stage, offset) {
            Ok((graph, when)) => {
                info!(
                    stage,
                    offset = graph.start_offset(),
                    chains = graph.chain_count(),
                    "playback started"
                );
                self.anchor = when;
                self.start_offset = graph.start_offset();
                self.graph = Some(graph);
                self.pause_offset = 0.0;
                self.pending_offset = 0.0;
                self.state = PlaybackState::Playing;
                Ok(())
            }
            Err(err) => {
                warn!(stage, error = %err, "playback failed to start");
                self.abandon(offset);
                Err(err)
            }
        }
    }

    fn start_graph(
        &self,
        sources: &[ChainSource],
        stage: usize,
        offset: f64,
    ) -> Result<(Graph, f64), PlaybackError> {
        self.output.ensure_running()?;
        let mut graph = build_graph(sources, stage, offset, &self.format, self.stem_gain)?;
        // every chain shares this one start time
        let when = self.output.current_time();
        graph.start(self.output.as_ref(), when)?;
        Ok((graph, when))
    }

    /// Stop in place, keeping the offset.
    pub fn pause(&mut self) {
        self.settle();
        if !self.state.is_playing() {
            return;
        }
        let offset = self.elapsed();
        self.teardown();
        self.pause_offset = offset;
        self.state = PlaybackState::Paused;
        info!(offset, "playback paused");
    }

    /// Halt everything and forget offsets. Safe to call in any state.
    pub fn stop(&mut self) {
        self.teardown();
        self.anchor = 0.0;
        self.start_offset = 0.0;
        self.pause_offset = 0.0;
        self.pending_offset = 0.0;
        if self.state != PlaybackState::Stopped {
            info!("playback stopped");
            self.state = PlaybackState::Stopped;
        }
    }

    /// Stop after a failed start, remembering where playback should resume.
    pub fn abandon(&mut self, offset: f64) {
        self.stop();
        self.pending_offset = offset.clamp(0.0, self.duration());
    }

    /// Store `offset` without touching audio. Only meaningful when not playing.
    pub fn park(&mut self, offset: f64) {
        self.settle();
        let offset = offset.clamp(0.0, self.duration());
        match self.state {
            PlaybackState::Paused => self.pause_offset = offset,
            PlaybackState::Stopped => self.pending_offset = offset,
            PlaybackState::Playing => {
                debug!(offset, "ignoring park while playing");
            }
        }
    }

    /// Report a segment that ran out since the last poll, once.
    pub fn poll(&mut self) -> Option<TransportEvent> {
        self.settle();
        std::mem::take(&mut self.ended).then_some(TransportEvent::Ended)
    }

    fn teardown(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            let stopped = graph.stop(self.output.as_ref());
            debug!(graph = graph.id().0, stopped, "tore down graph");
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemplay_engine::OfflineOutput;
    use stemplay_transport::AudioArc;

    const RATE: u32 = 8000;

    fn setup() -> (Rc<OfflineOutput>, Transport) {
        let output = Rc::new(OfflineOutput::new(RATE, 2));
        let format = BufferFormat::new(RATE, 2, 1.0);
        let transport = Transport::new(output.clone(), format, 0.7);
        (output, transport)
    }

    fn sources(count: usize) -> Vec<ChainSource> {
        (0..count)
            .map(|i| ChainSource {
                stem: i.to_string(),
                buffer: AudioArc::new(vec![0.1; RATE as usize * 2], RATE, 2),
                fallback: false,
            })
            .collect()
    }

    #[test]
    fn test_elapsed_follows_output_clock() {
        let (output, mut transport) = setup();
        assert_eq!(transport.elapsed(), 0.0);

        transport.launch(&sources(1), 0, 0.0).unwrap();
        output.advance(0.25);

        assert_eq!(transport.state(), PlaybackState::Playing);
        assert!((transport.elapsed() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_launch_at_offset() {
        let (output, mut transport) = setup();
        transport.launch(&sources(2), 1, 0.5).unwrap();
        output.advance(0.1);

        assert!((transport.elapsed() - 0.6).abs() < 1e-9);
        assert_eq!(transport.active_chains(), 2);
    }

    #[test]
    fn test_pause_keeps_offset_and_disconnects() {
        let (output, mut transport) = setup();
        transport.launch(&sources(2), 1, 0.0).unwrap();
        output.advance(0.3);

        transport.pause();
        output.advance(0.3);

        assert_eq!(transport.state(), PlaybackState::Paused);
        assert!((transport.elapsed() - 0.3).abs() < 1e-9);
        assert_eq!(transport.active_chains(), 0);
        assert_eq!(output.connected_voices(), 0);
        assert!((transport.resume_offset() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (output, mut transport) = setup();
        transport.launch(&sources(1), 0, 0.2).unwrap();
        output.advance(0.1);

        transport.stop();
        transport.stop();

        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.elapsed(), 0.0);
        assert_eq!(transport.resume_offset(), 0.0);
        assert_eq!(output.connected_voices(), 0);
    }

    #[test]
    fn test_poll_ends_segment_at_duration() {
        let (output, mut transport) = setup();
        transport.launch(&sources(1), 0, 0.5).unwrap();

        output.advance(0.4);
        assert_eq!(transport.poll(), None);

        output.advance(0.1);
        assert_eq!(transport.poll(), Some(TransportEvent::Ended));
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.elapsed(), 0.0);
        assert_eq!(transport.poll(), None);
    }

    #[test]
    fn test_segment_reads_stopped_past_its_end_without_poll() {
        let (output, mut transport) = setup();
        transport.launch(&sources(1), 0, 0.0).unwrap();
        output.advance(1.5);

        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.elapsed(), 0.0);
        assert_eq!(transport.active_chains(), 0);
        assert_eq!(transport.resume_offset(), 0.0);
    }

    #[test]
    fn test_park_after_natural_end_does_not_restart() {
        let (output, mut transport) = setup();
        transport.launch(&sources(1), 0, 0.0).unwrap();
        output.advance(1.1);

        transport.park(0.5);

        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(output.connected_voices(), 0);
        assert_eq!(transport.resume_offset(), 0.5);
    }

    #[test]
    fn test_pause_after_natural_end_keeps_ended_event() {
        let (output, mut transport) = setup();
        transport.launch(&sources(1), 0, 0.5).unwrap();
        output.advance(0.6);

        transport.pause();

        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(transport.poll(), Some(TransportEvent::Ended));
        assert_eq!(transport.poll(), None);
    }

    #[test]
    fn test_relaunch_clears_unreported_end() {
        let (output, mut transport) = setup();
        transport.launch(&sources(1), 0, 0.5).unwrap();
        output.advance(0.6);

        transport.launch(&sources(1), 0, 0.0).unwrap();

        assert_eq!(transport.poll(), None);
        assert_eq!(transport.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_failed_launch_leaves_stopped_and_keeps_offset() {
        let (output, mut transport) = setup();
        output.set_suspended(true);

        let err = transport.launch(&sources(1), 0, 0.4).unwrap_err();

        assert!(matches!(err, PlaybackError::Output(_)));
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(output.connected_voices(), 0);
        assert!((transport.resume_offset() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_failed_build_tears_down_previous_graph() {
        let (output, mut transport) = setup();
        transport.launch(&sources(1), 0, 0.0).unwrap();

        let err = transport.launch(&sources(1), 3, 0.0).unwrap_err();

        assert!(matches!(err, PlaybackError::Graph(_)));
        assert_eq!(transport.state(), PlaybackState::Stopped);
        assert_eq!(output.connected_voices(), 0);
    }

    #[test]
    fn test_park_stores_offset_by_state() {
        let (_output, mut transport) = setup();
        transport.park(0.75);
        assert_eq!(transport.elapsed(), 0.0);
        assert_eq!(transport.resume_offset(), 0.75);

        transport.park(4.0);
        assert_eq!(transport.resume_offset(), 1.0);
    }

    #[test]
    fn test_offset_for_clamps_fraction() {
        let (_output, transport) = setup();
        assert_eq!(transport.offset_for(0.5), 0.5);
        assert_eq!(transport.offset_for(2.0), 1.0);
        assert_eq!(transport.offset_for(-1.0), 0.0);
        assert_eq!(transport.offset_for(f64::NAN), 0.0);
    }

    #[test]
    fn test_drop_disconnects_graph() {
        let (output, mut transport) = setup();
        transport.launch(&sources(2), 1, 0.0).unwrap();
        drop(transport);

        assert_eq!(output.connected_voices(), 0);
    }
}
