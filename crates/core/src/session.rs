use std::sync::Arc;

use stemplay_decode::{BackgroundLoads, BufferStore, StemBuffer};
use stemplay_transport::{SessionId, Stem};
use tracing::info;

use crate::error::PlaybackError;
use crate::mix::{ensure_current, resolve_sources};
use crate::time::Progress;
use crate::transport::{PlaybackState, Transport, TransportEvent};

/// Everything that belongs to one loaded song.
///
/// Replaced wholesale when the song changes; the buffer cache goes with it.
pub struct PlaybackSession {
    id: SessionId,
    stems: Vec<Stem>,
    store: Arc<BufferStore>,
    stage: usize,
    total_stages: usize,
    transport: Transport,
}

impl PlaybackSession {
    pub fn new(
        stems: Vec<Stem>,
        store: Arc<BufferStore>,
        transport: Transport,
        stage: usize,
        total_stages: usize,
    ) -> Self {
        let total_stages = if total_stages == 0 {
            stems.len()
        } else {
            total_stages
        };
        Self {
            id: store.session(),
            stage: stage.min(stems.len().saturating_sub(1)),
            stems,
            store,
            total_stages,
            transport,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn stems(&self) -> &[Stem] {
        &self.stems
    }

    pub fn store(&self) -> &Arc<BufferStore> {
        &self.store
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn total_stages(&self) -> usize {
        self.total_stages
    }

    /// Load the first stem, then the rest in the background.
    pub async fn load(&self) -> BackgroundLoads {
        self.store.load_all(&self.stems).await
    }

    /// Whether a finished load belongs to this session.
    pub fn accepts(&self, buffer: &StemBuffer) -> Result<(), PlaybackError> {
        ensure_current(&self.store, buffer)
    }

    fn check_stage(&self, stage: usize) -> Result<(), PlaybackError> {
        if stage < self.stems.len() {
            Ok(())
        } else {
            Err(PlaybackError::StageOutOfRange {
                stage,
                stems: self.stems.len(),
            })
        }
    }

    /// Play stages `0..=stage`.
    ///
    /// From stopped this starts at any offset stored by an earlier seek; from
    /// paused it continues at the pause offset; while playing it restarts at 0.
    pub async fn play(&mut self, stage: usize) -> Result<(), PlaybackError> {
        self.check_stage(stage)?;
        if self.transport.state().is_playing() {
            self.transport.stop();
        }
        let offset = self.transport.resume_offset();
        self.stage = stage;
        self.launch(offset).await
    }

    pub fn pause(&mut self) {
        self.transport.pause();
    }

    /// Continue a paused segment from its offset. No-op unless paused.
    pub async fn resume(&mut self) -> Result<(), PlaybackError> {
        if !self.transport.state().is_paused() {
            return Ok(());
        }
        let offset = self.transport.resume_offset();
        self.launch(offset).await
    }

    pub fn stop(&mut self) {
        self.transport.stop();
    }

    /// Jump to `fraction` of the stage, keeping the play/pause disposition.
    pub async fn seek(&mut self, fraction: f64) -> Result<(), PlaybackError> {
        let offset = self.transport.offset_for(fraction);
        self.seek_to(offset).await
    }

    /// Step back `seconds`, not past the start of the stage.
    pub async fn rewind(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        let offset = (self.transport.elapsed() - seconds.max(0.0)).max(0.0);
        self.seek_to(offset).await
    }

    async fn seek_to(&mut self, offset: f64) -> Result<(), PlaybackError> {
        if self.transport.state().is_playing() {
            self.transport.stop();
            return self.launch(offset).await;
        }
        self.transport.park(offset);
        Ok(())
    }

    async fn launch(&mut self, offset: f64) -> Result<(), PlaybackError> {
        match resolve_sources(&self.store, &self.stems, self.stage).await {
            Ok(sources) => self.transport.launch(&sources, self.stage, offset),
            Err(err) => {
                self.transport.abandon(offset);
                Err(err)
            }
        }
    }

    /// Expose stages `0..=stage`.
    ///
    /// While playing this stops the current mix; nothing plays again until
    /// [`PlaybackSession::play`] is called. Otherwise only the stage changes.
    pub fn set_stage(&mut self, stage: usize) -> Result<(), PlaybackError> {
        self.check_stage(stage)?;
        self.transport.settle();
        if self.transport.state().is_playing() {
            self.transport.stop();
        }
        if stage != self.stage {
            info!(session = %self.id, from = self.stage, to = stage, "stage changed");
        }
        self.stage = stage;
        Ok(())
    }

    pub fn poll(&mut self) -> Option<TransportEvent> {
        self.transport.poll()
    }

    pub fn current_time(&self) -> f64 {
        self.transport.elapsed()
    }

    pub fn duration(&self) -> f64 {
        self.transport.duration()
    }

    pub fn state(&self) -> PlaybackState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.state().is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.transport.state().is_paused()
    }

    pub fn active_chains(&self) -> usize {
        self.transport.active_chains()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            stage: self.stage,
            total_stages: self.total_stages,
            elapsed: self.current_time(),
            duration: self.duration(),
            state: self.state(),
            stems_ready: self.store.resolved_count(),
        }
    }
}
