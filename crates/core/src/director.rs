use std::rc::Rc;
use std::sync::Arc;

use stemplay_decode::{BackgroundLoads, BufferStore, StemBuffer, StemFetcher};
use stemplay_engine::AudioOutput;
use stemplay_transport::{BufferFormat, SessionId, Stem};
use tracing::{info, warn};

use crate::catalog::StemCatalog;
use crate::config::Config;
use crate::error::PlaybackError;
use crate::session::PlaybackSession;
use crate::time::Progress;
use crate::transport::{Transport, TransportEvent};

/// Result of skipping to the next stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAdvance {
    Next(usize),
    /// Every stage has been revealed.
    Final,
}

/// A song load started through [`StageDirector::load_from_catalog`].
pub struct LoadedSong {
    pub song_name: String,
    pub loads: BackgroundLoads,
}

/// Holds the process-wide output and at most one live [`PlaybackSession`].
///
/// Every transport call is a no-op while no song is loaded.
pub struct StageDirector {
    output: Rc<dyn AudioOutput>,
    fetcher: Arc<dyn StemFetcher>,
    config: Config,
    session: Option<PlaybackSession>,
}

impl StageDirector {
    pub fn new(output: Rc<dyn AudioOutput>, fetcher: Arc<dyn StemFetcher>, config: Config) -> Self {
        output.set_master_gain(config.master_gain);
        Self {
            output,
            fetcher,
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn format(&self) -> BufferFormat {
        self.config.buffer_format(self.output.sample_rate())
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(PlaybackSession::id)
    }

    /// Replace the current song, stopping whatever was playing.
    ///
    /// Returns once the first stem is ready; the rest keep loading behind the
    /// returned handle.
    pub async fn load_song(
        &mut self,
        stems: Vec<Stem>,
        current_stage: usize,
        total_stages: usize,
    ) -> BackgroundLoads {
        self.load(stems, current_stage, total_stages).await
    }

    pub async fn load_from_catalog(
        &mut self,
        catalog: &dyn StemCatalog,
        song_id: &str,
    ) -> anyhow::Result<LoadedSong> {
        let song = catalog.fetch_stem_list(song_id).await?;
        let loads = self
            .load(song.stems(), song.current_stage, song.total_stages)
            .await;
        Ok(LoadedSong {
            song_name: song.song_name,
            loads,
        })
    }

    async fn load(
        &mut self,
        stems: Vec<Stem>,
        current_stage: usize,
        total_stages: usize,
    ) -> BackgroundLoads {
        if let Some(mut old) = self.session.take() {
            old.stop();
            info!(session = %old.id(), "discarded previous song");
        }

        let id = SessionId::next();
        let format = self.format();
        let store = Arc::new(BufferStore::new(id, format, Arc::clone(&self.fetcher)));
        let transport = Transport::new(Rc::clone(&self.output), format, self.config.stem_gain);
        let session =
            PlaybackSession::new(stems, Arc::clone(&store), transport, current_stage, total_stages);
        info!(
            session = %id,
            stems = session.stems().len(),
            stage = session.stage(),
            total_stages = session.total_stages(),
            "loaded song"
        );

        let stems = session.stems().to_vec();
        self.session = Some(session);
        store.load_all(&stems).await
    }

    /// Stale-result guard for background loads.
    ///
    /// Returns false, and drops the buffer, when it was produced for a song that
    /// is no longer loaded.
    pub fn accept_loaded(&self, buffer: &StemBuffer) -> bool {
        let Some(session) = &self.session else {
            warn!(stem = %buffer.stem, "stem finished loading with no song loaded");
            return false;
        };
        match session.accepts(buffer) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "ignoring stale stem");
                false
            }
        }
    }

    pub async fn play(&mut self, stage: usize) -> Result<(), PlaybackError> {
        match &mut self.session {
            Some(session) => session.play(stage).await,
            None => Ok(()),
        }
    }

    /// Play the session's current stage.
    pub async fn play_current(&mut self) -> Result<(), PlaybackError> {
        match &mut self.session {
            Some(session) => {
                let stage = session.stage();
                session.play(stage).await
            }
            None => Ok(()),
        }
    }

    pub fn pause(&mut self) {
        if let Some(session) = &mut self.session {
            session.pause();
        }
    }

    pub async fn resume(&mut self) -> Result<(), PlaybackError> {
        match &mut self.session {
            Some(session) => session.resume().await,
            None => Ok(()),
        }
    }

    pub fn stop(&mut self) {
        if let Some(session) = &mut self.session {
            session.stop();
        }
    }

    pub async fn seek(&mut self, fraction: f64) -> Result<(), PlaybackError> {
        match &mut self.session {
            Some(session) => session.seek(fraction).await,
            None => Ok(()),
        }
    }

    pub async fn rewind(&mut self, seconds: f64) -> Result<(), PlaybackError> {
        match &mut self.session {
            Some(session) => session.rewind(seconds).await,
            None => Ok(()),
        }
    }

    /// Rewind by the configured step.
    pub async fn rewind_step(&mut self) -> Result<(), PlaybackError> {
        let step = self.config.rewind_step_secs;
        self.rewind(step).await
    }

    pub fn set_stage(&mut self, stage: usize) -> Result<(), PlaybackError> {
        match &mut self.session {
            Some(session) => session.set_stage(stage),
            None => Ok(()),
        }
    }

    /// Skip to the next stage, stopping playback.
    pub fn advance_stage(&mut self) -> Result<Option<StageAdvance>, PlaybackError> {
        let Some(session) = &mut self.session else {
            return Ok(None);
        };
        session.stop();

        let next = session.stage() + 1;
        let last = session.total_stages().min(session.stems().len());
        if next >= last {
            info!(session = %session.id(), "final stage reached");
            return Ok(Some(StageAdvance::Final));
        }
        session.set_stage(next)?;
        Ok(Some(StageAdvance::Next(next)))
    }

    pub fn poll(&mut self) -> Option<TransportEvent> {
        self.session.as_mut().and_then(PlaybackSession::poll)
    }

    pub fn current_time(&self) -> f64 {
        self.session
            .as_ref()
            .map_or(0.0, PlaybackSession::current_time)
    }

    pub fn duration(&self) -> f64 {
        self.session
            .as_ref()
            .map_or(self.config.stage_duration_secs, PlaybackSession::duration)
    }

    pub fn is_playing(&self) -> bool {
        self.session.as_ref().is_some_and(PlaybackSession::is_playing)
    }

    pub fn is_paused(&self) -> bool {
        self.session.as_ref().is_some_and(PlaybackSession::is_paused)
    }

    pub fn progress(&self) -> Option<Progress> {
        self.session.as_ref().map(PlaybackSession::progress)
    }

    pub fn master_volume(&self) -> f32 {
        self.output.master_gain()
    }

    /// Set the process-wide master gain, clamped to `[0, 1]`.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.output.set_master_gain(volume);
        self.config.master_gain = self.output.master_gain();
    }
}
