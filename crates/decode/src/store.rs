use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use stemplay_transport::{AudioArc, BufferFormat, SessionId, Stem};
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{StemFetcher, decode_bytes};

/// How a stem's buffer came to be.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Fetched and decoded.
    Resolved(AudioArc),
    /// Fetch or decode failed; silence of the same shape stands in.
    Fallback { buffer: AudioArc, reason: String },
}

impl LoadOutcome {
    pub fn buffer(&self) -> &AudioArc {
        match self {
            LoadOutcome::Resolved(buffer) => buffer,
            LoadOutcome::Fallback { buffer, .. } => buffer,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, LoadOutcome::Fallback { .. })
    }
}

/// A stem's buffer tagged with the session that produced it.
#[derive(Debug, Clone)]
pub struct StemBuffer {
    pub session: SessionId,
    pub stem: String,
    pub outcome: LoadOutcome,
}

impl StemBuffer {
    pub fn buffer(&self) -> &AudioArc {
        self.outcome.buffer()
    }
}

/// Decodes and caches stem audio for one song.
///
/// Every stem resolves to exactly one buffer shaped like `format`. Failures never
/// escape: they become [`LoadOutcome::Fallback`] silence. Concurrent requests for
/// the same stem share one fetch.
pub struct BufferStore {
    session: SessionId,
    format: BufferFormat,
    fetcher: Arc<dyn StemFetcher>,
    slots: Mutex<HashMap<String, Arc<OnceCell<StemBuffer>>>>,
}

impl BufferStore {
    pub fn new(session: SessionId, format: BufferFormat, fetcher: Arc<dyn StemFetcher>) -> Self {
        Self {
            session,
            format,
            fetcher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn format(&self) -> BufferFormat {
        self.format
    }

    /// Whether a loaded buffer belongs to this store's session.
    pub fn accepts(&self, buffer: &StemBuffer) -> bool {
        buffer.session == self.session
    }

    fn slot(&self, name: &str) -> Arc<OnceCell<StemBuffer>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(name.to_string()).or_default().clone()
    }

    /// Load a stem, or return the cached buffer if it already resolved.
    pub async fn load(&self, stem: &Stem) -> StemBuffer {
        let slot = self.slot(&stem.name);
        slot.get_or_init(|| self.fetch_and_decode(stem)).await.clone()
    }

    /// The cached buffer for `name`, if its load has finished.
    pub fn get(&self, name: &str) -> Option<StemBuffer> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(name).and_then(|slot| slot.get().cloned())
    }

    pub fn is_resolved(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn resolved_count(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|slot| slot.initialized()).count()
    }

    /// Load the first stem now and the rest in the background.
    ///
    /// Returns once `stems[0]` is resolved. The remaining loads run as detached
    /// tasks in no particular order; dropping the returned handle does not cancel them.
    pub async fn load_all(self: &Arc<Self>, stems: &[Stem]) -> BackgroundLoads {
        let Some((first, rest)) = stems.split_first() else {
            return BackgroundLoads::default();
        };

        let first = self.load(first).await;
        debug!(session = %self.session, stem = %first.stem, "first stem ready");

        let tasks = rest
            .iter()
            .cloned()
            .map(|stem| {
                let store = Arc::clone(self);
                tokio::spawn(async move { store.load(&stem).await })
            })
            .collect();

        BackgroundLoads { tasks }
    }

    async fn fetch_and_decode(&self, stem: &Stem) -> StemBuffer {
        let outcome = match self.try_load(stem).await {
            Ok(buffer) => {
                debug!(session = %self.session, stem = %stem.name, "loaded stem");
                LoadOutcome::Resolved(buffer)
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(
                    session = %self.session,
                    stem = %stem.name,
                    error = %reason,
                    "failed to load stem, substituting silence"
                );
                LoadOutcome::Fallback {
                    buffer: AudioArc::silent(&self.format),
                    reason,
                }
            }
        };

        StemBuffer {
            session: self.session,
            stem: stem.name.clone(),
            outcome,
        }
    }

    async fn try_load(&self, stem: &Stem) -> anyhow::Result<AudioArc> {
        let bytes = self
            .fetcher
            .fetch(&stem.source)
            .await
            .with_context(|| format!("fetching stem '{}'", stem.name))?;

        let extension = stem.extension().map(str::to_owned);
        let format = self.format;
        tokio::task::spawn_blocking(move || {
            let decoded = decode_bytes(bytes, extension.as_deref())?;
            decoded.conform(&format)
        })
        .await
        .context("decode task panicked")?
        .with_context(|| format!("decoding stem '{}'", stem.name))
    }
}

/// Handles to the background loads started by [`BufferStore::load_all`].
#[derive(Default)]
pub struct BackgroundLoads {
    tasks: Vec<JoinHandle<StemBuffer>>,
}

impl BackgroundLoads {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every background load, in spawn order.
    pub async fn wait(self) -> Vec<StemBuffer> {
        let mut buffers = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.await {
                Ok(buffer) => buffers.push(buffer),
                Err(err) => warn!(error = %err, "background stem load did not finish"),
            }
        }
        buffers
    }

    /// Forward each finished buffer to `tx` as it completes.
    ///
    /// The receiver is expected to check the session tag before using a buffer.
    pub fn forward(self, tx: mpsc::UnboundedSender<StemBuffer>) {
        for task in self.tasks {
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Ok(buffer) = task.await {
                    let _ = tx.send(buffer);
                }
            });
        }
    }
}
