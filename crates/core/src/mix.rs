use stemplay_decode::{BufferStore, StemBuffer};
use stemplay_engine::ChainSource;
use stemplay_transport::Stem;
use tracing::debug;

use crate::error::PlaybackError;

/// Reject a buffer produced for a different session than `store`'s.
pub fn ensure_current(store: &BufferStore, buffer: &StemBuffer) -> Result<(), PlaybackError> {
    if store.accepts(buffer) {
        return Ok(());
    }
    Err(PlaybackError::StaleBuffer {
        stem: buffer.stem.clone(),
        loaded: buffer.session,
        current: store.session(),
    })
}

/// The chain sources for stages `0..=up_to_stage`, in stage order.
///
/// Stems that have not resolved yet are loaded here, one after another, so a
/// stage never plays with a chain missing.
pub async fn resolve_sources(
    store: &BufferStore,
    stems: &[Stem],
    up_to_stage: usize,
) -> Result<Vec<ChainSource>, PlaybackError> {
    let needed = stems
        .get(..=up_to_stage)
        .ok_or(PlaybackError::StageOutOfRange {
            stage: up_to_stage,
            stems: stems.len(),
        })?;

    let mut sources = Vec::with_capacity(needed.len());
    for stem in needed {
        if !store.is_resolved(&stem.name) {
            debug!(stem = %stem.name, "stem not ready, loading before building the mix");
        }
        let loaded = store.load(stem).await;
        ensure_current(store, &loaded)?;
        sources.push(ChainSource {
            stem: loaded.stem.clone(),
            fallback: loaded.outcome.is_fallback(),
            buffer: loaded.buffer().clone(),
        });
    }
    Ok(sources)
}
