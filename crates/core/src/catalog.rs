use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stemplay_transport::Stem;
use tracing::debug;

const AUDIO_EXTENSIONS: &[&str] = &["flac", "wav", "mp3", "ogg"];

/// Stems marked quiet are alternate mixes and never part of a stage.
const QUIET_MARKER: &str = "_Quiet";

/// Where a song's stem list comes from.
#[async_trait]
pub trait StemCatalog: Send + Sync {
    async fn fetch_stem_list(&self, song_id: &str) -> anyhow::Result<SongStems>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemEntry {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub stage: u32,
}

impl StemEntry {
    pub fn to_stem(&self) -> Stem {
        Stem::new(self.name.clone(), self.url.clone())
    }
}

/// A song's stems in reveal order plus the game's view of its stages.
#[derive(Debug, Clone, PartialEq)]
pub struct SongStems {
    pub song_name: String,
    pub stems: Vec<StemEntry>,
    pub current_stage: usize,
    pub total_stages: usize,
}

impl SongStems {
    /// Sorts `stems` by stage, then name. `total_stages` defaults to the stem count.
    pub fn new(
        song_name: impl Into<String>,
        mut stems: Vec<StemEntry>,
        current_stage: usize,
        total_stages: Option<usize>,
    ) -> Self {
        stems.sort_by(|a, b| a.stage.cmp(&b.stage).then_with(|| a.name.cmp(&b.name)));
        let total_stages = total_stages.unwrap_or(stems.len());
        Self {
            song_name: song_name.into(),
            stems,
            current_stage,
            total_stages,
        }
    }

    pub fn stems(&self) -> Vec<Stem> {
        self.stems.iter().map(StemEntry::to_stem).collect()
    }
}

/// The game server's `current-song` reply.
#[derive(Debug, Deserialize)]
pub struct CurrentSongResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub song_name: Option<String>,
    #[serde(default)]
    pub stems: Vec<StemEntry>,
    #[serde(default)]
    pub current_stage: usize,
    #[serde(default)]
    pub total_stages: Option<usize>,
}

impl CurrentSongResponse {
    pub fn into_song(self) -> anyhow::Result<SongStems> {
        if !self.success {
            anyhow::bail!(
                "server refused the request: {}",
                self.error.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(SongStems::new(
            self.song_name.unwrap_or_default(),
            self.stems,
            self.current_stage,
            self.total_stages,
        ))
    }
}

/// Stage of a stem named after its stage number; anything else is stage 0.
pub fn stage_from_name(name: &str) -> u32 {
    name.parse().unwrap_or(0)
}

/// Songs stored as one directory of stem files each, under `root`.
pub struct DirCatalog {
    root: PathBuf,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn song_dir(&self, song_id: &str) -> PathBuf {
        if song_id.is_empty() {
            self.root.clone()
        } else {
            self.root.join(song_id)
        }
    }
}

fn is_stem_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let audio = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        });
    audio && !name.contains(QUIET_MARKER)
}

#[async_trait]
impl StemCatalog for DirCatalog {
    async fn fetch_stem_list(&self, song_id: &str) -> anyhow::Result<SongStems> {
        let dir = self.song_dir(song_id);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("listing {}", dir.display()))?;

        let mut stems = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_stem_file(&path) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            stems.push(StemEntry {
                name: name.to_string(),
                stage: stage_from_name(name),
                url: path.to_string_lossy().into_owned(),
            });
        }

        if stems.is_empty() {
            anyhow::bail!("no stems found in {}", dir.display());
        }

        let song_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| song_id.to_string());
        debug!(song = %song_name, stems = stems.len(), "listed song directory");
        Ok(SongStems::new(song_name, stems, 0, None))
    }
}
