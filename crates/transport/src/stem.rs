use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// One isolated instrument or vocal track of a song.
///
/// Identity is the name; it is unique within a song.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stem {
    pub name: String,
    /// Where the encoded audio lives: a URL, a `file://` URI or a plain path.
    #[serde(alias = "url")]
    pub source: String,
}

impl Stem {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// File extension of the source, used as a decoder hint.
    pub fn extension(&self) -> Option<&str> {
        let path = self.source.split(['?', '#']).next().unwrap_or_default();
        let file = path.rsplit('/').next().unwrap_or(path);
        file.rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

/// Tag identifying one song load.
///
/// Every buffer produced for a session carries its id, so results that arrive
/// after the song changed can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}
