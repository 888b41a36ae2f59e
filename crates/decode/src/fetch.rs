use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;

/// Retrieves the encoded bytes of a stem from wherever its source points.
#[async_trait]
pub trait StemFetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> anyhow::Result<Vec<u8>>;
}

/// Reads stems from the local filesystem. Accepts plain paths and `file://` URIs.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher;

impl FileFetcher {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, source: &str) -> PathBuf {
        PathBuf::from(source.strip_prefix("file://").unwrap_or(source))
    }
}

#[async_trait]
impl StemFetcher for FileFetcher {
    async fn fetch(&self, source: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(source);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }
}
