use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use stemplay_core::{CurrentSongResponse, FileFetcher, SongStems, StemCatalog, StemFetcher};
use tracing::debug;

const USER_AGENT: &str = concat!("stemplay/", env!("CARGO_PKG_VERSION"));

pub fn client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()
        .context("building HTTP client")
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// The game server's view of a session's current song.
pub struct HttpCatalog {
    client: reqwest::Client,
    server: String,
}

impl HttpCatalog {
    pub fn new(client: reqwest::Client, server: impl Into<String>) -> Self {
        let server = server.into().trim_end_matches('/').to_string();
        Self { client, server }
    }

    fn song_url(&self, session: &str) -> String {
        format!("{}/api/current-song/{}", self.server, session)
    }
}

#[async_trait]
impl StemCatalog for HttpCatalog {
    async fn fetch_stem_list(&self, song_id: &str) -> anyhow::Result<SongStems> {
        let url = self.song_url(song_id);
        debug!(url = %url, "requesting current song");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("reading reply from {url}"))?;

        // the server wraps errors in the same envelope, so try it first
        match serde_json::from_str::<CurrentSongResponse>(&body) {
            Ok(reply) => reply.into_song(),
            Err(_) if !status.is_success() => anyhow::bail!("{url} returned {status}"),
            Err(err) => Err(anyhow::Error::new(err).context(format!("parsing reply from {url}"))),
        }
    }
}

/// Fetches stems over HTTP, or from disk when the source is not a URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    files: FileFetcher,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            files: FileFetcher::new(),
        }
    }
}

#[async_trait]
impl StemFetcher for HttpFetcher {
    async fn fetch(&self, source: &str) -> anyhow::Result<Vec<u8>> {
        if !is_remote(source) {
            return self.files.fetch(source).await;
        }

        let response = self
            .client
            .get(source)
            .send()
            .await
            .with_context(|| format!("requesting {source}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{source} returned {status}");
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("downloading {source}"))?;
        debug!(source, bytes = bytes.len(), "downloaded stem");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_url_trims_trailing_slash() {
        let catalog = HttpCatalog::new(reqwest::Client::new(), "http://localhost:5000/");
        assert_eq!(
            catalog.song_url("abc123"),
            "http://localhost:5000/api/current-song/abc123"
        );
    }

    #[test]
    fn test_remote_sources() {
        assert!(is_remote("https://raw.githubusercontent.com/x/0.flac"));
        assert!(is_remote("http://localhost/0.flac"));
        assert!(!is_remote("file:///tmp/0.flac"));
        assert!(!is_remote("songs/0.flac"));
    }

    #[tokio::test]
    async fn test_local_source_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.flac");
        std::fs::write(&path, b"not really flac").unwrap();

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let bytes = fetcher.fetch(path.to_str().unwrap()).await.unwrap();

        assert_eq!(bytes, b"not really flac");
    }
}
