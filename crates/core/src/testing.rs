//! Fixtures shared by the core tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use stemplay_decode::StemFetcher;
use stemplay_engine::OfflineOutput;
use stemplay_transport::BufferFormat;

use crate::config::Config;

pub const RATE: u32 = 8000;
pub const DURATION: f64 = 0.5;

pub fn format() -> BufferFormat {
    BufferFormat::new(RATE, 2, DURATION)
}

pub fn config() -> Config {
    Config {
        stage_duration_secs: DURATION,
        ..Config::default()
    }
}

pub fn output() -> Rc<OfflineOutput> {
    Rc::new(OfflineOutput::new(RATE, 2))
}

/// A stereo 16-bit WAV at [`RATE`] holding `value` for the whole stage.
pub fn wav(value: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let sample = (value * i16::MAX as f32) as i16;
        for _ in 0..(RATE as f64 * DURATION) as usize * 2 {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Serves stems from memory and counts fetches. Unknown sources fail like a 404.
#[derive(Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    pub fn with(mut self, source: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(source.to_string(), bytes);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// `count` stems named `0..count`, served as `<i>.wav`.
    pub fn song(count: usize) -> Arc<Self> {
        let fetcher = (0..count).fold(Self::default(), |fetcher, i| {
            fetcher.with(&format!("{i}.wav"), wav(0.1))
        });
        Arc::new(fetcher)
    }
}

#[async_trait]
impl StemFetcher for MemoryFetcher {
    async fn fetch(&self, source: &str) -> anyhow::Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.files
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 for {source}"))
    }
}

pub fn stems(count: usize) -> Vec<stemplay_transport::Stem> {
    (0..count)
        .map(|i| stemplay_transport::Stem::new(i.to_string(), format!("{i}.wav")))
        .collect()
}
