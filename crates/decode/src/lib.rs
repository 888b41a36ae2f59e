use std::io::Cursor;
use std::path::Path;

use stemplay_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

mod fetch;
mod store;

pub use fetch::{FileFetcher, StemFetcher};
pub use store::{BackgroundLoads, BufferStore, LoadOutcome, StemBuffer};

/// Decode an encoded stem held in memory.
///
/// `extension` is only a probe hint; the container is still sniffed from the bytes.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> anyhow::Result<AudioArc> {
    decode_source(Box::new(Cursor::new(bytes)), extension)
}

pub fn decode_file(path: &Path) -> anyhow::Result<AudioArc> {
    let file = std::fs::File::open(path)?;
    decode_source(Box::new(file), path.extension().and_then(|e| e.to_str()))
}

fn decode_source(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
) -> anyhow::Result<AudioArc> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default track"))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow::anyhow!("stream has no sample rate"))?;
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) as u16;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(reason, "skipping corrupt packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let spec = *decoded.spec();
        channels = spec.channels.count() as u16;

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if channels == 0 {
        anyhow::bail!("stream reports zero channels");
    }

    Ok(AudioArc::new(samples, sample_rate, channels))
}

#[cfg(test)]
pub(crate) mod test_audio {
    /// 16-bit PCM WAV bytes holding `frames` frames of a constant value.
    pub fn wav_bytes(frames: usize, sample_rate: u32, channels: u16, value: f32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let sample = (value * i16::MAX as f32) as i16;
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).expect("wav writer");
            for _ in 0..frames * channels as usize {
                writer.write_sample(sample).expect("write sample");
            }
            writer.finalize().expect("finalize wav");
        }
        cursor.into_inner()
    }
}
