use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

mod format;
mod stem;

pub use format::BufferFormat;
pub use stem::{SessionId, Stem};

/// Shared, immutable decoded stem audio.
///
/// `AudioArc` keeps the interleaved samples in an `Arc<[f32]>` so the Buffer Store,
/// every graph built from it and the real-time mixer can all hold the same data
/// without copying. Cloning only bumps the reference count.
///
/// # Memory Layout
///
/// ```text
/// AudioArc (24 bytes on stack)
/// ├─ samples: Arc<[f32]> (16 bytes) ────> Heap: [f32; N]
/// ├─ sample_rate: u32 (4 bytes)
/// └─ channels: u16 (2 bytes)
/// ```
///
/// # Examples
///
/// ```
/// use stemplay_transport::AudioArc;
///
/// let audio = AudioArc::new(vec![0.0, 0.5, 1.0, 0.5], 44100, 2);
/// let shared = audio.clone();
/// assert_eq!(shared.frames(), 2);
/// assert_eq!(audio.samples()[2], 1.0);
/// ```
#[derive(Clone)]
pub struct AudioArc {
    /// Interleaved samples, `[L, R, L, R, ...]` for stereo.
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioArc {
    /// Create a new `AudioArc` from owned interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    /// A buffer of pure silence shaped exactly like `format`.
    ///
    /// This is what the Buffer Store substitutes when a stem cannot be fetched or
    /// decoded, so the mixer never has to special-case a missing stem.
    pub fn silent(format: &BufferFormat) -> Self {
        let len = format.frames() * format.channels as usize;
        Self::new(vec![0.0; len], format.sample_rate, format.channels)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// The inner `Arc<[f32]>`, mostly useful for checking sharing.
    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Iterate over one channel's samples.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is >= `self.channels()`.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        assert!(
            channel < self.channels as usize,
            "channel index out of bounds"
        );
        let channels = self.channels as usize;
        (0..self.frames()).map(move |frame| self.samples[frame * channels + channel])
    }

    /// Whether this buffer already has the exact shape of `format`.
    pub fn matches(&self, format: &BufferFormat) -> bool {
        self.sample_rate == format.sample_rate
            && self.channels == format.channels
            && self.frames() == format.frames()
    }

    /// Resample to `target_sample_rate`; a cheap clone when the rate already matches.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }

        resample_audio_arc(self, target_sample_rate)
    }

    /// Conform decoded audio to the fixed stem shape used for mixing.
    ///
    /// Resamples to the format's rate, maps channels by `out % source_channels`
    /// (mono is duplicated, extra channels are dropped) and truncates or
    /// zero-pads to exactly `format.frames()`.
    pub fn conform(&self, format: &BufferFormat) -> anyhow::Result<Self> {
        if self.matches(format) {
            return Ok(self.clone());
        }

        let resampled = self.resample(format.sample_rate)?;
        let source_channels = resampled.channels as usize;
        let target_channels = format.channels as usize;
        let target_frames = format.frames();
        let available = resampled.frames().min(target_frames);

        let mut samples = vec![0.0f32; target_frames * target_channels];
        let source = resampled.samples();
        for frame in 0..available {
            for ch in 0..target_channels {
                samples[frame * target_channels + ch] =
                    source[frame * source_channels + ch % source_channels];
            }
        }

        Ok(Self::new(samples, format.sample_rate, format.channels))
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

/// Resample an `AudioArc` with sinc interpolation.
///
/// Returns a cheap clone if the audio is already at the target rate.
///
/// ```
/// use stemplay_transport::{AudioArc, resample_audio_arc};
///
/// let audio = AudioArc::new(vec![0.0; 44100], 44100, 1);
/// let resampled = resample_audio_arc(&audio, 48000).unwrap();
/// assert_eq!(resampled.sample_rate(), 48000);
/// ```
pub fn resample_audio_arc(audio: &AudioArc, target_sample_rate: u32) -> anyhow::Result<AudioArc> {
    if audio.sample_rate == target_sample_rate {
        return Ok(audio.clone());
    }

    let channels = audio.channels as usize;
    let input_frames = audio.frames();
    if input_frames == 0 {
        return Ok(AudioArc::new(Vec::new(), target_sample_rate, audio.channels));
    }

    let resample_ratio = target_sample_rate as f64 / audio.sample_rate as f64;
    let output_frames = (input_frames as f64 * resample_ratio).ceil() as usize;

    // rubato works on planar channels
    let mut input_channels = vec![Vec::with_capacity(input_frames); channels];
    for frame in audio.samples().chunks_exact(channels) {
        for (ch, sample) in frame.iter().enumerate() {
            input_channels[ch].push(*sample);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, channels)?;
    let mut output_channels = resampler.process(&input_channels, None)?;
    // flush the filter tail so the delayed output still covers the whole input
    let tail = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
    for (channel, rest) in output_channels.iter_mut().zip(tail) {
        channel.extend(rest);
    }

    // the sinc filter delays its output; drop that lead-in so stems stay aligned
    let delay = resampler.output_delay();
    let available = output_channels[0].len().saturating_sub(delay);
    let kept = output_frames.min(available);

    let mut output_samples = Vec::with_capacity(kept * channels);
    for frame_idx in delay..delay + kept {
        for channel in &output_channels {
            output_samples.push(channel[frame_idx]);
        }
    }

    Ok(AudioArc::new(
        output_samples,
        target_sample_rate,
        audio.channels,
    ))
}

#[cfg(test)]
mod audio_arc_tests {
    use super::*;
    use std::f32::consts::PI;

    fn generate_sine_wave(
        frequency: f32,
        sample_rate: u32,
        duration_secs: f32,
        channels: u16,
    ) -> AudioArc {
        let num_frames = (sample_rate as f32 * duration_secs) as usize;
        let mut samples = Vec::with_capacity(num_frames * channels as usize);

        for i in 0..num_frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (2.0 * PI * frequency * t).sin();
            for _ in 0..channels {
                samples.push(sample);
            }
        }

        AudioArc::new(samples, sample_rate, channels)
    }

    #[test]
    fn test_audio_arc_new() {
        let audio = AudioArc::new(vec![0.0, 0.1, 0.2, 0.3], 44100, 2);

        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 2);
        assert_eq!(audio.len(), 4);
        assert!(!audio.is_empty());
    }

    #[test]
    #[should_panic(expected = "channels must be greater than 0")]
    fn test_audio_arc_zero_channels() {
        AudioArc::new(vec![0.0], 44100, 0);
    }

    #[test]
    #[should_panic(expected = "samples.len() must be divisible by channels")]
    fn test_audio_arc_invalid_length() {
        AudioArc::new(vec![0.0, 0.1, 0.2], 44100, 2);
    }

    #[test]
    fn test_audio_arc_clone_shares_samples() {
        let audio = AudioArc::new(vec![0.0; 1000], 44100, 2);
        let audio2 = audio.clone();

        assert_eq!(Arc::strong_count(audio.samples_arc()), 2);
        assert_eq!(audio2.samples().len(), 1000);
    }

    #[test]
    fn test_audio_arc_channel_iterator() {
        let audio = AudioArc::new(vec![0.0, 1.0, 0.5, 1.5, 0.25, 1.25], 44100, 2);

        let left: Vec<f32> = audio.channel(0).collect();
        let right: Vec<f32> = audio.channel(1).collect();
        assert_eq!(left, vec![0.0, 0.5, 0.25]);
        assert_eq!(right, vec![1.0, 1.5, 1.25]);
    }

    #[test]
    fn test_silent_matches_format() {
        let format = BufferFormat::new(8000, 2, 1.5);
        let silent = AudioArc::silent(&format);

        assert!(silent.matches(&format));
        assert_eq!(silent.frames(), 12000);
        assert!(silent.samples().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_conform_pads_short_audio_with_silence() {
        let format = BufferFormat::new(8000, 2, 1.0);
        let audio = AudioArc::new(vec![0.5; 4000 * 2], 8000, 2);

        let conformed = audio.conform(&format).unwrap();

        assert!(conformed.matches(&format));
        assert_eq!(conformed.samples()[0], 0.5);
        assert_eq!(conformed.samples()[3999 * 2 + 1], 0.5);
        assert_eq!(conformed.samples()[4000 * 2], 0.0);
    }

    #[test]
    fn test_conform_truncates_long_audio() {
        let format = BufferFormat::new(8000, 1, 0.5);
        let audio = AudioArc::new(vec![0.25; 8000 * 3], 8000, 1);

        let conformed = audio.conform(&format).unwrap();

        assert_eq!(conformed.frames(), 4000);
        assert_eq!(conformed.channels(), 1);
    }

    #[test]
    fn test_conform_duplicates_mono_into_stereo() {
        let format = BufferFormat::new(8000, 2, 0.001);
        let frames = format.frames();
        let audio = AudioArc::new((0..frames).map(|i| i as f32).collect(), 8000, 1);

        let conformed = audio.conform(&format).unwrap();

        let left: Vec<f32> = conformed.channel(0).collect();
        let right: Vec<f32> = conformed.channel(1).collect();
        assert_eq!(left, right);
        assert_eq!(left[frames - 1], (frames - 1) as f32);
    }

    #[test]
    fn test_conform_already_matching_is_shared() {
        let format = BufferFormat::new(8000, 2, 0.5);
        let audio = AudioArc::silent(&format);

        let conformed = audio.conform(&format).unwrap();

        assert_eq!(Arc::strong_count(audio.samples_arc()), 2);
        assert!(conformed.matches(&format));
    }

    #[test]
    fn test_conform_resamples_to_format_rate() {
        let format = BufferFormat::new(48000, 2, 0.1);
        let audio = generate_sine_wave(440.0, 44100, 0.2, 2);

        let conformed = audio.conform(&format).unwrap();

        assert!(conformed.matches(&format));
        assert_eq!(conformed.sample_rate(), 48000);
    }

    #[test]
    fn test_resample_same_rate_is_cheap_clone() {
        let audio = generate_sine_wave(440.0, 44100, 0.1, 2);
        let resampled = audio.resample(44100).unwrap();

        assert_eq!(resampled.len(), audio.len());
        assert_eq!(Arc::strong_count(audio.samples_arc()), 2);
    }

    #[test]
    fn test_resample_upsampling_frame_count() {
        let audio = generate_sine_wave(440.0, 44100, 0.1, 2);
        let original_frames = audio.frames();

        let resampled = audio.resample(48000).unwrap();

        let expected_frames = (original_frames as f64 * 48000.0 / 44100.0) as usize;
        let tolerance = (expected_frames as f64 * 0.03) as i64;
        let diff = (resampled.frames() as i64 - expected_frames as i64).abs();
        assert_eq!(resampled.sample_rate(), 48000);
        assert!(
            diff <= tolerance,
            "expected ~{expected_frames} frames, got {}",
            resampled.frames()
        );
    }

    #[test]
    fn test_resample_keeps_timing_aligned() {
        let mut samples = vec![0.0f32; 4410];
        samples[441] = 1.0;
        let audio = AudioArc::new(samples, 44100, 1);

        let resampled = audio.resample(48000).unwrap();

        let peak = resampled
            .samples()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(frame, _)| frame)
            .unwrap();
        assert!(
            (peak as i64 - 480).abs() <= 2,
            "impulse moved to frame {peak}"
        );
        assert!((4800..=4801).contains(&resampled.frames()));
    }

    #[test]
    fn test_resample_empty_audio() {
        let audio = AudioArc::new(Vec::new(), 44100, 2);
        let resampled = audio.resample(48000).unwrap();

        assert!(resampled.is_empty());
        assert_eq!(resampled.sample_rate(), 48000);
    }

    #[test]
    fn test_audio_arc_debug_format() {
        let audio = AudioArc::new(vec![0.0; 44100], 44100, 1);
        let debug_str = format!("{:?}", audio);

        assert!(debug_str.contains("AudioArc"));
        assert!(debug_str.contains("duration_secs"));
    }
}
