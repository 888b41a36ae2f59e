/// The fixed shape every stem buffer is conformed to before mixing.
///
/// All stems of a song share one format, so starting every source at the same
/// frame with the same offset keeps them sample-aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Length of every stem buffer, which is also the length of one stage.
    pub duration_secs: f64,
}

impl BufferFormat {
    pub const DEFAULT_DURATION_SECS: f64 = 30.0;
    pub const DEFAULT_CHANNELS: u16 = 2;

    pub fn new(sample_rate: u32, channels: u16, duration_secs: f64) -> Self {
        Self {
            sample_rate,
            channels,
            duration_secs: duration_secs.max(0.0),
        }
    }

    /// Stereo, 30 second buffers at the given output rate.
    pub fn stereo(sample_rate: u32) -> Self {
        Self::new(
            sample_rate,
            Self::DEFAULT_CHANNELS,
            Self::DEFAULT_DURATION_SECS,
        )
    }

    pub fn frames(&self) -> usize {
        (self.duration_secs * self.sample_rate as f64).round() as usize
    }

    /// Convert a position in seconds to a frame index, clamped to the buffer.
    pub fn seconds_to_frames(&self, seconds: f64) -> usize {
        if !(seconds > 0.0) {
            return 0;
        }
        ((seconds * self.sample_rate as f64).round() as usize).min(self.frames())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stereo_format() {
        let format = BufferFormat::stereo(44100);
        assert_eq!(format.channels, 2);
        assert_eq!(format.duration_secs, 30.0);
        assert_eq!(format.frames(), 1_323_000);
    }

    #[test]
    fn test_seconds_to_frames_clamps() {
        let format = BufferFormat::new(8000, 2, 2.0);
        assert_eq!(format.seconds_to_frames(-1.0), 0);
        assert_eq!(format.seconds_to_frames(f64::NAN), 0);
        assert_eq!(format.seconds_to_frames(0.5), 4000);
        assert_eq!(format.seconds_to_frames(10.0), 16000);
    }

    #[test]
    fn test_negative_duration_is_empty() {
        let format = BufferFormat::new(8000, 2, -3.0);
        assert_eq!(format.frames(), 0);
    }
}
