use crate::transport::PlaybackState;

/// Render seconds as `m:ss`, the way the game's progress bar shows time.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() {
        seconds.max(0.0).floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Snapshot of a session for the UI's progress poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Zero-based stage index.
    pub stage: usize,
    pub total_stages: usize,
    pub elapsed: f64,
    pub duration: f64,
    pub state: PlaybackState,
    pub stems_ready: usize,
}

impl Progress {
    /// Elapsed share of the stage, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.duration <= 0.0 {
            return 0.0;
        }
        (self.elapsed / self.duration).clamp(0.0, 1.0)
    }

    pub fn is_final_stage(&self) -> bool {
        self.stage + 1 >= self.total_stages
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stage {} of {}  {} / {}",
            self.stage + 1,
            self.total_stages,
            format_clock(self.elapsed),
            format_clock(self.duration)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(elapsed: f64) -> Progress {
        Progress {
            stage: 1,
            total_stages: 6,
            elapsed,
            duration: 30.0,
            state: PlaybackState::Playing,
            stems_ready: 2,
        }
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "0:00");
        assert_eq!(format_clock(5.9), "0:05");
        assert_eq!(format_clock(30.0), "0:30");
        assert_eq!(format_clock(125.0), "2:05");
        assert_eq!(format_clock(-3.0), "0:00");
        assert_eq!(format_clock(f64::NAN), "0:00");
    }

    #[test]
    fn test_progress_display() {
        assert_eq!(progress(5.2).to_string(), "Stage 2 of 6  0:05 / 0:30");
    }

    #[test]
    fn test_fraction_is_clamped() {
        assert_eq!(progress(15.0).fraction(), 0.5);
        assert_eq!(progress(45.0).fraction(), 1.0);

        let empty = Progress {
            duration: 0.0,
            ..progress(1.0)
        };
        assert_eq!(empty.fraction(), 0.0);
    }

    #[test]
    fn test_final_stage() {
        assert!(!progress(0.0).is_final_stage());
        let last = Progress {
            stage: 5,
            ..progress(0.0)
        };
        assert!(last.is_final_stage());
    }
}
