use std::path::PathBuf;

use stemplay_engine::{GraphError, OutputError};
use stemplay_transport::SessionId;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// The sink could not start, e.g. it is waiting for a user gesture.
    #[error("audio output unavailable: {0}")]
    Output(#[source] OutputError),

    #[error("could not build the stage mix: {0}")]
    Graph(#[source] GraphError),

    #[error("stem '{stem}' belongs to {loaded}, not the current {current}")]
    StaleBuffer {
        stem: String,
        loaded: SessionId,
        current: SessionId,
    },

    #[error("stage {stage} is out of range, the song has {stems} stems")]
    StageOutOfRange { stage: usize, stems: usize },
}

impl From<OutputError> for PlaybackError {
    fn from(err: OutputError) -> Self {
        PlaybackError::Output(err)
    }
}

impl From<GraphError> for PlaybackError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Output(err) => PlaybackError::Output(err),
            other => PlaybackError::Graph(other),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config directory on this platform")]
    NoConfigDir,

    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("serializing config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("writing {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
