pub mod catalog;
pub mod config;
pub mod director;
pub mod error;
pub mod mix;
pub mod session;
pub mod time;
pub mod transport;

#[cfg(test)]
mod testing;

pub use catalog::{CurrentSongResponse, DirCatalog, SongStems, StemCatalog, StemEntry};
pub use config::Config;
pub use director::{LoadedSong, StageAdvance, StageDirector};
pub use error::{ConfigError, PlaybackError};
pub use session::PlaybackSession;
pub use time::{Progress, format_clock};
pub use transport::{PlaybackState, Transport, TransportEvent};

pub use stemplay_decode::{
    BackgroundLoads, BufferStore, FileFetcher, LoadOutcome, StemBuffer, StemFetcher,
};
pub use stemplay_engine::{AudioOutput, CpalOutput, OfflineOutput, OutputError};
pub use stemplay_transport::{AudioArc, BufferFormat, SessionId, Stem};
