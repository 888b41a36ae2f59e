use std::str::FromStr;

use stemplay_core::{PlaybackError, StageAdvance, StageDirector};

pub const HELP: &str = "\
commands:
  p           play / pause
  s           skip to the next stage
  r           rewind
  seek F      jump to fraction F of the stage (0..1)
  stage N     expose stages 1..=N
  vol V       master volume (0..1)
  stop        stop playback
  h           show this help
  q           quit";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    PlayPause,
    Skip,
    Rewind,
    Seek(f64),
    /// Zero-based stage index.
    Stage(usize),
    Volume(f32),
    Stop,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default();
        let arg = words.next();

        let command = match (name, arg) {
            ("p" | "play" | "pause", None) => Command::PlayPause,
            ("s" | "skip", None) => Command::Skip,
            ("r" | "rewind", None) => Command::Rewind,
            ("stop", None) => Command::Stop,
            ("h" | "help" | "?", None) => Command::Help,
            ("q" | "quit", None) => Command::Quit,
            ("seek", Some(arg)) => Command::Seek(parse_number(arg)?),
            ("vol" | "volume", Some(arg)) => Command::Volume(parse_number(arg)?),
            ("stage", Some(arg)) => match parse_number::<usize>(arg)? {
                0 => return Err("stages are numbered from 1".to_string()),
                n => Command::Stage(n - 1),
            },
            _ => return Err(format!("unknown command '{}', try h", line.trim())),
        };

        if words.next().is_some() {
            return Err(format!("too many arguments in '{}'", line.trim()));
        }
        Ok(command)
    }
}

fn parse_number<T: FromStr>(arg: &str) -> Result<T, String> {
    arg.parse().map_err(|_| format!("'{arg}' is not a number"))
}

impl Command {
    /// Run the command against `director`. `song_name` is revealed on the final stage.
    pub async fn apply(
        self,
        director: &mut StageDirector,
        song_name: &str,
    ) -> Result<(), PlaybackError> {
        match self {
            Command::PlayPause => {
                if director.is_playing() {
                    director.pause();
                } else if director.is_paused() {
                    director.resume().await?;
                } else {
                    director.play_current().await?;
                }
            }
            Command::Skip => match director.advance_stage()? {
                Some(StageAdvance::Next(stage)) => println!("stage {} unlocked", stage + 1),
                Some(StageAdvance::Final) => println!("no stages left, the song was: {song_name}"),
                None => {}
            },
            Command::Rewind => director.rewind_step().await?,
            Command::Seek(fraction) => director.seek(fraction).await?,
            Command::Stage(stage) => director.set_stage(stage)?,
            Command::Volume(volume) => director.set_master_volume(volume),
            Command::Stop => director.stop(),
            Command::Help => println!("{HELP}"),
            Command::Quit => {}
        }
        Ok(())
    }
}
