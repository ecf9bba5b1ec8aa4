use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build version with format info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Formats: png jpeg tiff tga exr hdr (image crate)\n",
    "Target:  ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Image sequence reader and frame cache
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging to file (default: seqcache.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Parse a frame sequence (`1-10,20`) or sequence file name (`render.0001-0010.exr`)
    Parse {
        #[arg(value_name = "SEQ")]
        sequence: String,
    },

    /// Open a file or sequence and print its info as JSON
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Headless playback: decode through the session and report dropped frames
    Play(PlayArgs),
}

#[derive(clap::Args, Debug)]
pub struct PlayArgs {
    /// File or any frame of a sequence
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Playback rate (default: from the file)
    #[arg(long = "fps", value_name = "FPS")]
    pub fps: Option<f32>,

    /// Number of ticks to simulate (default: one pass over the range)
    #[arg(short = 'n', long = "frames", value_name = "N")]
    pub frames: Option<usize>,

    /// Play backwards
    #[arg(short = 'r', long = "reverse")]
    pub reverse: bool,

    /// Loop within the play range
    #[arg(short = 'o', long = "loop")]
    pub loop_playback: bool,

    /// Cache budget in MB (default: from settings and available memory)
    #[arg(long = "cache-mb", value_name = "MB")]
    pub cache_mb: Option<usize>,

    /// Disable the frame cache
    #[arg(long = "no-cache")]
    pub no_cache: bool,

    /// In point (0-based index)
    #[arg(long = "in", value_name = "N", requires = "out_point")]
    pub in_point: Option<i64>,

    /// Out point (0-based index)
    #[arg(long = "out", value_name = "N", requires = "in_point")]
    pub out_point: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_play_args() {
        let args = Args::parse_from([
            "seqcache", "-vv", "play", "shot.0001.exr", "--fps", "25", "--in", "2", "--out", "8", "--loop",
        ]);
        assert_eq!(args.verbosity, 2);
        match args.command {
            Command::Play(play) => {
                assert_eq!(play.file, PathBuf::from("shot.0001.exr"));
                assert_eq!(play.fps, Some(25.0));
                assert_eq!((play.in_point, play.out_point), (Some(2), Some(8)));
                assert!(play.loop_playback);
                assert!(!play.reverse);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_in_requires_out() {
        assert!(Args::try_parse_from(["seqcache", "play", "a.png", "--in", "2"]).is_err());
    }

    #[test]
    fn test_global_log_flag() {
        let args = Args::parse_from(["seqcache", "parse", "1-10", "--log"]);
        assert_eq!(args.log_file, Some(None));
        assert!(matches!(args.command, Command::Parse { .. }));
    }
}
