use clap::Parser;
use std::path::PathBuf;

/// Frame-paced media playback engine (headless runner)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Unit directory containing meta.json and frames/
    #[arg(value_name = "UNIT_DIR")]
    pub unit: PathBuf,

    /// Stream raw RGBA frames from an external transcoder instead of
    /// decoding the frames/ directory. First word is the program, the rest
    /// its arguments.
    #[arg(long = "pipe", value_name = "CMD", num_args = 1.., allow_hyphen_values = true)]
    pub pipe: Option<Vec<String>>,

    /// Configuration file (JSON). Defaults apply when absent.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seconds of frames to keep decoded ahead of the cursor
    #[arg(long = "lookahead", value_name = "SECONDS")]
    pub lookahead_seconds: Option<f32>,

    /// Per-frame decode timeout in milliseconds
    #[arg(long = "decode-timeout", value_name = "MS")]
    pub decode_timeout_ms: Option<u64>,

    /// Decode worker threads (default: 3/4 of CPU count)
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Pause after this many seconds, resume one second later (smoke test aid)
    #[arg(long = "pause-at", value_name = "SECONDS", hide = true)]
    pub pause_at: Option<f32>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_invocation() {
        let args = Args::try_parse_from(["flipbook", "some/unit"]).unwrap();
        assert_eq!(args.unit, PathBuf::from("some/unit"));
        assert!(args.pipe.is_none());
        assert_eq!(args.verbosity, 0);
    }

    #[test]
    fn test_tuning_flags_and_verbosity() {
        let args = Args::try_parse_from([
            "flipbook",
            "unit",
            "--lookahead",
            "3.5",
            "--decode-timeout",
            "750",
            "--workers",
            "2",
            "-vv",
        ])
        .unwrap();
        assert_eq!(args.lookahead_seconds, Some(3.5));
        assert_eq!(args.decode_timeout_ms, Some(750));
        assert_eq!(args.workers, Some(2));
        assert_eq!(args.verbosity, 2);
    }

    #[test]
    fn test_pipe_captures_command_words() {
        let args =
            Args::try_parse_from(["flipbook", "unit", "--pipe", "ffmpeg", "-i", "clip.mp4"])
                .unwrap();
        assert_eq!(
            args.pipe,
            Some(vec!["ffmpeg".into(), "-i".into(), "clip.mp4".into()])
        );
    }

    #[test]
    fn test_unit_dir_required() {
        assert!(Args::try_parse_from(["flipbook"]).is_err());
    }
}
