// thumbgate/src/cli.rs
use crate::core::crop::CropPolicy;
use crate::core::ResizeAlgorithm;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "thumbgate", version, about = "Guarded thumbnailing for untrusted images")]
pub struct Cli {
    /// Log every pipeline stage
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML file with processor settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Thumbnail a single image
    Thumbnail {
        input: PathBuf,

        /// Output file; the extension picks the format
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Target width, 0 to follow the height
        #[arg(long, default_value_t = 0)]
        width: u32,

        /// Target height, 0 to follow the width
        #[arg(long, default_value_t = 0)]
        height: u32,

        /// none, force, down, high, centre, attention or focal:X,Y
        #[arg(long, default_value = "none")]
        crop: CropPolicy,

        /// One-based page of a multi-page source
        #[arg(long, default_value_t = 1)]
        page: i32,

        /// Frames to keep from an animation, -1 for all
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        frames: i32,

        #[arg(long)]
        dpi: Option<u32>,

        /// Filter expression such as blur(2); repeatable
        #[arg(long = "filter")]
        filters: Vec<String>,

        #[arg(short, long)]
        quality: Option<u8>,

        /// Skip the resolution guard
        #[arg(long)]
        unlimited: bool,

        #[arg(long, value_enum)]
        algorithm: Option<Algorithm>,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Thumbnail every image in a directory
    Batch {
        input: PathBuf,
        output: PathBuf,

        #[arg(long, default_value_t = 0)]
        width: u32,

        #[arg(long, default_value_t = 0)]
        height: u32,

        #[arg(long, default_value = "none")]
        crop: CropPolicy,

        /// Parallel jobs, 0 for one per core
        #[arg(short = 'j', long, default_value_t = 0)]
        threads: usize,

        #[arg(short, long)]
        recursive: bool,

        #[arg(short, long)]
        quality: Option<u8>,

        #[arg(long, value_enum)]
        algorithm: Option<Algorithm>,
    },

    /// Print dimensions, pages and EXIF details
    Info { input: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl From<Algorithm> for ResizeAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Nearest => ResizeAlgorithm::Nearest,
            Algorithm::Bilinear => ResizeAlgorithm::Bilinear,
            Algorithm::Bicubic => ResizeAlgorithm::Bicubic,
            Algorithm::Lanczos3 => ResizeAlgorithm::Lanczos3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_thumbnail_command() {
        let cli = Cli::parse_from([
            "thumbgate",
            "thumbnail",
            "in.gif",
            "--width",
            "120",
            "--height",
            "80",
            "--crop",
            "focal:0.2,0.8",
            "--frames",
            "-1",
            "--filter",
            "blur(1)",
            "--filter",
            "grayscale",
        ]);
        match cli.command {
            Commands::Thumbnail {
                width,
                height,
                crop,
                frames,
                filters,
                ..
            } => {
                assert_eq!((width, height), (120, 80));
                assert_eq!(crop, CropPolicy::FocalPoint { fx: 0.2, fy: 0.8 });
                assert_eq!(frames, -1);
                assert_eq!(filters, vec!["blur(1)", "grayscale"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bad_crop_is_rejected() {
        assert!(Cli::try_parse_from(["thumbgate", "thumbnail", "a.png", "--crop", "squash"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["thumbgate", "info", "a.png", "-v", "--config", "t.toml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("t.toml")));
    }
}
