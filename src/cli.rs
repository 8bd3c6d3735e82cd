//! Command-line interface
//!
//! Argument parsing and logging configuration for the voicenote binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

/// Voicenote - record and play back voice answers
#[derive(Parser, Debug)]
#[command(name = "voicenote")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Emit state snapshots as JSON lines instead of human-readable text
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record from the microphone, then encode the capture as WAV
    Record {
        /// How long to record, in seconds
        #[arg(short, long, default_value_t = 5)]
        seconds: u32,

        /// Recordings directory (defaults to the app data directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Play a WAV file to completion
    Play {
        /// File to play
        file: PathBuf,

        /// Playback speed
        #[arg(short, long, default_value_t = 1.0)]
        speed: f32,
    },
    /// Wrap an existing raw PCM file in a WAV container
    Encode {
        /// Headerless little-endian 16-bit mono PCM file
        file: PathBuf,

        /// Sample rate of the PCM data in Hz
        #[arg(short, long, default_value_t = 16_000)]
        rate: u32,
    },
    /// List encoded recordings, newest first
    List {
        /// Recordings directory (defaults to the app data directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

impl Args {
    /// Log level filter based on the verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Keep dependencies at warn; raise only our own modules.
    builder.filter_level(LevelFilter::Warn);
    builder.filter_module("voicenote", args.log_level());

    builder.format_timestamp_millis().init();
}
