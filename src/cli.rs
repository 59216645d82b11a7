use crate::logic::HistoryWindow;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cropadvisor",
    version,
    about = "Crop recommendation and adjustment advisor"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run interactive setup
    Init,
    /// Validate config, load the model and test the sensor API
    Check,
    /// Recommend a crop for a reading (the latest one unless given)
    Predict {
        /// Request JSON with N, P, K, temperature and humidity
        #[arg(short, long)]
        features: Option<String>,
    },
    /// Compare a reading with a crop's ideal conditions
    Adjust {
        /// Crop to compare against
        #[arg(long)]
        crop: Option<String>,
        /// Reading JSON (fetched from the sensor API if omitted)
        #[arg(short, long)]
        reading: Option<String>,
    },
    /// List crops with ideal-condition data
    Crops,
    /// Summarize recent sensor history
    History {
        /// Look-back window: 1h, 24h or 7d
        #[arg(short, long, default_value = "1h")]
        window: HistoryWindow,
    },
    /// Poll live readings and print each update (`r` refresh, `l` toggle live, `q` quit)
    Watch {
        /// Also print adjustments for this crop on every update
        #[arg(long)]
        crop: Option<String>,
    },
}
