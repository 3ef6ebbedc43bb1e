//! CLI argument definition. Deliberately minimal: the server is configured
//! through its TOML file, not through flags.

use clap::Parser;
use std::path::PathBuf;

/// Whisker SLAM coordination server.
#[derive(Parser, Debug)]
#[command(
    name = "whisker-server",
    author,
    version,
    about = "Coordinates robot sensor/actuator clients around a central SLAM map"
)]
pub struct Cli {
    /// Path to the server's TOML configuration file.
    #[arg(short, long, default_value = "config.toml", env = "WHISKER_CONFIG")]
    pub config: PathBuf,
}
