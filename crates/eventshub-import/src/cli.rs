//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// eventshub-import - upload XML event exports to an eventshub server
#[derive(Debug, Parser)]
#[command(name = "eventshub-import")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "EVENTSHUB_IMPORT_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Extra XML files to upload after the configured ones
    pub files: Vec<PathBuf>,
}

impl Cli {
    /// The configured sources followed by the ones given on the command line.
    pub fn sources(&self, configured: &[PathBuf]) -> Vec<PathBuf> {
        configured.iter().chain(&self.files).cloned().collect()
    }
}
