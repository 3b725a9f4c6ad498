use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "procdeck", version, about = "Process supervision shell")]
pub struct Cli {
    /// Run a single command and exit with its status
    #[arg(short = 'c', long = "command")]
    pub command: Option<String>,

    /// Config file to load (default: ./procdeck.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Kill the command after this many milliseconds (with -c)
    #[arg(long)]
    pub timeout: Option<u64>,
}
