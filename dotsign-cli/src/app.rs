use std::path::PathBuf;

use clap::Parser;

/// dotsign - strong-name signing for .NET assemblies
#[derive(Debug, Parser)]
#[command(name = "dotsign", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    /// Verify every signature after writing it.
    #[arg(long)]
    pub verify: bool,

    /// Path to the strong-name key file (.snk).
    #[arg(value_name = "KEY")]
    pub key: PathBuf,

    /// Assemblies to sign in place.
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,
}

/// Output and logging options.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}
