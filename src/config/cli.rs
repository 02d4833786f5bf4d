//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! destila validate distill.yaml
//! destila validate distill.yaml --output resolved.yaml
//! destila probe distill.yaml --steps 50 --lr 0.05 --seed 7
//! ```

use super::schema::DistillSpec;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Destila: feature-map distillation losses
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "destila")]
#[command(version)]
#[command(about = "Channel-wise divergence distillation loss with a tape-based autograd core")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate a loss configuration file
    Validate(ValidateArgs),

    /// Fit each configured loss on synthetic feature maps and report the loss per step
    Probe(ProbeArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Write the configuration with every default filled in
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Arguments for the probe command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ProbeArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Batch size of the synthetic feature maps
    #[arg(short, long, default_value_t = 2)]
    pub batch: usize,

    /// Teacher feature-map height (the student is twice as tall)
    #[arg(long, default_value_t = 8)]
    pub height: usize,

    /// Teacher feature-map width (the student is twice as wide)
    #[arg(long, default_value_t = 8)]
    pub width: usize,

    /// Number of SGD steps on the projection parameters
    #[arg(short, long, default_value_t = 20)]
    pub steps: usize,

    /// Learning rate for the projection parameters
    #[arg(short, long, default_value_t = 0.1)]
    pub lr: f32,

    /// Random seed for feature maps and projection initialization
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Parse command line arguments
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a DistillSpec
///
/// A `--seed` fills in the seed of every loss that does not set its own.
pub fn apply_overrides(spec: &mut DistillSpec, args: &ProbeArgs) {
    if let Some(seed) = args.seed {
        for loss in spec.losses.iter_mut().filter(|l| l.seed.is_none()) {
            loss.seed = Some(seed);
        }
    }
}
