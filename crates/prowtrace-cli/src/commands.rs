//! CLI command definitions.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Rebuild the trace of a finished job from its archived artifacts
    Reconstruct(ReconstructArgs),

    /// Emit a short synthetic trace beneath the root derived from a job id
    Selftest {
        /// Job identifier whose trace to join
        #[arg(long, env = "PROW_JOB_ID")]
        job_id: String,

        /// OTLP collector endpoint
        #[arg(long)]
        endpoint: Option<String>,

        /// Print the spans instead of exporting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the trace identity derived from a job id
    Id {
        /// Canonical UUID, optionally urn:uuid: prefixed
        id: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ReconstructArgs {
    /// Job artifact path: <bucket>/<prefix> in object storage
    #[arg(required_unless_present = "local")]
    pub job_path: Option<String>,

    /// Read artifacts from a local directory instead
    #[arg(long, conflicts_with = "job_path")]
    pub local: Option<PathBuf>,

    /// Nest under the root another tool derived from this id instead of
    /// creating the job span
    #[arg(long)]
    pub attach: Option<String>,

    /// Print the span tree instead of exporting it
    #[arg(long)]
    pub dry_run: bool,

    /// OTLP collector endpoint
    #[arg(long)]
    pub endpoint: Option<String>,
}
