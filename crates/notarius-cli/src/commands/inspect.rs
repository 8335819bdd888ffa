//! The `notarius inspect` subcommand.
//!
//! Displays a signature file in human-readable format. Nothing is verified.

use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::Result;
use notarius_artifact::SignatureArtifact;
use notarius_verifier::inspect;

/// Arguments for `notarius inspect`.
#[derive(Args)]
pub struct InspectArgs {
    /// Path to the signature file (raw protobuf or base64).
    pub artifact: PathBuf,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the inspect command.
pub fn execute(args: &InspectArgs) -> Result<()> {
    let artifact = SignatureArtifact::from_file(&args.artifact)?;
    let summary = inspect::summarize(&artifact);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", inspect::format_summary(&summary));
    }

    Ok(())
}
