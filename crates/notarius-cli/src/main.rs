//! Notarius CLI: verify identity-bound document signatures.
//!
//! Check a signature file against a document offline, decode one for
//! inspection, or run the HTTP verification service.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

/// Notarius: verify identity-bound document signatures.
///
/// A signature proves that a verified email identity, vouched for by an
/// identity provider whose key chains to a trusted root, attested the
/// SHA-256 hash of a document.
#[derive(Parser)]
#[command(name = "notarius", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (repeat for more detail: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output logs as JSON (for machine consumption).
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Verify a signature file against a document or its hash.
    Verify(commands::verify::VerifyArgs),
    /// Display a signature file in human-readable format, without verifying it.
    Inspect(commands::inspect::InspectArgs),
    /// Run the HTTP verification service.
    Serve(commands::serve::ServeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Verify(args) => commands::verify::execute(args),
        Commands::Inspect(args) => commands::inspect::execute(&args),
        Commands::Serve(args) => commands::serve::execute(args).await,
    }
}
