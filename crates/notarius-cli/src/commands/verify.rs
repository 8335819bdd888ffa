//! The `notarius verify` subcommand.
//!
//! Verifies a signature file offline against a document (or its hash).

use std::path::PathBuf;
use std::process;

use chrono::{DateTime, Utc};
use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use notarius_api::config::ServiceConfig;
use notarius_artifact::SignatureArtifact;
use notarius_verifier::binding::sha256_reader;
use notarius_verifier::{
    LtvMode, SignatureLevel, VerificationError, VerificationVerdict, Verifier, VerifyOptions,
};

/// Arguments for `notarius verify`.
#[derive(Args)]
pub struct VerifyArgs {
    /// Path to the signature file (raw protobuf or base64).
    pub artifact: PathBuf,

    /// Document to hash and check the signature against.
    #[arg(long, value_name = "PATH", conflicts_with = "hash", required_unless_present = "hash")]
    pub document: Option<PathBuf>,

    /// Hex SHA-256 of the document, instead of `--document`.
    #[arg(long, value_name = "HEX")]
    pub hash: Option<String>,

    /// Service config file supplying defaults for the trust settings.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Expected token issuer.
    #[arg(long)]
    pub issuer: Option<String>,

    /// Client id expected in the token audience.
    #[arg(long)]
    pub client_id: Option<String>,

    /// Trusted root certificate (PEM or DER); repeat to trust several.
    #[arg(long, value_name = "PATH")]
    pub root_ca: Vec<PathBuf>,

    /// Verify as of this RFC 3339 time instead of now.
    #[arg(long, value_name = "TIME")]
    pub at: Option<DateTime<Utc>>,

    /// Require long-term validation evidence.
    #[arg(long, conflicts_with = "no_ltv")]
    pub ltv: bool,

    /// Skip long-term validation (ignored when the config requires it).
    #[arg(long)]
    pub no_ltv: bool,

    /// Output the verdict as JSON.
    #[arg(long)]
    pub json: bool,
}

impl VerifyArgs {
    /// The requested long-term validation override.
    fn long_term(&self) -> Option<bool> {
        match (self.ltv, self.no_ltv) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    /// Layer the command-line trust settings over the loaded config.
    fn apply_to(&self, config: &mut ServiceConfig) {
        if let Some(issuer) = &self.issuer {
            config.issuer = Some(issuer.clone());
        }
        if let Some(client_id) = &self.client_id {
            config.client_id = Some(client_id.clone());
        }
        if let Some((first, rest)) = self.root_ca.split_first() {
            config.root_ca = Some(first.clone());
            config.additional_roots = rest.to_vec();
        }
        if let Some(at) = self.at {
            config.reference_time = Some(at);
        }
    }
}

/// Execute the verify command.
pub fn execute(args: VerifyArgs) -> Result<()> {
    let mut service_config = ServiceConfig::load(args.config.as_deref())?;
    args.apply_to(&mut service_config);
    let trust_config = service_config
        .trust_config()
        .wrap_err("cannot build trust configuration")?;

    let target_hash = match (&args.hash, &args.document) {
        (Some(hash), _) => hash.clone(),
        (None, Some(document)) => {
            let file = std::fs::File::open(document)
                .wrap_err_with(|| format!("cannot open document {}", document.display()))?;
            sha256_reader(file)
                .wrap_err_with(|| format!("cannot read document {}", document.display()))?
        }
        (None, None) => color_eyre::eyre::bail!("either --document or --hash is required"),
    };

    let verdict = match SignatureArtifact::from_file(&args.artifact) {
        Ok(artifact) => {
            let verifier = Verifier::new(trust_config);
            verifier.verify(
                &artifact,
                &target_hash,
                VerifyOptions {
                    long_term: args.long_term(),
                },
            )
        }
        Err(e) => VerificationVerdict::failure(&VerificationError::from(e)),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        print_verdict(&verdict, &target_hash, service_config.ltv_mode);
    }

    if !verdict.valid {
        process::exit(1);
    }

    Ok(())
}

fn print_verdict(verdict: &VerificationVerdict, target_hash: &str, ltv_mode: LtvMode) {
    println!("Document hash:  {target_hash}");
    println!("LTV mode:       {ltv_mode:?}");
    println!();

    if verdict.valid {
        if let Some(email) = &verdict.signer_email {
            println!("[PASS] Signed by {email}");
        }
        if let Some(level) = verdict.signature_level {
            println!("[PASS] Signature level: {}", level_name(level));
        }
        if let Some(time) = verdict.signature_time {
            println!("[PASS] Signed at {}", time.to_rfc3339());
        }
    } else if let Some(error) = &verdict.error {
        println!("[FAIL] {error}");
    }

    println!();
    if verdict.valid {
        println!("Verification PASSED");
    } else {
        println!("Verification FAILED");
    }
}

fn level_name(level: SignatureLevel) -> &'static str {
    match level {
        SignatureLevel::Basic => "basic",
        SignatureLevel::LongTerm => "long-term",
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: VerifyArgs,
    }

    fn parse(argv: &[&str]) -> VerifyArgs {
        Harness::try_parse_from(std::iter::once("verify").chain(argv.iter().copied()))
            .expect("parse")
            .args
    }

    #[test]
    fn ltv_flags_map_to_override() {
        assert_eq!(parse(&["a.sig", "--hash", "00"]).long_term(), None);
        assert_eq!(parse(&["a.sig", "--hash", "00", "--ltv"]).long_term(), Some(true));
        assert_eq!(
            parse(&["a.sig", "--hash", "00", "--no-ltv"]).long_term(),
            Some(false)
        );
    }

    #[test]
    fn hash_or_document_is_required() {
        let result = Harness::try_parse_from(["verify", "a.sig"]);
        assert!(result.is_err());
        let result = Harness::try_parse_from([
            "verify",
            "a.sig",
            "--hash",
            "00",
            "--document",
            "doc.pdf",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn first_root_is_default_rest_are_additional() {
        let args = parse(&[
            "a.sig",
            "--hash",
            "00",
            "--issuer",
            "https://idp.example",
            "--root-ca",
            "one.pem",
            "--root-ca",
            "two.pem",
            "--at",
            "2023-06-01T12:00:00Z",
        ]);
        let mut config = ServiceConfig::default();
        args.apply_to(&mut config);

        assert_eq!(config.issuer.as_deref(), Some("https://idp.example"));
        assert_eq!(config.client_id, None);
        assert_eq!(config.root_ca, Some(PathBuf::from("one.pem")));
        assert_eq!(config.additional_roots, vec![PathBuf::from("two.pem")]);
        assert_eq!(
            config.reference_time.map(|t| t.to_rfc3339()),
            Some("2023-06-01T12:00:00+00:00".to_owned())
        );
    }
}
