//! Integration tests for the Notarius CLI.
//!
//! Each test writes a fixture signature, document, and root certificate
//! into a temporary directory, invokes the `notarius` binary via
//! `assert_cmd`, and checks outputs and exit codes.

#![allow(deprecated)] // cargo_bin deprecation: macro replacement not yet stable

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use notarius_verifier::binding::sha256_hex;
use notarius_verifier::fixtures::{CLIENT_ID, EMAIL, Fixture, ISSUER};
use predicates::prelude::*;

const DOCUMENT: &[u8] = b"%PDF-1.7 contract body";

/// Convenience: get a `Command` for the `notarius` binary, isolated from
/// the caller's config file and environment.
fn notarius(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("notarius").expect("notarius binary not found");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("NOTARIUS_BIND_ADDR")
        .env_remove("NOTARIUS_ISSUER")
        .env_remove("NOTARIUS_CLIENT_ID")
        .env_remove("NOTARIUS_ROOT_CA");
    cmd
}

struct Scenario {
    fixture: Fixture,
    artifact: PathBuf,
    document: PathBuf,
    root: PathBuf,
}

/// Helper: write a signed artifact over [`DOCUMENT`], the document itself,
/// and the trusted root PEM.
fn scenario(dir: &Path) -> Scenario {
    let fixture = Fixture::new();
    let artifact = fixture.artifact(&sha256_hex(DOCUMENT));

    let artifact_path = dir.join("contract.sig");
    std::fs::write(&artifact_path, artifact.to_protobuf()).expect("write artifact");
    let document_path = dir.join("contract.pdf");
    std::fs::write(&document_path, DOCUMENT).expect("write document");
    let root_path = dir.join("root.pem");
    std::fs::write(&root_path, fixture.root_pem()).expect("write root");

    Scenario {
        fixture,
        artifact: artifact_path,
        document: document_path,
        root: root_path,
    }
}

fn trust_args(s: &Scenario) -> Vec<String> {
    vec![
        "--issuer".to_owned(),
        ISSUER.to_owned(),
        "--client-id".to_owned(),
        CLIENT_ID.to_owned(),
        "--root-ca".to_owned(),
        s.root.display().to_string(),
        "--at".to_owned(),
        s.fixture.reference_time().to_rfc3339(),
    ]
}

// ─── verify tests ───────────────────────────────────────────

#[test]
fn verify_document() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());

    notarius(dir.path())
        .arg("verify")
        .arg(&s.artifact)
        .arg("--document")
        .arg(&s.document)
        .args(trust_args(&s))
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("[PASS] Signed by {EMAIL}")))
        .stdout(predicate::str::contains("Signature level: long-term"))
        .stdout(predicate::str::contains("Verification PASSED"));
}

#[test]
fn verify_hash_json() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());

    let output = notarius(dir.path())
        .arg("verify")
        .arg(&s.artifact)
        .args(["--hash", &sha256_hex(DOCUMENT), "--no-ltv", "--json"])
        .args(trust_args(&s))
        .output()
        .unwrap();

    assert!(output.status.success());
    let verdict: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(verdict["valid"], true);
    assert_eq!(verdict["signer_email"], EMAIL);
    assert_eq!(verdict["signature_level"], "basic");
}

#[test]
fn verify_base64_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());
    let text = s.fixture.artifact(&sha256_hex(DOCUMENT)).to_base64();
    let text_path = dir.path().join("contract.sig.b64");
    std::fs::write(&text_path, format!("{text}\n")).unwrap();

    notarius(dir.path())
        .arg("verify")
        .arg(&text_path)
        .arg("--document")
        .arg(&s.document)
        .args(trust_args(&s))
        .assert()
        .success();
}

#[test]
fn verify_other_document_fails() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());
    let other = dir.path().join("other.pdf");
    std::fs::write(&other, b"a different contract").unwrap();

    notarius(dir.path())
        .arg("verify")
        .arg(&s.artifact)
        .arg("--document")
        .arg(&other)
        .args(trust_args(&s))
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("[FAIL] hash mismatch"))
        .stdout(predicate::str::contains("Verification FAILED"));
}

#[test]
fn verify_untrusted_root_fails() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());
    std::fs::write(&s.root, Fixture::new().root_pem()).unwrap();

    let output = notarius(dir.path())
        .arg("verify")
        .arg(&s.artifact)
        .arg("--document")
        .arg(&s.document)
        .arg("--json")
        .args(trust_args(&s))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let verdict: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(verdict["valid"], false);
    assert_eq!(verdict["error_kind"], "untrusted_chain");
    assert_eq!(verdict["error_class"], "trust");
}

#[test]
fn verify_garbage_artifact_fails() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());
    std::fs::write(&s.artifact, [0x0a, 0x0a, 0x01]).unwrap();

    notarius(dir.path())
        .arg("verify")
        .arg(&s.artifact)
        .arg("--document")
        .arg(&s.document)
        .arg("--json")
        .args(trust_args(&s))
        .assert()
        .failure()
        .stdout(predicate::str::contains("malformed_artifact"));
}

#[test]
fn verify_without_root_ca_refuses() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());

    notarius(dir.path())
        .arg("verify")
        .arg(&s.artifact)
        .arg("--document")
        .arg(&s.document)
        .args(["--issuer", ISSUER, "--client-id", CLIENT_ID])
        .assert()
        .failure()
        .stderr(predicate::str::contains("root_ca"));
}

#[test]
fn verify_reads_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());
    let config_path = dir.path().join("notarius.toml");
    std::fs::write(
        &config_path,
        format!(
            "issuer = \"{ISSUER}\"\nclient_id = \"{CLIENT_ID}\"\nroot_ca = {:?}\nltv_mode = \"required\"\nreference_time = \"{}\"\n",
            s.root.display().to_string(),
            s.fixture.reference_time().to_rfc3339(),
        ),
    )
    .unwrap();

    notarius(dir.path())
        .arg("verify")
        .arg(&s.artifact)
        .arg("--document")
        .arg(&s.document)
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("LTV mode:       Required"));
}

// ─── inspect tests ──────────────────────────────────────────

#[test]
fn inspect_shows_unverified_contents() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());

    notarius(dir.path())
        .arg("inspect")
        .arg(&s.artifact)
        .assert()
        .success()
        .stdout(predicate::str::contains("Signature Artifact (unverified)"))
        .stdout(predicate::str::contains(EMAIL))
        .stdout(predicate::str::contains("Certificate chain (2):"))
        .stdout(predicate::str::contains("LTV records (2):"));
}

#[test]
fn inspect_json() {
    let dir = tempfile::tempdir().unwrap();
    let s = scenario(dir.path());

    let output = notarius(dir.path())
        .args(["inspect", "--json"])
        .arg(&s.artifact)
        .output()
        .unwrap();

    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["token"]["Ok"]["claims"]["email"], EMAIL);
    assert_eq!(summary["ltv_records"].as_array().map(Vec::len), Some(2));
}

#[test]
fn inspect_missing_file() {
    let dir = tempfile::tempdir().unwrap();

    notarius(dir.path())
        .args(["inspect", "/nonexistent/contract.sig"])
        .assert()
        .failure();
}
