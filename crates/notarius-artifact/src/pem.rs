//! PEM helpers.
//!
//! Trust roots are distributed as PEM bundles; everything else in an
//! artifact is DER or base64.

use base64::Engine;

use crate::error::ArtifactError;

/// A single decoded PEM block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    /// The label between `BEGIN` and the trailing dashes, e.g. `CERTIFICATE`.
    pub label: String,
    /// The decoded body.
    pub der: Vec<u8>,
}

/// Wrap DER bytes in PEM with the given label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    // base64 output is ASCII, so splitting on any byte boundary is safe.
    for chunk in b64.as_bytes().chunks(64) {
        pem.extend(chunk.iter().map(|&b| char::from(b)));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}

/// Decode every PEM block in `pem`, in order.
///
/// Text outside `BEGIN`/`END` markers is ignored.
///
/// # Errors
///
/// Returns [`ArtifactError::Pem`] for an unterminated block, a mismatched
/// `END` label, or a body that is not valid base64.
pub fn pem_blocks(pem: &str) -> Result<Vec<PemBlock>, ArtifactError> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in pem.lines() {
        let trimmed = line.trim();
        if let Some(label) = marker(trimmed, "-----BEGIN ") {
            if current.is_some() {
                return Err(ArtifactError::Pem(format!(
                    "BEGIN {label} inside an open block"
                )));
            }
            current = Some((label.to_owned(), String::new()));
        } else if let Some(label) = marker(trimmed, "-----END ") {
            let (open, body) = current
                .take()
                .ok_or_else(|| ArtifactError::Pem(format!("END {label} without BEGIN")))?;
            if open != label {
                return Err(ArtifactError::Pem(format!(
                    "BEGIN {open} closed by END {label}"
                )));
            }
            let der = base64::engine::general_purpose::STANDARD
                .decode(&body)
                .map_err(|e| ArtifactError::Pem(format!("invalid base64 in {label}: {e}")))?;
            blocks.push(PemBlock { label: open, der });
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(trimmed);
        }
    }

    if let Some((label, _)) = current {
        return Err(ArtifactError::Pem(format!("unterminated {label} block")));
    }
    Ok(blocks)
}

fn marker<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix("-----")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_round_trip() {
        let data = b"hello world";
        let pem = der_to_pem(data, "TEST");
        let blocks = pem_blocks(&pem).expect("should parse PEM");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].label, "TEST");
        assert_eq!(blocks[0].der, data);
    }

    #[test]
    fn long_bodies_wrap_at_64_columns() {
        let pem = der_to_pem(&[0u8; 200], "CERTIFICATE");
        assert!(pem.lines().all(|line| line.len() <= 64));
    }

    #[test]
    fn bundle_yields_blocks_in_order() {
        let bundle = format!(
            "root\n{}intermediate\n{}",
            der_to_pem(b"first", "CERTIFICATE"),
            der_to_pem(b"second", "CERTIFICATE")
        );
        let blocks = pem_blocks(&bundle).expect("bundle");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].der, b"first");
        assert_eq!(blocks[1].der, b"second");
        assert_eq!(blocks[1].label, "CERTIFICATE");
    }

    #[test]
    fn reject_mismatched_labels() {
        let pem = "-----BEGIN CERTIFICATE-----\naGk=\n-----END PRIVATE KEY-----\n";
        assert!(matches!(pem_blocks(pem), Err(ArtifactError::Pem(_))));
    }

    #[test]
    fn reject_unterminated_block() {
        let pem = "-----BEGIN CERTIFICATE-----\naGk=\n";
        assert!(matches!(pem_blocks(pem), Err(ArtifactError::Pem(_))));
    }
}
