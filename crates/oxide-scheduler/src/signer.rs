//! HMAC-SHA256 verification of signed pipeline configuration.
//!
//! A signed configuration carries its digest in a `kind: signature`
//! document. The digest covers every other document of the stream, so the
//! signature document is removed before the HMAC is computed.

use hmac::{Hmac, Mac};
use oxide_core::ports::Signer;
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SignatureDoc {
    kind: String,
    hmac: String,
}

/// Default [`Signer`] for protected repositories.
#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSigner;

impl HmacSigner {
    pub fn new() -> Self {
        Self
    }

    /// Hex digest of `data` with any signature document removed.
    pub fn sign(&self, data: &str, secret: &str) -> String {
        let (unsigned, _) = split_signature(data);
        hex::encode(compute(unsigned.as_bytes(), secret.as_bytes()))
    }
}

impl Signer for HmacSigner {
    fn verify(&self, data: &str, secret: &str) -> bool {
        let (unsigned, digest) = split_signature(data);
        let Some(expected) = digest.and_then(|d| hex::decode(d.trim()).ok()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(unsigned.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

fn compute(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    match HmacSha256::new_from_slice(secret) {
        Ok(mut mac) => {
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        }
        Err(_) => Vec::new(),
    }
}

/// Split a YAML stream into the text without its signature document and
/// the digest that document carried.
fn split_signature(data: &str) -> (String, Option<String>) {
    let mut kept: Vec<&str> = Vec::new();
    let mut digest = None;

    for document in documents(data) {
        match serde_yaml::from_str::<SignatureDoc>(document) {
            Ok(doc) if doc.kind == "signature" => digest = Some(doc.hmac),
            _ => kept.push(document),
        }
    }
    (kept.join("---\n"), digest)
}

/// Raw document slices of a stream, split on `---` separator lines.
fn documents(data: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in data.split_inclusive('\n') {
        if line.trim_end() == "---" {
            result.push(&data[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    result.push(&data[start..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "correct-horse-battery-staple";
    const MANIFEST: &str = "kind: pipeline\nname: default\nsteps:\n- name: build\n  image: rust\n";

    fn signed(manifest: &str, digest: &str) -> String {
        format!("{manifest}---\nkind: signature\nhmac: {digest}\n")
    }

    #[test]
    fn test_documents_split() {
        let docs = documents("a: 1\n---\nb: 2\n---\nc: 3");
        assert_eq!(docs, vec!["a: 1\n", "b: 2\n", "c: 3"]);
    }

    #[test]
    fn test_verify_signed_manifest() {
        let signer = HmacSigner::new();
        let digest = signer.sign(MANIFEST, SECRET);
        assert_eq!(digest.len(), 64);
        assert!(signer.verify(&signed(MANIFEST, &digest), SECRET));
    }

    #[test]
    fn test_wrong_secret() {
        let signer = HmacSigner::new();
        let digest = signer.sign(MANIFEST, SECRET);
        assert!(!signer.verify(&signed(MANIFEST, &digest), "wrong-secret"));
    }

    #[test]
    fn test_tampered_manifest() {
        let signer = HmacSigner::new();
        let digest = signer.sign(MANIFEST, SECRET);
        let tampered = MANIFEST.replace("rust", "alpine");
        assert!(!signer.verify(&signed(&tampered, &digest), SECRET));
    }

    #[test]
    fn test_missing_or_malformed_signature() {
        let signer = HmacSigner::new();
        assert!(!signer.verify(MANIFEST, SECRET));
        assert!(!signer.verify(&signed(MANIFEST, "not-hex"), SECRET));
    }

    #[test]
    fn test_sign_ignores_existing_signature() {
        let signer = HmacSigner::new();
        let digest = signer.sign(MANIFEST, SECRET);
        assert_eq!(signer.sign(&signed(MANIFEST, "deadbeef"), SECRET), digest);
    }
}
