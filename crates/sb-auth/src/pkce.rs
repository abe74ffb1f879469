//! PKCE (Proof Key for Code Exchange) for the authorization-code flow
//!
//! Implements PKCE as defined in RFC 7636 with the S256 (SHA-256) challenge
//! method. The extension is a public client, so the verifier/challenge pair
//! stands in for a client secret.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Verifier length in characters. RFC 7636 allows 43-128.
const VERIFIER_LEN: usize = 64;

/// Ephemeral verifier/challenge pair for one authorization attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkcePair {
    /// Random string drawn from the unreserved URL-safe alphabet.
    pub verifier: String,

    /// BASE64URL(SHA256(verifier)), no padding.
    pub challenge: String,

    /// Challenge method, always "S256".
    pub method: String,
}

impl PkcePair {
    /// Generate a fresh pair from a cryptographically secure random source.
    pub fn generate() -> Self {
        let mut rng = thread_rng();
        let verifier: String = (0..VERIFIER_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..62);
                match idx {
                    0..=25 => (b'A' + idx) as char,
                    26..=51 => (b'a' + (idx - 26)) as char,
                    _ => (b'0' + (idx - 52)) as char,
                }
            })
            .collect();

        let challenge = challenge_for(&verifier);

        Self {
            verifier,
            challenge,
            method: "S256".to_string(),
        }
    }
}

fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}
