//! # Short unique identifier generation.
//!
//! [`generate`] produces 16-character, URL-safe identifiers by hashing a
//! process-wide salt, the current wall clock in nanoseconds and a monotone
//! counter. Uniqueness is statistical: callers that need strict uniqueness
//! within a namespace (build tokens inside an app) must loop and check the
//! namespace before accepting a candidate.

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Process-wide salt mixed into every identifier.
static TOKEN_SALT: &str = "ngbuild";

/// Monotone counter; guarantees two calls in the same nanosecond differ.
static TOKEN_CTR: AtomicU64 = AtomicU64::new(0);

/// Truncated length of the encoded digest.
const TOKEN_LEN: usize = 16;

/// Generates a short, URL-safe identifier, optionally namespaced.
///
/// Prefixes are joined with `-` and prepended to the 16-character id, so
/// `generate(&["build"])` yields something like `build3fK9_qX81LmZwpQ`.
pub fn generate(prefixes: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(TOKEN_SALT.as_bytes());

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    hasher.update(nanos.to_le_bytes());
    hasher.update(counter_next().to_le_bytes());

    let encoded = URL_SAFE.encode(hasher.finalize());
    // `-` is not matched by the `\w+` token captures in the topic grammar.
    let id = encoded[..TOKEN_LEN].replace('-', "_");

    if prefixes.is_empty() {
        id
    } else {
        format!("{}{id}", prefixes.join("-"))
    }
}

fn counter_next() -> u64 {
    TOKEN_CTR.fetch_add(1, AtomicOrdering::SeqCst) + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test(flavor = "multi_thread")]
    async fn tokens_are_unique_under_concurrency() {
        let total = 1000usize;
        let before = TOKEN_CTR.load(AtomicOrdering::SeqCst);

        let mut handles = Vec::with_capacity(total);
        for _ in 0..total {
            handles.push(tokio::spawn(async { generate(&[]) }));
        }

        let mut seen = HashSet::with_capacity(total);
        for handle in handles {
            let id = handle.await.expect("token task panicked");
            assert_eq!(id.len(), TOKEN_LEN);
            assert!(seen.insert(id), "duplicate token generated");
        }

        let after = TOKEN_CTR.load(AtomicOrdering::SeqCst);
        assert_eq!(after - before, total as u64);
    }

    #[test]
    fn prefixes_are_joined_with_dashes() {
        let id = generate(&["pr", "24"]);
        assert!(id.starts_with("pr-24"));
        assert_eq!(id.len(), "pr-24".len() + TOKEN_LEN);
    }

    #[test]
    fn tokens_match_the_topic_token_pattern() {
        let word = regex::Regex::new(r"^\w+$").expect("pattern");
        for _ in 0..256 {
            assert!(word.is_match(&generate(&[])));
        }
    }
}
