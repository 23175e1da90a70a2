//! Small, widely-shared helpers: content normalization/hashing, signable
//! confirm tokens for destructive batch operations, duplicate-fact
//! detection, and the redaction pass applied to session checkpoints.

use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Lowercases and strips trailing punctuation, per spec.md §3's
/// `normalized_content` definition used for dedup comparisons.
pub fn normalize_content(content: &str) -> String {
    let collapsed = content.trim();
    let trimmed = collapsed.trim_end_matches(|c: char| c.is_ascii_punctuation());
    trimmed.to_lowercase()
}

/// Trims and collapses internal whitespace, the storage form of `content`.
pub fn collapse_whitespace(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 of the normalization basis, lowercase hex.
pub fn content_hash(normalized: &str) -> String {
    let digest = Sha256::digest(normalized.as_bytes());
    hex_lower(&digest)
}

fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{:02x}", b).expect("writing to String cannot fail");
    }
    out
}

type HmacSha256 = Hmac<Sha256>;

/// Builds a confirm token for a batch operation: an HMAC over the selector
/// description, the matched count, and a coarse time bucket, so a token
/// minted by `preview` remains valid for a short window when replayed on
/// `execute` (spec.md §4.1).
pub fn confirm_token(secret: &[u8], selector_digest: &str, count: usize, time_bucket: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(selector_digest.as_bytes());
    mac.update(b":");
    mac.update(count.to_string().as_bytes());
    mac.update(b":");
    mac.update(time_bucket.to_string().as_bytes());
    hex_lower(&mac.finalize().into_bytes())
}

/// Coarse time bucket (5 minute windows) used by `confirm_token`.
pub fn time_bucket(now: chrono::DateTime<chrono::Utc>) -> i64 {
    now.timestamp() / 300
}

/// Verifies `token` against the current or immediately preceding time
/// bucket, so a confirm token minted just before a bucket boundary still
/// validates.
pub fn verify_confirm_token(
    secret: &[u8],
    selector_digest: &str,
    count: usize,
    now: chrono::DateTime<chrono::Utc>,
    token: &str,
) -> bool {
    let current = time_bucket(now);
    for bucket in [current, current - 1] {
        if confirm_token(secret, selector_digest, count, bucket) == token {
            return true;
        }
    }
    false
}

/// Tokenizes for the duplicate-overlap check: lowercase word tokens, no
/// length floor (unlike recall's query tokenizer).
fn overlap_tokens(text: &str) -> std::collections::HashSet<String> {
    static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9']+").unwrap());
    WORD.find_iter(&text.to_lowercase()).map(|m| m.as_str().to_string()).collect()
}

/// True if `b` (the candidate/input fact) shares at least 70% of its own
/// token set with `a` (a stored memory), used by the summarization worker
/// to skip facts that duplicate an existing memory (spec.md §4.6). The
/// denominator is always `b`'s token count, not whichever set is smaller —
/// otherwise a short stored memory fully contained in a much longer new
/// fact would be flagged at 100% overlap regardless of how much of the new
/// fact is actually novel.
pub fn is_near_duplicate(a: &str, b: &str) -> bool {
    let ta = overlap_tokens(a);
    let tb = overlap_tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return false;
    }
    let shared = ta.intersection(&tb).count();
    (shared as f64 / tb.len() as f64) >= 0.70
}

/// Redaction patterns applied to session checkpoint text before persistence
/// (spec.md §4.4): common secret-shaped substrings are replaced with a
/// fixed placeholder. Idempotent — redacting already-redacted text is a
/// no-op.
static REDACTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"sk-[A-Za-z0-9]{16,}").unwrap(), "[REDACTED]"),
        (Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9._-]+").unwrap(), "Bearer [REDACTED]"),
        (
            Regex::new(r"-----BEGIN [A-Z ]+PRIVATE KEY-----[\s\S]+?-----END [A-Z ]+PRIVATE KEY-----")
                .unwrap(),
            "[REDACTED]",
        ),
        (Regex::new(r"(?i)(password|api[_-]?key|secret)\s*[:=]\s*\S+").unwrap(), "$1=[REDACTED]"),
    ]
});

pub fn redact(text: &str) -> String {
    let mut out = text.to_string();
    for (re, replacement) in REDACTIONS.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out
}

/// Packs a float32 vector as little-endian bytes for the `embeddings.vector`
/// BLOB column.
pub fn pack_vector(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Inverse of `pack_vector`. Ignores a trailing partial element, which
/// should never occur for well-formed rows.
pub fn unpack_vector(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// Errors building or parsing a signable payload (spec.md §4.6).
#[derive(Debug, thiserror::Error)]
pub enum SignableError {
    #[error("field contains the reserved '|' separator")]
    ReservedSeparator,
    #[error("content hash must match ^[0-9a-f]+$")]
    InvalidContentHash,
    #[error("payload has the wrong number of fields for its version")]
    MalformedFields,
}

fn check_field(field: &str) -> Result<(), SignableError> {
    if field.contains('|') {
        Err(SignableError::ReservedSeparator)
    } else {
        Ok(())
    }
}

fn check_content_hash(hash: &str) -> Result<(), SignableError> {
    static HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]+$").unwrap());
    if HEX.is_match(hash) { Ok(()) } else { Err(SignableError::InvalidContentHash) }
}

/// Builds a v1 signable payload: `contentHash|createdAt|signerDid`.
pub fn signable_payload_v1(content_hash: &str, created_at: &str, signer_did: &str) -> Result<String, SignableError> {
    check_content_hash(content_hash)?;
    check_field(created_at)?;
    check_field(signer_did)?;
    Ok(format!("{content_hash}|{created_at}|{signer_did}"))
}

/// Builds a v2 signable payload: `v2|memoryId|contentHash|createdAt|signerDid`.
pub fn signable_payload_v2(
    memory_id: &str,
    content_hash: &str,
    created_at: &str,
    signer_did: &str,
) -> Result<String, SignableError> {
    check_field(memory_id)?;
    check_content_hash(content_hash)?;
    check_field(created_at)?;
    check_field(signer_did)?;
    Ok(format!("v2|{memory_id}|{content_hash}|{created_at}|{signer_did}"))
}

/// The parsed fields of a signable payload, either version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignablePayload {
    V1 { content_hash: String, created_at: String, signer_did: String },
    V2 { memory_id: String, content_hash: String, created_at: String, signer_did: String },
}

/// Parses a signable payload, requiring the `v2|` prefix for v2 and bare
/// fields for v1 (spec.md §4.6: "verification requires the v-prefix to
/// parse correctly").
pub fn parse_signable_payload(payload: &str) -> Result<SignablePayload, SignableError> {
    if let Some(rest) = payload.strip_prefix("v2|") {
        let parts: Vec<&str> = rest.split('|').collect();
        let [memory_id, content_hash, created_at, signer_did] = parts[..] else {
            return Err(SignableError::MalformedFields);
        };
        check_content_hash(content_hash)?;
        return Ok(SignablePayload::V2 {
            memory_id: memory_id.to_string(),
            content_hash: content_hash.to_string(),
            created_at: created_at.to_string(),
            signer_did: signer_did.to_string(),
        });
    }
    let parts: Vec<&str> = payload.split('|').collect();
    let [content_hash, created_at, signer_did] = parts[..] else {
        return Err(SignableError::MalformedFields);
    };
    check_content_hash(content_hash)?;
    Ok(SignablePayload::V1 {
        content_hash: content_hash.to_string(),
        created_at: created_at.to_string(),
        signer_did: signer_did.to_string(),
    })
}

/// Cosine similarity; returns 0.0 for a zero-norm vector rather than NaN.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_content("Use Postgres for sessions."), "use postgres for sessions");
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(content_hash("a"), content_hash("a"));
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn confirm_token_round_trips_within_bucket() {
        let secret = b"test-secret";
        let now = chrono::Utc::now();
        let token = confirm_token(secret, "digest", 30, time_bucket(now));
        assert!(verify_confirm_token(secret, "digest", 30, now, &token));
    }

    #[test]
    fn near_duplicate_detects_high_overlap() {
        assert!(is_near_duplicate(
            "the user prefers dark mode in the editor",
            "the user prefers dark mode in editor settings"
        ));
        assert!(!is_near_duplicate("completely unrelated sentence", "totally different content"));
    }

    #[test]
    fn redact_masks_api_keys_and_bearer_tokens() {
        let text = "key: sk-abcdefghijklmnopqrstuvwxyz and Bearer eyJhbGciOi.aaa.bbb";
        let redacted = redact(text);
        assert!(!redacted.contains("sk-abcdefghijklmnopqrstuvwxyz"));
        assert!(redacted.contains("Bearer [REDACTED]"));
    }

    #[test]
    fn signable_v1_round_trips() {
        let payload = signable_payload_v1("abc123", "2026-01-01T00:00:00Z", "did:key:abc").unwrap();
        match parse_signable_payload(&payload).unwrap() {
            SignablePayload::V1 { content_hash, created_at, signer_did } => {
                assert_eq!(content_hash, "abc123");
                assert_eq!(created_at, "2026-01-01T00:00:00Z");
                assert_eq!(signer_did, "did:key:abc");
            }
            SignablePayload::V2 { .. } => panic!("expected v1"),
        }
    }

    #[test]
    fn signable_v2_round_trips_and_is_distinguishable_from_v1() {
        let payload = signable_payload_v2("mem-1", "abc123", "2026-01-01T00:00:00Z", "did:key:abc").unwrap();
        assert!(payload.starts_with("v2|"));
        match parse_signable_payload(&payload).unwrap() {
            SignablePayload::V2 { memory_id, .. } => assert_eq!(memory_id, "mem-1"),
            SignablePayload::V1 { .. } => panic!("expected v2"),
        }
    }

    #[test]
    fn signable_rejects_pipe_in_field_and_non_hex_hash() {
        assert!(signable_payload_v1("abc123", "2026|01|01", "did:key:abc").is_err());
        assert!(signable_payload_v1("not-hex", "2026-01-01T00:00:00Z", "did:key:abc").is_err());
    }
}
