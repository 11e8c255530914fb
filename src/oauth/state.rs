//! Anti-forgery state tokens for the redirect round-trip
//!
//! A state token is an HMAC-SHA256 digest over the canonical encoding of a
//! small set of request attributes, keyed by a per-provider salt. The token
//! is self-verifying: given the same name, attributes, and salt, the digest
//! recomputes to the same value, so no server-side state storage is needed.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Derive a state token.
///
/// The attributes are merged with `{ "name": name }`, encoded in key order
/// as a form-urlencoded query string, and digested with HMAC-SHA256 keyed
/// by `salt`. The result is the hex digest.
///
/// Derivation is pure and total: the same inputs always produce the same
/// token, and no combination of inputs fails.
///
/// # Arguments
///
/// * `name` - Logical name bound into the token (typically the provider slot).
/// * `info` - Request attributes to bind.
/// * `salt` - HMAC key.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use authgate::oauth::state;
///
/// let mut info = BTreeMap::new();
/// info.insert("response_type".to_string(), "code".to_string());
///
/// let a = state::derive("github", &info, "salt");
/// let b = state::derive("github", &info, "salt");
/// assert_eq!(a, b);
/// ```
pub fn derive(name: &str, info: &BTreeMap<String, String>, salt: &str) -> String {
    let payload = canonical_query(name, info);
    // HMAC accepts keys of any length, so new_from_slice cannot fail here.
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a state token in constant time.
///
/// Recomputes the digest for `(name, info, salt)` and compares it against
/// the hex-decoded candidate with a constant-time comparison. A candidate
/// that is not valid hex fails verification; nothing panics.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use authgate::oauth::state;
///
/// let info = BTreeMap::new();
/// let token = state::derive("github", &info, "salt");
/// assert!(state::verify("github", &token, &info, "salt"));
/// assert!(!state::verify("github", &token, &info, "other-salt"));
/// ```
pub fn verify(name: &str, state: &str, info: &BTreeMap<String, String>, salt: &str) -> bool {
    let candidate = match hex::decode(state) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let payload = canonical_query(name, info);
    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload.as_bytes());
    mac.verify_slice(&candidate).is_ok()
}

/// Canonical sorted-by-key query-string encoding of `info` plus the name.
fn canonical_query(name: &str, info: &BTreeMap<String, String>) -> String {
    let mut merged = info.clone();
    merged.insert("name".to_string(), name.to_string());

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in &merged {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
