//! Request signing for the payment gateway.
//!
//! The gateway's scheme: drop `hash` and empty values, sort by key, join as
//! `k=v&k=v`, append the app secret, MD5, lowercase hex.

use md5::{Digest, Md5};
use std::fmt;
use subtle::ConstantTimeEq;

/// Name of the signature field in both directions.
pub const HASH_FIELD: &str = "hash";

const DIGEST_HEX_LEN: usize = 32;

/// Ordered parameter list for one gateway call.
///
/// Built once per operation; the exact same pairs are signed and then sent,
/// with the `hash` pair appended last by [`SignedParams::into_form`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedParams {
    pairs: Vec<(String, String)>,
}

impl SignedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Form body to post: the signed pairs followed by `hash`.
    pub fn into_form(mut self, hash: String) -> Vec<(String, String)> {
        self.pairs.push((HASH_FIELD.to_string(), hash));
        self.pairs
    }
}

#[derive(Clone)]
pub struct Signer {
    secret: String,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("secret", &"<redacted>").finish()
    }
}

impl Signer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Lowercase hex MD5 over the canonical parameter string plus secret.
    pub fn sign<'a, I>(&self, params: I) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut input = canonical_string(params);
        input.push_str(&self.secret);
        hex::encode(Md5::digest(input.as_bytes()))
    }

    /// Recomputes the signature and compares it in constant time.
    ///
    /// The comparison is exact: the gateway sends lowercase hex, so a digest
    /// differing only in letter case does not verify.
    pub fn verify<'a, I>(&self, params: I, candidate: &str) -> bool
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let candidate = candidate.trim();
        if candidate.len() != DIGEST_HEX_LEN {
            return false;
        }
        let expected = self.sign(params);
        expected.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

fn canonical_string<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = params
        .into_iter()
        .filter(|(k, v)| *k != HASH_FIELD && !v.is_empty())
        .collect();
    pairs.sort_unstable();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
