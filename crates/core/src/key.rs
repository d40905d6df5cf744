//! Storage keys and reference normalization.
//!
//! A [`StorageKey`] is the canonical identifier of one object in the blob
//! store. Per-owner categories use the shape
//! `{category}/{ownerId}/{year}/{month}/{uniqueSuffix}.{ext}` (e.g. `photo`,
//! `profile`); shared categories live under `global/{namespace}/...`.
//!
//! Relational rows embed references in inconsistent shapes: bare keys,
//! public-facing URLs, and percent-encoded variants of either. The
//! [`Normalizer`] collapses all of them into one comparable key so the
//! reconciler never compares an encoded form against a decoded one.

use crate::error::{Error, Result};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trust/visibility scope implied by a key's category prefix.
///
/// `global/` keys are world-readable; everything else is readable only by
/// its owner. The access-control boundary enforces this; the reconciliation
/// core only uses it to keep keys from being compared across scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyScope {
    /// Per-owner key (`photo/...`, `profile/...`).
    Owner,
    /// Shared key under `global/`.
    Global,
}

/// A canonical, comparable storage key.
///
/// Only a [`Normalizer`] produces these; holding a `StorageKey` is proof the
/// underlying string has been decoded, collapsed, and traversal-checked.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Scope implied by the category prefix.
    pub fn scope(&self) -> KeyScope {
        match self.category() {
            "global" => KeyScope::Global,
            _ => KeyScope::Owner,
        }
    }

    /// First path segment (`photo`, `profile`, `global`, ...).
    pub fn category(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    /// Owner UUID embedded in per-owner keys, when present and parseable.
    ///
    /// Returns `None` for `global/` keys and for legacy keys whose owner
    /// segment is not a UUID.
    pub fn owner_id(&self) -> Option<Uuid> {
        if self.scope() == KeyScope::Global {
            return None;
        }
        let segment = self.0.split('/').nth(1)?;
        Uuid::parse_str(segment).ok()
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalizes stored references (URLs or raw keys) into [`StorageKey`]s.
#[derive(Clone, Debug, Default)]
pub struct Normalizer {
    /// Public URL prefixes to strip, longest first.
    public_prefixes: Vec<String>,
}

impl Normalizer {
    /// Create a normalizer that strips the given public URL prefixes
    /// (e.g. `https://cdn.example.com/storage/`).
    pub fn new<I, S>(public_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut public_prefixes: Vec<String> =
            public_prefixes.into_iter().map(Into::into).collect();
        // Longest-prefix match wins when one base URL is a prefix of another.
        public_prefixes.sort_by_key(|p| std::cmp::Reverse(p.len()));
        Self { public_prefixes }
    }

    /// Canonicalize a stored reference into a [`StorageKey`].
    ///
    /// Strips a known public URL prefix if present, percent-decodes exactly
    /// once, collapses duplicate path separators, and rejects empty results
    /// and parent-directory traversal. Idempotent: feeding a normalized key
    /// back in yields the same key.
    pub fn normalize(&self, reference: &str) -> Result<StorageKey> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(Error::MalformedReference("empty reference".to_string()));
        }

        let stripped = self
            .public_prefixes
            .iter()
            .find_map(|prefix| trimmed.strip_prefix(prefix.as_str()))
            .unwrap_or(trimmed);

        let decoded = percent_decode_str(stripped)
            .decode_utf8()
            .map_err(|e| {
                Error::MalformedReference(format!("invalid percent-encoding in {stripped:?}: {e}"))
            })?
            .into_owned();

        // Decode exactly once: a residual escape after decoding (e.g. from a
        // double-encoded reference) would change meaning on a second pass,
        // so it is rejected instead of decoded again. This is what makes
        // normalize(normalize(x)) == normalize(x) hold.
        if decoded.contains('%') {
            return Err(Error::MalformedReference(format!(
                "residual percent-encoding after decoding: {decoded:?}"
            )));
        }

        Self::assemble(&decoded, reference)
    }

    /// Canonicalize a key reported by a blob-store listing.
    ///
    /// Listed keys are already raw storage keys, not references: no public
    /// URL prefix is stripped and no percent-decoding happens, so an object
    /// legitimately named with a literal `%` keeps its name. Separator
    /// collapse and traversal rejection still apply.
    pub fn normalize_listed(&self, key: &str) -> Result<StorageKey> {
        Self::assemble(key, key)
    }

    fn assemble(decoded: &str, original: &str) -> Result<StorageKey> {
        if decoded.contains('\\') {
            return Err(Error::MalformedReference(format!(
                "backslash in reference: {decoded:?}"
            )));
        }

        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                // Collapse duplicate separators and ignore self-references.
                "" | "." => continue,
                ".." => {
                    return Err(Error::MalformedReference(format!(
                        "parent-directory traversal in reference: {decoded:?}"
                    )));
                }
                _ => segments.push(segment),
            }
        }

        if segments.is_empty() {
            return Err(Error::MalformedReference(format!(
                "reference reduces to an empty key: {original:?}"
            )));
        }

        Ok(StorageKey(segments.join("/")))
    }
}
