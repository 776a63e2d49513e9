//! Cache key namespacing and content addressing

use std::fmt;

use sha2::{Digest, Sha256};

/// Namespace applied transparently to every key
///
/// Callers work with bare keys; the key space adds the configured prefix on the
/// way in and strips it on the way out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the fully-qualified backend key
    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Returns a backend glob pattern confined to this key space
    pub fn pattern(&self, pattern: &str) -> String {
        format!("{}{}", escape_glob(&self.prefix), pattern)
    }

    /// Strips the prefix from a backend key, if it belongs to this key space
    pub fn strip<'a>(&self, full_key: &'a str) -> Option<&'a str> {
        full_key.strip_prefix(self.prefix.as_str())
    }
}

/// Encodes the key separator so a component never spans two key segments
fn encode_segment(input: &str) -> String {
    input.replace('%', "%25").replace(':', "%3A")
}

/// Escapes glob metacharacters so a literal prefix can head a SCAN/KEYS pattern
fn escape_glob(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());

    for c in input.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

/// SHA-256 hex digest of the given text
pub fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Key of a cached embedding, scoped by provider and model
///
/// Vectors from different embedding spaces never share a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorKey {
    pub provider: String,
    pub model: String,
    pub text_hash: String,
}

impl VectorKey {
    pub const NAMESPACE: &'static str = "vector";

    pub fn new(provider: impl Into<String>, model: impl Into<String>, text: &str) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            text_hash: text_hash(text),
        }
    }

    /// Pattern matching every vector of one provider/model pair
    pub fn scope_pattern(provider: &str, model: &str) -> String {
        format!(
            "{}:{}:{}:*",
            Self::NAMESPACE,
            escape_glob(&encode_segment(provider)),
            escape_glob(&encode_segment(model))
        )
    }
}

impl fmt::Display for VectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            Self::NAMESPACE,
            encode_segment(&self.provider),
            encode_segment(&self.model),
            self.text_hash
        )
    }
}
