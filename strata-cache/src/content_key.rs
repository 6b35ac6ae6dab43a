//! Content-derived schema identity.
//!
//! Two independently opened schemas share cached state iff their content
//! keys are equal. Equality is strictly textual: the key is a digest of a
//! canonicalized attribute string, so semantically equivalent but textually
//! different schemas do NOT share.

use sha2::{Digest, Sha256};
use std::fmt;
use strata_core::SchemaProperties;

/// Globally unique identity for the metadata content of a schema.
///
/// Derived from the inline catalog content when the connection supplies it
/// (or declares a dynamic schema processor, which means the URL's bytes are
/// not the effective content), otherwise from the catalog URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    /// Derive the content key for a schema.
    ///
    /// `catalog_url` locates the schema definition; `catalog_contents` is the
    /// effective definition text, used only when the connection properties
    /// mark the content as inline or dynamically produced.
    pub fn create(
        properties: &SchemaProperties,
        catalog_url: &str,
        catalog_contents: &str,
    ) -> Self {
        let mut buf = String::new();
        if properties.has_inline_content() {
            attribute_value(&mut buf, "catalogStr", catalog_contents);
        } else {
            attribute_value(&mut buf, "catalog", catalog_url);
        }

        let mut hasher = Sha256::new();
        hasher.update(buf.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// The hex-encoded digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append one `name='value';` attribute with deterministic escaping.
/// Single quotes in the value are doubled.
fn attribute_value(buf: &mut String, name: &str, value: &str) {
    buf.push_str(name);
    buf.push_str("='");
    for ch in value.chars() {
        if ch == '\'' {
            buf.push('\'');
        }
        buf.push(ch);
    }
    buf.push_str("';");
}
