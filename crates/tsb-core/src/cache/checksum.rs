//! Source checksums using BLAKE3.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::compiler::CompileOptions;

/// Current cache format version. Increment when the cached value layout or
/// the generated code shape changes.
const CACHE_FORMAT_VERSION: u32 = 1;

/// Checksum of one module's source (BLAKE3 hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Hash of, in order:
    /// 1. Cache format version and crate version
    /// 2. Compile options
    /// 3. Raw source text
    pub fn compute(source: &str, options: &CompileOptions) -> Self {
        let mut hasher = Hasher::new();

        hasher.update(&CACHE_FORMAT_VERSION.to_le_bytes());
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(b"\0");

        hash_options(&mut hasher, options);

        hasher.update(source.as_bytes());

        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hash_options(hasher: &mut Hasher, options: &CompileOptions) {
    hasher.update(&[options.jsx as u8]);
    hasher.update(options.jsx_pragma.as_bytes());
    hasher.update(b"\0");
    hasher.update(options.jsx_pragma_frag.as_bytes());
    hasher.update(b"\0");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_deterministic() {
        let options = CompileOptions::default();
        assert_eq!(
            Checksum::compute("export const a = 1;", &options),
            Checksum::compute("export const a = 1;", &options)
        );
    }

    #[test]
    fn test_single_byte_change_changes_checksum() {
        let options = CompileOptions::default();
        assert_ne!(
            Checksum::compute("export const a = 1;", &options),
            Checksum::compute("export const a = 2;", &options)
        );
    }

    #[test]
    fn test_options_change_checksum() {
        let plain = CompileOptions::default();
        let jsx = CompileOptions::default().with_jsx(true);
        assert_ne!(Checksum::compute("x", &plain), Checksum::compute("x", &jsx));
    }

    #[test]
    fn test_hex_roundtrip() {
        let checksum = Checksum::compute("x", &CompileOptions::default());
        assert_eq!(checksum.as_hex().len(), 64);
        assert_eq!(Checksum::from_hex(checksum.as_hex()), checksum);
        assert_eq!(checksum.to_string(), checksum.as_hex());
    }
}
