//! Module specifiers and relative path resolution.
//!
//! A [`ModuleSpecifier`] is the primary key for every stage of loading: the
//! fetcher, the dependency graph, the compile cache and the module registry
//! all index by it. Two specifiers are the same module exactly when their
//! normalized strings are equal.
//!
//! Resolution is a pure string algorithm over `/`-separated segments. It
//! deliberately keeps leading `..` segments that climb above the base, so a
//! page served from a nested directory can reach sibling trees:
//!
//! ```text
//! resolve_path("../../src/compose/Painter", "./index.ts") == "../../src/compose/Painter"
//! resolve_path("./synths/ISynth", "../../src/DataStructures") == "../../src/synths/ISynth"
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

/// File extensions that are fetched as-is without probing.
pub const EXPLICIT_EXTENSIONS: &[&str] = &["ts", "js", "tsx", "jsx"];

/// Normalized, absolute module identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleSpecifier(Arc<str>);

impl ModuleSpecifier {
    /// Parse an entry specifier.
    ///
    /// Absolute paths and URLs are kept verbatim; relative input is
    /// normalized against the page root.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LoaderError::InvalidSpecifier {
                specifier: raw.to_string(),
                reason: "specifier is empty".to_string(),
            });
        }
        Ok(Self(resolve_path(trimmed, "./").into()))
    }

    /// Resolve `raw` relative to the module at `base`.
    pub fn resolve(raw: &str, base: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(LoaderError::InvalidSpecifier {
                specifier: raw.to_string(),
                reason: format!("empty import inside '{base}'"),
            });
        }
        Ok(Self(resolve_path(raw.trim(), base).into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Extension of the last path segment, if it is one of the known
    /// explicit extensions.
    pub fn explicit_extension(&self) -> Option<&str> {
        extension_of(&self.0).filter(|ext| EXPLICIT_EXTENSIONS.contains(ext))
    }

    /// Candidate location with `ext` appended (`/src/a` + `ts` = `/src/a.ts`).
    pub fn with_appended_extension(&self, ext: &str) -> String {
        format!("{}.{}", self.0, ext)
    }
}

impl fmt::Display for ModuleSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleSpecifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ModuleSpecifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Returns the extension of the final path segment of `location`.
pub fn extension_of(location: &str) -> Option<&str> {
    let file = location.rsplit('/').next().unwrap_or(location);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// Whether `path` is already absolute (root-relative or an http(s) URL).
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.starts_with("http://") || path.starts_with("https://")
}

/// Resolve `path` against the module location `base`.
///
/// The last segment of `base` is treated as a file name and dropped unless
/// `base` ends with `/`. `..` pops the previous segment, or is kept when
/// there is nothing left to pop. `.` segments in `path` are dropped.
pub fn resolve_path(path: &str, base: &str) -> String {
    if is_absolute(path) {
        return path.to_string();
    }

    let mut parts: Vec<&str> = base.split('/').collect();
    if !base.ends_with('/') {
        parts.pop();
    }
    while parts.len() > 1 && parts.last() == Some(&"") {
        parts.pop();
    }

    for part in path.split('/').skip_while(|p| p.is_empty()) {
        if part == ".." && parts.last() != Some(&"..") {
            while parts.last() == Some(&".") {
                parts.pop();
            }
            match parts.as_slice() {
                [] => parts.push(".."),
                // `/..` is still the root.
                [""] => {}
                _ => {
                    parts.pop();
                }
            }
        } else if part != "." {
            parts.push(part);
        }
    }

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_resolve_path_table() {
        let cases = [
            ("../../src/compose/Painter", "./index.ts", "../../src/compose/Painter"),
            ("./synths/ISynth", "../../src/DataStructures", "../../src/synths/ISynth"),
            ("ServApi", "../../src/utils/YoutubeApi", "../../src/utils/ServApi"),
            ("./some/path/SomeModule.ts", "./index.ts", "./some/path/SomeModule.ts"),
            (
                "./some/path/SomeModule.ts",
                "./subDir/index.ts",
                "./subDir/some/path/SomeModule.ts",
            ),
            ("./index.ts", "./", "./index.ts"),
            ("./sub/dir/index.ts", "./", "./sub/dir/index.ts"),
            ("../../dir/index.ts", "./", "../../dir/index.ts"),
            ("./doStuff.ts", "./somePath/index.ts", "./somePath/doStuff.ts"),
            (
                "../stuffPackage/doStuff.ts",
                "../../somePath/index.ts",
                "../../stuffPackage/doStuff.ts",
            ),
        ];

        for (path, base, expected) in cases {
            assert_eq!(
                resolve_path(path, base),
                expected,
                "resolve_path({path:?}, {base:?})"
            );
        }
    }

    #[test]
    fn test_absolute_paths_pass_through() {
        assert_eq!(resolve_path("/lib/a.ts", "./x/index.ts"), "/lib/a.ts");
        assert_eq!(
            resolve_path("https://cdn.test/m.js", "./index.ts"),
            "https://cdn.test/m.js"
        );
    }

    #[test]
    fn test_resolve_against_url_base() {
        assert_eq!(
            resolve_path("../shared/util", "https://host.test/app/pages/home.ts"),
            "https://host.test/app/shared/util"
        );
        assert_eq!(resolve_path("./b", "/src/a.ts"), "/src/b");
        assert_eq!(resolve_path("./b", "/a.ts"), "/b");
        assert_eq!(resolve_path("../b", "/a.ts"), "/b");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            ModuleSpecifier::parse("  "),
            Err(LoaderError::InvalidSpecifier { .. })
        ));
        assert_eq!(ModuleSpecifier::parse("/src/main").unwrap().as_str(), "/src/main");
    }

    #[test]
    fn test_explicit_extension() {
        let spec = ModuleSpecifier::parse("/src/view.tsx").unwrap();
        assert_eq!(spec.explicit_extension(), Some("tsx"));

        let spec = ModuleSpecifier::parse("/src/model.v2").unwrap();
        assert_eq!(spec.explicit_extension(), None);

        let spec = ModuleSpecifier::parse("/src/.hidden/mod").unwrap();
        assert_eq!(spec.explicit_extension(), None);
        assert_eq!(spec.with_appended_extension("ts"), "/src/.hidden/mod.ts");
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,6}"
    }

    proptest! {
        #[test]
        fn prop_dot_free_path_joins_base_directory(
            dirs in prop::collection::vec(segment(), 0..4),
            names in prop::collection::vec(segment(), 1..4),
        ) {
            let mut base = String::from(".");
            for dir in &dirs {
                base.push('/');
                base.push_str(dir);
            }
            let dir = base.clone();
            base.push_str("/index.ts");

            let path = names.join("/");
            prop_assert_eq!(resolve_path(&path, &base), format!("{dir}/{path}"));
        }

        #[test]
        fn prop_parent_segment_pops_one_directory(
            dirs in prop::collection::vec(segment(), 1..5),
            name in segment(),
        ) {
            let base = format!("./{}/index.ts", dirs.join("/"));
            let parent = &dirs[..dirs.len() - 1];
            let expected = if parent.is_empty() {
                format!("./{name}")
            } else {
                format!("./{}/{name}", parent.join("/"))
            };

            prop_assert_eq!(resolve_path(&format!("../{name}"), &base), expected);
        }

        #[test]
        fn prop_no_dot_segments_after_first(
            dirs in prop::collection::vec(segment(), 0..4),
            path in prop::collection::vec(prop_oneof![Just(".".to_string()), segment()], 1..6),
        ) {
            let base = format!("./{}", dirs.iter().map(|d| format!("{d}/")).collect::<String>());
            let resolved = resolve_path(&path.join("/"), &base);
            prop_assert!(!resolved.split('/').skip(1).any(|p| p == "."));
        }
    }
}
