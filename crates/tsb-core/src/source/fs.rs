use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use path_clean::PathClean;

use super::{ContentSource, RetrievalError, RetrievalResult};

/// Serves locations from a directory on disk.
///
/// Root-relative (`/src/a.ts`) and page-relative (`./src/a.ts`) locations
/// both map under `root`. Locations that would escape `root` after
/// normalization are refused.
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into().clean(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a location onto a path under the root.
    pub fn path_for(&self, location: &str) -> RetrievalResult<PathBuf> {
        if location.contains("://") {
            return Err(RetrievalError::AccessDenied(format!(
                "'{location}' is not a local location"
            )));
        }

        let relative = Path::new(location.trim_start_matches('/')).clean();
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(RetrievalError::AccessDenied(format!(
                "'{location}' escapes {}",
                self.root.display()
            )));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentSource for FsSource {
    async fn retrieve(&self, location: &str) -> RetrievalResult<String> {
        let path = self.path_for(location)?;

        tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RetrievalError::NotFound
            } else {
                RetrievalError::Transport(format!("failed to read {}: {}", path.display(), e))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_root_and_page_relative_locations() {
        let dir = TempDir::new().unwrap();
        tokio::fs::create_dir_all(dir.path().join("src")).await.unwrap();
        tokio::fs::write(dir.path().join("src/a.ts"), "export const a = 1;")
            .await
            .unwrap();

        let source = FsSource::new(dir.path());
        assert_eq!(source.retrieve("/src/a.ts").await.unwrap(), "export const a = 1;");
        assert_eq!(source.retrieve("./src/a.ts").await.unwrap(), "export const a = 1;");
        assert_eq!(source.retrieve("/src/b.ts").await, Err(RetrievalError::NotFound));
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let source = FsSource::new(dir.path().join("public"));

        assert!(matches!(
            source.retrieve("../secret.ts").await,
            Err(RetrievalError::AccessDenied(_))
        ));
        assert!(matches!(
            source.retrieve("/src/../../secret.ts").await,
            Err(RetrievalError::AccessDenied(_))
        ));
        assert!(matches!(
            source.retrieve("https://example.test/a.ts").await,
            Err(RetrievalError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_inner_parent_segments_are_collapsed() {
        let source = FsSource::new("/srv/site");
        assert_eq!(
            source.path_for("/src/lib/../a.ts").unwrap(),
            PathBuf::from("/srv/site/src/a.ts")
        );
    }
}
