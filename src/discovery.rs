//! Recursive discovery of XML files to feed the pool.

use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

/// Walks a directory tree collecting files whose extension matches.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    extensions: Vec<String>,
    follow_symlinks: bool,
    max_depth: Option<usize>,
}

impl FileDiscovery {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            follow_symlinks: false,
            max_depth: None,
        }
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|wanted| wanted == ext))
            .unwrap_or(false)
    }

    /// Collects matching files under `root` (or `root` itself when it is a
    /// file). Unreadable entries are logged and skipped; results come back
    /// sorted for deterministic reports.
    pub fn discover(&self, root: &Path) -> io::Result<Vec<PathBuf>> {
        let metadata = std::fs::metadata(root)?;
        if metadata.is_file() {
            return Ok(if self.matches(root) {
                vec![root.to_path_buf()]
            } else {
                Vec::new()
            });
        }

        let mut files = Vec::new();
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(self.follow_symlinks)
            .max_depth(self.max_depth)
            .build();

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let is_file = entry
                        .file_type()
                        .map(|file_type| file_type.is_file())
                        .unwrap_or(false);
                    if is_file && self.matches(entry.path()) {
                        files.push(entry.path().to_path_buf());
                    }
                }
                Err(err) => {
                    tracing::warn!("skipping unreadable entry: {err}");
                }
            }
        }

        files.sort();
        Ok(files)
    }
}
