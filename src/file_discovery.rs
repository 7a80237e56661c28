use crate::error::{Result, ValidatorError};
use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Finds the documents to validate under the paths given on the command line
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    /// File extensions to include (e.g., ["xml", "ubl"])
    extensions: Vec<String>,
    /// Include patterns (glob syntax)
    include_patterns: Vec<String>,
    /// Exclude patterns (glob syntax)
    exclude_patterns: Vec<String>,
    /// Maximum depth for directory traversal (None = unlimited)
    max_depth: Option<usize>,
    /// Follow symbolic links
    follow_symlinks: bool,
}

impl FileDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xml".to_string()],
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_depth: None,
            follow_symlinks: false,
        }
    }

    /// Set file extensions to discover
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_include_patterns(mut self, patterns: Vec<String>) -> Self {
        self.include_patterns = patterns;
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.exclude_patterns = patterns;
        self
    }

    /// Set maximum traversal depth
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set whether to follow symbolic links
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Discover files under every path, keeping argument order.
    ///
    /// A path naming a file is taken as is; directories are walked.
    pub fn discover_all(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in paths {
            files.extend(self.discover_files(path)?);
        }
        Ok(files)
    }

    /// Discover files in the given path (file or directory), sorted
    pub fn discover_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let metadata = std::fs::metadata(path)?;
        if metadata.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }

        let overrides = self.overrides(path)?;
        let mut builder = WalkBuilder::new(path);
        builder
            .max_depth(self.max_depth)
            .follow_links(self.follow_symlinks)
            .overrides(overrides)
            .sort_by_file_path(|a, b| a.cmp(b));

        let mut files = Vec::new();
        for entry in builder.build() {
            match entry {
                Ok(entry) => {
                    let is_file = entry.file_type().is_some_and(|t| t.is_file());
                    if is_file && self.has_extension(entry.path()) {
                        files.push(entry.into_path());
                    }
                }
                // Log error but continue processing other files
                Err(e) => warn!(root = %path.display(), error = %e, "skipping entry"),
            }
        }

        Ok(files)
    }

    fn overrides(&self, root: &Path) -> Result<Override> {
        let mut builder = OverrideBuilder::new(root);
        let patterns = self
            .include_patterns
            .iter()
            .cloned()
            .chain(self.exclude_patterns.iter().map(|p| format!("!{}", p)));

        for pattern in patterns {
            builder
                .add(&pattern)
                .map_err(|e| ValidatorError::FileSystemTraversal {
                    path: root.to_path_buf(),
                    reason: format!("Invalid glob pattern '{}': {}", pattern, e),
                })?;
        }

        builder
            .build()
            .map_err(|e| ValidatorError::FileSystemTraversal {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Check the extension against the configured list (case-insensitive)
    pub fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new()
    }
}
