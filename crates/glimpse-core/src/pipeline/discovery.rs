//! Library walking: which files under a root are candidate photos.
//!
//! Hidden entries (dot-prefixed, like `.thumbnails` or `.DS_Store`) are
//! skipped, and excluded trees are pruned without being descended into.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::{DirEntry, WalkDir};

pub struct FileDiscovery {
    extensions: Vec<String>,
    excluded: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
    /// Last modification time, if the filesystem reports one
    pub modified: Option<SystemTime>,
}

impl DiscoveredFile {
    /// Containing folder, as registered in the catalog.
    pub fn folder(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }
}

impl FileDiscovery {
    /// `extensions` may be given with or without dots, in any case.
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .collect(),
            excluded: Vec::new(),
        }
    }

    /// Never descend into `dir` (e.g. a thumbnail root inside the library).
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let dir = dir.canonicalize().unwrap_or(dir);
        self.excluded.push(dir);
        self
    }

    /// Supported files under `root`, ordered folder by folder.
    ///
    /// A `root` that is itself a supported file yields just that file.
    pub fn discover(&self, root: &Path) -> Vec<DiscoveredFile> {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || self.should_enter(e));

        let mut files: Vec<DiscoveredFile> = walker
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && self.is_supported(e.path()))
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                Some(DiscoveredFile {
                    path: e.into_path(),
                    size: meta.len(),
                    modified: meta.modified().ok(),
                })
            })
            .collect();

        // walkdir interleaves files and subfolders; keep each folder's files together
        files.sort_by(|a, b| a.folder().cmp(b.folder()).then(a.path.cmp(&b.path)));
        files
    }

    fn should_enter(&self, entry: &DirEntry) -> bool {
        if is_hidden(entry) {
            return false;
        }
        if !entry.file_type().is_dir() || self.excluded.is_empty() {
            return true;
        }
        let path = entry.path();
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        !self.excluded.iter().any(|x| *x == path)
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    pub fn total_size(files: &[DiscoveredFile]) -> u64 {
        files.iter().map(|f| f.size).sum()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
