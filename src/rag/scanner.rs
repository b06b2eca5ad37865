use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::core::config::DocsSettings;

/// Directories never descended into.
pub const EXCLUDED_DIRS: [&str; 9] = [
    "node_modules",
    ".next",
    ".git",
    "api",
    "target",
    "dist",
    "build",
    ".turbo",
    ".vercel",
];

/// One source file of the corpus. `path` is relative to the project root and
/// always uses forward slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub path: String,
    pub raw_text: String,
}

impl DocumentRecord {
    pub fn new(path: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            raw_text: raw_text.into(),
        }
    }
}

pub trait CorpusProvider: Send + Sync {
    /// Lazily yields every document; each call starts a fresh walk.
    fn scan(&self) -> Box<dyn Iterator<Item = DocumentRecord> + Send + '_>;

    /// Reads one document by root-relative path.
    fn read(&self, path: &str) -> Option<DocumentRecord>;

    /// Root-relative prefix of the documentation tree, e.g. `app`.
    fn docs_prefix(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct FsCorpus {
    root: PathBuf,
    dir: PathBuf,
    prefix: String,
    page_files_only: bool,
    extensions: Vec<String>,
}

impl FsCorpus {
    pub fn new(settings: &DocsSettings) -> Self {
        let prefix = settings
            .dir
            .strip_prefix(&settings.root)
            .map(to_slash_path)
            .unwrap_or_default();
        Self {
            root: settings.root.clone(),
            dir: settings.dir.clone(),
            prefix,
            page_files_only: settings.page_files_only,
            extensions: settings
                .extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(OsStr::to_str) else {
            return false;
        };
        let ext = format!(".{}", ext.to_lowercase());
        if !self.extensions.iter().any(|allowed| *allowed == ext) {
            return false;
        }
        if self.page_files_only {
            return path.file_stem().and_then(OsStr::to_str) == Some("page");
        }
        true
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(to_slash_path)
            .unwrap_or_else(|_| to_slash_path(path))
    }

    fn load(&self, path: &Path) -> Option<DocumentRecord> {
        match fs::read_to_string(path) {
            Ok(raw_text) => Some(DocumentRecord::new(self.relative(path), raw_text)),
            Err(e) => {
                tracing::warn!("Skipping unreadable file {}: {}", path.display(), e);
                None
            }
        }
    }
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| EXCLUDED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Rejects absolute paths and any `..` component.
pub fn is_safe_relative(path: &str) -> bool {
    let candidate = Path::new(path);
    !candidate.is_absolute()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

impl CorpusProvider for FsCorpus {
    fn scan(&self) -> Box<dyn Iterator<Item = DocumentRecord> + Send + '_> {
        let walker = WalkDir::new(&self.dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_excluded(entry));

        Box::new(walker.filter_map(move |entry| match entry {
            Ok(entry) if entry.file_type().is_file() && self.accepts(entry.path()) => {
                self.load(entry.path())
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        }))
    }

    fn read(&self, path: &str) -> Option<DocumentRecord> {
        if !is_safe_relative(path) {
            return None;
        }
        let full = self.root.join(path);
        if !full.is_file() || !self.accepts(&full) {
            return None;
        }
        self.load(&full)
    }

    fn docs_prefix(&self) -> &str {
        &self.prefix
    }
}

/// Fixed set of documents held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    prefix: String,
    documents: Vec<DocumentRecord>,
}

impl MemoryCorpus {
    pub fn new(prefix: impl Into<String>, documents: Vec<DocumentRecord>) -> Self {
        Self {
            prefix: prefix.into(),
            documents,
        }
    }
}

impl CorpusProvider for MemoryCorpus {
    fn scan(&self) -> Box<dyn Iterator<Item = DocumentRecord> + Send + '_> {
        Box::new(self.documents.iter().cloned())
    }

    fn read(&self, path: &str) -> Option<DocumentRecord> {
        if !is_safe_relative(path) {
            return None;
        }
        self.documents.iter().find(|d| d.path == path).cloned()
    }

    fn docs_prefix(&self) -> &str {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, text).expect("write");
    }

    fn settings(root: &Path, page_files_only: bool) -> DocsSettings {
        DocsSettings {
            dir: root.join("app"),
            root: root.to_path_buf(),
            page_files_only,
            extensions: vec![".ts".into(), ".tsx".into(), ".js".into(), ".jsx".into()],
        }
    }

    #[test]
    fn scan_filters_extensions_and_denylisted_dirs() {
        let tmp = TempDir::new().expect("tempdir");
        write(tmp.path(), "app/page.tsx", "root");
        write(tmp.path(), "app/b/page.TSX", "upper");
        write(tmp.path(), "app/a/page.ts", "a");
        write(tmp.path(), "app/a/notes.md", "skip");
        write(tmp.path(), "app/a/helper.tsx", "helper");
        write(tmp.path(), "app/api/rag/route.ts", "skip");
        write(tmp.path(), "app/node_modules/x/page.tsx", "skip");
        write(tmp.path(), "app/.next/page.js", "skip");

        let corpus = FsCorpus::new(&settings(tmp.path(), false));
        let paths: Vec<String> = corpus.scan().map(|d| d.path).collect();
        assert_eq!(
            paths,
            vec![
                "app/a/helper.tsx".to_string(),
                "app/a/page.ts".to_string(),
                "app/b/page.TSX".to_string(),
                "app/page.tsx".to_string(),
            ]
        );
        assert_eq!(corpus.docs_prefix(), "app");
    }

    #[test]
    fn page_files_only_keeps_page_modules() {
        let tmp = TempDir::new().expect("tempdir");
        write(tmp.path(), "app/a/page.tsx", "a");
        write(tmp.path(), "app/a/helper.tsx", "helper");

        let corpus = FsCorpus::new(&settings(tmp.path(), true));
        let paths: Vec<String> = corpus.scan().map(|d| d.path).collect();
        assert_eq!(paths, vec!["app/a/page.tsx".to_string()]);
    }

    #[test]
    fn missing_docs_dir_yields_nothing() {
        let tmp = TempDir::new().expect("tempdir");
        let corpus = FsCorpus::new(&settings(tmp.path(), true));
        assert_eq!(corpus.scan().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_files_are_skipped() {
        let tmp = TempDir::new().expect("tempdir");
        write(tmp.path(), "app/a/page.tsx", "ok");
        // invalid UTF-8 fails read_to_string
        let bad = tmp.path().join("app/b/page.tsx");
        fs::create_dir_all(bad.parent().expect("parent")).expect("mkdir");
        fs::write(&bad, [0xff, 0xfe, 0xfd]).expect("write");

        let corpus = FsCorpus::new(&settings(tmp.path(), true));
        let docs: Vec<DocumentRecord> = corpus.scan().collect();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].raw_text, "ok");
    }

    #[test]
    fn read_rejects_traversal() {
        let tmp = TempDir::new().expect("tempdir");
        write(tmp.path(), "app/a/page.tsx", "a");
        let corpus = FsCorpus::new(&settings(tmp.path(), true));

        assert!(corpus.read("app/a/page.tsx").is_some());
        assert!(corpus.read("app/../app/a/page.tsx").is_none());
        assert!(corpus.read("/etc/passwd").is_none());
        assert!(corpus.read("app/missing/page.tsx").is_none());
    }
}
