use std::sync::Arc;

use serde::Serialize;

use super::extractor::ContentExtractor;
use super::scanner::{CorpusProvider, DocumentRecord};
use crate::core::errors::ApiError;

const PAGE_FILES: [&str; 4] = ["page.tsx", "page.ts", "page.jsx", "page.js"];

/// A documentation page rebuilt from its source module.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocPage {
    pub uri: String,
    pub name: String,
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocSummary {
    pub name: String,
    pub path: String,
    pub uri: String,
}

impl From<DocPage> for DocSummary {
    fn from(page: DocPage) -> Self {
        Self {
            name: page.name,
            path: page.path,
            uri: page.uri,
        }
    }
}

/// `docs://<page directory relative to the docs dir>`, `docs:///` for the
/// docs root itself.
pub fn page_uri(path: &str, docs_prefix: &str) -> String {
    let dir = match path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    let relative = if docs_prefix.is_empty() {
        dir
    } else if dir == docs_prefix {
        ""
    } else {
        dir.strip_prefix(&format!("{}/", docs_prefix)).unwrap_or(dir)
    };
    if relative.is_empty() {
        "docs:///".to_string()
    } else {
        format!("docs://{}", relative)
    }
}

/// Text of the first level-one markdown heading.
pub fn page_title(content: &str) -> String {
    content
        .lines()
        .filter_map(|line| line.strip_prefix('#'))
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim)
        .find(|title| !title.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Untitled".to_string())
}

fn is_page_file(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    PAGE_FILES.contains(&name.to_lowercase().as_str())
}

/// Paths to try for a caller-supplied page reference, most specific first.
fn candidate_paths(raw: &str, docs_prefix: &str) -> Vec<String> {
    let trimmed = raw
        .trim()
        .trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches('/');

    let rooted = if docs_prefix.is_empty()
        || trimmed == docs_prefix
        || trimmed.starts_with(&format!("{}/", docs_prefix))
    {
        trimmed.to_string()
    } else if trimmed.is_empty() {
        docs_prefix.to_string()
    } else {
        format!("{}/{}", docs_prefix, trimmed)
    };

    if is_page_file(&rooted) {
        return vec![rooted];
    }
    PAGE_FILES
        .iter()
        .map(|file| {
            if rooted.is_empty() {
                file.to_string()
            } else {
                format!("{}/{}", rooted, file)
            }
        })
        .collect()
}

#[derive(Clone)]
pub struct DocsCatalog {
    corpus: Arc<dyn CorpusProvider>,
    extractor: Arc<ContentExtractor>,
}

impl DocsCatalog {
    pub fn new(corpus: Arc<dyn CorpusProvider>, extractor: Arc<ContentExtractor>) -> Self {
        Self { corpus, extractor }
    }

    fn page_of(&self, document: &DocumentRecord) -> DocPage {
        let content = self.extractor.extract(&document.raw_text).join("\n\n");
        DocPage {
            uri: page_uri(&document.path, self.corpus.docs_prefix()),
            name: page_title(&content),
            path: document.path.clone(),
            content,
        }
    }

    /// Every page, optionally narrowed to paths containing `directory`.
    pub async fn list(&self, directory: Option<&str>) -> Result<Vec<DocSummary>, ApiError> {
        let catalog = self.clone();
        let filter = directory
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        tokio::task::spawn_blocking(move || {
            catalog
                .corpus
                .scan()
                .filter(|doc| is_page_file(&doc.path))
                .filter(|doc| match &filter {
                    Some(dir) => doc.path.contains(dir.as_str()),
                    None => true,
                })
                .map(|doc| DocSummary::from(catalog.page_of(&doc)))
                .collect()
        })
        .await
        .map_err(ApiError::internal)
    }

    /// Looks a page up by path; a miss is `Ok(None)`.
    pub async fn get(&self, path: &str) -> Result<Option<DocPage>, ApiError> {
        if path.split(['/', '\\']).any(|part| part == "..") {
            return Ok(None);
        }
        let candidates = candidate_paths(path, self.corpus.docs_prefix());
        let catalog = self.clone();

        tokio::task::spawn_blocking(move || {
            candidates
                .iter()
                .find_map(|candidate| catalog.corpus.read(candidate))
                .map(|doc| catalog.page_of(&doc))
        })
        .await
        .map_err(ApiError::internal)
    }
}
