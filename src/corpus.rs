use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use rayon::prelude::*;
use regex::Regex;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use crate::anchor::collect_anchors;
use crate::config::Config;
use crate::error::{Error, Result};

static FRONTMATTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A---[ \t]*\r?\n(.*?)\r?\n---[ \t]*(?:\r?\n|\z)").expect("frontmatter pattern")
});

/// A document of the corpus, identified by its corpus-relative path
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,  // e.g. "security/policy.md"
    pub text: String,
    pub frontmatter: Option<serde_yaml::Mapping>,
    pub modified: Option<DateTime<Utc>>,
    pub anchors: AHashSet<String>,
}

impl Document {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            path: path.into(),
            frontmatter: parse_frontmatter(&text),
            anchors: collect_anchors(&text),
            modified: None,
            text,
        }
    }

    /// Corpus-relative directory, empty for documents at the root
    pub fn dir(&self) -> &str {
        parent_dir(&self.path)
    }
}

pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Leading `---` block as a YAML mapping; absent or malformed yields `None`
pub fn parse_frontmatter(text: &str) -> Option<serde_yaml::Mapping> {
    let body = FRONTMATTER_RE.captures(text)?.get(1)?;
    serde_yaml::from_str::<serde_yaml::Mapping>(body.as_str()).ok()
}

/// A file that was found but could not be read
#[derive(Debug, Clone)]
pub struct ReadFailure {
    pub path: String,
    pub message: String,
}

/// Result of looking a canonical path up in the index
#[derive(Debug)]
pub enum Lookup<'a> {
    Found(&'a Document),
    /// Only a case-insensitive match exists; carries the real document
    CaseMismatch(&'a Document),
    /// A non-document file (image, PDF, ...) with exactly this path
    Asset,
    Missing,
}

/// Every document of the corpus, with exact and case-folded lookup.
/// Built once per run and read-only afterwards.
#[derive(Debug, Default)]
pub struct CorpusIndex {
    root: PathBuf,
    documents: Vec<Document>,
    exact: AHashMap<String, usize>,
    folded: AHashMap<String, usize>,
    assets: AHashSet<String>,
    failures: Vec<ReadFailure>,
}

/// Corpus-relative path with `/` separators
pub fn relative_path(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn build_excludes(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

impl CorpusIndex {
    /// Walk the corpus root and read every document.
    ///
    /// Fails only if the root itself is missing. Files that cannot be read
    /// are recorded in [`CorpusIndex::failures`] and skipped.
    pub fn build(config: &Config) -> Result<Self> {
        let root = config.root.clone();
        if !root.is_dir() {
            return Err(Error::CorpusRootMissing(root));
        }

        let excludes = build_excludes(&config.exclude)?;
        let source_ext = config.source_ext.to_lowercase();

        let mut builder = WalkBuilder::new(&root);
        builder.hidden(true).git_ignore(true).git_global(true);
        let filter_root = root.clone();
        let filter_set = excludes;
        builder.filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            let rel = relative_path(entry.path(), &filter_root);
            !(filter_set.is_match(name.as_ref())
                || rel.is_some_and(|rel| filter_set.is_match(rel.as_str())))
        });

        let mut document_paths: Vec<(PathBuf, String)> = Vec::new();
        let mut assets = AHashSet::new();

        for entry in builder.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let path = entry.path();
            let Some(rel) = relative_path(path, &root) else {
                continue;
            };

            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();

            if ext == source_ext {
                document_paths.push((path.to_path_buf(), rel));
            } else {
                assets.insert(rel);
            }
        }

        let loaded: Vec<std::result::Result<Document, ReadFailure>> = document_paths
            .par_iter()
            .map(|(path, rel)| load_document(path, rel))
            .collect();

        let mut documents = Vec::new();
        let mut failures = Vec::new();
        for result in loaded {
            match result {
                Ok(doc) => documents.push(doc),
                Err(failure) => {
                    log::warn!("could not read {}: {}", failure.path, failure.message);
                    failures.push(failure);
                }
            }
        }

        log::debug!(
            "indexed {} documents, {} other files, {} unreadable",
            documents.len(),
            assets.len(),
            failures.len()
        );

        let mut index = Self::from_documents(documents);
        index.root = root;
        index.assets = assets;
        index.failures = failures;
        Ok(index)
    }

    /// Build the lookup tables over already-loaded documents
    pub fn from_documents(mut documents: Vec<Document>) -> Self {
        documents.sort_by(|a, b| a.path.cmp(&b.path));

        let mut exact = AHashMap::with_capacity(documents.len());
        let mut folded = AHashMap::with_capacity(documents.len());
        for (i, doc) in documents.iter().enumerate() {
            exact.insert(doc.path.clone(), i);
            folded.entry(doc.path.to_lowercase()).or_insert(i);
        }
        // `README.MD` is also reachable as `README.md`, the spelling the
        // resolver produces for `README.html`
        for (i, doc) in documents.iter().enumerate() {
            exact.entry(lowercase_extension(&doc.path)).or_insert(i);
        }

        Self {
            documents,
            exact,
            folded,
            ..Self::default()
        }
    }

    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets.extend(assets.into_iter().map(Into::into));
        self
    }

    pub fn lookup(&self, path: &str) -> Lookup<'_> {
        if let Some(&i) = self.exact.get(path) {
            return Lookup::Found(&self.documents[i]);
        }
        if self.assets.contains(path) {
            return Lookup::Asset;
        }
        match self.folded.get(&path.to_lowercase()) {
            Some(&i) => Lookup::CaseMismatch(&self.documents[i]),
            None => Lookup::Missing,
        }
    }

    /// A non-document file with exactly this path
    pub fn has_asset(&self, path: &str) -> bool {
        self.assets.contains(path)
    }

    pub fn get(&self, path: &str) -> Option<&Document> {
        self.exact.get(path).map(|&i| &self.documents[i])
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn failures(&self) -> &[ReadFailure] {
        &self.failures
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn lowercase_extension(path: &str) -> String {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) => {
            let split = name_start + dot;
            format!("{}{}", &path[..split], path[split..].to_lowercase())
        }
        None => path.to_string(),
    }
}

fn load_document(path: &Path, rel: &str) -> std::result::Result<Document, ReadFailure> {
    let text = fs::read_to_string(path).map_err(|e| ReadFailure {
        path: rel.to_string(),
        message: e.to_string(),
    })?;
    let mut doc = Document::new(rel, text);
    doc.modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    Ok(doc)
}
