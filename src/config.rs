use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

// Documents that live in development/ however they are linked
const DEVELOPMENT_FILES: [&str; 16] = [
    "apex-patterns.md",
    "soql-query-patterns.md",
    "governor-limits-and-optimization.md",
    "error-handling-and-logging.md",
    "flow-patterns.md",
    "lwc-patterns.md",
    "asynchronous-apex-patterns.md",
    "custom-settings-metadata-patterns.md",
    "locking-and-concurrency-strategies.md",
    "order-of-execution.md",
    "large-data-loads.md",
    "admin-basics.md",
    "email-management.md",
    "formulas-validation-rules.md",
    "lightning-app-builder.md",
    "omnistudio-patterns.md",
];

/// Run configuration, loaded once at startup and passed by reference to the
/// components that need it.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Corpus directory on disk
    pub root: PathBuf,
    /// Corpus-root marker used by corpus-rooted links, e.g. `/corpus`
    pub url_prefix: String,
    /// Extension of the documents as authored
    pub source_ext: String,
    /// Extension the renderer publishes documents under
    pub rendered_ext: String,
    /// Glob patterns for files and directories to skip
    pub exclude: Vec<String>,
    /// Error-severity issues tolerated before `check` fails
    pub max_errors: usize,
    pub backup_dir: PathBuf,
    pub report_dir: PathBuf,
    pub placeholder_domains: Vec<String>,
    pub placeholder_markers: Vec<String>,
    /// Filename -> the directory that file canonically lives in. A
    /// `[relocations]` table in the config file replaces the built-in one.
    pub relocations: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("corpus"),
            url_prefix: "/corpus".to_string(),
            source_ext: "md".to_string(),
            rendered_ext: "html".to_string(),
            exclude: vec!["rag-index.md".to_string(), "index-generated.md".to_string()],
            max_errors: 0,
            backup_dir: PathBuf::from(".linkmend/backups"),
            report_dir: PathBuf::from(".linkmend/reports"),
            placeholder_domains: ["example.com", "example.org", "example.net", "test.com"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            placeholder_markers: vec!["placeholder".to_string()],
            relocations: DEVELOPMENT_FILES
                .iter()
                .map(|file| (file.to_string(), "development".to_string()))
                .collect(),
        }
    }
}

impl Config {
    /// Load a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default().normalized()),
            Err(e) => return Err(Error::io(path, e)),
        };
        Self::from_toml(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(content)?;
        Ok(config.normalized())
    }

    /// Strip stray slashes and dots so the rest of the crate can join
    /// prefix, directories and extensions without re-checking.
    fn normalized(mut self) -> Self {
        let prefix = self.url_prefix.trim_matches('/');
        self.url_prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("/{}", prefix)
        };
        self.source_ext = self.source_ext.trim_start_matches('.').to_string();
        self.rendered_ext = self.rendered_ext.trim_start_matches('.').to_string();
        self.relocations = self
            .relocations
            .into_iter()
            .map(|(file, dir)| (file, dir.trim_matches('/').to_string()))
            .collect();
        self
    }

    /// Prefix segments, e.g. `["corpus"]` for `/corpus`
    pub fn prefix_segments(&self) -> Vec<&str> {
        self.url_prefix.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Canonical directory for a filename in the relocation table.
    /// `file` may carry either the source or the rendered extension.
    pub fn relocation_for(&self, file: &str) -> Option<&str> {
        let source_name = match file.strip_suffix(&format!(".{}", self.rendered_ext)) {
            Some(stem) => format!("{}.{}", stem, self.source_ext),
            None => file.to_string(),
        };
        self.relocations.get(&source_name).map(String::as_str)
    }

    /// Build the corpus-rooted URL for a corpus-relative path
    pub fn rooted(&self, rel_path: &str) -> String {
        format!("{}/{}", self.url_prefix, rel_path.trim_start_matches('/'))
    }
}
