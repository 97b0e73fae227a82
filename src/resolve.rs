//! Path resolution: raw link target + source location -> canonical
//! corpus-relative path.
//!
//! Every component that needs to know where an internal link points goes
//! through [`Resolver`]; nothing else re-derives `..` handling.

use serde::Serialize;

use crate::config::Config;
use crate::corpus::parent_dir;
use crate::extract::{Link, LinkCategory};

/// Extension the raw target was written with
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TargetExt {
    /// Source-markup extension (`.md`)
    Source,
    /// Rendered extension (`.html`)
    Rendered,
    /// No extension at all
    Bare,
    /// Trailing slash, resolved to the directory index
    Directory,
    /// Anything else: images, PDFs, ...
    Other,
}

/// Where an internal or anchor link points
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Canonical corpus-relative path with the source extension.
    /// `None` for anchors into the linking document itself.
    pub path: Option<String>,
    pub anchor: Option<String>,
    pub query: Option<String>,
    pub ext: TargetExt,
    /// Raw target already carried the corpus prefix
    pub rooted: bool,
    /// Raw target was site-absolute but lacked the corpus prefix
    pub outside_prefix: bool,
    /// More `..` segments than the source depth allowed
    pub clamped: bool,
    /// De-duplicated path when the rooted form repeats a segment
    pub repeated: Option<String>,
}

impl ResolvedTarget {
    fn same_file(anchor: &str) -> Self {
        Self {
            path: None,
            anchor: Some(anchor.to_string()).filter(|a| !a.is_empty()),
            query: None,
            ext: TargetExt::Bare,
            rooted: false,
            outside_prefix: false,
            clamped: false,
            repeated: None,
        }
    }

    /// Path and anchor joined, used as the grouping key for duplicates
    pub fn key(&self) -> String {
        match (&self.path, &self.anchor) {
            (Some(path), Some(anchor)) => format!("{}#{}", path, anchor),
            (Some(path), None) => path.clone(),
            (None, Some(anchor)) => format!("#{}", anchor),
            (None, None) => String::new(),
        }
    }

    /// Final path segment, e.g. `policy.md`
    pub fn file_name(&self) -> Option<&str> {
        let path = self.path.as_deref()?;
        Some(path.rsplit_once('/').map(|(_, f)| f).unwrap_or(path))
    }
}

/// How to spell the extension when turning a resolved target back into a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtStyle {
    /// Always the rendered extension
    Rendered,
    /// Whatever extension the raw target used
    AsWritten,
}

/// Collapse immediately repeated segments: `a/a/b` -> `a/b`
pub fn dedup_segments<'s>(segments: &[&'s str]) -> Vec<&'s str> {
    let mut out: Vec<&str> = Vec::with_capacity(segments.len());
    for seg in segments {
        if out.last() != Some(seg) {
            out.push(seg);
        }
    }
    out
}

pub fn has_repeated_segment(segments: &[&str]) -> bool {
    segments.windows(2).any(|w| w[0] == w[1])
}

pub struct Resolver<'a> {
    config: &'a Config,
}

impl<'a> Resolver<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Resolve a link against its own document. External and mailto links
    /// have no corpus target.
    pub fn resolve(&self, link: &Link) -> Option<ResolvedTarget> {
        match link.category {
            LinkCategory::External | LinkCategory::Mailto => None,
            LinkCategory::AnchorOnly => Some(ResolvedTarget::same_file(&link.target[1..])),
            LinkCategory::Internal => {
                Some(self.resolve_target(&link.target, parent_dir(&link.source)))
            }
        }
    }

    /// Resolve an internal target written in a document living in
    /// `source_dir` (corpus-relative, empty for the root).
    pub fn resolve_target(&self, target: &str, source_dir: &str) -> ResolvedTarget {
        let (rest, anchor) = match target.split_once('#') {
            Some((path, anchor)) => (path, Some(anchor.to_string()).filter(|a| !a.is_empty())),
            None => (target, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (rest, None),
        };

        if rest.is_empty() {
            let mut same = ResolvedTarget::same_file(anchor.as_deref().unwrap_or(""));
            same.query = query;
            return same;
        }

        let prefix = self.config.url_prefix.as_str();
        let (rooted, outside_prefix, relative) = if prefix.is_empty() && rest.starts_with('/') {
            (true, false, rest)
        } else if let Some(after) = rest
            .strip_prefix(prefix)
            .filter(|a| !prefix.is_empty() && (a.is_empty() || a.starts_with('/')))
        {
            (true, false, after)
        } else if rest.starts_with('/') {
            (false, true, rest)
        } else {
            (false, false, rest)
        };

        let mut segments: Vec<String> = if rooted || outside_prefix {
            Vec::new()
        } else {
            source_dir
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut clamped = false;
        for seg in relative.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        clamped = true;
                    }
                }
                other => segments.push(other.to_string()),
            }
        }

        let last_raw = relative.rsplit('/').next().unwrap_or("");
        let directory = matches!(last_raw, "" | "." | "..");
        let ext = if directory || segments.is_empty() {
            segments.push(format!("index.{}", self.config.source_ext));
            TargetExt::Directory
        } else {
            let last = segments.len() - 1;
            let (name, ext) = self.normalize_file_name(&segments[last]);
            segments[last] = name;
            ext
        };

        let rooted_segments: Vec<&str> = self
            .config
            .prefix_segments()
            .into_iter()
            .chain(segments.iter().map(String::as_str))
            .collect();
        let repeated = has_repeated_segment(&rooted_segments).then(|| {
            let prefix_len = self.config.prefix_segments().len();
            dedup_segments(&rooted_segments)
                .get(prefix_len..)
                .map(|rest| rest.join("/"))
                .unwrap_or_default()
        });

        ResolvedTarget {
            path: Some(segments.join("/")),
            anchor,
            query,
            ext,
            rooted,
            outside_prefix,
            clamped,
            repeated,
        }
    }

    /// Map the last segment to its source-extension identity
    fn normalize_file_name(&self, name: &str) -> (String, TargetExt) {
        let source = format!(".{}", self.config.source_ext);
        let rendered = format!(".{}", self.config.rendered_ext);
        let lower = name.to_lowercase();

        if lower.ends_with(&source) {
            (name.to_string(), TargetExt::Source)
        } else if lower.ends_with(&rendered) {
            let stem = &name[..name.len() - rendered.len()];
            (format!("{}{}", stem, source), TargetExt::Rendered)
        } else if !name.contains('.') {
            (format!("{}{}", name, source), TargetExt::Bare)
        } else {
            (name.to_string(), TargetExt::Other)
        }
    }

    /// Corpus-rooted URL for `path`, carrying over the extension kind,
    /// query and anchor of `target`
    pub fn href_with_path(&self, path: &str, target: &ResolvedTarget, style: ExtStyle) -> String {
        let source = format!(".{}", self.config.source_ext);
        let stem = path.strip_suffix(&source);
        let spelled = match (style, target.ext, stem) {
            (_, TargetExt::Other, _) | (_, _, None) => path.to_string(),
            (ExtStyle::Rendered, _, Some(stem)) => format!("{}.{}", stem, self.config.rendered_ext),
            (ExtStyle::AsWritten, TargetExt::Source, _) => path.to_string(),
            (ExtStyle::AsWritten, TargetExt::Rendered, Some(stem)) => {
                format!("{}.{}", stem, self.config.rendered_ext)
            }
            (ExtStyle::AsWritten, TargetExt::Bare, Some(stem)) => stem.to_string(),
            (ExtStyle::AsWritten, TargetExt::Directory, Some(stem)) => {
                stem.strip_suffix("index").unwrap_or(stem).to_string()
            }
        };

        let mut url = self.config.rooted(&spelled);
        if let Some(query) = &target.query {
            url.push('?');
            url.push_str(query);
        }
        if let Some(anchor) = &target.anchor {
            url.push('#');
            url.push_str(anchor);
        }
        url
    }

    /// Corpus-rooted URL of the resolved path itself
    pub fn href(&self, target: &ResolvedTarget, style: ExtStyle) -> Option<String> {
        let path = target.path.as_deref()?;
        Some(self.href_with_path(path, target, style))
    }

    /// Corpus-rooted URL with repeated segments collapsed
    pub fn deduplicated_href(&self, target: &ResolvedTarget, style: ExtStyle) -> Option<String> {
        let path = target.repeated.as_deref()?;
        Some(self.href_with_path(path, target, style))
    }
}
