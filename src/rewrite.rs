//! Link normalization as a fixed sequence of pure text passes.
//!
//! Each pass re-extracts links from the text it is given, computes one
//! replacement per link and splices them in. A pass whose output equals its
//! input reports no modification, and every pass is a fixed point of its own
//! output, so running the whole sequence twice changes nothing the second
//! time. Text inside code is never touched because the extractor never
//! yields links there.

use rayon::prelude::*;
use std::fs;
use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::corpus::CorpusIndex;
use crate::extract::{extract_links, Link, LinkCategory, LinkSyntax};
use crate::resolve::{ExtStyle, ResolvedTarget, Resolver, TargetExt};
use crate::validate::relocation_path;

/// What a pass sees besides the text
pub struct PassContext<'a> {
    pub config: &'a Config,
    pub resolver: &'a Resolver<'a>,
    /// Corpus-relative path of the document being rewritten
    pub source: &'a str,
}

pub type Pass = fn(&str, &PassContext<'_>) -> (String, bool);

/// The passes, in the order they must run
pub const PASSES: [(&str, Pass); 4] = [
    ("dedupe-segments", dedupe_segments),
    ("relocate", relocate),
    ("canonicalize-form", canonicalize_form),
    ("normalize-extension", normalize_extension),
];

/// Apply non-overlapping replacements, last first so earlier offsets stay valid
fn splice(text: &str, mut edits: Vec<(Range<usize>, String)>) -> (String, bool) {
    edits.retain(|(range, replacement)| &text[range.clone()] != replacement.as_str());
    if edits.is_empty() {
        return (text.to_string(), false);
    }
    edits.sort_by_key(|(range, _)| std::cmp::Reverse(range.start));

    let mut out = text.to_string();
    for (range, replacement) in edits {
        out.replace_range(range, &replacement);
    }
    (out, true)
}

/// Replace the target of every internal link for which `rewrite` returns a
/// new target
fn rewrite_targets<F>(text: &str, cx: &PassContext<'_>, rewrite: F) -> (String, bool)
where
    F: Fn(&Link, &ResolvedTarget) -> Option<String>,
{
    let edits = extract_links(cx.source, text)
        .iter()
        .filter(|link| link.category == LinkCategory::Internal)
        .filter_map(|link| {
            let target = cx.resolver.resolve(link)?;
            rewrite(link, &target).map(|new| (link.target_span.clone(), new))
        })
        .collect();
    splice(text, edits)
}

/// Pass 1: collapse immediately repeated segments
pub fn dedupe_segments(text: &str, cx: &PassContext<'_>) -> (String, bool) {
    rewrite_targets(text, cx, |_, target| {
        cx.resolver.deduplicated_href(target, ExtStyle::AsWritten)
    })
}

/// Pass 2: move targets named in the relocation table to their directory
pub fn relocate(text: &str, cx: &PassContext<'_>) -> (String, bool) {
    rewrite_targets(text, cx, |_, target| {
        let path = target.path.as_deref()?;
        let file = target.file_name()?;
        let canonical = cx.config.relocation_for(file)?;
        let relocated = relocation_path(canonical, file);
        if relocated == path {
            return None;
        }
        Some(cx.resolver.href_with_path(&relocated, target, ExtStyle::AsWritten))
    })
}

fn is_image(text: &str, link: &Link) -> bool {
    link.span.start > 0 && text.as_bytes()[link.span.start - 1] == b'!'
}

fn templated(href: &str, label: &str) -> String {
    format!(r#"<a href="{{{{ '{}' | relative_url }}}}">{}</a>"#, href, label)
}

/// Pass 3: bracket links to documents become templated anchors with a
/// corpus-rooted target; templated anchors get their target corrected
pub fn canonicalize_form(text: &str, cx: &PassContext<'_>) -> (String, bool) {
    let edits = extract_links(cx.source, text)
        .iter()
        .filter(|link| link.category == LinkCategory::Internal)
        .filter_map(|link| {
            let target = cx.resolver.resolve(link)?;
            let href = cx.resolver.href(&target, ExtStyle::AsWritten)?;
            match link.syntax {
                LinkSyntax::TemplatedAnchor => Some((link.target_span.clone(), href)),
                LinkSyntax::BracketLink => {
                    let convertible = matches!(target.ext, TargetExt::Source | TargetExt::Rendered)
                        && !is_image(text, link)
                        && !link.text.contains('<')
                        && !href.contains(['\'', '"']);
                    convertible.then(|| (link.span.clone(), templated(&href, &link.text)))
                }
                LinkSyntax::BareUrl | LinkSyntax::Mailto => None,
            }
        })
        .collect();
    splice(text, edits)
}

/// Pass 4: source extension -> rendered extension, anchor and query kept
pub fn normalize_extension(text: &str, cx: &PassContext<'_>) -> (String, bool) {
    let source = format!(".{}", cx.config.source_ext);
    rewrite_targets(text, cx, |link, target| {
        if target.ext != TargetExt::Source {
            return None;
        }
        let path_end = link.target.find(['?', '#']).unwrap_or(link.target.len());
        let path = &link.target[..path_end];
        let stem_end = path.len().checked_sub(source.len())?;
        if !path.is_char_boundary(stem_end) || !path[stem_end..].eq_ignore_ascii_case(&source) {
            return None;
        }
        Some(format!(
            "{}.{}{}",
            &path[..stem_end],
            cx.config.rendered_ext,
            &link.target[path_end..]
        ))
    })
}

/// Output of the full pass sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    /// Names of the passes that changed something, in order
    pub applied: Vec<&'static str>,
}

impl Rewrite {
    pub fn modified(&self) -> bool {
        !self.applied.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMode {
    DryRun,
    Apply,
}

/// Per-file result of a fix run. A failure affects only this file.
#[derive(Debug, Clone)]
pub struct FixOutcome {
    pub path: String,
    pub applied: Vec<&'static str>,
    pub backup: Option<PathBuf>,
    pub written: bool,
    pub error: Option<String>,
}

impl FixOutcome {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            applied: Vec::new(),
            backup: None,
            written: false,
            error: None,
        }
    }

    pub fn modified(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Write `content` to a temporary file beside `file`, then rename it over
/// `file`. Readers see the old content or the new, never a partial write.
fn replace_atomically(file: &Path, content: &str) -> io::Result<()> {
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(file)?.permissions();
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.as_file().set_permissions(permissions)?;
    temp.persist(file).map_err(|e| e.error)?;
    Ok(())
}

pub struct Rewriter<'a> {
    config: &'a Config,
    resolver: Resolver<'a>,
}

impl<'a> Rewriter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            resolver: Resolver::new(config),
        }
    }

    /// Run every pass over `text`, the content of corpus document `source`
    pub fn rewrite(&self, source: &str, text: &str) -> Rewrite {
        let cx = PassContext {
            config: self.config,
            resolver: &self.resolver,
            source,
        };
        let mut current = text.to_string();
        let mut applied = Vec::new();
        for (name, pass) in PASSES {
            let (next, modified) = pass(&current, &cx);
            if modified {
                applied.push(name);
                current = next;
            }
        }
        Rewrite {
            text: current,
            applied,
        }
    }

    /// Rewrite one document from a fresh read of the file.
    ///
    /// With [`FixMode::Apply`] the original is copied to
    /// `backup_dir/<stamp>/<path>` before it is overwritten. A backup that
    /// was made stays in place even if the write fails.
    pub fn fix_document(&self, root: &Path, rel: &str, mode: FixMode, stamp: &str) -> FixOutcome {
        let mut outcome = FixOutcome::new(rel);
        let file = root.join(rel);

        let text = match fs::read_to_string(&file) {
            Ok(text) => text,
            Err(e) => {
                outcome.error = Some(format!("read {}: {}", file.display(), e));
                return outcome;
            }
        };

        let rewrite = self.rewrite(rel, &text);
        outcome.applied = rewrite.applied;
        if !outcome.modified() || mode == FixMode::DryRun {
            return outcome;
        }

        let backup = self.config.backup_dir.join(stamp).join(rel);
        let copied = backup
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::copy(&file, &backup));
        if let Err(e) = copied {
            outcome.error = Some(format!("backup {}: {}", backup.display(), e));
            return outcome;
        }
        outcome.backup = Some(backup);

        match replace_atomically(&file, &rewrite.text) {
            Ok(()) => outcome.written = true,
            Err(e) => outcome.error = Some(format!("write {}: {}", file.display(), e)),
        }
        outcome
    }

    /// Fix every indexed document (or just `only`), one outcome per file
    pub fn fix_corpus(&self, index: &CorpusIndex, only: Option<&str>, mode: FixMode) -> Vec<FixOutcome> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let paths: Vec<&str> = index
            .documents()
            .iter()
            .map(|doc| doc.path.as_str())
            .filter(|path| only.is_none_or(|o| *path == o))
            .collect();

        let outcomes: Vec<FixOutcome> = paths
            .par_iter()
            .map(|path| self.fix_document(index.root(), path, mode, &stamp))
            .collect();

        for outcome in &outcomes {
            match (&outcome.error, outcome.written) {
                (Some(e), _) => log::warn!("{}: {}", outcome.path, e),
                (None, true) => log::info!("rewrote {} ({})", outcome.path, outcome.applied.join(", ")),
                (None, false) if outcome.modified() => {
                    log::debug!("would rewrite {} ({})", outcome.path, outcome.applied.join(", "))
                }
                _ => {}
            }
        }
        outcomes
    }
}
