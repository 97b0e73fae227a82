use serde::Serialize;
use url::{Host, Url};

use crate::config::Config;
use crate::corpus::{parent_dir, CorpusIndex, Document, Lookup, ReadFailure};
use crate::extract::{Link, LinkCategory};
use crate::resolve::{dedup_segments, ExtStyle, ResolvedTarget, Resolver, TargetExt};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Broken,
    Path,
    Format,
    Case,
    Anchor,
    Suspicious,
    ReadError,
}

impl IssueKind {
    pub const ALL: [IssueKind; 7] = [
        IssueKind::Broken,
        IssueKind::Path,
        IssueKind::Format,
        IssueKind::Case,
        IssueKind::Anchor,
        IssueKind::Suspicious,
        IssueKind::ReadError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            IssueKind::Broken => "broken",
            IssueKind::Path => "path",
            IssueKind::Format => "format",
            IssueKind::Case => "case",
            IssueKind::Anchor => "anchor",
            IssueKind::Suspicious => "suspicious",
            IssueKind::ReadError => "read-error",
        }
    }
}

/// A finding about one link, or about a document that could not be read
#[derive(Serialize, Debug, Clone)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub message: String,
    pub suggestion: Option<String>,
    pub source: String,
    pub line: usize,
    /// Absent for read errors
    pub link: Option<Link>,
}

impl Issue {
    fn for_link(link: &Link, severity: Severity, kind: IssueKind, message: String) -> Self {
        Self {
            severity,
            kind,
            message,
            suggestion: None,
            source: link.source.clone(),
            line: link.line,
            link: Some(link.clone()),
        }
    }

    fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }

    pub fn read_error(failure: &ReadFailure) -> Self {
        Self {
            severity: Severity::Error,
            kind: IssueKind::ReadError,
            message: format!("could not read document: {}", failure.message),
            suggestion: None,
            source: failure.path.clone(),
            line: 0,
            link: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Checks links against a fully built [`CorpusIndex`]. Never mutates links
/// or documents; every finding comes back as an [`Issue`].
pub struct Validator<'a> {
    index: &'a CorpusIndex,
    config: &'a Config,
    resolver: Resolver<'a>,
}

impl<'a> Validator<'a> {
    pub fn new(index: &'a CorpusIndex, config: &'a Config) -> Self {
        Self {
            index,
            config,
            resolver: Resolver::new(config),
        }
    }

    pub fn resolver(&self) -> &Resolver<'a> {
        &self.resolver
    }

    pub fn validate_document(&self, doc: &Document, links: &[Link]) -> Vec<Issue> {
        links
            .iter()
            .flat_map(|link| self.validate_link(doc, link))
            .collect()
    }

    /// All issues for one link of `doc`
    pub fn validate_link(&self, doc: &Document, link: &Link) -> Vec<Issue> {
        match link.category {
            LinkCategory::External => self.check_external(link).into_iter().collect(),
            LinkCategory::Mailto => check_mailto(link).into_iter().collect(),
            LinkCategory::Internal | LinkCategory::AnchorOnly => match self.resolver.resolve(link) {
                Some(target) => self.check_internal(doc, link, &target),
                None => Vec::new(),
            },
        }
    }

    fn check_internal(&self, doc: &Document, link: &Link, target: &ResolvedTarget) -> Vec<Issue> {
        let mut issues = Vec::new();

        let Some(path) = target.path.as_deref() else {
            if let Some(issue) = self.check_anchor(link, target, doc) {
                issues.push(issue);
            }
            return issues;
        };

        let repaired = self.repaired_path(target);
        let repaired_exists = repaired
            .as_deref()
            .is_some_and(|p| matches!(self.index.lookup(p), Lookup::Found(_)));

        let lookup = match self.index.lookup(path) {
            Lookup::Found(found) => Lookup::Found(found),
            _ if self.rendered_asset_exists(path, target) => Lookup::Asset,
            other => other,
        };

        let anchor_doc = match lookup {
            Lookup::Found(found) => Some(found),
            Lookup::CaseMismatch(found) => {
                issues.push(
                    Issue::for_link(
                        link,
                        Severity::Warning,
                        IssueKind::Case,
                        format!("{} differs only in case from {}", link.target, found.path),
                    )
                    .with_suggestion(Some(self.resolver.href_with_path(
                        &found.path,
                        target,
                        ExtStyle::Rendered,
                    ))),
                );
                Some(found)
            }
            Lookup::Asset => None,
            Lookup::Missing => {
                // A path fix that lands on a real document is reported as a
                // path error below instead
                if !repaired_exists {
                    issues.push(Issue::for_link(
                        link,
                        Severity::Error,
                        IssueKind::Broken,
                        format!("{} does not exist (resolved to {})", link.target, path),
                    ));
                }
                None
            }
        };

        if target.repeated.is_some() {
            issues.push(
                Issue::for_link(
                    link,
                    Severity::Error,
                    IssueKind::Path,
                    format!("repeated path segment in {}", link.target),
                )
                .with_suggestion(self.resolver.deduplicated_href(target, ExtStyle::Rendered)),
            );
        }

        if let Some(relocated) = self.relocated_path(target) {
            issues.push(
                Issue::for_link(
                    link,
                    Severity::Error,
                    IssueKind::Path,
                    format!(
                        "{} belongs in {}/",
                        target.file_name().unwrap_or(path),
                        parent_dir(&relocated)
                    ),
                )
                .with_suggestion(Some(self.resolver.href_with_path(
                    &relocated,
                    target,
                    ExtStyle::Rendered,
                ))),
            );
        }

        if target.clamped {
            issues.push(
                Issue::for_link(
                    link,
                    Severity::Warning,
                    IssueKind::Path,
                    format!("{} climbs above the corpus root", link.target),
                )
                .with_suggestion(self.resolver.href(target, ExtStyle::Rendered)),
            );
        }

        if target.ext == TargetExt::Source {
            issues.push(
                Issue::for_link(
                    link,
                    Severity::Warning,
                    IssueKind::Format,
                    format!("{} uses the .{} extension", link.target, self.config.source_ext),
                )
                .with_suggestion(self.resolver.href(target, ExtStyle::Rendered)),
            );
        }

        if target.outside_prefix {
            issues.push(
                Issue::for_link(
                    link,
                    Severity::Warning,
                    IssueKind::Format,
                    format!("{} is site-absolute but lacks {}", link.target, self.config.url_prefix),
                )
                .with_suggestion(self.resolver.href(target, ExtStyle::Rendered)),
            );
        }

        if let Some(found) = anchor_doc {
            if let Some(issue) = self.check_anchor(link, target, found) {
                issues.push(issue);
            }
        }

        issues
    }

    /// `search.html` linked as written and present on disk as a plain file
    fn rendered_asset_exists(&self, path: &str, target: &ResolvedTarget) -> bool {
        if target.ext != TargetExt::Rendered {
            return false;
        }
        let source = format!(".{}", self.config.source_ext);
        path.strip_suffix(&source).is_some_and(|stem| {
            self.index
                .has_asset(&format!("{}.{}", stem, self.config.rendered_ext))
        })
    }

    /// The path with repeated segments collapsed and the relocation applied
    fn repaired_path(&self, target: &ResolvedTarget) -> Option<String> {
        if target.repeated.is_none() && self.relocated_path(target).is_none() {
            return None;
        }
        let base = target.repeated.clone().or_else(|| target.path.clone())?;
        let deduped = ResolvedTarget {
            path: Some(base.clone()),
            ..target.clone()
        };
        Some(self.relocated_path(&deduped).unwrap_or(base))
    }

    /// Canonical location when the relocation table places the file elsewhere
    fn relocated_path(&self, target: &ResolvedTarget) -> Option<String> {
        let path = target.path.as_deref()?;
        let file = target.file_name()?;
        let canonical = self.config.relocation_for(file)?;
        if parent_dir(path) == canonical {
            return None;
        }
        Some(relocation_path(canonical, file))
    }

    fn check_anchor(&self, link: &Link, target: &ResolvedTarget, doc: &Document) -> Option<Issue> {
        let anchor = target.anchor.as_deref()?;
        if doc.anchors.contains(anchor) || doc.anchors.contains(&anchor.to_lowercase()) {
            return None;
        }
        Some(Issue::for_link(
            link,
            Severity::Warning,
            IssueKind::Anchor,
            format!("no heading in {} matches #{}", doc.path, anchor),
        ))
    }

    fn check_external(&self, link: &Link) -> Option<Issue> {
        let suspicious = |message: String| {
            Some(Issue::for_link(link, Severity::Warning, IssueKind::Suspicious, message))
        };

        let url = match Url::parse(&link.target) {
            Ok(url) => url,
            Err(e) => return suspicious(format!("unparsable URL {}: {}", link.target, e)),
        };

        if is_loopback(&url) {
            return suspicious(format!("{} points at a loopback host", link.target));
        }

        let host = url.host_str().unwrap_or("").to_ascii_lowercase();
        let placeholder = self.config.placeholder_domains.iter().any(|domain| {
            let domain = domain.to_ascii_lowercase();
            host == domain || host.ends_with(&format!(".{}", domain))
        });
        if placeholder {
            return suspicious(format!("{} uses a placeholder domain", link.target));
        }

        let lower = link.target.to_lowercase();
        if let Some(marker) = self
            .config
            .placeholder_markers
            .iter()
            .find(|m| !m.is_empty() && lower.contains(&m.to_lowercase()))
        {
            return suspicious(format!("{} contains placeholder marker '{}'", link.target, marker));
        }

        None
    }
}

/// Join a relocation directory and a file name
pub fn relocation_path(dir: &str, file: &str) -> String {
    let joined = if dir.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", dir, file)
    };
    let segments: Vec<&str> = joined.split('/').collect();
    dedup_segments(&segments).join("/")
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Some(Host::Ipv6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        None => false,
    }
}

fn check_mailto(link: &Link) -> Option<Issue> {
    let address = link.target.get(7..).unwrap_or("");
    let address = address.split('?').next().unwrap_or("");
    if address.contains('@') {
        return None;
    }
    Some(Issue::for_link(
        link,
        Severity::Warning,
        IssueKind::Suspicious,
        format!("{} has no address", link.target),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_links;

    fn index() -> CorpusIndex {
        CorpusIndex::from_documents(vec![
            Document::new("index.md", "# Home\n"),
            Document::new("dev/guide.md", "# Guide\n## When to Retrieve\n"),
            Document::new("security/policy.md", "# Policy\n"),
            Document::new("security/Access.md", "# Access\n"),
            Document::new("rag/file.md", "# File\n"),
            Document::new("development/apex-patterns.md", "# Apex\n## Triggers\n"),
        ])
        .with_assets(["dev/img/arch.png"])
    }

    fn config() -> Config {
        let mut config = Config::default();
        config
            .relocations
            .insert("apex-patterns.md".to_string(), "development".to_string());
        config
    }

    fn issues_for(source: &str, text: &str) -> Vec<Issue> {
        let index = index();
        let config = config();
        let validator = Validator::new(&index, &config);
        let doc = Document::new(source, text);
        let links = extract_links(source, text);
        validator.validate_document(&doc, &links)
    }

    fn kinds(issues: &[Issue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn test_existing_target_is_clean() {
        let issues = issues_for(
            "dev/guide.md",
            "<a href=\"{{ '/corpus/security/policy.html' | relative_url }}\">policy</a>",
        );
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_parent_relative_source_ext_is_format_warning() {
        let issues = issues_for("dev/guide.md", "[x](../security/policy.md)");
        assert_eq!(kinds(&issues), vec![IssueKind::Format]);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].suggestion.as_deref(), Some("/corpus/security/policy.html"));
    }

    #[test]
    fn test_broken_and_case() {
        let issues = issues_for("dev/guide.md", "[a](../nowhere.html) [b](../security/access.html)");
        assert_eq!(kinds(&issues), vec![IssueKind::Broken, IssueKind::Case]);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[1].severity, Severity::Warning);
        assert_eq!(issues[1].suggestion.as_deref(), Some("/corpus/security/Access.html"));
    }

    #[test]
    fn test_repeated_segment_path_error() {
        let issues = issues_for("index.md", "[f](/corpus/rag/rag/file.html)");
        assert_eq!(kinds(&issues), vec![IssueKind::Path]);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].suggestion.as_deref(), Some("/corpus/rag/file.html"));
    }

    #[test]
    fn test_relocation_path_error_keeps_anchor() {
        let issues = issues_for("index.md", "[apex](api-reference/apex-patterns.html#triggers)");
        assert_eq!(kinds(&issues), vec![IssueKind::Path]);
        assert_eq!(
            issues[0].suggestion.as_deref(),
            Some("/corpus/development/apex-patterns.html#triggers")
        );

        let plain = issues_for("index.md", "[apex](api-reference/apex-patterns.html)");
        assert_eq!(
            plain[0].suggestion.as_deref(),
            Some("/corpus/development/apex-patterns.html")
        );
    }

    #[test]
    fn test_missing_without_fix_is_broken() {
        let issues = issues_for("index.md", "[f](/corpus/rag/rag/gone.html)");
        assert_eq!(kinds(&issues), vec![IssueKind::Broken, IssueKind::Path]);
    }

    #[test]
    fn test_outside_prefix_and_clamped() {
        let issues = issues_for("dev/guide.md", "[a](/security/policy.html) [b](../../security/policy.html)");
        assert_eq!(kinds(&issues), vec![IssueKind::Format, IssueKind::Path]);
        assert_eq!(issues[0].suggestion.as_deref(), Some("/corpus/security/policy.html"));
        assert_eq!(issues[1].severity, Severity::Warning);
    }

    #[test]
    fn test_anchor_warnings() {
        let issues = issues_for(
            "dev/guide.md",
            "# Guide\n## Setup\n[a](#setup) [b](#missing) [c](/corpus/dev/guide.html#when-to-retrieve) [d](/corpus/dev/guide.html#nope)",
        );
        assert_eq!(kinds(&issues), vec![IssueKind::Anchor, IssueKind::Anchor]);
        assert!(issues.iter().all(|i| i.severity == Severity::Warning));
        assert!(issues[0].message.contains("#missing"));
        assert!(issues[1].message.contains("#nope"));
    }

    #[test]
    fn test_assets_exist() {
        let issues = issues_for("dev/guide.md", "![arch](img/arch.png)");
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_suspicious_externals() {
        let issues = issues_for(
            "index.md",
            "http://localhost:8080/x https://127.0.0.1/y https://api.example.com/z \
             https://docs.rs/placeholder https://docs.rs/regex [m](mailto:nobody)",
        );
        assert_eq!(kinds(&issues), vec![IssueKind::Suspicious; 5]);
        assert!(issues.iter().all(|i| i.severity == Severity::Warning));
    }

    #[test]
    fn test_relocation_table_built_in() {
        let index = CorpusIndex::from_documents(vec![
            Document::new("index.md", "# Home\n"),
            Document::new("development/apex-patterns.md", "# Apex\n"),
        ]);
        let config = Config::default();
        let validator = Validator::new(&index, &config);
        let doc = Document::new("index.md", "[a](api-reference/apex-patterns.html)");
        let links = extract_links(&doc.path, &doc.text);
        let issues = validator.validate_document(&doc, &links);

        assert_eq!(kinds(&issues), vec![IssueKind::Path]);
        assert_eq!(
            issues[0].suggestion.as_deref(),
            Some("/corpus/development/apex-patterns.html")
        );
    }

    #[test]
    fn test_rendered_file_on_disk_exists() {
        let index = CorpusIndex::from_documents(vec![Document::new("a.md", "# A\n")])
            .with_assets(["search.html", "tools/report.html"]);
        let config = Config::default();
        let validator = Validator::new(&index, &config);
        let doc = Document::new("a.md", "[s](search.html) [r](/corpus/tools/report.html) [m](missing.html)");
        let links = extract_links(&doc.path, &doc.text);
        let issues = validator.validate_document(&doc, &links);

        assert_eq!(kinds(&issues), vec![IssueKind::Broken]);
        assert_eq!(issues[0].link.as_ref().map(|l| l.target.as_str()), Some("missing.html"));
    }

    #[test]
    fn test_uppercase_extension_document() {
        let index = CorpusIndex::from_documents(vec![Document::new("README.MD", "# Readme\n")]);
        let config = Config::default();
        let validator = Validator::new(&index, &config);
        let doc = Document::new("a.md", "[r](README.html) [r2](README.MD)");
        let links = extract_links(&doc.path, &doc.text);
        let issues = validator.validate_document(&doc, &links);

        assert_eq!(kinds(&issues), vec![IssueKind::Format]);
        assert_eq!(issues[0].line, 1);
        assert_eq!(issues[0].link.as_ref().map(|l| l.text.as_str()), Some("r2"));
    }

    #[test]
    fn test_read_error_issue() {
        let issue = Issue::read_error(&ReadFailure {
            path: "bad.md".to_string(),
            message: "invalid utf-8".to_string(),
        });
        assert_eq!(issue.kind, IssueKind::ReadError);
        assert!(issue.is_error());
        assert!(issue.link.is_none());
    }
}
