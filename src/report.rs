use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dupes::DuplicateGroup;
use crate::error::{Error, Result};
use crate::extract::Link;
use crate::pipeline::ScanResult;
use crate::validate::{Issue, IssueKind, Severity};

const SECTION_LIMIT: usize = 50;
const DUPLICATE_LIMIT: usize = 20;

pub const MARKDOWN_REPORT: &str = "link-validation-report.md";
pub const JSON_REPORT: &str = "link-validation-report.json";
pub const CSV_REPORT: &str = "link-validation-report.csv";

// ============================================================================
// Summary
// ============================================================================

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_documents: usize,
    pub total_links: usize,
    pub total_issues: usize,
    pub errors: usize,
    pub warnings: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub links_by_category: BTreeMap<String, usize>,
    pub links_by_syntax: BTreeMap<String, usize>,
    pub duplicate_groups: usize,
}

impl Summary {
    pub fn from_scan(scan: &ScanResult) -> Self {
        let mut by_kind = BTreeMap::new();
        for issue in &scan.issues {
            *by_kind.entry(issue.kind.name().to_string()).or_insert(0) += 1;
        }
        let (links_by_category, links_by_syntax) = link_counts(&scan.links);

        Self {
            total_documents: scan.documents,
            total_links: scan.links.len(),
            total_issues: scan.issues.len(),
            errors: scan.errors(),
            warnings: scan.warnings(),
            by_kind,
            links_by_category,
            links_by_syntax,
            duplicate_groups: scan.duplicates.len(),
        }
    }
}

fn link_counts(links: &[Link]) -> (BTreeMap<String, usize>, BTreeMap<String, usize>) {
    let mut by_category = BTreeMap::new();
    let mut by_syntax = BTreeMap::new();
    for link in links {
        *by_category.entry(link.category.name().to_string()).or_insert(0) += 1;
        *by_syntax.entry(link.syntax.format_name().to_string()).or_insert(0) += 1;
    }
    (by_category, by_syntax)
}

// ============================================================================
// Structured records
// ============================================================================

#[derive(Serialize, Debug, Clone)]
pub struct IssueRecord<'a> {
    pub source_file: &'a str,
    pub line: usize,
    pub link_text: &'a str,
    pub link_url: &'a str,
    pub link_kind: &'a str,
    pub issue_kind: &'a str,
    pub severity: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'a str>,
}

impl<'a> From<&'a Issue> for IssueRecord<'a> {
    fn from(issue: &'a Issue) -> Self {
        let link = issue.link.as_ref();
        Self {
            source_file: &issue.source,
            line: issue.line,
            link_text: link.map_or("", |l| l.text.as_str()),
            link_url: link.map_or("", |l| l.target.as_str()),
            link_kind: link.map_or("", |l| l.category.name()),
            issue_kind: issue.kind.name(),
            severity: issue.severity.name(),
            message: &issue.message,
            suggestion: issue.suggestion.as_deref(),
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct DuplicateRecord<'a> {
    pub source_file: &'a str,
    pub target: &'a str,
    pub count: usize,
    pub lines: Vec<usize>,
}

impl<'a> From<&'a DuplicateGroup> for DuplicateRecord<'a> {
    fn from(group: &'a DuplicateGroup) -> Self {
        Self {
            source_file: &group.source,
            target: &group.target,
            count: group.count,
            lines: group.links.iter().map(|l| l.line).collect(),
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated: String,
    summary: Summary,
    issues: Vec<IssueRecord<'a>>,
    duplicates: Vec<DuplicateRecord<'a>>,
}

pub fn render_json(scan: &ScanResult, generated: DateTime<Local>) -> Result<String> {
    let report = JsonReport {
        generated: generated.to_rfc3339(),
        summary: Summary::from_scan(scan),
        issues: scan.issues.iter().map(IssueRecord::from).collect(),
        duplicates: scan.duplicates.iter().map(DuplicateRecord::from).collect(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

// ============================================================================
// Discovery
// ============================================================================

/// One link as listed by `discover`
#[derive(Serialize, Debug, Clone)]
pub struct DiscoveryRecord<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub url: &'a str,
    pub text: &'a str,
    pub line: usize,
    pub format: &'a str,
    pub source_file: &'a str,
}

#[derive(Serialize, Debug, Clone)]
pub struct DiscoverySummary {
    pub total_files: usize,
    pub total_links: usize,
    pub links_by_type: BTreeMap<String, usize>,
    pub links_by_format: BTreeMap<String, usize>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Discovery<'a> {
    pub summary: DiscoverySummary,
    pub links: Vec<DiscoveryRecord<'a>>,
}

pub fn discovery<'a>(documents: usize, links: &'a [Link]) -> Discovery<'a> {
    let (links_by_type, links_by_format) = link_counts(links);
    Discovery {
        summary: DiscoverySummary {
            total_files: documents,
            total_links: links.len(),
            links_by_type,
            links_by_format,
        },
        links: links
            .iter()
            .map(|link| DiscoveryRecord {
                kind: link.category.name(),
                url: &link.target,
                text: &link.text,
                line: link.line,
                format: link.syntax.format_name(),
                source_file: &link.source,
            })
            .collect(),
    }
}

// ============================================================================
// CSV
// ============================================================================

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Flat rows: source, line, target, kind, severity, message, suggestion
pub fn render_csv(issues: &[Issue]) -> String {
    let mut out = String::from("source_file,line,link_url,issue_kind,severity,message,suggestion\n");
    for issue in issues {
        let record = IssueRecord::from(issue);
        let line = record.line.to_string();
        let row = [
            record.source_file,
            line.as_str(),
            record.link_url,
            record.issue_kind,
            record.severity,
            record.message,
            record.suggestion.unwrap_or(""),
        ];
        let fields: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

// ============================================================================
// Markdown
// ============================================================================

fn section_title(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::Broken => "Broken Links",
        IssueKind::Path => "Path Issues",
        IssueKind::Format => "Format Issues",
        IssueKind::Case => "Case Mismatches",
        IssueKind::Anchor => "Anchor Issues",
        IssueKind::Suspicious => "Suspicious External Links",
        IssueKind::ReadError => "Unreadable Documents",
    }
}

fn recommendation(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::Broken => "Fix or remove links whose targets do not exist.",
        IssueKind::Path => "Run `linkmend fix --apply` to collapse repeated segments and relocate misplaced targets.",
        IssueKind::Format => "Run `linkmend fix --apply` to move links to the templated, rendered-extension form.",
        IssueKind::Case => "Match the target's exact filename case; case mismatches are not fixed automatically.",
        IssueKind::Anchor => "Check anchors against the target's headings; slugs are approximate, so verify before editing.",
        IssueKind::Suspicious => "Replace placeholder and loopback URLs with real destinations.",
        IssueKind::ReadError => "Check permissions and encoding of unreadable documents.",
    }
}

pub fn render_markdown(scan: &ScanResult, generated: DateTime<Local>) -> String {
    let summary = Summary::from_scan(scan);
    let mut out = String::new();

    let _ = writeln!(out, "# Link Validation Report\n");
    let _ = writeln!(out, "Generated: {}\n", generated.format("%Y-%m-%d %H:%M:%S"));

    let _ = writeln!(out, "## Executive Summary\n");
    let _ = writeln!(out, "- Documents scanned: {}", summary.total_documents);
    let _ = writeln!(out, "- Links found: {}", summary.total_links);
    let _ = writeln!(out, "- Errors: {}", summary.errors);
    let _ = writeln!(out, "- Warnings: {}", summary.warnings);
    let _ = writeln!(out, "- Duplicate link groups: {}\n", summary.duplicate_groups);

    if summary.total_issues > 0 {
        let _ = writeln!(out, "### Issues by Kind\n");
        let _ = writeln!(out, "| Kind | Count |");
        let _ = writeln!(out, "|------|-------|");
        for (kind, count) in &summary.by_kind {
            let _ = writeln!(out, "| {} | {} |", kind, count);
        }
        out.push('\n');
    }

    for kind in IssueKind::ALL {
        let issues: Vec<&Issue> = scan.issues.iter().filter(|i| i.kind == kind).collect();
        if issues.is_empty() {
            continue;
        }
        let _ = writeln!(out, "## {} ({})\n", section_title(kind), issues.len());
        for issue in issues.iter().take(SECTION_LIMIT) {
            let marker = match issue.severity {
                Severity::Error => "ERROR",
                Severity::Warning => "WARN",
            };
            let _ = write!(out, "- **{}** `{}:{}` {}", marker, issue.source, issue.line, issue.message);
            if let Some(suggestion) = &issue.suggestion {
                let _ = write!(out, " → `{}`", suggestion);
            }
            out.push('\n');
        }
        if issues.len() > SECTION_LIMIT {
            let _ = writeln!(out, "- ... and {} more", issues.len() - SECTION_LIMIT);
        }
        out.push('\n');
    }

    if !scan.duplicates.is_empty() {
        let _ = writeln!(out, "## Duplicate Links ({})\n", scan.duplicates.len());
        for group in scan.duplicates.iter().take(DUPLICATE_LIMIT) {
            let lines: Vec<String> = group.links.iter().map(|l| l.line.to_string()).collect();
            let _ = writeln!(
                out,
                "- `{}` links {} times to `{}` (lines {})",
                group.source,
                group.count,
                group.target,
                lines.join(", ")
            );
        }
        if scan.duplicates.len() > DUPLICATE_LIMIT {
            let _ = writeln!(out, "- ... and {} more", scan.duplicates.len() - DUPLICATE_LIMIT);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Recommendations\n");
    let present: Vec<IssueKind> = IssueKind::ALL
        .into_iter()
        .filter(|kind| scan.issues.iter().any(|i| i.kind == *kind))
        .collect();
    if present.is_empty() {
        let _ = writeln!(out, "No issues found. The corpus link graph is clean.");
    } else {
        for (i, kind) in present.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, recommendation(*kind));
        }
    }

    out
}

/// Write the markdown, JSON and CSV reports into `dir`
pub fn write_reports(dir: &Path, scan: &ScanResult) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    let generated = Local::now();

    let outputs = [
        (MARKDOWN_REPORT, render_markdown(scan, generated)),
        (JSON_REPORT, render_json(scan, generated)?),
        (CSV_REPORT, render_csv(&scan.issues)),
    ];

    let mut written = Vec::with_capacity(outputs.len());
    for (name, content) in outputs {
        let path = dir.join(name);
        fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::corpus::{CorpusIndex, Document};
    use crate::pipeline::scan;

    fn sample() -> ScanResult {
        let index = CorpusIndex::from_documents(vec![
            Document::new("a.md", "# A\n[b](b.md) [b again](b.html) [gone](gone.html \"Gone, for now\")\n"),
            Document::new("b.md", "https://localhost/x and [a](a.html)\n"),
        ]);
        scan(&index, &Config::default(), None)
    }

    #[test]
    fn test_summary_counts() {
        let summary = Summary::from_scan(&sample());
        assert_eq!(summary.total_documents, 2);
        assert_eq!(summary.total_links, 5);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.warnings, 2);
        assert_eq!(summary.by_kind.get("broken"), Some(&1));
        assert_eq!(summary.by_kind.get("format"), Some(&1));
        assert_eq!(summary.by_kind.get("suspicious"), Some(&1));
        assert_eq!(summary.links_by_category.get("internal"), Some(&4));
        assert_eq!(summary.links_by_syntax.get("standalone"), Some(&1));
        assert_eq!(summary.duplicate_groups, 1);
    }

    #[test]
    fn test_json_report_shape() {
        let json = render_json(&sample(), Local::now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let issues = value["issues"].as_array().unwrap();
        assert_eq!(issues.len(), 3);
        let first = &issues[0];
        for key in ["source_file", "line", "link_text", "link_url", "link_kind", "issue_kind", "severity", "message"] {
            assert!(first.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["summary"]["errors"], 1);
        assert_eq!(value["duplicates"][0]["count"], 2);
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");

        let csv = render_csv(&sample().issues);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("source_file,line,link_url,issue_kind,severity,message,suggestion")
        );
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn test_markdown_sections() {
        let md = render_markdown(&sample(), Local::now());
        assert!(md.starts_with("# Link Validation Report"));
        assert!(md.contains("## Broken Links (1)"));
        assert!(md.contains("## Format Issues (1)"));
        assert!(md.contains("## Suspicious External Links (1)"));
        assert!(md.contains("## Duplicate Links (1)"));
        assert!(!md.contains("## Case Mismatches"));
        assert!(md.contains("## Recommendations"));
    }

    #[test]
    fn test_discovery_record() {
        let scan = sample();
        let found = discovery(scan.documents, &scan.links);
        assert_eq!(found.summary.total_files, 2);
        assert_eq!(found.summary.total_links, 5);
        let json = serde_json::to_value(&found).unwrap();
        assert_eq!(json["links"][0]["type"], "internal");
        assert_eq!(json["links"][0]["format"], "markdown");
        assert_eq!(json["links"][0]["source_file"], "a.md");
        assert_eq!(json["links"][0]["line"], 2);
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_reports(dir.path(), &sample()).unwrap();
        assert_eq!(written.len(), 3);
        for path in written {
            assert!(path.exists());
        }
    }
}
