use pulldown_cmark::{CodeBlockKind, Event, Parser, Tag};
use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::sync::LazyLock;

// Anchor tag whose href goes through the site-relative URL filter:
// <a href="{{ '/corpus/dir/file.html' | relative_url }}">text</a>
// Other attributes may sit on either side of href, and the label may hold markup.
static TEMPLATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']\{\{\s*["']([^"']+)["']\s*\|\s*relative_url\s*\}\}["'][^>]*>(.*?)</a>"#,
    )
    .expect("templated anchor pattern")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));

static BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("bracket link pattern"));

// Any anchor element; bare URLs inside one are never reported on their own
static ANCHOR_ELEMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>.*?</a>").expect("anchor element pattern"));

static BARE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s)<>"'\]]+"#).expect("bare url pattern"));

static MAILTO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)mailto:[^\s)<>"'\]]+"#).expect("mailto pattern"));

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("scheme pattern"));

/// Syntax a link was written in
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum LinkSyntax {
    TemplatedAnchor,
    BracketLink,
    BareUrl,
    Mailto,
}

impl LinkSyntax {
    /// Name used in discovery records
    pub fn format_name(self) -> &'static str {
        match self {
            LinkSyntax::TemplatedAnchor => "templated",
            LinkSyntax::BracketLink => "markdown",
            LinkSyntax::BareUrl => "standalone",
            LinkSyntax::Mailto => "mailto",
        }
    }
}

/// What a link points at, derived from its target prefix
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum LinkCategory {
    Internal,
    External,
    AnchorOnly,
    Mailto,
}

impl LinkCategory {
    pub fn classify(target: &str) -> Self {
        let lower = target.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") || SCHEME_RE.is_match(target)
        {
            LinkCategory::External
        } else if lower.starts_with("mailto:") {
            LinkCategory::Mailto
        } else if target.starts_with('#') {
            LinkCategory::AnchorOnly
        } else {
            LinkCategory::Internal
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LinkCategory::Internal => "internal",
            LinkCategory::External => "external",
            LinkCategory::AnchorOnly => "anchor",
            LinkCategory::Mailto => "mailto",
        }
    }
}

/// One link found in a document. Never mutated after extraction.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub source: String,  // corpus-relative path of the containing document
    pub text: String,
    pub target: String,
    pub syntax: LinkSyntax,
    pub category: LinkCategory,
    pub line: usize,  // 1-based
    #[serde(skip)]
    pub span: Range<usize>,  // byte range of the whole link syntax
    #[serde(skip)]
    pub target_span: Range<usize>,  // byte range of the target alone
}

/// Blank out fenced code blocks and inline code spans.
///
/// Every masked character is replaced by as many spaces as it has bytes, and
/// newlines are kept, so byte offsets and line numbers of the result match
/// the input exactly.
pub fn mask_code(text: &str) -> String {
    let mut ranges: Vec<Range<usize>> = Vec::new();
    for (event, range) in Parser::new(text).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) | Event::Code(_) => {
                ranges.push(range)
            }
            _ => {}
        }
    }

    if ranges.is_empty() {
        return text.to_string();
    }
    ranges.sort_by_key(|r| r.start);

    let mut out = String::with_capacity(text.len());
    let mut current = 0;
    for (offset, ch) in text.char_indices() {
        while current < ranges.len() && ranges[current].end <= offset {
            current += 1;
        }
        let masked = ranges
            .get(current)
            .is_some_and(|r| r.start <= offset && offset < r.end);
        if masked && ch != '\n' {
            out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Byte offset -> 1-based line number
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { starts }
    }

    pub fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }
}

fn overlaps(spans: &[Range<usize>], offset: usize) -> bool {
    spans.iter().any(|s| s.start <= offset && offset < s.end)
}

/// Split a bracket destination into the target and its offset within `raw`.
/// Handles `<path with spaces>` and a trailing `"title"`.
fn parse_destination(raw: &str) -> Option<(usize, &str)> {
    let lead = raw.len() - raw.trim_start().len();
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix('<') {
        let end = rest.find('>')?;
        return Some((lead + 1, &rest[..end]));
    }
    let token = trimmed.split_whitespace().next()?;
    Some((lead, token))
}

/// Extract every link of one document, ordered by position.
///
/// Templated anchors are matched first, then bracket links, then bare URLs
/// and `mailto:` targets that sit outside both. Nothing inside code is
/// extracted.
pub fn extract_links(source: &str, text: &str) -> Vec<Link> {
    let masked = mask_code(text);
    let lines = LineIndex::new(text);
    let mut links = Vec::new();
    let mut claimed: Vec<Range<usize>> = Vec::new();

    let make = |text_value: String,
                target: String,
                syntax: LinkSyntax,
                span: Range<usize>,
                target_span: Range<usize>| Link {
        source: source.to_string(),
        category: LinkCategory::classify(&target),
        text: text_value,
        target,
        syntax,
        line: lines.line_of(span.start),
        span,
        target_span,
    };

    for caps in TEMPLATED_RE.captures_iter(&masked) {
        let (Some(whole), Some(url)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let label = caps
            .get(2)
            .map(|m| TAG_RE.replace_all(&text[m.range()], "").trim().to_string())
            .unwrap_or_default();
        claimed.push(whole.range());
        links.push(make(
            label,
            text[url.range()].to_string(),
            LinkSyntax::TemplatedAnchor,
            whole.range(),
            url.range(),
        ));
    }

    for caps in BRACKET_RE.captures_iter(&masked) {
        let (Some(whole), Some(label), Some(dest)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if overlaps(&claimed, whole.start()) {
            continue;
        }
        let raw_dest = &text[dest.range()];
        // Templating inside a bracket destination is left to the renderer
        if raw_dest.contains("{{") || raw_dest.contains('|') {
            continue;
        }
        let Some((offset, target)) = parse_destination(raw_dest) else {
            continue;
        };
        let target_start = dest.start() + offset;
        links.push(make(
            text[label.range()].to_string(),
            target.to_string(),
            LinkSyntax::BracketLink,
            whole.range(),
            target_start..target_start + target.len(),
        ));
        claimed.push(whole.range());
    }

    claimed.extend(ANCHOR_ELEMENT_RE.find_iter(&masked).map(|m| m.range()));

    let mut bare: Vec<Range<usize>> = Vec::new();
    for m in BARE_URL_RE.find_iter(&masked) {
        if overlaps(&claimed, m.start()) {
            continue;
        }
        let url = text[m.range()].trim_end_matches(['.', ',', ';', ':', '!', '?', '*', '_']);
        let span = m.start()..m.start() + url.len();
        bare.push(span.clone());
        links.push(make(url.to_string(), url.to_string(), LinkSyntax::BareUrl, span.clone(), span));
    }

    for m in MAILTO_RE.find_iter(&masked) {
        if overlaps(&claimed, m.start()) || overlaps(&bare, m.start()) {
            continue;
        }
        let target = text[m.range()].trim_end_matches(['.', ',', ';', ':', '!', '?']);
        let span = m.start()..m.start() + target.len();
        links.push(make(target.to_string(), target.to_string(), LinkSyntax::Mailto, span.clone(), span));
    }

    links.sort_by_key(|l| l.span.start);
    links
}
