//! Heading-derived anchor slugs.
//!
//! The slug rule approximates the renderer's: lowercase, drop everything
//! that is not a letter, digit, space or hyphen, collapse runs of
//! whitespace/hyphens into one hyphen, trim hyphens at both ends. Because it
//! is an approximation, anchor mismatches are only ever warnings.

use ahash::{AHashMap, AHashSet};
use regex::Regex;
use std::sync::LazyLock;

use crate::extract::mask_code;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^ {0,3}#{1,6}[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*\r?$").expect("heading pattern")
});

// `## Title {#custom-id}` and kramdown's `## Title {: #custom-id}`
static EXPLICIT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{:?\s*#([\w-]+)\s*\}\s*$").expect("explicit id pattern"));

static HTML_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<[a-z][^>]*?\s(?:id|name)\s*=\s*["']([^"']+)["']"#).expect("html id pattern")
});

// Inline links and tags in a heading contribute only their visible text
static INLINE_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("inline link pattern"));

static INLINE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("inline tag pattern"));

/// Canonicalize heading text into a slug
pub fn slugify(heading: &str) -> String {
    let mut slug = String::with_capacity(heading.len());
    let mut pending_dash = false;

    for ch in heading.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
        // anything else is stripped without separating words
    }

    slug
}

/// Every anchor a document offers: heading slugs (with `-1`, `-2` suffixes
/// for repeats), explicit heading ids and HTML `id`/`name` attributes.
/// Headings inside fenced code do not count.
pub fn collect_anchors(text: &str) -> AHashSet<String> {
    let masked = mask_code(text);
    let mut anchors = AHashSet::new();
    let mut seen: AHashMap<String, usize> = AHashMap::new();

    for caps in HEADING_RE.captures_iter(&masked) {
        let Some(heading) = caps.get(1) else {
            continue;
        };
        let heading = &text[heading.range()];

        if let Some(id) = EXPLICIT_ID_RE.captures(heading).and_then(|c| c.get(1)) {
            anchors.insert(id.as_str().to_string());
            continue;
        }

        let visible = INLINE_LINK_RE.replace_all(heading, "$1");
        let slug = slugify(&INLINE_TAG_RE.replace_all(&visible, ""));
        if slug.is_empty() {
            continue;
        }
        let count = seen.entry(slug.clone()).or_insert(0);
        if *count > 0 {
            anchors.insert(format!("{}-{}", slug, count));
        }
        *count += 1;
        anchors.insert(slug);
    }

    for caps in HTML_ID_RE.captures_iter(&masked) {
        if let Some(id) = caps.get(1) {
            anchors.insert(text[id.range()].to_string());
        }
    }

    anchors
}
