use rayon::prelude::*;

use crate::config::Config;
use crate::corpus::{CorpusIndex, Document};
use crate::dupes::{find_duplicates, DuplicateGroup};
use crate::extract::{extract_links, Link};
use crate::validate::{Issue, Severity, Validator};

/// Everything one run found, sorted by source path then line
#[derive(Debug, Default)]
pub struct ScanResult {
    pub documents: usize,
    pub links: Vec<Link>,
    pub issues: Vec<Issue>,
    pub duplicates: Vec<DuplicateGroup>,
}

impl ScanResult {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }
}

struct DocumentScan {
    links: Vec<Link>,
    issues: Vec<Issue>,
    duplicates: Vec<DuplicateGroup>,
}

fn scan_document(validator: &Validator<'_>, doc: &Document) -> DocumentScan {
    let links = extract_links(&doc.path, &doc.text);
    let issues = validator.validate_document(doc, &links);
    let duplicates = find_duplicates(validator.resolver(), &links);
    log::debug!(
        "{}: {} links, {} issues, {} duplicate groups",
        doc.path,
        links.len(),
        issues.len(),
        duplicates.len()
    );
    DocumentScan {
        links,
        issues,
        duplicates,
    }
}

/// Extract, validate and group the links of every document, in parallel.
///
/// `only` restricts the scan to one corpus-relative path. The index must be
/// fully built; it is only read here.
pub fn scan(index: &CorpusIndex, config: &Config, only: Option<&str>) -> ScanResult {
    let validator = Validator::new(index, config);
    let selected: Vec<&Document> = index
        .documents()
        .iter()
        .filter(|doc| only.is_none_or(|path| doc.path == path))
        .collect();

    let scans: Vec<DocumentScan> = selected
        .par_iter()
        .map(|doc| scan_document(&validator, doc))
        .collect();

    let mut result = ScanResult {
        documents: selected.len(),
        ..ScanResult::default()
    };
    for scan in scans {
        result.links.extend(scan.links);
        result.issues.extend(scan.issues);
        result.duplicates.extend(scan.duplicates);
    }

    result.issues.extend(
        index
            .failures()
            .iter()
            .filter(|f| only.is_none_or(|path| f.path == path))
            .map(Issue::read_error),
    );
    result
        .issues
        .sort_by(|a, b| a.source.cmp(&b.source).then(a.line.cmp(&b.line)));

    result
}
