//! linkmend - link-graph checker and fixer for interlinked documentation corpora

pub mod anchor;
pub mod config;
pub mod corpus;
pub mod dupes;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod rewrite;
pub mod validate;

pub use config::Config;
pub use corpus::{CorpusIndex, Document};
pub use error::{Error, Result};
pub use extract::{extract_links, Link, LinkCategory, LinkSyntax};
pub use pipeline::{scan, ScanResult};
pub use resolve::{ResolvedTarget, Resolver};
pub use rewrite::{FixMode, FixOutcome, Rewriter};
pub use validate::{Issue, IssueKind, Severity, Validator};
