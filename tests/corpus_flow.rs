use std::fs;
use std::path::Path;

use linkmend::{scan, Config, CorpusIndex, FixMode, IssueKind, Rewriter};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn corpus(root: &Path) {
    write(root, "index.md", "---\ntitle: Home\n---\n# Home\n\n[Guide](dev/guide.md)\n");
    write(
        root,
        "dev/guide.md",
        "# Guide\n\n\
         ## When to Retrieve\n\n\
         See [the policy](../security/policy.md) and [again](../security/policy.md).\n\
         Nested [x](/corpus/dev/dev/setup.html#install).\n\
         Misplaced [apex](../api-reference/apex-patterns.html#triggers).\n\
         Missing [gone](../nowhere.html).\n\
         Self [retrieve](#when-to-retrieve) and [wrong](#nope).\n\
         Local http://localhost:4000/preview\n\n\
         ```markdown\n[example](../broken/example.md)\n```\n",
    );
    write(root, "dev/setup.md", "# Setup\n## Install\n");
    write(root, "security/policy.md", "# Policy\n");
    write(root, "development/apex-patterns.md", "# Apex Patterns\n## Triggers\n");
    write(root, "rag-index.md", "[generated](does/not/exist.md)\n");
}

fn config(root: &Path, backups: &Path) -> Config {
    let mut config = Config::from_toml(
        r#"
        url_prefix = "/corpus"

        [relocations]
        "apex-patterns.md" = "development"
        "#,
    )
    .unwrap();
    config.root = root.to_path_buf();
    config.backup_dir = backups.to_path_buf();
    config
}

fn kinds_for(result: &linkmend::ScanResult, source: &str) -> Vec<IssueKind> {
    result
        .issues
        .iter()
        .filter(|i| i.source == source)
        .map(|i| i.kind)
        .collect()
}

#[test]
fn test_check_then_fix_then_recheck() {
    let corpus_dir = tempfile::tempdir().unwrap();
    let backup_dir = tempfile::tempdir().unwrap();
    corpus(corpus_dir.path());
    let config = config(corpus_dir.path(), backup_dir.path());

    let index = CorpusIndex::build(&config).unwrap();
    assert_eq!(index.len(), 5);

    let result = scan(&index, &config, None);
    assert_eq!(
        kinds_for(&result, "dev/guide.md"),
        vec![
            IssueKind::Format,
            IssueKind::Format,
            IssueKind::Path,
            IssueKind::Path,
            IssueKind::Broken,
            IssueKind::Anchor,
            IssueKind::Suspicious,
        ]
    );
    assert_eq!(kinds_for(&result, "index.md"), vec![IssueKind::Format]);
    assert!(result.issues.iter().all(|i| i.source != "rag-index.md"));

    let nested = result
        .issues
        .iter()
        .find(|i| i.kind == IssueKind::Path && i.line == 6)
        .unwrap();
    assert_eq!(nested.suggestion.as_deref(), Some("/corpus/dev/setup.html#install"));
    let misplaced = result
        .issues
        .iter()
        .find(|i| i.kind == IssueKind::Path && i.line == 7)
        .unwrap();
    assert_eq!(
        misplaced.suggestion.as_deref(),
        Some("/corpus/development/apex-patterns.html#triggers")
    );

    assert_eq!(result.duplicates.len(), 1);
    assert_eq!(result.duplicates[0].count, 2);
    assert_eq!(result.duplicates[0].target, "security/policy.md");

    let original = fs::read_to_string(corpus_dir.path().join("dev/guide.md")).unwrap();
    let rewriter = Rewriter::new(&config);
    let outcomes = rewriter.fix_corpus(&index, None, FixMode::Apply);
    let guide = outcomes.iter().find(|o| o.path == "dev/guide.md").unwrap();
    assert!(guide.written, "{:?}", guide.error);
    assert_eq!(fs::read_to_string(guide.backup.as_ref().unwrap()).unwrap(), original);
    assert!(outcomes.iter().all(|o| o.error.is_none()));

    let rewritten = fs::read_to_string(corpus_dir.path().join("dev/guide.md")).unwrap();
    assert!(rewritten.contains("<a href=\"{{ '/corpus/security/policy.html' | relative_url }}\">the policy</a>"));
    assert!(rewritten.contains("<a href=\"{{ '/corpus/dev/setup.html#install' | relative_url }}\">x</a>"));
    assert!(rewritten.contains("'/corpus/development/apex-patterns.html#triggers'"));
    assert!(rewritten.contains("[example](../broken/example.md)"));
    assert!(rewritten.contains("[wrong](#nope)"));

    let index = CorpusIndex::build(&config).unwrap();
    let result = scan(&index, &config, None);
    assert_eq!(
        kinds_for(&result, "dev/guide.md"),
        vec![IssueKind::Broken, IssueKind::Anchor, IssueKind::Suspicious]
    );
    assert!(kinds_for(&result, "index.md").is_empty());

    let again = rewriter.fix_corpus(&index, None, FixMode::Apply);
    assert!(again.iter().all(|o| !o.modified() && !o.written));
}

#[test]
fn test_single_file_dry_run_writes_nothing() {
    let corpus_dir = tempfile::tempdir().unwrap();
    let backup_dir = tempfile::tempdir().unwrap();
    corpus(corpus_dir.path());
    let config = config(corpus_dir.path(), backup_dir.path());
    let index = CorpusIndex::build(&config).unwrap();

    let outcomes = Rewriter::new(&config).fix_corpus(&index, Some("index.md"), FixMode::DryRun);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].modified());
    assert!(!outcomes[0].written);
    assert!(outcomes[0].backup.is_none());
    assert_eq!(
        fs::read_to_string(corpus_dir.path().join("index.md")).unwrap(),
        "---\ntitle: Home\n---\n# Home\n\n[Guide](dev/guide.md)\n"
    );
    assert_eq!(fs::read_dir(backup_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_backup_failure_leaves_files_untouched() {
    let corpus_dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    corpus(corpus_dir.path());
    let blocker = scratch.path().join("backups");
    fs::write(&blocker, "not a directory").unwrap();
    let config = config(corpus_dir.path(), &blocker);
    let index = CorpusIndex::build(&config).unwrap();
    let guide = fs::read_to_string(corpus_dir.path().join("dev/guide.md")).unwrap();

    let outcomes = Rewriter::new(&config).fix_corpus(&index, None, FixMode::Apply);
    assert_eq!(outcomes.len(), 5);
    for outcome in &outcomes {
        assert!(!outcome.written);
        assert!(outcome.backup.is_none());
        assert_eq!(outcome.error.is_some(), outcome.modified(), "{}", outcome.path);
    }
    let failed: Vec<_> = outcomes.iter().filter(|o| o.error.is_some()).map(|o| o.path.as_str()).collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.contains(&"index.md") && failed.contains(&"dev/guide.md"));

    assert_eq!(fs::read_to_string(corpus_dir.path().join("dev/guide.md")).unwrap(), guide);
    assert_eq!(fs::read_to_string(&blocker).unwrap(), "not a directory");
}

#[test]
fn test_vanished_document_does_not_stop_the_batch() {
    let corpus_dir = tempfile::tempdir().unwrap();
    let backup_dir = tempfile::tempdir().unwrap();
    corpus(corpus_dir.path());
    let config = config(corpus_dir.path(), backup_dir.path());
    let index = CorpusIndex::build(&config).unwrap();
    fs::remove_file(corpus_dir.path().join("index.md")).unwrap();

    let outcomes = Rewriter::new(&config).fix_corpus(&index, None, FixMode::Apply);
    assert_eq!(outcomes.len(), 5);
    let gone = outcomes.iter().find(|o| o.path == "index.md").unwrap();
    assert!(gone.error.as_deref().is_some_and(|e| e.starts_with("read")));
    assert!(!gone.written);

    let guide = outcomes.iter().find(|o| o.path == "dev/guide.md").unwrap();
    assert!(guide.written, "{:?}", guide.error);
    assert!(fs::read_to_string(corpus_dir.path().join("dev/guide.md"))
        .unwrap()
        .contains("'/corpus/security/policy.html'"));
    assert!(!corpus_dir.path().join("index.md").exists());
}
