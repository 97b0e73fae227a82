use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use linkmend::corpus::relative_path;
use linkmend::report::{self, Summary};
use linkmend::{scan, Config, CorpusIndex, Error, FixMode, Issue, Rewriter, ScanResult, Severity};

/// linkmend - Check and fix the link graph of a documentation corpus
#[derive(Parser)]
#[command(name = "linkmend")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".linkmend.toml")]
    config: PathBuf,

    /// Corpus root (overrides the config file)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List every link in the corpus
    Discover {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Write the JSON discovery record to a file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate every link and report issues
    Check {
        /// Only check this document
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Write markdown, JSON and CSV reports into this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Error-severity issues tolerated before exiting non-zero
        #[arg(long)]
        max_errors: Option<usize>,
    },

    /// Rewrite links into canonical form
    Fix {
        /// Report what would change without writing (default)
        #[arg(long, conflicts_with = "apply")]
        dry_run: bool,

        /// Write changes, backing up every modified file first
        #[arg(long)]
        apply: bool,

        /// Only fix this document
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Run the check and count rewritable documents, never write
        #[arg(long)]
        validate_only: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.quiet, cli.verbose);

    let result = load_config(&cli.config, cli.root.as_deref()).and_then(|config| match cli.command {
        Commands::Discover { json, output } => cmd_discover(&config, json, output.as_deref(), cli.quiet),
        Commands::Check { file, json, report_dir, max_errors } => {
            cmd_check(&config, file.as_deref(), json, report_dir.as_deref(), max_errors, cli.quiet)
        }
        Commands::Fix { dry_run: _, apply, file, validate_only } => {
            let mode = if apply { FixMode::Apply } else { FixMode::DryRun };
            cmd_fix(&config, mode, file.as_deref(), validate_only, cli.quiet)
        }
    });

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            let missing_root = matches!(e.downcast_ref::<Error>(), Some(Error::CorpusRootMissing(_)));
            std::process::exit(if missing_root { 2 } else { 1 });
        }
    }
}

fn init_logger(quiet: bool, verbose: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    if verbose || quiet {
        builder.parse_filters(level);
    }
    builder.format_timestamp(None).format_target(false).init();
}

fn load_config(path: &Path, root: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::load(path)?;
    if let Some(root) = root {
        config.root = root.to_path_buf();
    }
    log::debug!("corpus root {}, prefix {:?}", config.root.display(), config.url_prefix);
    Ok(config)
}

fn build_index(config: &Config, quiet: bool) -> anyhow::Result<CorpusIndex> {
    let start = Instant::now();
    let index = CorpusIndex::build(config)?;
    if !quiet {
        eprintln!(
            "Indexed {} documents in {:?}",
            index.len().to_string().cyan(),
            start.elapsed()
        );
    }
    Ok(index)
}

/// `--file` may be given relative to the working directory or to the corpus root
fn corpus_relative(file: &Path, root: &Path) -> String {
    if let (Ok(file), Ok(root)) = (fs::canonicalize(file), fs::canonicalize(root)) {
        if let Some(rel) = relative_path(&file, &root) {
            return rel;
        }
    }
    let raw = file.to_string_lossy().replace('\\', "/");
    raw.trim_start_matches("./").to_string()
}

fn only_file(file: Option<&Path>, config: &Config, index: &CorpusIndex) -> anyhow::Result<Option<String>> {
    let Some(file) = file else {
        return Ok(None);
    };
    let rel = corpus_relative(file, &config.root);
    if index.get(&rel).is_none() && !index.failures().iter().any(|f| f.path == rel) {
        anyhow::bail!("{} is not a document of {}", file.display(), config.root.display());
    }
    Ok(Some(rel))
}

// ============================================================================
// discover
// ============================================================================

fn cmd_discover(config: &Config, json: bool, output: Option<&Path>, quiet: bool) -> anyhow::Result<bool> {
    if !quiet && !json {
        println!("{} {}", "Discovering".cyan().bold(), config.root.display());
    }

    let index = build_index(config, quiet || json)?;
    let result = scan(&index, config, None);
    let found = report::discovery(result.documents, &result.links);

    if json || output.is_some() {
        let rendered = serde_json::to_string_pretty(&found)?;
        match output {
            Some(path) => {
                fs::write(path, rendered).with_context(|| format!("writing {}", path.display()))?;
                if !quiet {
                    println!("{} {}", "Wrote".green(), path.display());
                }
            }
            None => println!("{}", rendered),
        }
        if json {
            return Ok(true);
        }
    }

    println!(
        "{} links in {} files",
        found.summary.total_links.to_string().cyan().bold(),
        found.summary.total_files
    );
    println!("\n{}", "By type:".bold());
    for (kind, count) in &found.summary.links_by_type {
        println!("  {:<10} {}", kind, count);
    }
    println!("\n{}", "By format:".bold());
    for (format, count) in &found.summary.links_by_format {
        println!("  {:<10} {}", format, count);
    }

    Ok(true)
}

// ============================================================================
// check
// ============================================================================

fn print_issue(issue: &Issue) {
    let severity = match issue.severity {
        Severity::Error => "ERROR".red().bold(),
        Severity::Warning => "WARN ".yellow().bold(),
    };
    println!(
        "  {} {:<10} {}:{}  {}",
        severity,
        issue.kind.name(),
        issue.source.cyan(),
        issue.line,
        issue.message
    );
    if let Some(suggestion) = &issue.suggestion {
        println!("  {:>16} {}", "→".dimmed(), suggestion.green());
    }
}

fn print_summary(result: &ScanResult) {
    let summary = Summary::from_scan(result);
    println!(
        "\n{} documents, {} links, {} errors, {} warnings, {} duplicate groups",
        summary.total_documents,
        summary.total_links,
        if summary.errors > 0 {
            summary.errors.to_string().red().bold()
        } else {
            summary.errors.to_string().green()
        },
        summary.warnings.to_string().yellow(),
        summary.duplicate_groups
    );
    for (kind, count) in &summary.by_kind {
        println!("  {:<12} {}", kind, count);
    }
}

fn cmd_check(
    config: &Config,
    file: Option<&Path>,
    json: bool,
    report_dir: Option<&Path>,
    max_errors: Option<usize>,
    quiet: bool,
) -> anyhow::Result<bool> {
    let start = Instant::now();
    if !quiet && !json {
        println!("{} {}", "Checking".cyan().bold(), config.root.display());
    }

    let index = build_index(config, quiet || json)?;
    let only = only_file(file, config, &index)?;
    let result = scan(&index, config, only.as_deref());
    let threshold = max_errors.unwrap_or(config.max_errors);
    let passed = result.errors() <= threshold;

    if let Some(dir) = report_dir {
        let written = report::write_reports(dir, &result)?;
        if !quiet && !json {
            for path in &written {
                println!("{} {}", "Wrote".green(), path.display());
            }
        }
    }

    if json {
        println!("{}", report::render_json(&result, chrono::Local::now())?);
        return Ok(passed);
    }

    if !quiet {
        for issue in &result.issues {
            print_issue(issue);
        }
        for group in &result.duplicates {
            println!(
                "  {} {} links {} times to {}",
                "DUP  ".blue().bold(),
                group.source.cyan(),
                group.count,
                group.target
            );
        }
    }
    print_summary(&result);
    eprintln!("Checked in {:?}", start.elapsed());

    if !passed {
        println!(
            "{} {} errors exceed the threshold of {}",
            "FAILED".red().bold(),
            result.errors(),
            threshold
        );
    } else if !quiet {
        println!("{}", "PASSED".green().bold());
    }
    Ok(passed)
}

// ============================================================================
// fix
// ============================================================================

fn cmd_fix(
    config: &Config,
    mode: FixMode,
    file: Option<&Path>,
    validate_only: bool,
    quiet: bool,
) -> anyhow::Result<bool> {
    let index = build_index(config, quiet)?;
    let only = only_file(file, config, &index)?;
    let rewriter = Rewriter::new(config);

    if validate_only {
        let result = scan(&index, config, only.as_deref());
        print_summary(&result);
        let pending = rewriter
            .fix_corpus(&index, only.as_deref(), FixMode::DryRun)
            .iter()
            .filter(|o| o.modified())
            .count();
        println!("{} documents would be rewritten", pending.to_string().yellow().bold());
        return Ok(true);
    }

    if !quiet {
        let action = match mode {
            FixMode::Apply => "Fixing",
            FixMode::DryRun => "Fixing (dry run)",
        };
        println!("{} {}", action.cyan().bold(), config.root.display());
    }

    let outcomes = rewriter.fix_corpus(&index, only.as_deref(), mode);
    let mut failed = 0;
    let mut changed = 0;
    for outcome in &outcomes {
        if let Some(error) = &outcome.error {
            failed += 1;
            println!("  {} {}: {}", "FAILED".red().bold(), outcome.path, error);
            if let Some(backup) = &outcome.backup {
                println!("         backup kept at {}", backup.display());
            }
            continue;
        }
        if !outcome.modified() {
            continue;
        }
        changed += 1;
        if !quiet {
            let status = if outcome.written { "fixed".green() } else { "would fix".yellow() };
            println!("  {} {} ({})", status, outcome.path.cyan(), outcome.applied.join(", "));
        }
    }

    println!(
        "\n{} of {} documents {}",
        changed.to_string().bold(),
        outcomes.len(),
        match mode {
            FixMode::Apply => "rewritten",
            FixMode::DryRun => "need rewriting (run with --apply to write)",
        }
    );
    if mode == FixMode::Apply && changed > 0 && !quiet {
        println!("Backups in {}", config.backup_dir.display());
    }

    Ok(failed == 0)
}
