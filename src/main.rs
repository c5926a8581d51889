use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use std::path::{Path, PathBuf};
use template_patcher::{
    merge_split_tags, repair, report, scan, CloseAnchor, PlainTextDocument, RepairPolicy,
    TemplateDocument,
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "template-patcher")]
#[command(about = "Balance checker and repairer for block tags in document template text", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every block tag in a file with offsets
    Scan {
        /// Template text file (e.g. an extracted word/document.xml)
        file: PathBuf,

        /// Merge tags split across formatting runs before scanning
        #[arg(short, long)]
        merge_runs: bool,

        /// Emit JSON instead of human-readable output
        #[arg(long)]
        json: bool,
    },

    /// Report per-name open/close balance and structural defects
    Report {
        /// Template text file, or a directory to check recursively
        path: PathBuf,

        /// File extension to match when checking a directory
        #[arg(long, default_value = "xml")]
        ext: String,

        /// Merge tags split across formatting runs before scanning
        #[arg(short, long)]
        merge_runs: bool,

        /// Emit JSON instead of human-readable output
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a file so block tags are explicitly and unambiguously paired
    Repair {
        /// Template text file
        file: PathBuf,

        /// Repair policy to apply
        #[arg(short, long, value_enum)]
        policy: PolicyArg,

        /// Restrict explicitize to these tag names (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,

        /// Byte offset for synthesized closes (default: end of buffer)
        #[arg(long)]
        anchor_offset: Option<usize>,

        /// Merge tags split across formatting runs before repairing
        #[arg(short, long)]
        merge_runs: bool,

        /// Write the result back to the input file
        #[arg(short, long)]
        in_place: bool,

        /// Write the result to this path instead
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show what would change without writing anything
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Emit a JSON summary instead of human-readable output
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Rewrite anonymous {/} closes to explicit named closes
    Explicitize,
    /// Insert synthesized closes for unmatched opens (best effort)
    Synthesize,
    /// Delete excess named closes until counts balance
    Prune,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            file,
            merge_runs,
            json,
        } => cmd_scan(&file, merge_runs, json),

        Commands::Report {
            path,
            ext,
            merge_runs,
            json,
        } => cmd_report(&path, &ext, merge_runs, json),

        Commands::Repair {
            file,
            policy,
            tag,
            anchor_offset,
            merge_runs,
            in_place,
            output,
            dry_run,
            diff,
            json,
        } => {
            let opts = RepairOpts {
                policy,
                tags: tag,
                anchor_offset,
                merge_runs,
                in_place,
                output,
                dry_run,
                diff,
                json,
            };
            cmd_repair(&file, opts)
        }
    }
}

fn load_text(file: &Path, merge_runs: bool) -> Result<String> {
    let doc = PlainTextDocument::open(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let text = doc.extract_text().to_string();
    Ok(if merge_runs { merge_split_tags(&text) } else { text })
}

fn cmd_scan(file: &Path, merge_runs: bool, json: bool) -> Result<()> {
    let text = load_text(file, merge_runs)?;
    let tags: Vec<_> = scan(&text).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
        return Ok(());
    }

    println!("{} tags in {}", tags.len(), file.display());
    for tag in &tags {
        println!("  {:>8}..{:<8} {}", tag.start, tag.end, tag.render());
    }

    Ok(())
}

/// Print one file's balance report. Returns true when the file is clean.
fn report_one(file: &Path, merge_runs: bool, json: bool) -> Result<bool> {
    let text = load_text(file, merge_runs)?;
    let rep = report(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&rep)?);
        return Ok(rep.is_clean());
    }

    println!("{}", file.display().to_string().bold());

    if rep.counts.is_empty() {
        println!("  {}", "no block tags found".dimmed());
    }
    for (name, counts) in &rep.counts {
        let glyph = if counts.is_balanced() {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {}: {} open, {} close",
            glyph, name, counts.open, counts.close
        );
    }

    let mut clean = true;
    for (name, counts) in rep.unbalanced() {
        clean = false;
        if counts.open > counts.close {
            println!(
                "  {} {}: missing {} closing tag(s)",
                "✗".red(),
                name,
                counts.open - counts.close
            );
        } else {
            println!(
                "  {} {}: {} extra closing tag(s)",
                "✗".red(),
                name,
                counts.close - counts.open
            );
        }
    }

    for diagnostic in &rep.diagnostics {
        clean = false;
        println!("  {} {}", "⊙".yellow(), diagnostic);
    }

    if clean {
        println!("  {}", "all tags balanced".green());
    }

    Ok(clean)
}

fn cmd_report(path: &Path, ext: &str, merge_runs: bool, json: bool) -> Result<()> {
    let files: Vec<PathBuf> = if path.is_dir() {
        let mut found = Vec::new();
        for entry in WalkDir::new(path) {
            let entry = entry?;
            if entry.file_type().is_file()
                && entry.path().extension().and_then(|s| s.to_str()) == Some(ext)
            {
                found.push(entry.path().to_path_buf());
            }
        }
        found.sort();
        if found.is_empty() {
            anyhow::bail!("no .{} files found under {}", ext, path.display());
        }
        found
    } else {
        vec![path.to_path_buf()]
    };

    let mut defective = 0;
    for file in &files {
        if !report_one(file, merge_runs, json)? {
            defective += 1;
        }
        if !json {
            println!();
        }
    }

    if !json && files.len() > 1 {
        println!("{}", "Summary:".bold());
        println!(
            "  {} clean",
            format!("{}", files.len() - defective).green()
        );
        println!("  {} with defects", format!("{defective}").red());
    }

    if defective > 0 {
        std::process::exit(1);
    }

    Ok(())
}

struct RepairOpts {
    policy: PolicyArg,
    tags: Vec<String>,
    anchor_offset: Option<usize>,
    merge_runs: bool,
    in_place: bool,
    output: Option<PathBuf>,
    dry_run: bool,
    diff: bool,
    json: bool,
}

#[derive(Serialize)]
struct RepairSummary<'a> {
    file: String,
    policy: &'a RepairPolicy,
    edits_applied: usize,
    best_effort: bool,
    diagnostics: &'a [template_patcher::Diagnostic],
    balanced_after: bool,
}

fn cmd_repair(file: &Path, opts: RepairOpts) -> Result<()> {
    let policy = match opts.policy {
        PolicyArg::Explicitize => RepairPolicy::Explicitize {
            only: if opts.tags.is_empty() {
                None
            } else {
                Some(opts.tags.clone())
            },
        },
        PolicyArg::Synthesize => RepairPolicy::SynthesizeMissing {
            anchor: match opts.anchor_offset {
                Some(offset) => CloseAnchor::Offset(offset),
                None => CloseAnchor::BufferEnd,
            },
        },
        PolicyArg::Prune => RepairPolicy::PruneExtra,
    };

    let original = load_text(file, opts.merge_runs)?;
    let outcome = repair(&original, &policy)
        .with_context(|| format!("repair failed for {}", file.display()))?;

    // Recompute on the result to confirm convergence.
    let after = report(&outcome.buffer);

    if opts.json {
        let summary = RepairSummary {
            file: file.display().to_string(),
            policy: &policy,
            edits_applied: outcome.edits.len(),
            best_effort: outcome.best_effort,
            diagnostics: &outcome.diagnostics,
            balanced_after: after.is_balanced(),
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        if opts.dry_run {
            println!("{}", "[DRY RUN - nothing will be written]".cyan());
        }

        if outcome.edits.is_empty() {
            println!("{} {}: no edits", "⊙".yellow(), file.display());
        } else {
            println!(
                "{} {}: {} edit(s) applied",
                "✓".green(),
                file.display(),
                outcome.edits.len()
            );
        }

        if outcome.best_effort {
            println!(
                "{}",
                "  best-effort repair: counts balance, but synthesized close placement is heuristic"
                    .yellow()
            );
        }

        for diagnostic in &outcome.diagnostics {
            println!("  {} {}", "⊙".yellow(), diagnostic);
        }

        if opts.diff && original != outcome.buffer {
            display_diff(file, &original, &outcome.buffer);
        }
    }

    if !opts.dry_run {
        if let Some(out_path) = &opts.output {
            let doc = PlainTextDocument::from_text(out_path.clone(), outcome.buffer.clone());
            doc.save_as(out_path)
                .with_context(|| format!("failed to write {}", out_path.display()))?;
        } else if opts.in_place {
            let mut doc = PlainTextDocument::open(file)?;
            doc.replace_text(outcome.buffer.clone());
            doc.save()
                .with_context(|| format!("failed to write {}", file.display()))?;
        } else if original != outcome.buffer && !opts.json {
            println!(
                "{}",
                "  result discarded: pass --in-place or --output to persist".dimmed()
            );
        }
    }

    // Defects remaining after the repair signal failure whether or not
    // anything was written, so a dry-run preview matches the real run.
    if !after.is_balanced() || !after.diagnostics.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

/// Show unified diff between original and repaired content.
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (repaired)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
    println!();
}
