//! notesync: reconcile a remote note store with a local markdown
//! directory.
//!
//! Pull commands (`status`, `sync`, `dry-run`, `json`) treat the
//! remote store as authoritative; `push` goes the other way.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use notesync_cli::config::{self, Config};
use notesync_cli::native_fs::NativeFs;
use notesync_cli::simperium::HttpRemote;

use notesync_core::fs::FileSystem;
use notesync_core::remote::RemoteStore;
use notesync_core::{
    ApplyOptions, ChangeSet, Corpus, apply, apply_tag, diff, existing_tags, organize, plan_push,
    push, rename_note, scan, unclassified,
};

#[derive(Parser, Debug)]
#[command(name = "notesync")]
#[command(about = "Sync a remote note store with a local markdown directory")]
struct Args {
    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what a sync would change, one line per difference
    Status {
        /// Corpus root directory
        root: Option<String>,
    },
    /// Apply remote state to the local directory
    Sync {
        /// Corpus root directory
        root: Option<String>,

        /// Move local files with no remote counterpart into TRASH/
        #[arg(long)]
        trash_orphans: bool,
    },
    /// Like sync, but only report what would happen
    DryRun {
        /// Corpus root directory
        root: Option<String>,
    },
    /// Emit the pending change set as JSON
    Json {
        /// Corpus root directory
        root: Option<String>,
    },
    /// Upload local notes to the remote store
    Push {
        /// Corpus root directory
        root: Option<String>,

        /// Only report what would be pushed
        #[arg(long)]
        dry_run: bool,
    },
    /// Curate untagged or identifier-named files in the corpus root
    #[command(subcommand)]
    Classify(ClassifyCommand),
}

#[derive(Subcommand, Debug)]
enum ClassifyCommand {
    /// List root files that still need a tag or a readable name
    List {
        /// Corpus root directory
        root: Option<String>,
    },
    /// List the existing tag directories
    Tags {
        /// Corpus root directory
        root: Option<String>,
    },
    /// Move tagged root files into their tag directories
    Organize {
        /// Corpus root directory
        root: Option<String>,
    },
    /// Tag one root file and move it into the tag directory
    Apply {
        /// File name in the corpus root
        file: String,
        /// Tag to apply
        tag: String,
        /// Corpus root directory
        root: Option<String>,
    },
    /// Rename a root file after a new title
    Rename {
        /// File name in the corpus root
        file: String,
        /// New title
        title: String,
        /// Corpus root directory
        root: Option<String>,
    },
}

impl ClassifyCommand {
    fn root(&self) -> Option<&str> {
        match self {
            ClassifyCommand::List { root }
            | ClassifyCommand::Tags { root }
            | ClassifyCommand::Organize { root }
            | ClassifyCommand::Apply { root, .. }
            | ClassifyCommand::Rename { root, .. } => root.as_deref(),
        }
    }
}

impl Command {
    fn root(&self) -> Option<&str> {
        match self {
            Command::Status { root }
            | Command::Sync { root, .. }
            | Command::DryRun { root }
            | Command::Json { root }
            | Command::Push { root, .. } => root.as_deref(),
            Command::Classify(classify) => classify.root(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // Usage errors exit 1; --help and --version exit 0.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // Respects RUST_LOG, defaults to warn so command output stays
    // readable (info with --verbose).
    let default_filter = if args.verbose {
        "info,notesync_cli=debug,notesync_core=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Curation is local-only and needs no credentials.
    if let Command::Classify(ref classify) = args.command {
        let root = match config::resolve_root(classify.root()) {
            Ok(root) => root,
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        };
        info!("Corpus root: {:?}", root);
        let fs = NativeFs::new(root);
        return run_classify(&fs, classify).await;
    }

    let config = match Config::load(args.command.root()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    info!("Corpus root: {:?}", config.root);
    let fs = NativeFs::new(config.root.clone());
    let remote = HttpRemote::new(&config);

    match args.command {
        Command::Status { .. } => {
            let (changes, _) = fetch_and_diff(&fs, &remote).await?;
            print_status(&changes);
        }
        Command::Sync { trash_orphans, .. } => {
            let (changes, _) = fetch_and_diff(&fs, &remote).await?;
            let opts = ApplyOptions {
                trash_orphans,
                ..Default::default()
            };
            let summary = apply(&fs, &changes, opts).await;
            print_summary(&summary);
        }
        Command::DryRun { .. } => {
            let (changes, _) = fetch_and_diff(&fs, &remote).await?;
            print_status(&changes);
            let opts = ApplyOptions {
                dry_run: true,
                ..Default::default()
            };
            let summary = apply(&fs, &changes, opts).await;
            print_summary(&summary);
        }
        Command::Json { .. } => {
            let (changes, _) = fetch_and_diff(&fs, &remote).await?;
            println!("{}", serde_json::to_string_pretty(&json_report(&changes))?);
        }
        Command::Push { dry_run, .. } => {
            let notes = remote.fetch_all().await?;
            let corpus = scan(&fs).await?;
            warn_scan_errors(&corpus);

            let plan = plan_push(&notes, &corpus);
            println!(
                "Push plan: {} to create, {} to update, {} to retag, {} unchanged",
                plan.creates.len(),
                plan.content_updates.len(),
                plan.tag_updates.len(),
                plan.unchanged.len(),
            );

            let summary = push(&fs, &remote, &plan, dry_run).await;
            println!(
                "{}Created {}, updated {}, retagged {} ({} errors)",
                if dry_run { "[dry run] " } else { "" },
                summary.created,
                summary.updated,
                summary.retagged,
                summary.errors,
            );
            if summary.errors > 0 {
                std::process::exit(2);
            }
        }
        // Dispatched before config loading.
        Command::Classify(_) => {}
    }

    Ok(())
}

async fn run_classify(fs: &NativeFs, command: &ClassifyCommand) -> Result<()> {
    match command {
        ClassifyCommand::List { .. } => {
            let corpus = scan(fs).await?;
            warn_scan_errors(&corpus);
            let pending = unclassified(&corpus);
            println!("Found {} files needing classification:", pending.len());
            for file in &pending {
                let mut status = Vec::new();
                if file.needs_tag {
                    status.push("needs tag");
                }
                if file.needs_rename {
                    status.push("needs rename");
                }
                println!("  {} ({})", file.path, status.join(", "));
                println!("    -> {}", file.title);
            }
        }
        ClassifyCommand::Tags { .. } => {
            println!("Existing tags:");
            for tag in existing_tags(fs).await? {
                println!("  - {tag}");
            }
        }
        ClassifyCommand::Organize { .. } => {
            let corpus = scan(fs).await?;
            warn_scan_errors(&corpus);
            let summary = organize(fs, &corpus).await;
            println!(
                "Organized {} files with existing tags ({} errors)",
                summary.moved, summary.errors,
            );
            if summary.errors > 0 {
                std::process::exit(2);
            }
        }
        ClassifyCommand::Apply { file, tag, .. } => {
            let dest = apply_tag(fs, file, tag).await?;
            println!("Moved: {file} -> {dest}");
        }
        ClassifyCommand::Rename { file, title, .. } => {
            let dest = rename_note(fs, file, title).await?;
            println!("Renamed: {file} -> {dest}");
        }
    }

    Ok(())
}

async fn fetch_and_diff<F: FileSystem>(fs: &F, remote: &HttpRemote) -> Result<(ChangeSet, Corpus)> {
    let notes = remote.fetch_all().await?;
    let corpus = scan(fs).await?;
    warn_scan_errors(&corpus);
    let changes = diff(&notes, &corpus);
    Ok((changes, corpus))
}

fn warn_scan_errors(corpus: &Corpus) {
    for err in &corpus.errors {
        eprintln!("Warning: {err}");
    }
}

fn print_status(changes: &ChangeSet) {
    println!(
        "Remote: {} active, {} trashed. Local: {} files.",
        changes.remote_active, changes.remote_trashed, changes.local_count,
    );

    for item in &changes.to_trash {
        println!("  trash   {}", item.path);
    }
    for item in &changes.tag_changes {
        println!(
            "  move    {} -> {}/",
            item.path,
            item.new_tag.as_deref().unwrap_or("."),
        );
    }
    for item in &changes.content_changes {
        println!("  update  {}", item.path);
    }
    for item in &changes.new_notes {
        println!(
            "  create  {} [{}]",
            item.note.title(),
            item.dir_tag.as_deref().unwrap_or("untagged"),
        );
    }
    for item in &changes.orphaned {
        println!("  orphan  {}", item.path);
    }

    if changes.is_converged() {
        println!("Everything up to date ({} identical).", changes.identical.len());
    }
}

fn print_summary(summary: &notesync_core::Summary) {
    println!(
        "Trashed {}, moved {}, updated {}, created {} ({} untagged), {} orphaned, {} errors",
        summary.trashed,
        summary.moved,
        summary.updated,
        summary.created,
        summary.untagged,
        summary.orphaned,
        summary.errors,
    );
    if summary.errors > 0 {
        std::process::exit(2);
    }
}


fn json_report(changes: &ChangeSet) -> serde_json::Value {
    serde_json::json!({
        "remote_active": changes.remote_active,
        "remote_trashed": changes.remote_trashed,
        "local_count": changes.local_count,
        "identical": changes.identical.len(),
        "to_trash": changes.to_trash.iter().map(|i| &i.path).collect::<Vec<_>>(),
        "tag_changes": changes.tag_changes.iter().map(|i| {
            serde_json::json!({
                "path": i.path,
                "old_tag": i.old_tag,
                "new_tag": i.new_tag,
            })
        }).collect::<Vec<_>>(),
        "content_changes": changes.content_changes.iter().map(|i| &i.path).collect::<Vec<_>>(),
        "new_notes": changes.new_notes.iter().map(|i| {
            serde_json::json!({
                "title": i.note.title(),
                "dir_tag": i.dir_tag,
            })
        }).collect::<Vec<_>>(),
        "orphaned": changes.orphaned.iter().map(|i| &i.path).collect::<Vec<_>>(),
    })
}
