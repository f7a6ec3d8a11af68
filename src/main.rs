mod app;
mod backend;
mod config;
mod coordinator;
mod feed;
mod notifications;
mod presentation;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use app::App;
use backend::{DeleteTarget, ProcessingItem};
use clap::{Parser, Subcommand, ValueEnum};
use config::CoordinatorConfig;
use coordinator::{DeleteOutcome, UploadFile, UploadOutcome};
use feed::FeedSnapshot;
use notifications::StoreSnapshot;
use presentation::{grouped_view, BadgeIcon};
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "notify-coordinator",
    about = "Upload, delete and process backend files while tracking every operation"
)]
struct Cli {
    /// Send mutations to an in-memory backend instead of the configured server.
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload local files into a folder on the backend, a few at a time.
    Upload {
        /// Files to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Destination folder on the backend; empty means the root.
        #[arg(long, default_value = "")]
        target: String,
        /// Files sent concurrently per batch (defaults to NOTIFY_UPLOAD_BATCH_SIZE or 3).
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Delete a file, a folder, or the processed data of a file.
    Delete {
        path: String,
        #[arg(long, value_enum, default_value_t = DeleteKindArg::File)]
        kind: DeleteKindArg,
    },
    /// Queue already uploaded files for processing.
    Process {
        #[arg(required = true)]
        paths: Vec<String>,
        /// Stack identifier to queue each file into; repeat for several stacks.
        #[arg(long = "stack", required = true)]
        stacks: Vec<i64>,
    },
    /// Print the current processing and model-service status once.
    Status {
        /// How long to wait for both feeds to report.
        #[arg(long, default_value_t = 5_000)]
        wait_ms: u64,
    },
    /// Follow the status feeds and print notifications until Ctrl-C.
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DeleteKindArg {
    File,
    Folder,
    Processed,
}

impl DeleteKindArg {
    fn target(self, path: String) -> DeleteTarget {
        match self {
            DeleteKindArg::File => DeleteTarget::file(path),
            DeleteKindArg::Folder => DeleteTarget::folder(path),
            DeleteKindArg::Processed => DeleteTarget::processed_data(path),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = CoordinatorConfig::from_env().context("Invalid coordinator configuration")?;
    let app = if cli.dry_run {
        App::dry_run(config)
    } else {
        App::connect(config).context("Backend client initialization failed")?
    };

    match cli.command {
        Commands::Upload {
            paths,
            target,
            batch_size,
        } => {
            let batch_size = batch_size.unwrap_or(app.config().upload_batch_size);
            run_upload(&app, paths, &target, batch_size).await
        }
        Commands::Delete { path, kind } => run_delete(&app, kind.target(path)).await,
        Commands::Process { paths, stacks } => run_process(&app, paths, stacks).await,
        Commands::Status { wait_ms } => run_status(&app, Duration::from_millis(wait_ms)).await,
        Commands::Watch => run_watch(&app).await,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}

async fn run_upload(
    app: &App,
    paths: Vec<PathBuf>,
    target: &str,
    batch_size: usize,
) -> anyhow::Result<()> {
    let files = paths
        .into_iter()
        .map(UploadFile::from_path)
        .collect::<anyhow::Result<Vec<_>>>()?;

    let files = match <[UploadFile; 1]>::try_from(files) {
        Ok([file]) => return run_single_upload(app, file, target).await,
        Err(files) => files,
    };

    let mut progress = app.uploads.subscribe_progress();
    let upload = app.uploads.upload_many(files, target, batch_size);
    tokio::pin!(upload);

    let mut interrupted = false;
    let summary = loop {
        tokio::select! {
            summary = &mut upload => break summary,
            changed = progress.changed() => {
                if changed.is_ok() {
                    info!(progress = *progress.borrow_and_update(), "upload progress");
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("interrupt received; cancelling remaining uploads");
                interrupted = true;
                app.uploads.cancel();
            }
        }
    };

    println!("{}", render(&app.store().snapshot()));
    if summary.failed > 0 || summary.cancelled > 0 {
        bail!(
            "{} of {} uploads did not complete ({} failed, {} cancelled)",
            summary.failed + summary.cancelled,
            summary.operation_ids.len(),
            summary.failed,
            summary.cancelled
        );
    }
    info!(uploaded = summary.succeeded, "all uploads finished");
    Ok(())
}

async fn run_single_upload(app: &App, file: UploadFile, target: &str) -> anyhow::Result<()> {
    let upload = app.uploads.upload_one(file, target);
    tokio::pin!(upload);

    let outcome = tokio::select! {
        outcome = &mut upload => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received; cancelling upload");
            app.uploads.cancel();
            upload.await
        }
    };

    println!("{}", render(&app.store().snapshot()));
    match outcome {
        UploadOutcome::Uploaded => Ok(()),
        UploadOutcome::Failed(message) => bail!("Upload failed: {message}"),
        UploadOutcome::Cancelled => bail!("Upload cancelled"),
    }
}

async fn run_delete(app: &App, target: DeleteTarget) -> anyhow::Result<()> {
    let outcome = app.deletions.delete(target).await;
    println!("{}", render(&app.store().snapshot()));

    match outcome {
        DeleteOutcome::Deleted => Ok(()),
        DeleteOutcome::Conflict(_) => bail!("Delete blocked by files that are still processing"),
        DeleteOutcome::Failed(message) => bail!("Delete failed: {message}"),
    }
}

async fn run_process(app: &App, paths: Vec<String>, stacks: Vec<i64>) -> anyhow::Result<()> {
    let items = paths
        .into_iter()
        .map(|original_path| ProcessingItem {
            original_path,
            stacks_identifiers_to_queue: stacks.clone(),
        })
        .collect();

    let result = app.processing.queue(items).await;
    println!("{}", render(&app.store().snapshot()));
    result
}

async fn run_status(app: &App, wait: Duration) -> anyhow::Result<()> {
    let feeds = app.start_feeds()?;

    let reported = tokio::time::timeout(
        wait,
        futures::future::join(
            first_report(feeds.processing.name(), feeds.processing.subscribe()),
            first_report(feeds.service.name(), feeds.service.subscribe()),
        ),
    )
    .await;
    if reported.is_err() {
        warn!(wait_ms = wait.as_millis() as u64, "status feeds did not report in time");
    }

    let processing = feeds.processing.snapshot();
    match processing.status() {
        Some(status) => println!(
            "processing: {}/{} files ({}%){}",
            status.processed_count,
            status.total_count,
            status.progress_percent(),
            stale_marker(processing.is_fresh())
        ),
        None => println!("processing: unknown ({})", feeds.processing.state()),
    }
    let service = feeds.service.snapshot();
    match service.status() {
        Some(status) if status.available => {
            println!("model service: available{}", stale_marker(service.is_fresh()))
        }
        Some(status) => println!(
            "model service: unavailable{}{}",
            status
                .message
                .as_deref()
                .map(|message| format!(" ({message})"))
                .unwrap_or_default(),
            stale_marker(service.is_fresh())
        ),
        None => println!("model service: unknown ({})", feeds.service.state()),
    }

    feeds.shutdown().await;
    Ok(())
}

fn stale_marker(fresh: bool) -> &'static str {
    if fresh {
        ""
    } else {
        " [stale]"
    }
}

async fn first_report<S: Clone>(feed: &str, mut snapshots: watch::Receiver<FeedSnapshot<S>>) {
    if snapshots
        .wait_for(|snapshot| snapshot.status().is_some())
        .await
        .is_err()
    {
        error!(feed, "status feed closed before reporting");
    }
}

async fn run_watch(app: &App) -> anyhow::Result<()> {
    let feeds = app.start_feeds()?;
    let mut updates = app.store().subscribe();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                println!("{}", render(&snapshot));
            }
            _ = tokio::signal::ctrl_c() => {
                info!(remaining = app.store().len(), "interrupt received; stopping");
                break;
            }
        }
    }

    feeds.shutdown().await;
    Ok(())
}

fn glyph(icon: BadgeIcon) -> &'static str {
    match icon {
        BadgeIcon::Clock => "…",
        BadgeIcon::Spinner => "⟳",
        BadgeIcon::Check => "✓",
        BadgeIcon::Cross => "✗",
        BadgeIcon::Warning => "!",
    }
}

fn render(snapshot: &StoreSnapshot) -> String {
    if snapshot.is_empty() {
        return "no active notifications".to_string();
    }
    let groups = grouped_view(snapshot);

    let mut lines = Vec::new();
    for group in groups {
        lines.push(format!("{} [{}%]", group.title, group.progress_percent));
        for op in group.operations {
            let mut line = format!(
                "  {} {} {}%",
                glyph(op.badge.icon),
                op.title,
                op.progress_percent
            );
            if !op.subtitle.is_empty() && op.subtitle != op.title {
                line.push_str(&format!(" ({})", op.subtitle));
            }
            lines.push(line);
            if let Some(message) = op.message {
                lines.extend(message.lines().map(|text| format!("      {text}")));
            }
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use crate::notifications::{OperationStatus, TrackedOperation};

    #[test]
    fn upload_command_parses_paths_and_flags() {
        let cli = Cli::parse_from([
            "notify-coordinator",
            "--dry-run",
            "upload",
            "a.txt",
            "b.txt",
            "--target",
            "docs",
            "--batch-size",
            "2",
        ]);
        assert!(cli.dry_run);
        match cli.command {
            Commands::Upload {
                paths,
                target,
                batch_size,
            } => {
                assert_eq!(paths, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
                assert_eq!(target, "docs");
                assert_eq!(batch_size, Some(2));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn delete_kind_maps_to_target() {
        let cli = Cli::parse_from(["notify-coordinator", "delete", "docs/a.pdf", "--kind", "processed"]);
        let Commands::Delete { path, kind } = cli.command else {
            panic!("expected delete command");
        };
        let target = kind.target(path);
        assert_eq!(target.endpoint(), "api/processing/processed-data");
        assert_eq!(target.original_path, "docs/a.pdf");
    }

    #[test]
    fn process_requires_a_stack() {
        let err = Cli::command()
            .try_get_matches_from(["notify-coordinator", "process", "docs/a.pdf"])
            .expect_err("missing --stack");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::parse_from([
            "notify-coordinator",
            "process",
            "docs/a.pdf",
            "--stack",
            "1",
            "--stack",
            "7",
        ]);
        let Commands::Process { stacks, .. } = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(stacks, vec![1, 7]);
    }

    #[test]
    fn cli_help_is_emitted_as_error_kind() {
        let err = Cli::command()
            .try_get_matches_from(["notify-coordinator", "--help"])
            .expect_err("help should short-circuit");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn render_lists_groups_with_messages() {
        let snapshot = StoreSnapshot {
            revision: 3,
            operations: vec![
                TrackedOperation::upload("a.txt", "docs/a.txt")
                    .with_status(OperationStatus::InProgress)
                    .with_progress(50),
                TrackedOperation::alert("svc", "Model service unavailable", "refused"),
            ],
        };

        let text = render(&snapshot);
        assert!(text.contains("Uploading 1 item [50%]"));
        assert!(text.contains("⟳ a.txt 50% (docs/a.txt)"));
        assert!(text.contains("! Model service unavailable 0%"));
        assert!(text.contains("      refused"));
        assert_eq!(render(&StoreSnapshot::default()), "no active notifications");
    }

    #[tokio::test]
    async fn dry_run_upload_renders_completed_entries() {
        let app = App::dry_run(CoordinatorConfig::default());
        let dir = std::env::temp_dir().join(format!("notify-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("report.txt");
        std::fs::write(&path, "quarterly").expect("write file");

        run_upload(&app, vec![path], "docs", 3)
            .await
            .expect("dry-run upload");

        let snapshot = app.store().snapshot();
        assert_eq!(snapshot.operations.len(), 1);
        assert_eq!(snapshot.operations[0].target_path, "docs/report.txt");
        assert_eq!(snapshot.operations[0].status, OperationStatus::Completed);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn dry_run_upload_of_several_files_runs_in_batches() {
        let app = App::dry_run(CoordinatorConfig::default());
        let dir = std::env::temp_dir().join(format!("notify-cli-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let paths: Vec<PathBuf> = ["a.txt", "b.txt", "c.txt"]
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, name).expect("write file");
                path
            })
            .collect();

        run_upload(&app, paths, "", 2).await.expect("dry-run upload");

        let snapshot = app.store().snapshot();
        let targets: Vec<&str> = snapshot
            .operations
            .iter()
            .map(|op| op.target_path.as_str())
            .collect();
        assert_eq!(targets, vec!["a.txt", "b.txt", "c.txt"]);
        assert!(snapshot
            .operations
            .iter()
            .all(|op| op.status == OperationStatus::Completed));
        assert_eq!(*app.uploads.subscribe_progress().borrow(), 100);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn stale_snapshots_are_marked() {
        assert_eq!(stale_marker(true), "");
        assert_eq!(stale_marker(false), " [stale]");
    }
}
