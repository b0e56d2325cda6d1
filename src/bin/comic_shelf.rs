use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use comic_shelf::app::{App, BulkResult, FetchResult, ListResult, LoadState, ProgressSinkKind};
use comic_shelf::config::{ConfigLoader, ResolvedConfig};
use comic_shelf::domain::ComicId;
use comic_shelf::download_list::AddOutcome;
use comic_shelf::error::ShelfError;
use comic_shelf::output::{JsonOutput, OutputMode};
use comic_shelf::remote::HttpClientFactory;
use comic_shelf::store::RecordStore;
use comic_shelf::tui::Tui;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "comic-shelf")]
#[command(about = "Browse locally cached comic details and download more from the remote source")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List local comics, optionally filtered by id or title")]
    List(ListArgs),
    #[command(about = "Show the stored details of one comic")]
    Info(IdArgs),
    #[command(about = "Download detail and cover of one comic")]
    Fetch(IdArgs),
    #[command(about = "Download details of related comics")]
    Related(RelatedArgs),
    #[command(about = "Manage the download list")]
    Queue(QueueArgs),
    #[command(about = "Delete a local comic record")]
    Delete(IdArgs),
    #[command(about = "Export the stored metadata of a comic as JSON")]
    Export(ExportArgs),
    #[command(about = "Download every image of a comic")]
    Pull(IdArgs),
}

#[derive(Args)]
struct ListArgs {
    query: Option<String>,
}

#[derive(Args)]
struct IdArgs {
    id: String,
}

#[derive(Args)]
struct RelatedArgs {
    id: String,

    #[arg(long, conflicts_with = "all")]
    select: Option<String>,

    #[arg(long)]
    all: bool,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long, short)]
    yes: bool,
}

#[derive(Args)]
struct QueueArgs {
    #[command(subcommand)]
    command: QueueCommand,
}

#[derive(Subcommand)]
enum QueueCommand {
    #[command(about = "Add a local comic to the download list")]
    Add(QueueAddArgs),
    #[command(about = "Show the entries of the download list")]
    Show(QueueShowArgs),
}

#[derive(Args)]
struct QueueAddArgs {
    id: String,

    #[arg(long)]
    list: Option<String>,
}

#[derive(Args)]
struct QueueShowArgs {
    #[arg(long)]
    list: Option<String>,
}

#[derive(Args)]
struct ExportArgs {
    id: String,
    destination: String,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<ShelfError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ShelfError) -> u8 {
    match error {
        ShelfError::InvalidComicId(_)
        | ShelfError::InvalidConcurrency(_)
        | ShelfError::RecordNotFound(_)
        | ShelfError::MetadataMissing(_)
        | ShelfError::RelatedNotFound { .. }
        | ShelfError::NoRelatedWorks(_)
        | ShelfError::ListNotFound(_)
        | ShelfError::ConfigMissing(_) => 2,
        ShelfError::Remote(_) | ShelfError::RemoteStatus { .. } | ShelfError::EmptyPhoto(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let app = build_app(&config);

    match cli.command {
        Commands::List(args) => run_list(args, &app, output_mode),
        Commands::Info(args) => run_info(args, &app, output_mode),
        Commands::Fetch(args) => run_fetch(args, app, output_mode),
        Commands::Related(args) => run_related(args, app, output_mode),
        Commands::Queue(args) => run_queue(args, &app, output_mode),
        Commands::Delete(args) => run_delete(args, &app, output_mode),
        Commands::Export(args) => run_export(args, &app, output_mode),
        Commands::Pull(args) => run_pull(args, app, output_mode),
    }
}

fn build_app(config: &ResolvedConfig) -> App<HttpClientFactory> {
    let store = RecordStore::new(config.records_dir.clone());
    let factory = HttpClientFactory::new(config.remote.clone());
    App::new(store, factory, config)
}

fn parse_id(value: &str) -> miette::Result<ComicId> {
    Ok(value.parse::<ComicId>()?)
}

fn run_list(
    args: ListArgs,
    app: &App<HttpClientFactory>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let result = app.list(args.query.as_deref(), &JsonOutput)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_list(&result).into_diagnostic(),
        OutputMode::Interactive => {
            print_list(&result);
            Ok(())
        }
    }
}

fn run_info(
    args: IdArgs,
    app: &App<HttpClientFactory>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = parse_id(&args.id)?;
    let result = app.info(&id, &JsonOutput)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_info(&result).into_diagnostic(),
        OutputMode::Interactive => {
            let meta = &result.metadata;
            println!("{CYAN}{} ({}){RESET}", meta.display_title(), result.id);
            let author = if meta.author.is_empty() {
                "unknown"
            } else {
                meta.author.as_str()
            };
            println!("author:   {author}");
            println!(
                "tags:     {}",
                if meta.tags.is_empty() {
                    "none".to_string()
                } else {
                    meta.tags.join(", ")
                }
            );
            println!("likes:    {}", meta.likes);
            println!("comments: {}", meta.comment_count);
            if result.has_cover {
                println!("cover:    {}", result.cover_path);
            } else {
                println!("cover:    {YELLOW}missing{RESET}");
            }
            if !meta.description.trim().is_empty() {
                println!();
                println!("{}", meta.description.trim());
            }
            if !meta.related_list.is_empty() {
                println!();
                println!("{CYAN}related works:{RESET}");
                for work in &meta.related_list {
                    println!("  {:<10} {}  [{}]", work.id, work.name, work.author);
                }
            }
            Ok(())
        }
    }
}

fn run_fetch(
    args: IdArgs,
    app: App<HttpClientFactory>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = parse_id(&args.id)?;
    let result = match output_mode {
        OutputMode::NonInteractive => app.fetch(&id, &JsonOutput)?,
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Fetch);
            tui.run(move |sink| app.fetch(&id, sink))?
        }
    };
    report_fetch(&result, output_mode)
}

fn run_related(
    args: RelatedArgs,
    app: App<HttpClientFactory>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = parse_id(&args.id)?;

    if let Some(selected) = args.select.as_deref() {
        let related_id = parse_id(selected)?;
        let result = match output_mode {
            OutputMode::NonInteractive => app.fetch_related(&id, &related_id, &JsonOutput)?,
            OutputMode::Interactive => {
                let mut tui = Tui::new(ProgressSinkKind::Fetch);
                tui.run(move |sink| app.fetch_related(&id, &related_id, sink))?
            }
        };
        return report_fetch(&result, output_mode);
    }

    if !args.all {
        return Err(miette::Report::msg(
            "choose a related work with --select <ID> or download all with --all",
        ));
    }

    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.fetch_all_related(&id, args.concurrency, &JsonOutput)?;
            JsonOutput::print_bulk(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let record = app.store().find(&id)?;
            let mut tui = Tui::new(ProgressSinkKind::Bulk);
            if !args.yes {
                let confirmed = tui.confirm(
                    "Confirm download",
                    &[
                        format!("Download details of all works related to {}?", record.title()),
                        format!("{} related works listed", record.metadata.related_list.len()),
                    ],
                )?;
                if !confirmed {
                    return Ok(());
                }
            }
            let concurrency = args.concurrency;
            let result = tui.run(move |sink| app.fetch_all_related(&id, concurrency, sink))?;
            print_bulk_summary(&result);
            Ok(())
        }
    }
}

fn run_queue(
    args: QueueArgs,
    app: &App<HttpClientFactory>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match args.command {
        QueueCommand::Add(args) => {
            let id = parse_id(&args.id)?;
            let list = args.list.map(Utf8PathBuf::from);
            let result = app.add_to_list(&id, list.as_deref(), &JsonOutput)?;
            match output_mode {
                OutputMode::NonInteractive => JsonOutput::print_queue(&result).into_diagnostic(),
                OutputMode::Interactive => {
                    match result.outcome {
                        AddOutcome::Added => println!(
                            "{GREEN}added {} ({}) to {}{RESET}",
                            result.title, result.id, result.list_path
                        ),
                        AddOutcome::AlreadyPresent => println!(
                            "{YELLOW}{} is already in {}{RESET}",
                            result.id, result.list_path
                        ),
                    }
                    Ok(())
                }
            }
        }
        QueueCommand::Show(args) => {
            let list = args.list.map(Utf8PathBuf::from);
            let result = app.show_list(list.as_deref(), &JsonOutput)?;
            match output_mode {
                OutputMode::NonInteractive => {
                    JsonOutput::print_queue_list(&result).into_diagnostic()
                }
                OutputMode::Interactive => {
                    println!(
                        "{CYAN}{} ({} entries){RESET}",
                        result.list_path,
                        result.entries.len()
                    );
                    for entry in &result.entries {
                        println!("  {:<10} {}  [{}]", entry.id, entry.title, entry.tags.join(", "));
                    }
                    Ok(())
                }
            }
        }
    }
}

fn run_delete(
    args: IdArgs,
    app: &App<HttpClientFactory>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = parse_id(&args.id)?;
    let result = app.delete(&id, &JsonOutput)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_delete(&result).into_diagnostic(),
        OutputMode::Interactive => {
            println!("{GREEN}deleted {}{RESET}", result.dir);
            Ok(())
        }
    }
}

fn run_export(
    args: ExportArgs,
    app: &App<HttpClientFactory>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = parse_id(&args.id)?;
    let destination = Utf8PathBuf::from(args.destination);
    let result = app.export(&id, &destination, &JsonOutput)?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_export(&result).into_diagnostic(),
        OutputMode::Interactive => {
            println!("{GREEN}exported {} to {}{RESET}", result.id, result.path);
            Ok(())
        }
    }
}

fn run_pull(
    args: IdArgs,
    app: App<HttpClientFactory>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let id = parse_id(&args.id)?;
    match output_mode {
        OutputMode::NonInteractive => {
            let result = app.download_album(&id, &JsonOutput)?;
            JsonOutput::print_album(&result).into_diagnostic()
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(ProgressSinkKind::Album);
            let result = tui.run(move |sink| app.download_album(&id, sink))?;
            println!(
                "{GREEN}downloaded {} images of {} into {}{RESET}",
                result.images, result.id, result.dir
            );
            Ok(())
        }
    }
}

fn report_fetch(result: &FetchResult, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_fetch(result).into_diagnostic()?,
        OutputMode::Interactive => {
            if result.success {
                println!("{GREEN}fetched {} ({}){RESET}", result.title, result.id);
            } else {
                println!(
                    "{RED}failed {} ({}): {}{RESET}",
                    result.title,
                    result.id,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    Ok(())
}

fn print_list(result: &ListResult) {
    match result.state {
        LoadState::MissingRoot => {
            println!("{RED}records directory does not exist: {}{RESET}", result.root);
            return;
        }
        LoadState::Empty => {
            println!("{YELLOW}no comic data found in {}{RESET}", result.root);
            return;
        }
        LoadState::NoValidRecords => {
            println!("{YELLOW}no valid comic data, fetch some details first{RESET}");
        }
        LoadState::Loaded => {}
    }

    for entry in &result.records {
        println!("{:<10} {}", entry.id, entry.title);
    }
    if result.records.is_empty() && result.total > 0 {
        println!("{YELLOW}no matching comics{RESET}");
    }
    println!(
        "{CYAN}{}/{} comics shown{RESET}",
        result.matched, result.total
    );
    for skipped in &result.skipped {
        println!("{YELLOW}skipped {}: {}{RESET}", skipped.dir, skipped.reason);
    }
}

fn print_bulk_summary(result: &BulkResult) {
    let report = &result.report;
    println!("{CYAN}bulk download of works related to {}{RESET}", result.source_id);
    println!("{GREEN}succeeded: {}{RESET}", report.succeeded);
    let color = if report.failures.is_empty() { GREEN } else { RED };
    println!("{color}failed: {}{RESET}", report.failed());
    for failure in &report.failures {
        println!(
            "{RED}  id: {}, title: {}, error: {}{RESET}",
            failure.id, failure.title, failure.message
        );
    }
    println!("{CYAN}{} comics now stored locally{RESET}", result.records_after);
}
