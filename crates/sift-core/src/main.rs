//! logsift CLI
//!
//! The `sift` binary, handling:
//! - Analyzer scans over files, directories and zip archives
//! - Ad-hoc single-pattern scans (`grep`)
//! - Virtual file listings that descend into archives
//! - The HTTP server with SSE progress streaming

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use sift_common::{Error, OutputFormat, StructuredError};
use sift_core::analyzer::{
    AnalyzerDefinition, AnalyzerMeta, AnalyzerRegistry, AnalyzerSource, DeclarativeAnalyzer,
    InsightDefinition,
};
use sift_core::config::{load_config, ConfigOptions, ResolvedConfig, SiftConfig};
use sift_core::events::{EventType, JsonlWriter};
use sift_core::exit_codes::ExitCode;
use sift_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use sift_core::server::{start_server, AppState};
use sift_core::sse::StreamSettings;
use sift_core::task::{TaskRegistry, TaskStatus};
use sift_core::{AnalysisHandle, AnalysisReport, AnalysisService};
use sift_filter::{LineFilterConfig, ReadingMode};
use sift_vfs::{Vfs, VirtualPath};
use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Id given to the analyzer built for `sift grep`.
const GREP_ANALYZER_ID: &str = "adhoc.grep";

/// logsift - pattern scanning over logs and bug-report archives
#[derive(Parser)]
#[command(name = "sift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (overrides SIFT_CONFIG and the per-user default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (default depends on the command)
    #[arg(long, short = 'f', global = true)]
    format: Option<OutputFormat>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr: human or jsonl
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve(ServeArgs),

    /// Run an analyzer over files, directories and archives
    Scan(ScanArgs),

    /// Scan for a single pattern without an analyzer definition
    Grep(GrepArgs),

    /// List files under a directory, descending into archives
    List(ListArgs),

    /// List registered analyzers
    Analyzers,

    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind (defaults to [server].bind)
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Analyzer id (see `sift analyzers`)
    #[arg(long, short = 'a')]
    analyzer: String,

    /// Task parameter passed to the analyzer context (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Files, directories or virtual paths (`bundle.zip::member.txt`)
    #[arg(required = true)]
    paths: Vec<String>,
}

#[derive(Args, Debug)]
struct GrepArgs {
    /// Regular expression to match against each line
    #[arg(long, short = 'e')]
    pattern: String,

    /// Reading strategy: line, chunk or ripgrep
    #[arg(long, default_value = "line")]
    mode: ReadingMode,

    /// Case-insensitive matching
    #[arg(long, short = 'i')]
    ignore_case: bool,

    /// Chunk size in bytes for chunk mode
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Only scan files whose name matches one of these patterns (repeatable)
    #[arg(long = "file-pattern")]
    file_patterns: Vec<String>,

    /// Files, directories or virtual paths
    #[arg(required = true)]
    paths: Vec<String>,
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Directory to list
    path: PathBuf,

    /// Descend into subdirectories and archives
    #[arg(long, short = 'r')]
    recursive: bool,
}

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let options = ConfigOptions {
        config_path: cli.global.config.clone(),
    };
    let resolved = match load_config(&options) {
        Ok(resolved) => resolved,
        Err(e) => {
            let code = output_error(&cli.global, &Error::from(e));
            std::process::exit(code.as_i32());
        }
    };
    if let Some(path) = &resolved.path {
        debug!(path = %path.display(), "loaded config");
    }

    let exit_code = match &cli.command {
        Commands::Serve(args) => run_async(&cli.global, run_serve(&resolved.config, args)),
        Commands::Scan(args) => run_async(&cli.global, run_scan(&cli.global, &resolved.config, args)),
        Commands::Grep(args) => run_async(&cli.global, run_grep(&cli.global, &resolved.config, args)),
        Commands::List(args) => run_list(&cli.global, &resolved.config, args),
        Commands::Analyzers => run_analyzers(&cli.global, &resolved.config),
        Commands::Config => run_config(&cli.global, &resolved),
    };

    std::process::exit(exit_code.as_i32());
}

fn run_async<F>(global: &GlobalOpts, fut: F) -> ExitCode
where
    F: Future<Output = Result<ExitCode, Error>>,
{
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => return output_error(global, &Error::Io(e)),
    };
    match runtime.block_on(fut) {
        Ok(code) => code,
        Err(e) => output_error(global, &e),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_serve(config: &SiftConfig, args: &ServeArgs) -> Result<ExitCode, Error> {
    let addr = match args.bind {
        Some(addr) => addr,
        None => config.server.bind.parse::<SocketAddr>().map_err(|e| {
            Error::Config(format!("invalid [server].bind {:?}: {e}", config.server.bind))
        })?,
    };

    let (registry, report) = AnalyzerRegistry::load(config.analyzer_dir().as_deref())?;
    for failure in &report.errors {
        warn!(path = %failure.path.display(), error = %failure.message, "analyzer not loaded");
    }
    info!(analyzers = registry.len(), "analyzer registry ready");

    let tasks = Arc::new(TaskRegistry::new(&config.tasks));
    let shutdown = CancellationToken::new();
    let sweeper = tasks.spawn_sweeper(config.tasks.sweep_interval(), shutdown.clone());

    let service = Arc::new(AnalysisService::new(config, registry, tasks));
    let state = AppState::new(service, StreamSettings::from(&config.server));

    let signal = shutdown.clone();
    let served = start_server(addr, state, async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
            _ = signal.cancelled() => {}
        }
    })
    .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        debug!(error = %e, "sweeper did not stop cleanly");
    }
    served?;
    Ok(ExitCode::Clean)
}

async fn run_scan(
    global: &GlobalOpts,
    config: &SiftConfig,
    args: &ScanArgs,
) -> Result<ExitCode, Error> {
    let params = parse_params(&args.params)?;
    let (registry, report) = AnalyzerRegistry::load(config.analyzer_dir().as_deref())?;
    for failure in &report.errors {
        warn!(path = %failure.path.display(), error = %failure.message, "analyzer not loaded");
    }

    let service = AnalysisService::new(config, registry, Arc::new(TaskRegistry::new(&config.tasks)));
    let handle = service.start(&args.analyzer, parse_paths(&args.paths), params)?;

    let format = global.format.unwrap_or(OutputFormat::Jsonl);
    let outcome = drive(handle, StreamSettings::from(&config.server), format).await;
    Ok(finish(outcome, format, false))
}

async fn run_grep(
    global: &GlobalOpts,
    config: &SiftConfig,
    args: &GrepArgs,
) -> Result<ExitCode, Error> {
    let filter = LineFilterConfig::new(args.pattern.clone())
        .with_mode(args.mode)
        .with_chunk_size(args.chunk_size.unwrap_or(config.filter.chunk_size))
        .ignore_case(args.ignore_case);
    let definition = AnalyzerDefinition {
        analyzer: AnalyzerMeta {
            name: "grep".to_string(),
            description: format!("ad-hoc scan for {}", args.pattern),
            file_patterns: args.file_patterns.clone(),
        },
        insights: vec![InsightDefinition::new("grep", "grep", filter)],
    };
    definition.validate()?;

    let service = AnalysisService::new(
        config,
        AnalyzerRegistry::new(),
        Arc::new(TaskRegistry::new(&config.tasks)),
    );
    let analyzer = DeclarativeAnalyzer::new(GREP_ANALYZER_ID, AnalyzerSource::Builtin, definition);
    let handle = service.start_analyzer(Arc::new(analyzer), parse_paths(&args.paths), Map::new());

    let format = global.format.unwrap_or(OutputFormat::Lines);
    let outcome = drive(handle, StreamSettings::from(&config.server), format).await;
    Ok(finish(outcome, format, true))
}

fn run_list(global: &GlobalOpts, config: &SiftConfig, args: &ListArgs) -> ExitCode {
    let vfs = Vfs::new(config.archive.clone());
    let paths = match vfs.list_directory(&args.path, args.recursive) {
        Ok(paths) => paths,
        Err(e) => return output_error(global, &Error::from(e)),
    };

    match global.format.unwrap_or(OutputFormat::Lines) {
        OutputFormat::Json => print_json(global, &paths),
        OutputFormat::Summary => {
            let archived = paths.iter().filter(|p| p.is_archived()).count();
            println!(
                "{} files ({} inside archives) under {}",
                paths.len(),
                archived,
                args.path.display()
            );
            ExitCode::Clean
        }
        OutputFormat::Jsonl => {
            let mut out = std::io::stdout().lock();
            for path in &paths {
                let _ = writeln!(out, "{}", Value::String(path.to_string()));
            }
            ExitCode::Clean
        }
        OutputFormat::Lines => {
            let mut out = std::io::stdout().lock();
            for path in &paths {
                let _ = writeln!(out, "{path}");
            }
            ExitCode::Clean
        }
    }
}

fn run_analyzers(global: &GlobalOpts, config: &SiftConfig) -> ExitCode {
    let (registry, report) = match AnalyzerRegistry::load(config.analyzer_dir().as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => return output_error(global, &Error::from(e)),
    };

    match global.format.unwrap_or(OutputFormat::Lines) {
        OutputFormat::Json | OutputFormat::Jsonl => print_json(
            global,
            &serde_json::json!({
                "analyzers": registry.list(),
                "errors": report.errors,
            }),
        ),
        OutputFormat::Lines | OutputFormat::Summary => {
            for info in registry.list() {
                println!("{}\t{}\t{} insights", info.id, info.name, info.insights.len());
            }
            for failure in &report.errors {
                eprintln!("not loaded: {}: {}", failure.path.display(), failure.message);
            }
            ExitCode::Clean
        }
    }
}

fn run_config(global: &GlobalOpts, resolved: &ResolvedConfig) -> ExitCode {
    match global.format {
        Some(OutputFormat::Json) | Some(OutputFormat::Jsonl) => print_json(
            global,
            &serde_json::json!({
                "path": resolved.path,
                "hash": resolved.hash,
                "config": resolved.config,
            }),
        ),
        _ => match resolved.config.to_toml() {
            Ok(toml) => {
                match &resolved.path {
                    Some(path) => println!("# source: {}", path.display()),
                    None => println!("# source: built-in defaults"),
                }
                print!("{toml}");
                ExitCode::Clean
            }
            Err(e) => output_error(global, &Error::from(e)),
        },
    }
}

// ============================================================================
// Scan driving and output
// ============================================================================

/// Consume a scan's events in order, streaming them as JSONL when asked.
/// Ctrl-C trips the task's cancellation token.
async fn drive(
    handle: AnalysisHandle,
    settings: StreamSettings,
    format: OutputFormat,
) -> Result<AnalysisReport, StructuredError> {
    let cancel = handle.cancel_token();
    let task_id = handle.task_id.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(task_id = %task_id, "interrupted, cancelling scan");
            cancel.cancel();
        }
    });

    let writer = JsonlWriter::new(std::io::stdout());
    let mut stream = handle.into_stream(settings);
    let mut failure = None;
    while let Some(event) = stream.next_event().await {
        if format == OutputFormat::Jsonl {
            writer.write_event(&event);
        }
        if event.kind == EventType::Result {
            failure = event.error;
        }
    }
    interrupt.abort();

    match stream.into_report() {
        Some(report) => Ok(report),
        None => Err(failure.unwrap_or_else(|| StructuredError::scan("scan produced no result"))),
    }
}

fn finish(
    outcome: Result<AnalysisReport, StructuredError>,
    format: OutputFormat,
    grep: bool,
) -> ExitCode {
    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            eprintln!("Error: {}", err.message);
            return ExitCode::ScanError;
        }
    };

    match format {
        // Already streamed, result event included.
        OutputFormat::Jsonl => {}
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error: {e}"),
        },
        OutputFormat::Lines => print_lines(&report, !grep),
        OutputFormat::Summary => println!("{}", summary_line(&report)),
    }

    match report.status {
        TaskStatus::Cancelled => ExitCode::Cancelled,
        TaskStatus::Error => {
            if format != OutputFormat::Jsonl {
                if let Some(err) = &report.error {
                    eprintln!("Error: {}", err.message);
                }
            }
            ExitCode::ScanError
        }
        _ if grep && report.total_matches == 0 => ExitCode::NoMatches,
        _ => ExitCode::Clean,
    }
}

/// `path:line`, or `insight:path:line` when several insights share stdout.
fn print_lines(report: &AnalysisReport, with_insight: bool) {
    let mut out = std::io::stdout().lock();
    for insight in &report.insights {
        for matches in insight.result.iter() {
            for line in &matches.lines {
                let written = if with_insight {
                    writeln!(out, "{}:{}:{}", insight.id, matches.path, line)
                } else {
                    writeln!(out, "{}:{}", matches.path, line)
                };
                if written.is_err() {
                    // Broken pipe.
                    return;
                }
            }
        }
    }
}

fn summary_line(report: &AnalysisReport) -> String {
    let skipped = if report.skipped.is_empty() {
        String::new()
    } else {
        format!(", {} inputs skipped", report.skipped.len())
    };
    format!(
        "[{}] {}: {} matches in {} files ({} ms){}",
        report.task_id,
        report.status,
        report.total_matches,
        report.total_files,
        report.duration_ms,
        skipped
    )
}

fn print_json<T: serde::Serialize + ?Sized>(global: &GlobalOpts, value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            ExitCode::Clean
        }
        Err(e) => output_error(global, &Error::Json(e)),
    }
}

fn output_error(global: &GlobalOpts, error: &Error) -> ExitCode {
    let exit_code = ExitCode::for_error(error);
    match global.format {
        Some(OutputFormat::Json) | Some(OutputFormat::Jsonl) => {
            eprintln!("{}", StructuredError::from(error).to_json());
        }
        Some(OutputFormat::Summary) => {
            eprintln!("[{}] {}", exit_code.code_name(), error);
        }
        _ => {
            eprintln!("# {}", error.headline());
            eprintln!();
            eprintln!("Error: {}", error);
        }
    }
    exit_code
}

// ============================================================================
// Argument parsing helpers
// ============================================================================

fn parse_paths(raw: &[String]) -> Vec<VirtualPath> {
    raw.iter().map(|p| VirtualPath::parse(p)).collect()
}

/// `key=value` pairs; values that parse as JSON keep their type.
fn parse_params(raw: &[String]) -> Result<Map<String, Value>, Error> {
    let mut params = Map::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("parameter {pair:?} is not KEY=VALUE")))?;
        if key.is_empty() {
            return Err(Error::Config(format!("parameter {pair:?} has an empty key")));
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        params.insert(key.to_string(), value);
    }
    Ok(params)
}
