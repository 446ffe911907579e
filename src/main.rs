use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use plantwatch::analysis::{Analyzer, AnalyzerConfig};
use plantwatch::config::{Config, ConfigSource};
use plantwatch::db::{format_timestamp, Database, Observation};
use plantwatch::export::{export_history, ExportFormat};
use plantwatch::llm::create_oracle;
use plantwatch::logging;
use plantwatch::notify::{notify_best_effort, WebhookNotifier};
use plantwatch::report::TrendReporter;

#[derive(Debug, PartialEq)]
enum Command {
    Analyze { photos: Option<PathBuf>, notify: bool },
    Report { notify: bool },
    Latest,
    History { days: Option<i64>, limit: Option<usize> },
    Export { path: PathBuf },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Analyze { .. } => "analyze",
            Command::Report { .. } => "report",
            Command::Latest => "latest",
            Command::History { .. } => "history",
            Command::Export { .. } => "export",
        }
    }
}

#[derive(Debug, PartialEq)]
struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

enum Parsed {
    Run(Cli),
    Help,
}

fn main() -> ExitCode {
    let cli = parse_args();

    let (config, source) = match load_config(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("plantwatch: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(config.log_dir.clone()) {
        eprintln!("plantwatch: failed to initialize logging: {:#}", e);
    }
    source.log();

    match run(&cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{} failed: {:#}", cli.command.name(), e);
            eprintln!("plantwatch: {:#}", e);
            report_failure(&config, cli.command.name(), &e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<(Config, ConfigSource)> {
    let path = cli.config_path.clone().unwrap_or_else(Config::config_path);
    Config::load_from(&path).with_context(|| format!("Failed to load config from {:?}", path))
}

fn open_database(path: &Path) -> Result<Database> {
    let db = Database::open(path)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    db.initialize().context("Failed to initialize database schema")?;
    Ok(db)
}

fn run(command: &Command, config: &Config) -> Result<()> {
    match command {
        Command::Analyze { photos, notify } => analyze(config, photos.as_deref(), *notify),
        Command::Report { notify } => report(config, *notify),
        Command::Latest => latest(config),
        Command::History { days, limit } => history(config, *days, *limit),
        Command::Export { path } => export(config, path),
    }
}

fn analyze(config: &Config, photos: Option<&Path>, notify: bool) -> Result<()> {
    let Some(oracle) = create_oracle(&config.oracle) else {
        warn!("No API key configured; analysis disabled");
        println!("Analysis disabled: set GEMINI_API_KEY or oracle.api_key in the config file");
        return Ok(());
    };

    let db = open_database(&config.db_path)?;
    let analyzer = Analyzer::new(oracle, AnalyzerConfig::from_config(config, photos));
    info!("Analyzing newest capture in {:?}", analyzer.photos_dir());

    let result = analyzer
        .analyze_latest_capture(&db)
        .context("Plant analysis failed")?;
    println!("{}", result.raw_response);

    if let Some(notifier) = notify.then(|| ai_notifier(config)).flatten() {
        let file_name = result
            .photo_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let message = format!(
            "🌱 **Plant analysis** for {}\nScore: {}\n\n{}",
            file_name,
            format_score(result.plant_score),
            result.description
        );
        notify_best_effort(&notifier, &message, Some(&result.photo_path));
    }
    Ok(())
}

fn report(config: &Config, notify: bool) -> Result<()> {
    let db = open_database(&config.db_path)?;
    let reporter = TrendReporter::new(config.report.clone());

    let Some(chart) = reporter
        .render_trend_chart(&db)
        .context("Failed to render trend chart")?
    else {
        println!("No plant score data available");
        return Ok(());
    };
    println!("{}", chart.display());

    if let Some(notifier) = notify.then(|| ai_notifier(config)).flatten() {
        notify_best_effort(&notifier, TrendReporter::weekly_report_message(), Some(&chart));
    }
    Ok(())
}

fn latest(config: &Config) -> Result<()> {
    let db = open_database(&config.db_path)?;
    match db.latest_analysis()? {
        Some(obs) => print_observation(&obs),
        None => println!("No analyses recorded yet"),
    }
    Ok(())
}

fn history(config: &Config, days: Option<i64>, limit: Option<usize>) -> Result<()> {
    let db = open_database(&config.db_path)?;

    if let Some(days) = days {
        let observations = db.analyses_since(history_window(days)?)?;
        if observations.is_empty() {
            println!("No analyses in the last {} day(s)", days);
        }
        for obs in &observations {
            print_observation(obs);
            println!();
        }
        return Ok(());
    }

    let limit = limit.unwrap_or(config.report.history_limit);
    let points = db.score_history(limit)?;
    if points.is_empty() {
        println!("No scored analyses yet");
    }
    for point in points {
        println!(
            "{}  {:>5.1}",
            format_timestamp(&point.captured_at),
            point.plant_score
        );
    }
    Ok(())
}

fn export(config: &Config, path: &Path) -> Result<()> {
    let db = open_database(&config.db_path)?;
    let format = ExportFormat::from_path(path);
    let rows = export_history(&db, path, format)
        .with_context(|| format!("Failed to export history to {:?}", path))?;
    println!("Exported {} analyses as {} to {}", rows, format.name(), path.display());
    Ok(())
}

fn history_window(days: i64) -> Result<chrono::Duration> {
    if days < 0 {
        return Err(anyhow!("--days must not be negative: {}", days));
    }
    chrono::Duration::try_days(days).ok_or_else(|| anyhow!("--days is too large: {}", days))
}

/// The AI channel notifier, or `None` (with a warning) when it is misconfigured.
fn ai_notifier(config: &Config) -> Option<WebhookNotifier> {
    match WebhookNotifier::ai(&config.notify) {
        Ok(notifier) => Some(notifier),
        Err(e) => {
            warn!("Skipping notification: {}", e);
            None
        }
    }
}

fn print_observation(obs: &Observation) {
    println!("Photo:    {}", obs.photo_path);
    println!("Captured: {}", format_timestamp(&obs.captured_at));
    println!("Analyzed: {}", format_timestamp(&obs.analyzed_at));
    println!("Score:    {}", format_score(obs.plant_score));
    println!("{}", obs.description);
}

fn format_score(score: Option<f64>) -> String {
    score
        .map(|s| format!("{:.0}/100", s))
        .unwrap_or_else(|| "n/a".to_string())
}

fn report_failure(config: &Config, command: &str, err: &anyhow::Error) {
    match WebhookNotifier::general(&config.notify) {
        Ok(notifier) => notify_best_effort(
            &notifier,
            &format!("⚠️ plantwatch {} failed: {:#}", command, err),
            None,
        ),
        Err(e) => warn!("Cannot send failure notice: {}", e),
    }
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse(&args) {
        Ok(Parsed::Run(cli)) => cli,
        Ok(Parsed::Help) => {
            print_help();
            std::process::exit(0);
        }
        Err(msg) => {
            eprintln!("{}", msg);
            print_help();
            std::process::exit(1);
        }
    }
}

fn parse(args: &[String]) -> std::result::Result<Parsed, String> {
    let mut config_path = None;
    let mut command: Option<String> = None;
    let mut photos = None;
    let mut notify = false;
    let mut days = None;
    let mut limit = None;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut value = |name: &str| -> std::result::Result<String, String> {
            i += 1;
            args.get(i)
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", name))
        };
        match arg {
            "--help" | "-h" => return Ok(Parsed::Help),
            "--config" | "-c" => config_path = Some(PathBuf::from(value(arg)?)),
            "--photos" | "-p" => photos = Some(PathBuf::from(value(arg)?)),
            "--notify" | "-n" => notify = true,
            "--days" | "-d" => {
                let v = value(arg)?;
                days = Some(v.parse::<i64>().map_err(|_| format!("Invalid --days: {}", v))?);
            }
            "--limit" | "-l" => {
                let v = value(arg)?;
                limit = Some(v.parse::<usize>().map_err(|_| format!("Invalid --limit: {}", v))?);
            }
            _ if arg.starts_with('-') => return Err(format!("Unknown argument: {}", arg)),
            _ if command.is_none() => command = Some(arg.to_string()),
            _ => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match command.as_deref() {
        Some("analyze") => Command::Analyze { photos, notify },
        Some("report") => Command::Report { notify },
        Some("latest") => Command::Latest,
        Some("history") => {
            if days.is_some() && limit.is_some() {
                return Err("--days and --limit cannot be combined".to_string());
            }
            Command::History { days, limit }
        }
        Some("export") => {
            let path = positional
                .pop()
                .ok_or_else(|| "export needs an output PATH".to_string())?;
            Command::Export {
                path: PathBuf::from(path),
            }
        }
        Some(other) => return Err(format!("Unknown command: {}", other)),
        None => return Err("No command given".to_string()),
    };

    Ok(Parsed::Run(Cli {
        config_path,
        command,
    }))
}

fn print_help() {
    println!(
        r#"plantwatch - Timelapse plant health tracker

USAGE:
    plantwatch [--config PATH] <COMMAND> [OPTIONS]

COMMANDS:
    analyze [--photos DIR] [--notify]   Analyze the newest capture and print the reply
    report [--notify]                   Render the score trend chart and print its path
    latest                              Show the most recent analysis
    history [--days N | --limit N]      List recent analyses or the score history
    export PATH                         Write the analysis history as CSV (or .json)

OPTIONS:
    --config, -c PATH   Path to config file
    --photos, -p DIR    Photo directory (overrides PHOTO_PATH and the config file)
    --notify, -n        Post the result to the AI webhook
    --days, -d N        Analyses from the last N days
    --limit, -l N       Number of scores to show (default: report.history_limit)
    --help, -h          Show this help message

ENVIRONMENT:
    PLANTWATCH_CONFIG    Path to config file (overrides default location)
    PLANTWATCH_DB        Database path
    PHOTO_PATH           Photo directory
    GEMINI_API_KEY       Vision model API key (also PLANTWATCH_API_KEY)
    DISCORD_WEBHOOK_URL  Webhook for capture notices and errors
    AI_WEBHOOK_URL       Webhook for analyses and reports
    PLANTWATCH_LOG       Log level (trace, debug, info, warn, error)
"#
    );
}
