use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use info_collector_lib::browser::ChromeLauncher;
use info_collector_lib::collector::{Orchestrator, RunRequest};
use info_collector_lib::config::{Config, ProjectPaths};
use info_collector_lib::init::{init_tracing, resolve_config_path};
use info_collector_lib::modules::ModuleRegistry;
use info_collector_lib::output;
use info_collector_lib::scoring::analyze;
use info_collector_lib::trends::{collect_trends, TrendRequest};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "info-collector",
    about = "Browser-driven collection of posts and trending topics",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run source modules and save the ranked results
    Collect {
        #[command(flatten)]
        config: ConfigArg,
        /// Modules to run (defaults to every enabled module)
        #[arg(long, num_args = 1..)]
        modules: Vec<String>,
        /// Search keyword for keyword-driven modules
        #[arg(long)]
        keyword: Option<String>,
        /// Force a headless browser
        #[arg(long, conflicts_with = "headful")]
        headless: bool,
        /// Force a visible browser
        #[arg(long)]
        headful: bool,
    },
    /// Fetch trending lists and filter them by keyword
    Trends {
        #[command(flatten)]
        config: ConfigArg,
        /// Comma-separated; `+kw` must match, `!kw` must not
        #[arg(long, value_delimiter = ',')]
        keywords: Vec<String>,
        /// Comma-separated platform ids
        #[arg(long, value_delimiter = ',')]
        platforms: Vec<String>,
        /// Output file or directory
        #[arg(long)]
        output: Option<PathBuf>,
        /// Drop items published more than this many hours ago
        #[arg(long, default_value = "48")]
        hours: i64,
    },
}

#[derive(Args)]
struct ConfigArg {
    /// Path to config.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(explicit: Option<&Path>) -> Result<(PathBuf, Config)> {
    let path = resolve_config_path(explicit)?;
    let config = Config::load(&path).with_context(|| format!("loading {}", path.display()))?;
    if let Err(problems) = config.validate() {
        for problem in problems {
            tracing::warn!("Config: {}", problem);
        }
    }
    Ok((path, config))
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

async fn collect(
    config: ConfigArg,
    modules: Vec<String>,
    keyword: Option<String>,
    headless: Option<bool>,
) -> Result<()> {
    let (config_path, config) = load_config(config.config.as_deref())?;
    let paths = ProjectPaths::resolve(&config_path, &config);
    paths.ensure_user_data_dir()?;

    let launcher = ChromeLauncher::persistent(&paths.user_data_dir);
    let orchestrator = Orchestrator::new(Arc::new(launcher), ModuleRegistry::builtin(), config)
        .with_output_dir(&paths.output_dir);

    let report = orchestrator
        .run(RunRequest {
            modules: non_empty(modules),
            headless,
            keyword,
        })
        .await;

    let analysis = analyze(&report.data);
    let path = output::write_collection(&paths.output_dir, &report, &analysis)?;

    let counts: serde_json::Map<String, serde_json::Value> = report
        .data
        .iter()
        .map(|(module, items)| (module.clone(), json!(items.len())))
        .collect();
    let summary = json!({
        "output": path,
        "items": counts,
        "total": report.total_items(),
        "restarts": report.restarts,
        "aborted": report.aborted,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn trends(
    config: ConfigArg,
    keywords: Vec<String>,
    platforms: Vec<String>,
    output_path: Option<PathBuf>,
    hours: i64,
) -> Result<()> {
    let (config_path, config) = load_config(config.config.as_deref())?;
    let paths = ProjectPaths::resolve(&config_path, &config);
    let crawler = &config.trends.crawler;

    let launcher = ChromeLauncher::ephemeral()
        .with_user_agent(crawler.user_agent.clone())
        .with_navigation_timeout(Duration::from_secs(crawler.timeout_secs));

    let request = TrendRequest {
        keywords: non_empty(keywords),
        platforms: non_empty(platforms),
        max_hours: hours,
    };
    let report = collect_trends(
        &launcher,
        &config.trends,
        &request,
        chrono::Local::now().naive_local(),
    )
    .await?;

    let target = output_path.unwrap_or(paths.output_dir);
    if !target.exists() && target.extension().is_none() {
        std::fs::create_dir_all(&target)?;
    }
    let path = output::write_trends(&target, &report)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "output": path,
            "count": report.count,
            "kept": report.items.len(),
            "topics": report.topics,
            "errors": report.errors,
        }))?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Collect {
            config,
            modules,
            keyword,
            headless,
            headful,
        } => {
            let headless = match (headless, headful) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            collect(config, modules, keyword, headless).await
        }
        Commands::Trends {
            config,
            keywords,
            platforms,
            output,
            hours,
        } => trends(config, keywords, platforms, output, hours).await,
    }
}
