use anyhow::Result;
use clap::Parser;
use console::style;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ytmd::cli::{Cli, Commands};
use ytmd::config::Config;
use ytmd::engine::ytdlp::YtDlpEngine;
use ytmd::job::{self, JobOptions, JobReport};
use ytmd::progress::{ConsolePresenter, Presenter};
use ytmd::tui::{self, TuiExit};
use ytmd::{output, utils, YtmdError};

const CANCELLED: &str = "Download cancelled by user.";
const TUI_LOG_FILE: &str = "ytmd.log";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n{}", style(CANCELLED).red().bold());
            std::process::exit(1);
        }
    }
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let default_filter = if cli.verbose { "ytmd=debug" } else { "ytmd=warn" };

    if matches!(cli.command, Commands::Tui) {
        // The terminal belongs to the UI, so logs go to a file
        let file = fs_err::File::create(TUI_LOG_FILE)?;
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "ytmd=info".into()))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let quiet = cli.quiet;
    let config = Config::load().await?;

    match cli.command {
        Commands::Download { url, batch_file } => download(&config, url, batch_file, quiet).await,
        Commands::Tui => {
            warn_missing_dependencies(&config).await;

            match tui::run(config).await? {
                TuiExit::Quit => Ok(()),
                TuiExit::Cancelled => {
                    eprintln!("{}", style(CANCELLED).red().bold());
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = config.save().await?;
                println!("Configuration written to: {}", path.display());
            }
            Ok(())
        }
    }
}

async fn download(config: &Config, url: Option<String>, batch_file: Option<PathBuf>, quiet: bool) -> Result<()> {
    let (urls, batch) = match url {
        Some(url) => (vec![url], false),
        None => {
            let path = batch_file.unwrap_or_else(|| config.app.batch_file.clone());
            if !path.exists() {
                return Err(YtmdError::NoInput(path).into());
            }
            tracing::info!("Reading URLs from {}", path.display());
            (job::read_batch_file(&path)?, true)
        }
    };

    warn_missing_dependencies(config).await;

    let engine = YtDlpEngine::new(&config.engine);
    let presenter: Arc<dyn Presenter> = Arc::new(ConsolePresenter::new(quiet));
    let options = JobOptions::cli();

    if !batch {
        download_one(&engine, &urls[0], config, &options, presenter).await?;
        return Ok(());
    }

    // Batch mode keeps going past failed URLs
    let mut succeeded = 0;
    for (position, url) in urls.iter().enumerate() {
        println!("\n{} {}", style(format!("[{}/{}]", position + 1, urls.len())).bold(), url);
        match download_one(&engine, url, config, &options, presenter.clone()).await {
            Ok(_) => succeeded += 1,
            Err(err) => eprintln!("{} {:#}", style("Failed:").red().bold(), err),
        }
    }
    println!("\n{}/{} succeeded", succeeded, urls.len());

    Ok(())
}

async fn download_one(
    engine: &YtDlpEngine,
    url: &str,
    config: &Config,
    options: &JobOptions,
    presenter: Arc<dyn Presenter>,
) -> Result<JobReport> {
    println!("{}", style("Fetching metadata...").cyan());
    let (info, plan) = job::prepare(engine, url, &config.app.output_dir).await?;
    output::print_summary(&info);

    let report = job::execute(engine, &plan, options, presenter).await?;
    println!(
        "{} {}/{} items saved to {}",
        style("Done:").green().bold(),
        report.completed,
        report.total_items,
        report.output_dir.display()
    );
    if report.tag_failures > 0 {
        println!("{} {} files could not be tagged", style("Warning:").yellow().bold(), report.tag_failures);
    }

    Ok(report)
}

async fn warn_missing_dependencies(config: &Config) {
    let missing = utils::check_dependencies(&config.engine.yt_dlp_path).await;
    if !missing.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}
