use std::fs::{self, File};
use std::process::ExitCode;
use std::sync::Mutex;

use camino::Utf8Path;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use hero_catalog::api::{ApiHttpClient, CharacterApi};
use hero_catalog::app::App;
use hero_catalog::config::ConfigLoader;
use hero_catalog::error::CatalogError;
use hero_catalog::output::ConsoleOutput;
use hero_catalog::resolver::{InfoboxPortraitLocator, PortraitLocator};
use hero_catalog::wiki::{WikiClient, WikiHttpClient};

#[derive(Parser)]
#[command(name = "hero-catalog")]
#[command(about = "Build the character catalog and keep its portrait images in sync")]
#[command(version, author)]
struct Cli {
    /// Path to a JSON config file (defaults to ./hero-catalog.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    #[command(about = "Fetch characters from the API and rewrite the canonical store")]
    Fetch,
    #[command(about = "Download missing portrait images from the wiki")]
    Download,
    #[command(about = "Write resized JPEG copies of downloaded images")]
    Optimize,
    #[command(about = "List characters whose portrait image is missing")]
    Verify,
    #[command(about = "Show the canonical store schema")]
    Inspect,
    #[command(about = "Run fetch, download, optimize and verify in order")]
    Sync,
}

impl Commands {
    fn name(self) -> &'static str {
        match self {
            Commands::Fetch => "fetch",
            Commands::Download => "download",
            Commands::Optimize => "optimize",
            Commands::Verify => "verify",
            Commands::Inspect => "inspect",
            Commands::Sync => "sync",
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<CatalogError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CatalogError) -> u8 {
    match error {
        CatalogError::StoreNotFound(_)
        | CatalogError::ConfigRead(_)
        | CatalogError::ConfigParse(_)
        | CatalogError::ConfigInvalid(_) => 2,
        err if err.is_source_unavailable() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    init_logging(&config.log_dir, cli.command.name());
    tracing::info!(command = cli.command.name(), "starting run");

    let api = ApiHttpClient::new(&config.api_url, &config.user_agent, config.timeout)?;
    let wiki = WikiHttpClient::new(&config.user_agent, config.timeout, config.request_delay)?;
    let locator = InfoboxPortraitLocator::new(&config.portrait_class)?;
    let app = App::new(config, api, wiki, locator);

    let result = match cli.command {
        Commands::Fetch => run_fetch(&app),
        Commands::Download => run_download(&app),
        Commands::Optimize => run_optimize(&app),
        Commands::Verify => run_verify(&app),
        Commands::Inspect => run_inspect(&app),
        Commands::Sync => run_fetch(&app)
            .and_then(|_| run_download(&app))
            .and_then(|_| run_optimize(&app))
            .and_then(|_| run_verify(&app)),
    };
    match &result {
        Ok(()) => tracing::info!(command = cli.command.name(), "run finished"),
        Err(report) => {
            tracing::error!(command = cli.command.name(), error = %report, "run aborted")
        }
    }
    result
}

fn init_logging(log_dir: &Utf8Path, command: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stamp = chrono::Local::now().format("%Y%m%dT%H%M%S");
    let log_path = log_dir.join(format!("hero-catalog-{command}-{stamp}.log"));
    let file = fs::create_dir_all(log_dir.as_std_path())
        .and_then(|_| File::create(log_path.as_std_path()));

    match file {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
            println!("Logging to {log_path}");
        }
        Err(err) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            tracing::warn!(
                path = %log_path,
                error = %err,
                "cannot open log file, logging to stderr"
            );
        }
    }
}

fn run_fetch<A: CharacterApi, W: WikiClient, L: PortraitLocator>(
    app: &App<A, W, L>,
) -> miette::Result<()> {
    let result = app.ingest(&ConsoleOutput)?;
    ConsoleOutput::print_ingest(&result).into_diagnostic()
}

fn run_download<A: CharacterApi, W: WikiClient, L: PortraitLocator>(
    app: &App<A, W, L>,
) -> miette::Result<()> {
    let result = app.download_portraits(&ConsoleOutput)?;
    ConsoleOutput::print_download(&result).into_diagnostic()
}

fn run_optimize<A: CharacterApi, W: WikiClient, L: PortraitLocator>(
    app: &App<A, W, L>,
) -> miette::Result<()> {
    let report = app.optimize(&ConsoleOutput)?;
    ConsoleOutput::print_optimize(&report).into_diagnostic()
}

fn run_verify<A: CharacterApi, W: WikiClient, L: PortraitLocator>(
    app: &App<A, W, L>,
) -> miette::Result<()> {
    let report = app.verify(&ConsoleOutput)?;
    ConsoleOutput::print_verify(&report).into_diagnostic()
}

fn run_inspect<A: CharacterApi, W: WikiClient, L: PortraitLocator>(
    app: &App<A, W, L>,
) -> miette::Result<()> {
    let result = app.inspect(&ConsoleOutput)?;
    ConsoleOutput::print_inspect(&result).into_diagnostic()
}
