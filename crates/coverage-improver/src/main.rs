use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use coverage_improver::config::{Config, WorkerMode};
use coverage_improver::logging::init_logging;
use coverage_improver::{
    load_config_with_env, AiWorker, CommandWorker, CoverageError, CoverageService, Database,
    DryRunWorker, JobProcessor, JobStore, Scheduler, SqliteStore,
};

#[derive(Parser, Debug)]
#[command(name = "coverage-improver")]
#[command(version)]
#[command(about = "Schedules AI test coverage improvement jobs against repositories")]
struct Args {
    /// Path to the JSON config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduler until interrupted (default)
    Run,

    /// Register a repository and queue an improvement job for one file
    Submit {
        /// GitHub HTTPS or SSH URL
        url: String,
        /// File to improve, relative to the repository root
        target_path: String,
    },

    /// List jobs as JSON, newest first
    Jobs {
        #[arg(long)]
        repository: Option<String>,
    },

    /// List repositories with job counts as JSON
    Repos,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config_with_env(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(config, args.command.unwrap_or(Commands::Run)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

struct App {
    store: Arc<SqliteStore>,
    scheduler: Arc<Scheduler>,
    service: CoverageService,
}

fn build(config: &Config) -> Result<App, CoverageError> {
    let db = Database::open(&config.database_path())?;
    let store = Arc::new(SqliteStore::new(db));

    let worker: Arc<dyn AiWorker> = match config.worker.mode {
        WorkerMode::Command => Arc::new(CommandWorker::new(
            config.worker.command.clone().unwrap_or_default(),
        )?),
        WorkerMode::DryRun => Arc::new(DryRunWorker::new()),
    };

    let processor = Arc::new(
        JobProcessor::new(store.clone(), store.clone(), worker)
            .with_worker_timeout(config.worker.timeout()),
    );
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        processor,
        config.scheduler.to_scheduler_config(),
    ));
    let service = CoverageService::new(
        store.clone(),
        store.clone(),
        Arc::clone(&scheduler),
        config.fork.clone(),
        config.workspace_root.clone(),
    );

    Ok(App {
        store,
        scheduler,
        service,
    })
}

async fn run(config: Config, command: Commands) -> Result<(), CoverageError> {
    let app = build(&config)?;

    match command {
        Commands::Run => serve(&config, app).await,
        Commands::Submit { url, target_path } => {
            let repository = app.service.ensure_repository(&url).await?;
            let job = app.service.submit_job(&repository.id, &target_path).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        Commands::Jobs { repository } => {
            let jobs = app.service.list_jobs(repository.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&jobs)?);
            Ok(())
        }
        Commands::Repos => {
            let repositories = app.service.list_repositories().await?;
            println!("{}", serde_json::to_string_pretty(&repositories)?);
            Ok(())
        }
    }
}

async fn serve(config: &Config, app: App) -> Result<(), CoverageError> {
    log::info!("Starting coverage-improver v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database: {}", config.database_path().display());
    log::info!("Workspaces: {}", config.workspace_root.display());

    let open = app.store.find_incomplete().await?;
    if !open.is_empty() {
        log::info!("{} open job(s) waiting in the store", open.len());
    }

    let stopper = Arc::clone(&app.scheduler);
    ctrlc::set_handler(move || {
        log::info!("Shutdown requested");
        stopper.stop();
    })?;

    let handle = app.scheduler.start();
    if let Err(e) = handle.await {
        log::error!("Scheduler loop ended abnormally: {}", e);
    }

    let in_flight = app.scheduler.in_flight();
    if in_flight > 0 {
        log::info!("Waiting for {} in-flight job(s) to finish", in_flight);
    }
    app.scheduler.wait_idle().await;
    log::info!("Shutdown complete");
    Ok(())
}
