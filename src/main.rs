mod cli;

use anyhow::Context;
use cli::output::Output;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wayfinder::types::RunOutcome;
use wayfinder::utils::toml_config::LogFormat;
use wayfinder::{
    AppState, ConfigManager, InMemoryRunStore, ResearchCoordinator, WayfinderConfig, build_app,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        None | Some(Commands::Serve) => serve(&cli.config, cli.verbose, &output).await,
        Some(Commands::Run {
            conversation,
            output: out_dir,
            purchasable,
        }) => {
            run_conversation(
                &cli.config,
                cli.verbose,
                &conversation,
                out_dir,
                purchasable,
                &output,
            )
            .await
        }
        Some(Commands::Config { validate }) => show_config(&cli.config, validate, &output),
    }
}

fn init_tracing(config: &WayfinderConfig, verbose: bool) {
    let default_filter = if verbose {
        "debug".to_string()
    } else {
        config.server.log_level.clone()
    };
    let env_filter =
        tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(default_filter));

    match config.server.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

fn load_config(path: &Path) -> anyhow::Result<ConfigManager> {
    ConfigManager::new(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

async fn serve(config_path: &Path, verbose: bool, output: &Output) -> anyhow::Result<()> {
    let mut config_manager = load_config(config_path)?;
    let config = config_manager.config();
    init_tracing(&config, verbose);
    output.banner();
    output.info(&format!("Config: {}", config_manager.config_path().display()));

    config_manager
        .start_watching()
        .context("failed to watch configuration file")?;
    let config_manager = Arc::new(config_manager);

    let coordinator = ResearchCoordinator::from_config(
        Arc::clone(&config_manager),
        Arc::new(InMemoryRunStore::new()),
    )
    .await
    .context("failed to build the research pipeline")?;

    let app = build_app(AppState {
        config_manager,
        coordinator: Arc::new(coordinator),
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    output.success(&format!("Listening on http://{}", addr));
    info!(addr = %addr, "server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received Ctrl+C shutdown signal");
        })
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn run_conversation(
    config_path: &Path,
    verbose: bool,
    conversation: &Path,
    out_dir: Option<PathBuf>,
    purchasable: bool,
    output: &Output,
) -> anyhow::Result<()> {
    let config_manager = Arc::new(load_config(config_path)?);
    init_tracing(&config_manager.config(), verbose);

    let text = std::fs::read_to_string(conversation)
        .with_context(|| format!("failed to read {}", conversation.display()))?;
    let mut request = cli::parse_run_request(&text)
        .with_context(|| format!("{} is not a valid conversation", conversation.display()))?;
    if purchasable {
        request.options.purchasable = Some(true);
    }

    let coordinator =
        ResearchCoordinator::from_config(config_manager, Arc::new(InMemoryRunStore::new()))
            .await
            .context("failed to build the research pipeline")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let out_dir = out_dir.unwrap_or_else(|| PathBuf::from("."));
    match coordinator.advance(request, cancel).await? {
        RunOutcome::AwaitingUser {
            run_id,
            question,
            conversation,
        } => {
            output.question(&question);
            std::fs::create_dir_all(&out_dir)?;
            let path = out_dir.join("conversation.json");
            let body = serde_json::json!({ "run_id": run_id, "conversation": conversation.turns() });
            std::fs::write(&path, serde_json::to_string_pretty(&body)?)?;
            output.written("conversation", &path.display().to_string());
            output.hint("Add your answer as a user turn and run again with that file.");
        }
        RunOutcome::Completed {
            run_id,
            artifacts,
            path_titles,
        } => {
            output.header("Career paths");
            for title in &path_titles {
                output.list_item(title);
            }
            let (preview, full) = cli::write_artifacts(&out_dir, &artifacts)?;
            output.written("preview", &preview.display().to_string());
            output.written("full report", &full.display().to_string());
            output.complete(&format!("Run {} complete", run_id));
        }
        RunOutcome::Failed { run_id, reason } => {
            output.error(&reason);
            anyhow::bail!("run {} failed", run_id);
        }
    }
    Ok(())
}

fn show_config(config_path: &Path, validate: bool, output: &Output) -> anyhow::Result<()> {
    let config = match WayfinderConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            output.error(&e.to_string());
            anyhow::bail!("invalid configuration: {}", config_path.display());
        }
    };

    output.header("Configuration");
    output.kv("file", &config_path.display().to_string());
    output.kv(
        "server",
        &format!("{}:{}", config.server.host, config.server.port),
    );
    for (stage, model) in config.stages.bindings() {
        output.kv(stage, model);
    }
    output.kv(
        "workers",
        &config.research.max_parallel_workers.to_string(),
    );
    output.kv(
        "calls budget",
        &config.research.total_calls_budget.to_string(),
    );

    if validate {
        let warnings = config.validate_with_warnings()?;
        for warning in &warnings {
            output.warning(&warning.message);
        }
        output.success("Configuration is valid");
    }
    Ok(())
}
