use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relay_client::{AiService, ContentGenerator, GatewayClient, QuotaGuard, RetryPolicy, UsageClass};
use relay_core::registry::{InMemoryStore, RtdbStore, SqliteStore};
use relay_core::{
    FailoverRouter, HealthChecker, Message, ModelStore, Provider, ProviderCaller, ProviderSet,
    Registry, seed_catalog,
};
use relay_gateway::{GatewayServer, GatewayState};
use relay_scheduler::JobRunner;

mod config;

use config::{RelayConfig, StoreBackend, expand_home};

#[derive(Parser)]
#[command(name = "relay")]
#[command(version)]
#[command(about = "llm-relay: multi-provider LLM gateway with failover")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway (and the scheduled health check)
    Serve,

    /// Check every enabled model once and print the results
    Check,

    /// Replace the registry with the starter catalog
    Seed,

    /// List registry entries with keys masked
    Models,

    /// Send a one-shot message through a running gateway
    Ask {
        /// The message to send
        message: String,

        /// Draw from the pilot share of the daily quota
        #[arg(long)]
        pilot: bool,
    },

    /// Generate a chapter list through a running gateway
    Chapters {
        /// Course name, e.g. "Class 10"
        course: String,

        /// Subject name
        subject: String,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Serve => cmd_serve(&cli.config).await,
        Commands::Check => cmd_check(&cli.config).await,
        Commands::Seed => cmd_seed(&cli.config).await,
        Commands::Models => cmd_models(&cli.config).await,
        Commands::Ask { message, pilot } => cmd_ask(&cli.config, &message, pilot).await,
        Commands::Chapters { course, subject } => {
            cmd_chapters(&cli.config, &course, &subject).await
        }
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("llm-relay initialized at {}", config_dir.display());
    println!("Edit {} to choose a registry store.", config_path.display());
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let mut cfg = RelayConfig::load(config_path)?;
    if !cfg.store.auth_token.is_empty() {
        cfg.store.auth_token = relay_core::model::mask_secret(&cfg.store.auth_token);
    }
    println!("{}", toml::to_string_pretty(&cfg)?);
    Ok(())
}

/// Shared HTTP client for provider calls and the RTDB store
fn http_client(cfg: &RelayConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.providers.timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

fn open_registry(cfg: &RelayConfig, client: reqwest::Client) -> Result<Registry> {
    let store: Arc<dyn ModelStore> = match cfg.store.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::default()),
        StoreBackend::Sqlite => {
            let path = expand_home(&cfg.store.path);
            Arc::new(
                SqliteStore::open(&path)
                    .with_context(|| format!("Failed to open registry at {}", path.display()))?,
            )
        }
        StoreBackend::Rtdb => {
            let url = cfg.store.database_url.trim();
            if url.is_empty() {
                bail!("store.database_url is required for the rtdb backend");
            }
            let mut store = RtdbStore::new(client, url);
            if !cfg.store.auth_token.is_empty() {
                store = store.with_auth_token(cfg.store.auth_token.clone());
            }
            Arc::new(store)
        }
    };
    info!("Using {} registry store", store.backend_name());
    Ok(Registry::new(store))
}

fn build_providers(cfg: &RelayConfig, client: reqwest::Client) -> Arc<dyn ProviderCaller> {
    let mut providers = ProviderSet::with_client(client);
    for (name, url) in &cfg.providers.base_urls {
        info!("Endpoint override for {}: {}", name, url);
        providers = providers.with_endpoint(Provider::parse(name), url.clone());
    }
    Arc::new(providers)
}

async fn cmd_serve(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    info!("Starting llm-relay gateway...");

    let client = http_client(&cfg)?;
    let registry = open_registry(&cfg, client.clone())?;
    let providers = build_providers(&cfg, client);

    let router = FailoverRouter::new(registry.clone(), providers.clone())
        .with_error_threshold(cfg.router.error_threshold);
    let checker =
        HealthChecker::new(registry, providers).with_red_threshold(cfg.health.red_threshold);

    let cancel = CancellationToken::new();

    let mut runner = JobRunner::with_shutdown(cancel.child_token());
    if cfg.health.enabled {
        runner
            .schedule(&cfg.health.schedule, Arc::new(checker.clone()), false)
            .context("Failed to schedule health check")?;
    } else {
        info!("Scheduled health check disabled");
    }

    let bind: SocketAddr = format!("{}:{}", cfg.gateway.bind, cfg.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid gateway address {}:{}",
                cfg.gateway.bind, cfg.gateway.port
            )
        })?;
    let server = GatewayServer::new(bind, GatewayState::new(router, checker));
    let mut server_task = server.spawn(cancel.clone());

    let early_exit = tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("Received Ctrl+C, shutting down...");
            None
        }
        res = &mut server_task => Some(res),
    };
    cancel.cancel();

    let outcome = match early_exit {
        Some(res) => res,
        None => server_task.await,
    };
    runner.shutdown().await;

    match outcome {
        Ok(Ok(())) => {
            println!("llm-relay stopped.");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Gateway exited with error: {:#}", e);
            Err(e)
        }
        Err(e) => Err(anyhow::anyhow!("Gateway task panicked: {}", e)),
    }
}

async fn cmd_check(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    let client = http_client(&cfg)?;
    let registry = open_registry(&cfg, client.clone())?;
    let checker = HealthChecker::new(registry, build_providers(&cfg, client))
        .with_red_threshold(cfg.health.red_threshold);

    let results = checker.run_once().await;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn cmd_seed(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    let registry = open_registry(&cfg, http_client(&cfg)?)?;
    let catalog = seed_catalog();
    registry
        .replace_all(&catalog)
        .await
        .context("Failed to seed registry")?;
    println!("Seeded {} models into the {} store.", catalog.len(), registry.backend_name());
    Ok(())
}

async fn cmd_models(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    let registry = open_registry(&cfg, http_client(&cfg)?)?;
    let models: Vec<_> = registry.list().await.iter().map(|m| m.masked()).collect();
    println!("{}", serde_json::to_string_pretty(&models)?);
    Ok(())
}

fn ai_service(cfg: &RelayConfig) -> Result<AiService> {
    let url = cfg.client.effective_gateway_url();
    let client = GatewayClient::new(&url, Duration::from_secs(cfg.providers.timeout_secs))?;
    Ok(AiService::new(Arc::new(client))
        .with_quota(QuotaGuard::new(cfg.client.total_capacity, cfg.client.pilot_ratio))
        .with_retry(RetryPolicy::new(
            cfg.client.max_retries,
            Duration::from_millis(cfg.client.retry_delay_ms),
        ))
        .with_bulk_concurrency(cfg.client.bulk_concurrency))
}

async fn cmd_ask(config_path: &Option<PathBuf>, message: &str, pilot: bool) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    let service = ai_service(&cfg)?;
    let class = if pilot { UsageClass::Pilot } else { UsageClass::Student };

    let answer = service.ask(vec![Message::user(message)], class).await?;
    println!("{}", answer);
    Ok(())
}

async fn cmd_chapters(config_path: &Option<PathBuf>, course: &str, subject: &str) -> Result<()> {
    let cfg = RelayConfig::load(config_path)?;
    let generator = ContentGenerator::new(ai_service(&cfg)?);
    let chapters = generator.list_chapters(course, subject).await;
    println!("{}", serde_json::to_string_pretty(&chapters)?);
    Ok(())
}
