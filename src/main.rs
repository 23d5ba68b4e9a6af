// ABOUTME: Main entry point for the scopebot chat bot
// ABOUTME: Initializes logging, config, scope store, command registry, and platform event loop

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scopebot::commands::{self, CommandDeps};
use scopebot::config::{Config, LoggingConfig};
use scopebot::platform::{ConsoleAdapter, PlatformRegistry};
use scopebot::{handler, metrics, paths};
use scopebot_core::{CommandKind, Dispatcher, Registry, ScopeResolver, ScopeStore};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Multi-platform chat bot with scope-aware commands
#[derive(Parser, Debug)]
#[command(name = "scopebot", version, about)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect to the configured platforms and answer commands (default)
    Run,

    /// Print the command catalog of one kind as JSON
    Commands {
        /// normal, advanced or admin
        #[arg(long, default_value = "normal", value_parser = parse_kind)]
        kind: CommandKind,
    },

    /// Show which config file is used and the resolved settings
    Config,
}

fn parse_kind(s: &str) -> Result<CommandKind, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

/// Install the tracing subscriber. Logs go to stderr since stdout carries
/// console replies. The returned guard keeps the file writer alive.
fn init_logging(debug: bool, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            "debug"
        } else {
            logging.level.as_str()
        })
    });

    let (json_layer, plain_layer) = if logging.json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    let (file_layer, guard) = if logging.file {
        let dir = paths::log_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "scopebot.log"));
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n╔══════════════════════════════════════════════════════════╗");
        eprintln!("║ PANIC! Bot crashed with the following error:            ║");
        eprintln!("╚══════════════════════════════════════════════════════════╝\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::load()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let _log_guard = init_logging(cli.debug, &config.logging)?;
            run(config).await
        }
        Commands::Commands { kind } => print_catalog(&config, kind),
        Commands::Config => print_config(&config),
    }
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        database = %config.storage.database,
        console = config.console.is_some(),
        metrics = ?config.metrics.listen,
        "Starting scopebot"
    );

    if let Some(listen) = &config.metrics.listen {
        metrics::init_metrics(listen)?;
    }

    let store = Arc::new(
        ScopeStore::open(&config.storage.database).context("Failed to open scope store")?,
    );

    let deps = CommandDeps::new(&config.storage.database);
    let registry =
        Arc::new(Registry::build(commands::all(&deps)).context("Invalid command tree")?);
    registry.init_all()?;

    let console = config.console.clone().unwrap_or_default();
    let admins = config.admins(&console.platform).to_vec();
    let mut platforms = PlatformRegistry::new();
    platforms.register(Arc::new(ConsoleAdapter::new(console, admins)?));
    let platforms = Arc::new(platforms);

    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        ScopeResolver::new(store),
        config.prefixes(),
    ));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    handler::run(Arc::clone(&platforms), dispatcher, shutdown).await?;
    platforms.shutdown().await;

    tracing::info!("Goodbye");
    Ok(())
}

fn print_catalog(config: &Config, kind: CommandKind) -> Result<()> {
    let deps = CommandDeps::new(&config.storage.database);
    let registry = Registry::build(commands::all(&deps)).context("Invalid command tree")?;
    let json = serde_json::to_string_pretty(&registry.catalog(kind))
        .context("Failed to serialize command catalog")?;
    println!("{}", json);
    Ok(())
}

fn print_config(config: &Config) -> Result<()> {
    match Config::find_config_file() {
        Some(path) => println!("# Loaded from {}", path.display()),
        None => println!("# No config file found; defaults and environment only"),
    }
    println!(
        "{}",
        toml::to_string_pretty(config).context("Failed to render config")?
    );
    Ok(())
}
