use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "wabot")]
#[command(about = "wabot: chat commands and an HTTP bridge for a messaging account", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write a default config file and create the status-log directory.
    Init {
        /// Config file path (default: WABOT_CONFIG_PATH or ./wabot.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the bot: connect the messaging client (with retry), handle chat commands and serve HTTP.
    Run {
        /// Config file path (default: WABOT_CONFIG_PATH or ./wabot.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default: PORT env, then config, then 3000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Print the last lines of the status log.
    Logs {
        /// Config file path (default: WABOT_CONFIG_PATH or ./wabot.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Number of lines (default from config, 10)
        #[arg(long, short = 'n')]
        lines: Option<usize>,
    },
}

fn env_logger_builder() -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.target(env_logger::Target::Stdout);
    builder
}

/// Plain env_logger for short-lived commands.
fn init_plain_logging() {
    env_logger_builder().init();
}

/// env_logger mirrored into the status log. Falls back to plain logging if the file cannot be opened.
fn init_status_logging(status_log: &Path) {
    let inner = env_logger_builder().build();
    let max = inner.filter();
    match lib::logging::StatusLogger::open(inner, status_log) {
        Ok(logger) => {
            if let Err(e) = lib::logging::install(logger, max) {
                eprintln!("logger already installed: {}", e);
            }
        }
        Err(e) => {
            init_plain_logging();
            log::warn!("cannot open status log {}: {}", status_log.display(), e);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("wabot {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            init_plain_logging();
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Run { config, port }) => {
            if let Err(e) = run_bot(config, port).await {
                log::error!("wabot failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Logs { config, lines }) => {
            init_plain_logging();
            if let Err(e) = run_logs(config, lines).await {
                log::error!("logs failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let config = lib::init::init_config(&path)?;
    println!(
        "initialized {} (status log: {})",
        path.display(),
        config.commands.status_log.display()
    );
    Ok(())
}

async fn run_bot(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = match lib::config::load_config(config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            init_plain_logging();
            return Err(e);
        }
    };
    init_status_logging(&config.commands.status_log);
    log::debug!("loaded config from {}", path.display());
    config.http.port = port.unwrap_or_else(|| lib::config::resolve_port(&config));
    lib::bot::run(config).await
}

async fn run_logs(config_path: Option<PathBuf>, lines: Option<usize>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let n = lines.unwrap_or(config.commands.tail_lines);
    let tail = lib::logging::read_tail(&config.commands.status_log, n)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "reading status log {}: {}",
                config.commands.status_log.display(),
                e
            )
        })?;
    println!("{}", tail);
    Ok(())
}
