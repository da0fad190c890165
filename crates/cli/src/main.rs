use std::{path::PathBuf, sync::Arc};

use {
    clap::{Parser, Subcommand},
    pairline_whatsapp::{
        WhatsAppConnector, dry_run::DryRunConnector, live::LiveConnector,
    },
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "pairline", about = "Pairline: WhatsApp pairing codes and bulk sends over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Directory to look for pairline.{toml,yaml,yml,json} in.
    #[arg(long, global = true, env = "PAIRLINE_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default).
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Link and send through an in-memory client instead of WhatsApp.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(dir) = cli.config_dir.clone() {
        pairline_config::set_config_dir(dir);
    }
    let mut config = pairline_config::discover_and_load();

    let command = cli.command.unwrap_or(Commands::Serve {
        bind: None,
        port: None,
        dry_run: false,
    });

    match command {
        Commands::Serve {
            bind,
            port,
            dry_run,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            info!(version = env!("CARGO_PKG_VERSION"), dry_run, "pairline starting");

            let connector: Arc<dyn WhatsAppConnector> = if dry_run {
                Arc::new(DryRunConnector::new())
            } else {
                Arc::new(LiveConnector::new(config.pairing.device_name.clone()))
            };
            pairline_gateway::server::start_gateway(config, connector).await
        },
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(())
        },
    }
}
