use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use maildav::{load_config, ConnectionPool, MaildavError, Poller, Uploader};

/// Poll IMAP mailboxes and deliver attachments to filesystem or WebDAV
/// destinations.
#[derive(Debug, Parser)]
#[command(name = "maildav", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json: bool,
}

fn init_logging(json: bool) -> Result<(), MaildavError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(env_filter);

    let installed = if json {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().with_target(false)))
    };
    installed.map_err(|e| MaildavError::Logging(e.to_string()))?;

    // Forward `log` records from dependencies and the IMAP client.
    tracing_log::LogTracer::init().map_err(|e| MaildavError::Logging(e.to_string()))
}

async fn run(cli: Cli) -> Result<(), MaildavError> {
    let config = load_config(&cli.config)?;
    let mut pollers = config.poller_configs()?.into_iter();

    let Some(poller_config) = pollers.next() else {
        return Err(MaildavError::Config(maildav::ConfigError::Validation {
            message: "At least one poller must be configured".to_string(),
        }));
    };
    let skipped = pollers.count();
    if skipped > 0 {
        warn!(
            "{} additional pollers configured, only '{}' will run",
            skipped, poller_config.source_name
        );
    }

    let pool = Arc::new(ConnectionPool::imap());
    let poller = Poller::new(poller_config, pool);
    let uploader = Uploader::new()?;

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        handler_token.cancel();
    })?;

    poller.start_polling(cancel, &uploader).await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.json) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
