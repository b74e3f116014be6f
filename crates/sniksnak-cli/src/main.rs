//! Sniksnak command-line client.
//!
//! # Usage
//!
//! ```bash
//! # Create a room and print its link
//! sniksnak create
//!
//! # Send a message
//! sniksnak send '<link>' 'hello'
//!
//! # Print the history, then keep polling until Ctrl-C
//! sniksnak read '<link>' --follow
//! ```

use std::{io::Write, path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use sniksnak_cli::{Stores, SystemEnv};
use sniksnak_client::ClientConfig;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sniksnak end-to-end encrypted rooms
#[derive(Parser, Debug)]
#[command(name = "sniksnak")]
#[command(about = "End-to-end encrypted chat rooms over an untrusted store")]
#[command(version)]
struct Args {
    /// Room and message database
    #[arg(long, default_value = "sniksnak.redb", global = true)]
    db: PathBuf,

    /// Author identity database for this installation
    #[arg(long, default_value = "sniksnak-identity.redb", global = true)]
    identity_db: PathBuf,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "1000", global = true)]
    poll_interval_ms: u64,

    /// Retries for transient store failures
    #[arg(long, default_value = "3", global = true)]
    retries: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a room and print its shareable link
    Create {
        /// Origin used in the printed link
        #[arg(long, default_value = "http://localhost:3000")]
        base_url: String,
    },

    /// Send a message to a room
    Send {
        /// Room link, including the key fragment
        link: String,
        /// Message text
        text: String,
    },

    /// Print a room's messages
    Read {
        /// Room link, including the key fragment
        link: String,
        /// Keep polling for new messages until interrupted
        #[arg(short, long)]
        follow: bool,
    },
}

impl Args {
    fn client_config(&self) -> ClientConfig {
        ClientConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fetch_retries: self.retries,
            ..ClientConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let env = SystemEnv::new();
    let config = args.client_config();
    let stores = Stores::open(&args.db, &args.identity_db, env.clone())?;
    tracing::debug!(
        db = %args.db.display(),
        identity_db = %args.identity_db.display(),
        "stores open"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Create { base_url } => {
            sniksnak_cli::create(&stores, &env, &config, &base_url, &mut out).await?;
        },
        Command::Send { link, text } => {
            sniksnak_cli::send(&stores, &env, &config, &link, &text).await?;
        },
        Command::Read { link, follow } => {
            let shutdown = follow.then(|| async {
                if let Err(error) = tokio::signal::ctrl_c().await {
                    tracing::warn!(%error, "cannot listen for Ctrl-C, not following");
                }
            });
            let count =
                sniksnak_cli::read(&stores, &env, &config, &link, &mut out, shutdown).await?;
            tracing::info!(count, "messages read");
        },
    }

    out.flush()?;
    Ok(())
}
