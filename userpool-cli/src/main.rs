mod handlers;
mod server;
#[cfg(test)]
mod server_test;

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use userpool_core::auth::ApiKeyGateway;
use userpool_core::config::PoolConfig;
use userpool_core::types::NewIdentity;

#[derive(Parser)]
#[command(
    name = "userpool",
    about = "userpool: exclusive leases on shared end-to-end test accounts",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the lease HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3100", env = "USERPOOL_PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Storage backend: "memory" or "sqlite:<path>"
        #[arg(long, default_value = "memory", env = "USERPOOL_STORAGE")]
        storage: String,

        /// Seconds after which an unreleased lease may be reclaimed
        #[arg(long, default_value = "600", env = "USERPOOL_LEASE_TIMEOUT_SECS", value_parser = clap::value_parser!(u64).range(1..))]
        lease_timeout_secs: u64,

        /// Seconds between reclaimer sweeps
        #[arg(long, default_value = "30", env = "USERPOOL_RECLAIM_INTERVAL_SECS", value_parser = clap::value_parser!(u64).range(1..))]
        reclaim_interval_secs: u64,
    },

    /// Add identities from a JSON array on stdin to persistent storage
    Provision {
        /// Storage backend: "sqlite:<path>"
        #[arg(long, env = "USERPOOL_STORAGE")]
        storage: String,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            port,
            host,
            storage,
            lease_timeout_secs,
            reclaim_interval_secs,
        } => {
            let config = PoolConfig::default()
                .with_lease_timeout(Duration::from_secs(lease_timeout_secs))
                .with_reclaim_interval(Duration::from_secs(reclaim_interval_secs));

            let pool = match server::open_pool(&storage, config) {
                Ok(pool) => pool,
                Err(e) => {
                    tracing::error!(storage = %storage, error = %e, "Failed to open storage");
                    std::process::exit(1);
                }
            };

            server::run(&host, port, pool, ApiKeyGateway::from_env()).await;
        }
        Commands::Provision { storage } => {
            if storage == "memory" {
                tracing::error!("Provisioning into in-memory storage is lost on exit; use sqlite:<path>");
                std::process::exit(2);
            }

            eprintln!("Reading identities from stdin...");
            let mut input = String::new();
            if let Err(e) = std::io::Read::read_to_string(&mut std::io::stdin(), &mut input) {
                tracing::error!(error = %e, "Failed to read stdin");
                std::process::exit(1);
            }

            let identities = match parse_identities(&input) {
                Ok(identities) => identities,
                Err(e) => {
                    tracing::error!(error = %e, "Invalid JSON identity list");
                    std::process::exit(1);
                }
            };

            let pool = match server::open_pool(&storage, PoolConfig::default()) {
                Ok(pool) => pool,
                Err(e) => {
                    tracing::error!(storage = %storage, error = %e, "Failed to open storage");
                    std::process::exit(1);
                }
            };

            let mut failed = 0;
            for new in identities {
                let login = new.login.clone();
                match pool.provision(new) {
                    Ok(identity) => println!("{}\t{}", identity.id, identity.login),
                    Err(e) => {
                        failed += 1;
                        tracing::error!(login = %login, error = %e, "Failed to provision identity");
                    }
                }
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("userpool {}", env!("CARGO_PKG_VERSION"));
            println!("Lease-pool allocator for shared end-to-end test accounts");
        }
    }
}

/// Parses the `provision` input: a JSON array of identities.
fn parse_identities(input: &str) -> Result<Vec<NewIdentity>, serde_json::Error> {
    serde_json::from_str(input)
}
