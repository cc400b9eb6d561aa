//! campus-access command line.
//!
//! Drives the access layer against the configured backends: fetch a primary
//! API endpoint through the façade, inspect or seed sessions, sign out.
//!
//! ```text
//!   CLI ──► AccessLayer ──► RequestFacade ──► cache / re-login / classifier
//!                │
//!                └── FileStorage (sessions + persisted cache survive runs)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use campus_access::backends::TokenPair;
use campus_access::classify::present;
use campus_access::config::load_or_default;
use campus_access::facade::{Freshness, RequestOptions};
use campus_access::observability::logging;
use campus_access::storage::StableKey;
use campus_access::{AccessLayer, BackendId, CacheKey};
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "campus-access")]
#[command(about = "Resilient data access for the campus backends", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET a primary API endpoint and print its data
    Get {
        path: String,
        /// Query parameter as key=value, repeatable
        #[arg(short, long, value_parser = parse_pair)]
        query: Vec<(String, String)>,
        /// Keep the result in the persisted cache under this key
        #[arg(long)]
        cache_key: Option<String>,
        /// Seconds a cached result counts as fresh
        #[arg(long)]
        stale_secs: Option<u64>,
    },
    /// Show the session state of a backend
    Session { backend: BackendId },
    /// Store a primary access/refresh token pair
    SeedToken { access: String, refresh: String },
    /// Sign out of one backend, or all of them
    Logout { backend: Option<BackendId> },
    /// Force the next `get --cache-key KEY` to refetch
    Invalidate { key: String },
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw}"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;
    logging::init(&config.observability.log_level);

    let layer = AccessLayer::init(config).await?;
    let outcome = run(&layer, cli.command).await;
    layer.dispose().await?;
    outcome
}

async fn run(layer: &AccessLayer, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Get {
            path,
            query,
            cache_key,
            stale_secs,
        } => {
            let call = layer.primary_call::<Vec<(String, String)>, Value>(Method::GET, &path);
            let mut options = RequestOptions::new();
            if let Some(key) = cache_key {
                options = options.cached(CacheKey::persisted(StableKey::new(key)?));
            }
            if let Some(secs) = stale_secs {
                options = options.stale_time(Duration::from_secs(secs));
            }

            match layer.facade().request(call, query, options).await {
                Ok(fetched) => {
                    if let Freshness::Stale { captured_at_ms } = fetched.freshness {
                        eprintln!("Offline: showing data captured at {captured_at_ms} ms");
                    }
                    println!("{}", serde_json::to_string_pretty(&fetched.data)?);
                }
                Err(err) => {
                    if let Some(notice) = present(&err, &layer.classifier().benign_codes()) {
                        eprintln!("{} ({:?})", notice.message, notice.action);
                    }
                    return Err(err.into());
                }
            }
        }
        Commands::Session { backend } => {
            let session = layer.sessions().get(backend);
            println!(
                "{backend}: {:?} (obtained_at: {}, persisted: {})",
                session.state(),
                session
                    .obtained_at()
                    .map(|at| at.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                layer.sessions().is_persisted(backend),
            );
        }
        Commands::SeedToken { access, refresh } => {
            let credential = TokenPair::new(access, refresh).to_credential();
            layer.sessions().set(BackendId::Primary, credential).await?;
            println!("primary session stored");
        }
        Commands::Logout { backend } => {
            layer.logout(backend).await?;
            println!("signed out");
        }
        Commands::Invalidate { key } => {
            let key = CacheKey::persisted(StableKey::new(key)?);
            if layer.cache().invalidate(&key).await {
                println!("{key} invalidated");
            } else {
                println!("{key} not cached");
            }
        }
    }
    Ok(())
}
