//! refline server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, and serves the referral reconciliation API over HTTP.
//!
//! # Seeding a user
//!
//! Role documents live in the store, not the identity provider. To grant a
//! subject the admin role:
//!
//! ```
//! cargo run -p refline-api --bin server -- \
//!   --seed-user <UID> ops@example.com admin
//! ```
//!
//! Exit codes: 0 on success, 1 on startup failure, 2 on configuration
//! error.

use std::{path::Path, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use refline_api::{AppState, ServerConfig, identity::HttpIdentityProvider};
use refline_core::store::{ReferralStore as _, Role, UserRecord};
use refline_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Refline referral reconciliation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: std::path::PathBuf,

  /// Create or replace a user role document, then exit.
  #[arg(long, num_args = 3, value_names = ["UID", "EMAIL", "ROLE"])]
  seed_user: Option<Vec<String>>,
}

#[tokio::main]
async fn main() {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = match load_config(&cli.config) {
    Ok(config) => config,
    Err(e) => {
      eprintln!("configuration error: {e:#}");
      std::process::exit(2);
    }
  };

  if let Err(e) = run(config, cli).await {
    tracing::error!("startup failure: {e:#}");
    std::process::exit(1);
  }
}

/// Load configuration from the TOML file (optional) plus `REFLINE_*`
/// environment overrides. A bare `PORT` env var wins over both — container
/// platforms set it directly.
fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path.to_path_buf()).required(false))
    .add_source(config::Environment::with_prefix("REFLINE").separator("__"))
    .build()
    .context("failed to read config file")?;

  let mut config: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  if let Ok(port) = std::env::var("PORT") {
    config.port = port.parse().context("PORT must be a valid port number")?;
  }

  Ok(config)
}

async fn run(config: ServerConfig, cli: Cli) -> anyhow::Result<()> {
  let store = SqliteStore::open(&config.store_path)
    .await
    .with_context(|| {
      format!("failed to open store at {:?}", config.store_path)
    })?;

  // Helper mode: write a user role document and exit.
  if let Some(args) = cli.seed_user {
    let (uid, email, role) = (&args[0], &args[1], &args[2]);
    let role = match role.as_str() {
      "admin" => Role::Admin,
      "viewer" => Role::Viewer,
      other => anyhow::bail!("unknown role {other:?} (admin | viewer)"),
    };
    store
      .put_user(&UserRecord {
        uid:   uid.clone(),
        email: Some(email.clone()),
        role,
      })
      .await
      .context("failed to write user document")?;
    tracing::info!(uid = %uid, role = ?role, "seeded user");
    return Ok(());
  }

  let identity = HttpIdentityProvider::new(&config.identity)
    .context("failed to build identity provider client")?;

  let address = format!("{}:{}", config.host, config.port);
  let state = AppState {
    store:    Arc::new(store),
    identity: Arc::new(identity),
    config:   Arc::new(config),
  };
  let app = refline_api::router(state);

  tracing::info!("listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
