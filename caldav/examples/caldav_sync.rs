// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! CalDAV collection sync tool.
//!
//! Syncs calendar collections from a real CalDAV server into a local token
//! store and prints what changed since the previous run.

use std::error::Error;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize as _;
use davsync_caldav::{
    AuthMethod, CalDavClient, CalDavConfig, ChangeKind, Href, SyncConfig, SyncCoordinator,
    SyncError, SyncMode, SyncResult, TokenStore, cancel_pair,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// CalDAV collection sync tool.
#[derive(Parser)]
#[command(name = "caldav_sync")]
#[command(about = "Incrementally sync CalDAV collections", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "DAVSYNC_CONFIG")]
    config: Option<PathBuf>,
    /// CalDAV server URL
    #[arg(long, env = "DAVSYNC_SERVER")]
    server: Option<String>,
    /// Calendar home path
    #[arg(long, env = "DAVSYNC_HOME")]
    home: Option<String>,
    /// Username for basic auth
    #[arg(long, env = "DAVSYNC_USERNAME")]
    username: Option<String>,
    /// Password for basic auth
    #[arg(long, env = "DAVSYNC_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Bearer token for OAuth
    #[arg(long, env = "DAVSYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Request timeout in seconds
    #[arg(long, env = "DAVSYNC_TIMEOUT")]
    timeout: Option<u64>,
    /// Collections synced at the same time
    #[arg(long, env = "DAVSYNC_CONCURRENCY")]
    concurrency: Option<usize>,
    /// Token store file
    #[arg(long, env = "DAVSYNC_STATE")]
    state: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// List calendar collections with their sync capability
    List,
    /// Sync calendar collections, all of them when none is given
    Sync {
        /// Calendar hrefs
        calendars: Vec<String>,
    },
    /// Drop the stored state of a calendar so its next sync is a full one
    Forget {
        /// Calendar href
        calendar: String,
    },
}

/// Settings read from the `--config` file; flags take precedence.
#[derive(Debug, Default, serde::Deserialize)]
struct FileConfig {
    server: Option<String>,
    home: Option<String>,
    #[serde(default)]
    auth: AuthMethod,
    timeout_secs: Option<u64>,
    sync_page_size: Option<u32>,
    state: Option<PathBuf>,
    #[serde(default)]
    sync: SyncConfig,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        Ok(toml::from_str(&content)?)
    }
}

impl Cli {
    fn file_config(&self) -> Result<FileConfig, Box<dyn Error>> {
        match &self.config {
            Some(path) => FileConfig::load(path),
            None => Ok(FileConfig::default()),
        }
    }

    fn build_config(&self, file: &FileConfig) -> Result<CalDavConfig, Box<dyn Error>> {
        let server = self
            .server
            .clone()
            .or_else(|| file.server.clone())
            .ok_or("DAVSYNC_SERVER must be provided via --server, the config file or env var")?;

        let auth = if let Some(token) = self.token.clone() {
            AuthMethod::Bearer { token }
        } else if let (Some(username), Some(password)) =
            (self.username.clone(), self.password.clone())
        {
            AuthMethod::Basic { username, password }
        } else {
            file.auth.clone()
        };

        let defaults = CalDavConfig::default();
        Ok(CalDavConfig {
            base_url: server,
            calendar_home: self
                .home
                .clone()
                .or_else(|| file.home.clone())
                .unwrap_or_else(|| "/".to_string()),
            auth,
            timeout_secs: self
                .timeout
                .or(file.timeout_secs)
                .unwrap_or(defaults.timeout_secs),
            user_agent: format!("davsync-caldav-sync/{}", env!("CARGO_PKG_VERSION")),
            sync_page_size: file.sync_page_size,
            ..defaults
        })
    }

    fn sync_config(&self, file: &FileConfig) -> SyncConfig {
        SyncConfig {
            concurrency: self.concurrency.unwrap_or(file.sync.concurrency),
            ..file.sync
        }
    }

    fn state_path(&self, file: &FileConfig) -> PathBuf {
        self.state
            .clone()
            .or_else(|| file.state.clone())
            .unwrap_or_else(|| PathBuf::from(".davsync-state.json"))
    }
}

async fn cmd_list(client: &CalDavClient, store: &TokenStore) -> Result<bool, Box<dyn Error>> {
    let calendars = client.list_calendars().await?;

    if calendars.is_empty() {
        println!("No calendars found");
        return Ok(true);
    }

    println!("{:-<100}", "");
    println!(
        "{:<50} {:<20} {:<10} {:<10}",
        "Href", "Name", "Sync", "Stored"
    );
    println!("{:-<100}", "");

    for cal in &calendars {
        let name = cal.display_name.as_deref().unwrap_or("Unnamed");
        let sync = if cal.supports_sync() {
            "yes".green()
        } else {
            "no".yellow()
        };
        let stored = if store.get(&cal.href).is_some() {
            "yes"
        } else {
            "-"
        };
        println!(
            "{:<50} {:<20} {:<10} {:<10}",
            cal.href.as_str(),
            name,
            sync,
            stored
        );
    }

    Ok(true)
}

async fn cmd_sync(
    client: CalDavClient,
    config: SyncConfig,
    store: &mut TokenStore,
    calendars: Vec<String>,
) -> Result<bool, Box<dyn Error>> {
    let collections: Vec<Href> = if calendars.is_empty() {
        client
            .list_calendars()
            .await?
            .into_iter()
            .filter(|cal| {
                if !cal.supports_sync() {
                    tracing::info!(href = %cal.href, "calendar does not advertise a sync token, skipping");
                }
                cal.supports_sync()
            })
            .map(|cal| cal.href)
            .collect()
    } else {
        calendars.into_iter().map(Href::from).collect()
    };

    if collections.is_empty() {
        println!("No calendars to sync");
        return Ok(true);
    }

    let (handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling in-flight syncs");
            handle.cancel();
        }
    });

    let coordinator = SyncCoordinator::with_config(client, config);
    let outcome = coordinator.sync_many(&collections, store, &cancel).await;

    for (href, result) in &outcome.results {
        match result {
            Ok(result) => print_result(result),
            Err(err) => print_failure(href, err),
        }
    }

    let merged = store.merge(&outcome);
    store.persist().await?;
    tracing::info!(merged, "token store updated");

    match outcome.partial_failure() {
        Some(partial) => {
            println!("{} {partial}", "Warning:".yellow().bold());
            Ok(false)
        }
        None => Ok(true),
    }
}

fn print_result(result: &SyncResult) {
    let mode = match result.mode {
        SyncMode::Full => "full".normal(),
        SyncMode::Incremental => "incremental".normal(),
        SyncMode::Resync => "resync".yellow(),
    };
    println!(
        "{} {} ({mode}, {} new, {} modified, {} deleted)",
        "✓".green(),
        result.collection,
        result.new_items().count(),
        result.modified_items().count(),
        result.deleted_items().count(),
    );

    for change in &result.changes {
        let marker = match change.kind {
            ChangeKind::New => "+".green(),
            ChangeKind::Modified => "~".yellow(),
            ChangeKind::Deleted => "-".red(),
        };
        let href_short = change
            .href
            .as_str()
            .rsplit('/')
            .next()
            .unwrap_or(change.href.as_str());
        match &change.etag {
            Some(etag) => println!("    {marker} {href_short} {}", etag.as_str().dimmed()),
            None => println!("    {marker} {href_short}"),
        }
    }
}

fn print_failure(href: &Href, err: &SyncError) {
    let reason = match err {
        SyncError::Cancelled(_) => "cancelled".to_string(),
        SyncError::TimedOut { limit, .. } => format!("timed out after {}s", limit.as_secs()),
        err => err.to_string(),
    };
    println!("{} {href}: {reason}", "✗".red());
}

async fn cmd_forget(store: &mut TokenStore, calendar: &str) -> Result<bool, Box<dyn Error>> {
    let href = Href::from(calendar);
    match store.forget(&href) {
        Some(state) => {
            store.persist().await?;
            println!(
                "{} Forgot {href} (token {}, {} items)",
                "✓".green(),
                state.token,
                state.items.len()
            );
        }
        None => println!("No stored state for {href}"),
    }
    Ok(true)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    // Priority: .env.local (highest) -> .env -> existing environment variables (lowest)
    dotenvy::dotenv().ok();
    dotenvy::from_filename(".env.local").ok();

    init_tracing();

    let cli = Cli::parse();
    let file = cli.file_config()?;

    let runtime = tokio::runtime::Runtime::new()?;

    let result = runtime.block_on(async {
        let mut store = TokenStore::load_or_new(cli.state_path(&file)).await?;
        match cli.command {
            Commands::List => {
                let client = CalDavClient::new(cli.build_config(&file)?)?;
                cmd_list(&client, &store).await
            }
            Commands::Sync { ref calendars } => {
                let client = CalDavClient::new(cli.build_config(&file)?)?;
                let config = cli.sync_config(&file);
                cmd_sync(client, config, &mut store, calendars.clone()).await
            }
            Commands::Forget { ref calendar } => cmd_forget(&mut store, calendar).await,
        }
    });

    match result {
        Ok(true) => Ok(ExitCode::SUCCESS),
        Ok(false) => Ok(ExitCode::FAILURE),
        Err(e) => {
            std::io::stdout().flush().ok();
            eprintln!("{} {e}", "Error:".red().bold());
            Ok(ExitCode::FAILURE)
        }
    }
}
