//! Edge scanner: trades model game predictions against Kalshi.
//!
//! Single-binary Tokio application that:
//! 1. Reads today's win probabilities from the predictions table
//! 2. Lists open winner markets on Kalshi
//! 3. Matches the two and ranks the edge
//! 4. Buys contracts where the edge clears the configured threshold

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use common::config::AppConfig;
use common::{Error, ScannerConfig, SizingMode};
use kalshi_client::{ExchangeApi, FileKeyStore, KalshiAuth, KalshiRestClient, KeyStore};
use predictions_client::TablePredictionSource;
use scanner::{
    resolve_trades_dir, EventSink, JournalSink, MultiSink, Scanner, ScannerHandle,
    ScannerRuntimeState, TradeJournal, TracingSink,
};
use strategy::{Matcher, TeamTable};

use crate::config::{SettingsStore, SettingsWatcher};

/// How often a running scanner re-reads saved settings.
const SETTINGS_RELOAD_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "edge-scanner", about = "Auto-trades model edges on Kalshi game markets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an RSA private key for signing requests.
    ImportKey {
        /// Kalshi API key id.
        #[arg(long)]
        key_id: String,
        /// PEM file (PKCS#1 or PKCS#8).
        #[arg(long)]
        pem: PathBuf,
    },
    /// Forget the stored signing key.
    ClearKey,
    /// Test authentication and print the balance.
    CheckAuth,
    /// Print balance and open positions.
    Portfolio,
    /// Show or change scanner settings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Start the scanner loop.
    Run {
        /// Log and journal orders instead of sending them.
        #[arg(long)]
        dry_run: bool,
        /// Run a single cycle and exit.
        #[arg(long)]
        once: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set {
        /// Minimum edge in percentage points (strictly exceeded).
        #[arg(long)]
        threshold: Option<f64>,
        /// contracts | dollars
        #[arg(long)]
        sizing: Option<SizingMode>,
        #[arg(long)]
        amount: Option<f64>,
        /// Seconds between cycles.
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long)]
        enabled: Option<bool>,
    },
}

fn open_key_store(cfg: &AppConfig) -> FileKeyStore {
    FileKeyStore::new(config::key_store_dir(cfg))
}

/// Resolve signing auth, importing `KALSHI_SECRET_KEY` first when it is set.
fn load_auth(cfg: &AppConfig, store: &FileKeyStore) -> anyhow::Result<KalshiAuth> {
    if !cfg.secret_key.trim().is_empty() {
        store
            .import_key(&cfg.api_key, &cfg.secret_key)
            .context("KALSHI_SECRET_KEY could not be imported")?;
    }
    match KalshiAuth::from_store(store) {
        Ok(auth) => Ok(auth),
        Err(Error::NoCredential) => {
            bail!("No signing key stored; run `edge-scanner import-key --key-id <ID> --pem <FILE>`")
        }
        Err(e) => Err(e).context("Failed to load signing key"),
    }
}

fn build_rest_client(cfg: &AppConfig, store: &FileKeyStore) -> anyhow::Result<KalshiRestClient> {
    let auth = load_auth(cfg, store)?;
    info!(
        "Environment: {} (key id {})",
        if cfg.use_demo { "DEMO" } else { "PRODUCTION" },
        auth.key_id()
    );
    let client = KalshiRestClient::new(auth, cfg.use_demo, cfg.api_base_url.as_deref())?;
    Ok(client)
}

async fn print_portfolio(client: &KalshiRestClient) -> anyhow::Result<()> {
    let balance = client.get_balance().await.context("Balance request failed")?;
    println!("Balance: ${:.2}", balance);

    let positions = client
        .get_positions()
        .await
        .context("Positions request failed")?;
    let open: Vec<_> = positions.iter().filter(|p| p.position != 0).collect();
    if open.is_empty() {
        println!("No open positions");
    }
    for p in open {
        println!(
            "{:<36} {:>6}  exposure ${:.2}  realized ${:+.2}",
            p.ticker, p.position, p.market_exposure, p.realized_pnl
        );
    }
    Ok(())
}

fn apply_settings(
    current: &ScannerConfig,
    threshold: Option<f64>,
    sizing: Option<SizingMode>,
    amount: Option<f64>,
    interval: Option<u64>,
    enabled: Option<bool>,
) -> ScannerConfig {
    let mut next = current.clone();
    if let Some(v) = threshold {
        next.edge_threshold_percent = v;
    }
    if let Some(v) = sizing {
        next.sizing_mode = v;
    }
    if let Some(v) = amount {
        next.amount = v;
    }
    if let Some(v) = interval {
        next.poll_interval_secs = v;
    }
    if let Some(v) = enabled {
        next.enabled = v;
    }
    next
}

fn print_settings(settings: &ScannerConfig) {
    println!("edge_threshold_percent = {}", settings.edge_threshold_percent);
    println!("sizing_mode            = {}", settings.sizing_mode.as_str());
    println!("amount                 = {}", settings.amount);
    println!("poll_interval_secs     = {}", settings.poll_interval_secs);
    println!("enabled                = {}", settings.enabled);
}

/// Push saved settings into a running scanner when they change on disk.
fn reload_settings(watcher: &mut SettingsWatcher, handle: &ScannerHandle) {
    let next = match watcher.poll(|name| std::env::var(name).ok()) {
        Ok(Some(next)) => next,
        Ok(None) => return,
        Err(e) => {
            warn!("Ignoring unreadable settings: {}", e);
            return;
        }
    };
    if next == handle.config() {
        return;
    }
    match handle.update_config(next) {
        Ok(()) => info!("Scanner settings reloaded from {}", watcher.path().display()),
        Err(e) => warn!("Rejected settings from {}: {}", watcher.path().display(), e),
    }
}

async fn build_sink() -> anyhow::Result<Arc<dyn EventSink>> {
    let journal = TradeJournal::open(resolve_trades_dir())
        .context("Failed to initialize trade journal")?;
    let journal = JournalSink::new(journal);
    info!("Trade journal path: {}", journal.dir().await.display());

    Ok(Arc::new(MultiSink::new(vec![
        Arc::new(TracingSink),
        Arc::new(journal),
    ])))
}

async fn run(
    cfg: AppConfig,
    settings: SettingsStore,
    dry_run: bool,
    once: bool,
) -> anyhow::Result<()> {
    let store = open_key_store(&cfg);
    let exchange: Arc<dyn ExchangeApi> = Arc::new(build_rest_client(&cfg, &store)?);
    let predictions = Arc::new(
        TablePredictionSource::new(&cfg.predictions).context("Predictions source unavailable")?,
    );
    let teams = TeamTable::for_league(cfg.league).with_overrides(&cfg.team_overrides);
    info!(
        "League: {} ({} teams), series: {:?}",
        cfg.league.as_str(),
        teams.len(),
        cfg.effective_series()
    );
    info!(
        "Scanner: edge>{:.1}, sizing={} x{}, every {}s, enabled={}",
        cfg.scanner.edge_threshold_percent,
        cfg.scanner.sizing_mode.as_str(),
        cfg.scanner.amount,
        cfg.scanner.poll_interval_secs,
        cfg.scanner.enabled
    );

    let sink = build_sink().await?;
    let scanner = Scanner::new(
        exchange,
        predictions,
        Matcher::new(teams),
        sink,
        cfg.effective_series(),
    )
    .with_dry_run(dry_run);

    if once {
        let mut state = ScannerRuntimeState::default();
        let summary = scanner
            .scan_once(&cfg.scanner, &mut state, &|_: &ScannerRuntimeState| {})
            .await
            .context("Scan cycle failed")?;
        info!(
            "Cycle complete: predictions={} instruments={} opportunities={} placed={} failed={}",
            summary.predictions,
            summary.instruments,
            summary.opportunities,
            summary.placed,
            summary.failed
        );
        return Ok(());
    }

    let handle = scanner.spawn(cfg.scanner.clone())?;
    let mut watcher = SettingsWatcher::new(settings);
    let mut reload = tokio::time::interval(SETTINGS_RELOAD_INTERVAL);
    reload.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = reload.tick() => {
                if handle.is_finished() {
                    break;
                }
                reload_settings(&mut watcher, &handle);
            }
        }
    }

    handle.stop();
    let state = handle.state();
    let result = handle.join().await;
    info!(
        "Scanner exited after {} cycles, {} orders placed",
        state.cycles, state.orders_placed
    );
    result.context("Scanner stopped on an unrecoverable error")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "edge_scanner=info,scanner=info,kalshi_client=info,strategy=info,predictions_client=info"
                    .into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let settings = SettingsStore::new(config::default_home_dir());
    let cfg = config::load_config(&settings).context("Configuration error")?;

    match cli.command {
        Commands::ImportKey { key_id, pem } => {
            let pem_text = std::fs::read_to_string(&pem)
                .with_context(|| format!("Failed to read {}", pem.display()))?;
            let store = open_key_store(&cfg);
            let credential = store
                .import_key(&key_id, &pem_text)
                .context("Key import failed")?;
            println!(
                "Imported key {} into {}",
                credential.key_id(),
                store.dir().display()
            );
        }
        Commands::ClearKey => {
            let store = open_key_store(&cfg);
            store.clear().context("Failed to clear key store")?;
            println!("Signing key removed from {}", store.dir().display());
        }
        Commands::CheckAuth => {
            let client = build_rest_client(&cfg, &open_key_store(&cfg))?;
            let balance = client.get_balance().await.context("Auth check failed")?;
            println!("Auth OK. Balance: ${:.2}", balance);
        }
        Commands::Portfolio => {
            let client = build_rest_client(&cfg, &open_key_store(&cfg))?;
            print_portfolio(&client).await?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print_settings(&cfg.scanner);
                println!("# saved at {}", settings.path().display());
            }
            ConfigAction::Set {
                threshold,
                sizing,
                amount,
                interval,
                enabled,
            } => {
                let next = apply_settings(&cfg.scanner, threshold, sizing, amount, interval, enabled);
                settings.save(&next).context("Settings not saved")?;
                print_settings(&next);
            }
        },
        Commands::Run { dry_run, once } => run(cfg, settings, dry_run, once).await?,
    }

    Ok(())
}
