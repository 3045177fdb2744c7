//! Configuration loader: defaults, config.toml, persisted scanner
//! settings, .env and environment variables, in that order.

use std::path::{Path, PathBuf};

use common::config::AppConfig;
use common::{Error, League, ScannerConfig, SizingMode};

const SETTINGS_FILE: &str = "scanner.toml";

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn parse_positive_f64(raw: &str, env_name: &str) -> Result<f64, Error> {
    let parsed = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Config(format!("{env_name} must be a number > 0")))?;
    if !(parsed.is_finite() && parsed > 0.0) {
        return Err(Error::Config(format!("{env_name} must be a number > 0")));
    }
    Ok(parsed)
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

/// User-scoped state directory: `$EDGE_SCANNER_HOME`, else `~/.edge-scanner`.
pub fn default_home_dir() -> PathBuf {
    if let Ok(raw) = std::env::var("EDGE_SCANNER_HOME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".edge-scanner")
}

/// Where the signing key lives unless `key_store_dir` is configured.
pub fn key_store_dir(config: &AppConfig) -> PathBuf {
    config
        .key_store_dir
        .clone()
        .unwrap_or_else(|| default_home_dir().join("keys"))
}

/// Persists [`ScannerConfig`] as TOML so it survives restarts.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SETTINGS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when nothing has been saved yet.
    pub fn load(&self) -> Result<Option<ScannerConfig>, Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", self.path.display(), e)))?;
        let config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", self.path.display(), e)))?;
        Ok(Some(config))
    }

    pub fn save(&self, config: &ScannerConfig) -> Result<(), Error> {
        let issues = config.issues();
        if !issues.is_empty() {
            return Err(Error::Config(issues.join("; ")));
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to encode settings: {}", e)))?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Watches the saved settings file for a running scanner. Environment
/// overrides keep winning over the file, as they do at startup.
#[derive(Debug)]
pub struct SettingsWatcher {
    store: SettingsStore,
    last_seen: Option<ScannerConfig>,
}

impl SettingsWatcher {
    /// Treat whatever is saved now as already applied.
    pub fn new(store: SettingsStore) -> Self {
        let last_seen = store.load().ok().flatten();
        Self { store, last_seen }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Effective settings when the file changed since the last poll,
    /// `None` otherwise.
    pub fn poll(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<ScannerConfig>, Error> {
        let Some(saved) = self.store.load()? else {
            return Ok(None);
        };
        if self.last_seen.as_ref() == Some(&saved) {
            return Ok(None);
        }
        self.last_seen = Some(saved.clone());

        let mut effective = saved;
        apply_scanner_env(&mut effective, lookup)?;
        Ok(Some(effective))
    }
}

/// Apply environment overrides through `lookup` (highest priority).
pub fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(key) = lookup("KALSHI_API_KEY") {
        config.api_key = key;
    }
    if let Some(secret) = lookup("KALSHI_SECRET_KEY") {
        config.secret_key = secret;
    }
    if let Some(demo) = lookup("USE_DEMO") {
        config.use_demo = parse_bool(&demo);
    }
    if let Some(url) = lookup("KALSHI_API_BASE_URL") {
        config.api_base_url = Some(url);
    }
    if let Some(dir) = lookup("KEY_STORE_DIR") {
        config.key_store_dir = Some(PathBuf::from(dir.trim()));
    }
    if let Some(league) = lookup("LEAGUE") {
        config.league = match league.trim().to_ascii_lowercase().as_str() {
            "mlb" => League::Mlb,
            "nba" => League::Nba,
            _ => return Err(Error::Config("LEAGUE must be one of: mlb, nba".into())),
        };
    }
    if let Some(raw) = lookup("SERIES_TICKERS") {
        config.series_tickers = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(url) = lookup("PREDICTIONS_URL").or_else(|| lookup("SUPABASE_URL")) {
        config.predictions.url = url;
    }
    if let Some(key) = lookup("PREDICTIONS_API_KEY").or_else(|| lookup("SUPABASE_KEY")) {
        config.predictions.api_key = key;
    }
    if let Some(table) = lookup("PREDICTIONS_TABLE") {
        config.predictions.table = table;
    }

    apply_scanner_env(&mut config.scanner, lookup)
}

/// The scanner subset of [`apply_env_overrides`].
fn apply_scanner_env(
    scanner: &mut ScannerConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(raw) = lookup("EDGE_THRESHOLD_PERCENT") {
        scanner.edge_threshold_percent = parse_positive_f64(&raw, "EDGE_THRESHOLD_PERCENT")?;
    }
    if let Some(raw) = lookup("SIZING_MODE") {
        scanner.sizing_mode = raw.parse::<SizingMode>().map_err(Error::Config)?;
    }
    if let Some(raw) = lookup("BET_AMOUNT") {
        scanner.amount = parse_positive_f64(&raw, "BET_AMOUNT")?;
    }
    if let Some(raw) = lookup("POLL_INTERVAL_SECS") {
        scanner.poll_interval_secs = parse_positive_u64(&raw, "POLL_INTERVAL_SECS")?;
    }
    if let Some(raw) = lookup("SCANNER_ENABLED") {
        scanner.enabled = parse_bool(&raw);
    }

    Ok(())
}

fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues = config.scanner.issues();

    if config.effective_series().iter().any(|s| s.trim().is_empty()) {
        issues.push("series_tickers must not contain empty entries".into());
    }
    if !config.secret_key.trim().is_empty() && config.api_key.trim().is_empty() {
        issues.push("KALSHI_SECRET_KEY is set but KALSHI_API_KEY is missing".into());
    }
    for (label, abbr) in &config.team_overrides {
        if abbr.trim().is_empty() {
            issues.push(format!("team_overrides.{label} must not be empty"));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Layer config.toml, saved settings and `lookup` over the defaults.
pub fn resolve_config(
    config_toml: Option<&str>,
    settings: &SettingsStore,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, Error> {
    let mut config = match config_toml {
        Some(contents) => toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?,
        None => AppConfig::default(),
    };

    if let Some(saved) = settings.load()? {
        config.scanner = saved;
    }

    apply_env_overrides(&mut config, lookup)?;
    config.apply_league_defaults();
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from the working directory and process environment.
pub fn load_config(settings: &SettingsStore) -> Result<AppConfig, Error> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let config_path = Path::new("config.toml");
    let contents = if config_path.exists() {
        Some(
            std::fs::read_to_string(config_path)
                .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?,
        )
    } else {
        None
    };

    resolve_config(contents.as_deref(), settings, |name| std::env::var(name).ok())
}
