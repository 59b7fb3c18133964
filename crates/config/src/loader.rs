use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::TeamsyncConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "teamsync.toml",
    "teamsync.yaml",
    "teamsync.yml",
    "teamsync.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<TeamsyncConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply environment
/// overrides.
///
/// Search order:
/// 1. `./teamsync.{toml,yaml,yml,json}`
/// 2. `~/.config/teamsync/teamsync.{toml,yaml,yml,json}`
///
/// Falls back to `TeamsyncConfig::default()` if no file is found or the file
/// does not parse.
pub fn discover_and_load() -> TeamsyncConfig {
    let mut config = if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                TeamsyncConfig::default()
            },
        }
    } else {
        debug!("no config file found, using defaults");
        TeamsyncConfig::default()
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/teamsync/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "teamsync").map(|d| d.config_dir().to_path_buf())
}

/// Override selected values from `TEAMSYNC_*` environment variables.
pub fn apply_env_overrides(config: &mut TeamsyncConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut TeamsyncConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("TEAMSYNC_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("TEAMSYNC_PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid TEAMSYNC_PORT"),
        }
    }
    if let Some(url) = lookup("TEAMSYNC_DATABASE_URL") {
        config.storage.database_url = (!url.is_empty()).then_some(url);
    }
    if let Some(bot) = lookup("TEAMSYNC_BOT_USER_ID") {
        config.bridge.bot_user_id = bot;
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<TeamsyncConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
