use anyhow::{Context, Result};
use rollcall_core::session::DEFAULT_MATCH_THRESHOLD;
use rollcall_core::SessionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Which capture progression to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flow {
    /// Six labelled stages, 800 ms apart.
    Staged,
    /// Ten 10% steps, 200 ms apart.
    Quick,
}

impl FromStr for Flow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staged" => Ok(Flow::Staged),
            "quick" => Ok(Flow::Quick),
            other => Err(format!("unknown flow {other:?}")),
        }
    }
}

/// CLI configuration: defaults, then the TOML file, then `ROLLCALL_*` variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Minimum recognizer confidence (percent) counted as a match.
    pub match_threshold: f64,
    pub flow: Flow,
    /// Overrides the flow's tick period when set.
    pub tick_interval_ms: Option<u64>,
    /// Directory export files are written to.
    pub export_dir: PathBuf,
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    match_threshold: Option<f64>,
    flow: Option<Flow>,
    tick_interval_ms: Option<u64>,
    export_dir: Option<PathBuf>,
}

impl Config {
    /// Load from the process environment and the config file it points at.
    pub fn load() -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut config = Self::defaults(&lookup);

        match config_file_path(&lookup) {
            ConfigFile::Explicit(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                config.apply_toml(&raw, &path)?;
            }
            ConfigFile::Default(path) => {
                if path.exists() {
                    let raw = std::fs::read_to_string(&path).with_context(|| {
                        format!("failed to read config file {}", path.display())
                    })?;
                    config.apply_toml(&raw, &path)?;
                }
            }
        }

        config.apply_env(&lookup);
        Ok(config)
    }

    fn defaults(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir(lookup).join(".local/share"))
            .join("rollcall");

        Self {
            db_path: data_dir.join("attendance.db"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            flow: Flow::Staged,
            tick_interval_ms: None,
            export_dir: PathBuf::from("."),
        }
    }

    fn apply_toml(&mut self, raw: &str, path: &Path) -> Result<()> {
        let file: FileConfig = toml::from_str(raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;

        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.match_threshold {
            self.match_threshold = v;
        }
        if let Some(v) = file.flow {
            self.flow = v;
        }
        if file.tick_interval_ms.is_some() {
            self.tick_interval_ms = file.tick_interval_ms;
        }
        if let Some(v) = file.export_dir {
            self.export_dir = v;
        }
        tracing::debug!(path = %path.display(), "applied config file");
        Ok(())
    }

    /// Malformed values are ignored and the previous layer wins.
    fn apply_env(&mut self, lookup: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        self.match_threshold = env_parse(lookup, "ROLLCALL_MATCH_THRESHOLD", self.match_threshold);
        self.flow = env_parse(lookup, "ROLLCALL_FLOW", self.flow);
        if let Some(ms) = lookup("ROLLCALL_TICK_MS").and_then(|v| v.parse().ok()) {
            self.tick_interval_ms = Some(ms);
        }
        if let Some(v) = lookup("ROLLCALL_EXPORT_DIR") {
            self.export_dir = PathBuf::from(v);
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut session = match self.flow {
            Flow::Staged => SessionConfig::staged(),
            Flow::Quick => SessionConfig::quick(),
        };
        session.match_threshold = self.match_threshold;
        if let Some(ms) = self.tick_interval_ms {
            session.tick_interval = Duration::from_millis(ms);
        }
        session
    }
}

enum ConfigFile {
    /// Named by `ROLLCALL_CONFIG`; must exist.
    Explicit(PathBuf),
    /// XDG location; optional.
    Default(PathBuf),
}

fn config_file_path(lookup: &dyn Fn(&str) -> Option<String>) -> ConfigFile {
    if let Some(path) = lookup("ROLLCALL_CONFIG") {
        return ConfigFile::Explicit(PathBuf::from(path));
    }
    let dir = lookup("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir(lookup).join(".config"));
    ConfigFile::Default(dir.join("rollcall").join("config.toml"))
}

fn home_dir(lookup: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(lookup("HOME").unwrap_or_else(|| "/tmp".to_string()))
}

fn env_parse<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
