use crate::models::SizeThresholds;
use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("org", "oed", "oedexport")
            .context("cannot locate config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(PathBuf::from).unwrap_or_else(|| {
            Config::default_path().unwrap_or_else(|_| PathBuf::from("./config.toml"))
        });
        let mut cfg = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading config at {:?}", path))?;
            toml::from_str(&content).context("parsing config")?
        } else {
            Config::default()
        };
        cfg.expand_paths();
        cfg.export.thresholds()?;
        Ok(cfg)
    }

    pub fn expand_paths(&mut self) {
        self.database.path = expand_tilde(&self.database.path);
        self.export.output_dir = expand_tilde(&self.export.output_dir);
        if let Some(file) = &self.logging.file {
            self.logging.file = Some(expand_tilde(file));
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.local/share/oedexport/readings.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "ExportConfig::default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "ExportConfig::default_language")]
    pub language: String,
    #[serde(default = "ExportConfig::default_warning_size")]
    pub warning_size: u64,
    #[serde(default = "ExportConfig::default_hard_limit")]
    pub hard_limit: u64,
    #[serde(default, with = "humantime_serde")]
    pub fetch_timeout: Option<Duration>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
            language: Self::default_language(),
            warning_size: Self::default_warning_size(),
            hard_limit: Self::default_hard_limit(),
            fetch_timeout: None,
        }
    }
}

impl ExportConfig {
    fn default_output_dir() -> PathBuf {
        PathBuf::from(".")
    }

    fn default_language() -> String {
        "en".into()
    }

    fn default_warning_size() -> u64 {
        100_000
    }

    fn default_hard_limit() -> u64 {
        1_000_000
    }

    pub fn thresholds(&self) -> Result<SizeThresholds> {
        SizeThresholds::new(self.warning_size, self.hard_limit).context("invalid [export] limits")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if !path_str.starts_with('~') {
        return path.to_path_buf();
    }

    let home = BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    if path_str == "~" {
        home
    } else {
        let mut expanded = home;
        expanded.push(path_str.trim_start_matches("~/"));
        expanded
    }
}
