// Configuration management for tagstore

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TagError};
use crate::tags::compress::{Abbreviation, DEFAULT_ABBREVIATION};
use crate::tags::WriteFlags;

/// Name of the per-project configuration file
pub const CONFIG_FILE: &str = ".tagstore.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub sources: SourceConfig,
    pub tags: TagsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub root: String,
}

/// Which files of the tree are enumerated, and which of them are parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// File name suffixes (without the dot) treated as source
    pub suffixes: Vec<String>,
    /// Skip list: `name`, `name/` (directories), `*.ext` globs, or
    /// `/rooted/path` entries relative to the project root
    pub skip: Vec<String>,
    /// Match suffixes and skip entries case-insensitively
    pub icase_path: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagsConfig {
    /// Directory holding GPATH/GTAGS/GRTAGS/GSYMS, relative to the root
    pub dbpath: String,
    pub unique: bool,
    pub extract_method: bool,
    /// Abbreviation table for the definitions database
    pub abbreviation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "unnamed-project".to_string(),
            root: ".".to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            suffixes: ["c", "h", "y", "cc", "cpp", "cxx", "hh", "hpp", "hxx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip: [
                "GPATH", "GTAGS", "GRTAGS", "GSYMS", "tags", "TAGS", "ID", "y.tab.c", "y.tab.h",
                "cscope.out", ".git/", "CVS/", "RCS/", "SCCS/", "target/", "autom4te.cache/",
                "*.o", "*.a", "*.so", "*.orig", "*.rej", "*.bak", "*~", "*.swp", "*.tmp",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            icase_path: false,
        }
    }
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            dbpath: ".".to_string(),
            unique: false,
            extract_method: false,
            abbreviation: DEFAULT_ABBREVIATION.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| TagError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from project directory
    /// Looks for .tagstore.toml in the project root
    pub fn from_project_dir<P: AsRef<Path>>(project_dir: P) -> Self {
        let config_path = project_dir.as_ref().join(CONFIG_FILE);
        if !config_path.is_file() {
            tracing::debug!("No {} in {}", CONFIG_FILE, project_dir.as_ref().display());
            return Self::default();
        }

        match Self::from_file(&config_path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Could not load config from {}: {}", config_path.display(), e);
                tracing::info!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Source root, resolved against the directory the config was found in
    pub fn root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.project.root)
    }

    /// Directory of the tag databases
    pub fn dbpath(&self, project_dir: &Path) -> PathBuf {
        self.root(project_dir).join(&self.tags.dbpath)
    }

    pub fn write_flags(&self) -> WriteFlags {
        WriteFlags {
            unique: self.tags.unique,
            extract_method: self.tags.extract_method,
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TagError::Config(msg));

        if self.project.name.is_empty() {
            return invalid("project name cannot be empty".to_string());
        }
        if self.project.root.is_empty() {
            return invalid("project root cannot be empty".to_string());
        }

        if self.sources.suffixes.is_empty() {
            return invalid("at least one source suffix is required".to_string());
        }
        for suffix in &self.sources.suffixes {
            if suffix.is_empty() || suffix.starts_with('.') || suffix.contains('/') {
                return invalid(format!("invalid source suffix: '{}'", suffix));
            }
        }
        for entry in &self.sources.skip {
            if entry.trim().is_empty() || entry == "/" {
                return invalid(format!("invalid skip entry: '{}'", entry));
            }
        }

        if self.tags.dbpath.is_empty() {
            return invalid("tags dbpath cannot be empty".to_string());
        }
        Abbreviation::parse(&self.tags.abbreviation)?;

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return invalid(format!("invalid log level: {}", self.logging.level));
        }
        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return invalid(format!("invalid log format: {}", self.logging.format));
        }

        Ok(())
    }
}

/// Load configuration for a project
pub fn load_config(project_dir: &Path) -> Config {
    Config::from_project_dir(project_dir)
}
