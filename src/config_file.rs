use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

const PROJECT_CONFIG_NAME: &str = ".weblakerc";

/// Values read from an INI configuration file, keyed by section
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigFile {
    pub store: HashMap<String, String>,
    pub pipeline: HashMap<String, String>,
    pub readiness: HashMap<String, String>,
}

impl ConfigFile {
    /// Find project-level .weblakerc by walking up directory tree
    pub fn find_project_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let config_path = current.join(PROJECT_CONFIG_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            if !current.pop() {
                break;
            }
        }
        None
    }

    /// User config file locations in order of preference:
    /// $XDG_CONFIG_HOME/weblake/config.ini, then ~/.weblakerc
    pub fn get_user_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        let xdg_config = env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".config"))
                    .unwrap_or_else(|_| PathBuf::from(".config"))
            });
        paths.push(xdg_config.join("weblake").join("config.ini"));

        if let Ok(home) = env::var("HOME") {
            paths.push(PathBuf::from(home).join(PROJECT_CONFIG_NAME));
        }

        paths
    }

    /// Load configuration with precedence: project > user > defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::get_user_config_paths().into_iter().find(|p| p.exists()) {
            let user_config = Self::load_from_path(&path)?;
            config = Self::merge_configs(config, user_config);
        }

        if let Some(project_path) = Self::find_project_config() {
            let project_config = Self::load_from_path(&project_path)?;
            config = Self::merge_configs(config, project_config);
        }

        Ok(config)
    }

    /// Load from an explicit path when given, otherwise search the usual places
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse_ini_content(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    fn parse_ini_content(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut current_section = String::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                current_section = line[1..line.len() - 1].trim().to_string();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                anyhow::bail!("line {}: expected 'key = value', got '{}'", index + 1, line);
            };
            let key = key.trim().to_string();
            let value = value.trim().to_string();

            match current_section.as_str() {
                "store" => {
                    config.store.insert(key, value);
                }
                "pipeline" => {
                    config.pipeline.insert(key, value);
                }
                "readiness" => {
                    config.readiness.insert(key, value);
                }
                // Root-level keys and unknown sections are ignored
                _ => {}
            }
        }

        Ok(config)
    }

    /// Merge two configurations, the second taking precedence per key
    fn merge_configs(base: Self, overlay: Self) -> Self {
        fn merge(mut base: HashMap<String, String>, overlay: HashMap<String, String>) -> HashMap<String, String> {
            base.extend(overlay);
            base
        }

        Self {
            store: merge(base.store, overlay.store),
            pipeline: merge(base.pipeline, overlay.pipeline),
            readiness: merge(base.readiness, overlay.readiness),
        }
    }
}
