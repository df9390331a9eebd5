use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use deusflow::generator::HttpGeneratorConfig;
use deusflow::pipeline::SessionConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug: bool,
    pub session: SessionConfig,
    pub generator: HttpGeneratorConfig,
    /// YAML file of prompt template overrides, keyed by prompt kind
    pub prompts: Option<PathBuf>,
    /// YAML tool catalog
    pub tools: Option<PathBuf>,
    /// Directory that receives one JSONL trail per session
    pub trail_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        // relative paths are relative to the config file
        if let Some(base) = path.as_ref().parent() {
            for slot in [&mut config.prompts, &mut config.tools, &mut config.trail_dir] {
                if let Some(p) = slot.as_mut().filter(|p| p.is_relative()) {
                    *p = base.join(&*p);
                }
            }
        }

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
