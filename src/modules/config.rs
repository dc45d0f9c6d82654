use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::models::AppConfig;

const DATA_DIR: &str = ".donut";
const CONFIG_FILE: &str = "config.json";

/// Get data directory path, `DONUT_DATA_DIR` wins over `~/.donut`
pub fn get_data_dir() -> AppResult<PathBuf> {
    let data_dir = match std::env::var_os("DONUT_DATA_DIR").filter(|d| !d.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .ok_or_else(|| AppError::Config("Failed to get user home directory".to_string()))?
            .join(DATA_DIR),
    };

    // Ensure directory exists
    if !data_dir.exists() {
        fs::create_dir_all(&data_dir).map_err(|e| {
            AppError::Config(format!("Failed to create data directory: {}", e))
        })?;
    }

    Ok(data_dir)
}

/// Load application config, environment overrides applied
pub fn load_app_config() -> AppResult<AppConfig> {
    let mut config = load_app_config_from(&get_data_dir()?)?;
    config.proxy.apply_env_overrides();
    Ok(config)
}

pub fn load_app_config_from(data_dir: &Path) -> AppResult<AppConfig> {
    let config_path = data_dir.join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(AppConfig::new());
    }

    let content = fs::read_to_string(&config_path)?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Config(format!("Failed to parse {}: {}", config_path.display(), e)))
}

/// Save application config
pub fn save_app_config(config: &AppConfig) -> AppResult<()> {
    save_app_config_to(&get_data_dir()?, config)
}

pub fn save_app_config_to(data_dir: &Path, config: &AppConfig) -> AppResult<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(data_dir.join(CONFIG_FILE), content)?;
    Ok(())
}
