//! Centralized path utilities

use std::path::PathBuf;

use crate::constants::ui;

/// Get the researcher config directory (~/.researcher)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(ui::CONFIG_DIR_NAME)
}

/// Get the default config file (~/.researcher/config.toml)
pub fn config_file() -> PathBuf {
    config_dir().join(ui::CONFIG_FILE_NAME)
}

/// Get the prompts override directory (~/.researcher/prompts)
pub fn prompts_dir() -> PathBuf {
    config_dir().join("prompts")
}
