use anyhow::{Context, Result};
use colored::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct DeckConfig {
    /// Shell binary used for interpreted commands; defaults to `$SHELL`.
    pub shell: Option<String>,
    /// Seconds between reaper sweeps of completed processes.
    pub reaper_interval_secs: Option<u64>,
    /// Prompt shown by the interactive session.
    pub prompt: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Load procdeck.toml if present, then overlay a sibling `.env` file.
/// A missing config file is not an error; a malformed one is.
pub fn load_config(path: &Path) -> Result<DeckConfig> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?
    } else {
        DeckConfig::default()
    };

    let env_path = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(".env");
    if env_path.exists() {
        eprintln!("{} Loading environment from: {:?}", "env".green(), env_path);
        // .env overrides the [env] table.
        for item in dotenvy::from_path_iter(&env_path)? {
            let (key, val) = item?;
            config.env.insert(key, val);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/no/such/procdeck.toml")).unwrap();
        assert!(config.shell.is_none());
        assert!(config.env.is_empty());
    }
}
