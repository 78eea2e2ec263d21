use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ButterflyError, Result};

/// Name of the per-project environment file
pub const ENV_FILE_NAME: &str = ".env";

/// Variable holding the client API key issued by the key service
pub const BUTTERFLY_API_KEY: &str = "BUTTERFLY_API_KEY";

/// Variable holding the completion service key
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Variable holding the access token signing secret
pub const SECRET_KEY: &str = "SECRET_KEY";

/// Stores API keys for the completion service and the key service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeys {
    /// Bearer token for the chat-completions endpoint
    pub openai_api_key: Option<String>,
    /// Client key issued by `POST /api_key`
    pub butterfly_api_key: Option<String>,
    /// HMAC secret for access tokens
    pub secret_key: Option<String>,
}

impl ApiKeys {
    /// Reads the keys from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(get_env_value)
    }

    /// Reads the keys through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            openai_api_key: lookup(OPENAI_API_KEY),
            butterfly_api_key: lookup(BUTTERFLY_API_KEY),
            secret_key: lookup(SECRET_KEY).filter(|s| !s.trim().is_empty()),
        }
    }

    /// The completion key, or a configuration error naming the variable
    pub fn openai_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ButterflyError::Config(format!("{} is not set", OPENAI_API_KEY)))
    }
}

/// Loads `<project_root>/.env` into the process environment.
///
/// Variables already set in the environment win. A missing file is not an
/// error.
pub fn load_env_file(project_root: &Path) -> Result<()> {
    let path = project_root.join(ENV_FILE_NAME);
    if !path.exists() {
        debug!("No {} found in {}", ENV_FILE_NAME, project_root.display());
        return Ok(());
    }
    dotenv::from_path(&path)
        .map_err(|e| ButterflyError::Config(format!("Failed to load {}: {}", path.display(), e)))
}

/// Writes `key=value` into `<project_root>/.env`, replacing an existing
/// assignment of `key` and keeping every other line
pub fn set_env_value(project_root: &Path, key: &str, value: &str) -> Result<PathBuf> {
    let path = project_root.join(ENV_FILE_NAME);
    let existing = if path.exists() {
        fs::read_to_string(&path)?
    } else {
        String::new()
    };

    let assignment = format!("{}={}", key, value);
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let name = line.trim_start().trim_start_matches("export ").split('=').next().unwrap_or("");
            if name.trim() == key && !replaced {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(assignment);
    }

    fs::write(&path, lines.join("\n") + "\n")?;
    debug!("Stored {} in {}", key, path.display());
    Ok(path)
}

/// Returns the value of an environment variable, treating empty as unset
pub fn get_env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_keys_from_lookup() {
        let vars: HashMap<&str, &str> = [(OPENAI_API_KEY, "sk-test")].into_iter().collect();
        let keys = ApiKeys::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(keys.openai_api_key().unwrap(), "sk-test");
        assert!(keys.butterfly_api_key.is_none());
    }

    #[test]
    fn test_missing_openai_key_is_a_config_error() {
        let keys = ApiKeys::default();
        assert!(matches!(keys.openai_api_key(), Err(ButterflyError::Config(_))));
    }

    #[test]
    fn test_set_env_value_replaces_and_appends() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(ENV_FILE_NAME),
            "OPENAI_API_KEY=sk-test\nBUTTERFLY_API_KEY=old\n",
        )
        .unwrap();

        set_env_value(temp.path(), BUTTERFLY_API_KEY, "new").unwrap();
        set_env_value(temp.path(), "DATABASE_PATH", "keys.db").unwrap();

        let content = fs::read_to_string(temp.path().join(ENV_FILE_NAME)).unwrap();
        assert_eq!(
            content,
            "OPENAI_API_KEY=sk-test\nBUTTERFLY_API_KEY=new\nDATABASE_PATH=keys.db\n"
        );
    }

    #[test]
    fn test_load_env_file_tolerates_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(load_env_file(temp.path()).is_ok());
    }
}
