mod env_manager;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::analysis::selector::DEFAULT_IGNORE_DIRS;
use crate::analysis::{AnalysisKind, AnalysisTask, SelectionLimits, DEFAULT_MAX_ACTION_ITEMS};
use crate::error::{ButterflyError, Result};
use crate::storage::keys::MAX_VALIDITY_DAYS;
use crate::utils::retry::RetryPolicy;

pub use env_manager::{
    get_env_value, load_env_file, set_env_value, ApiKeys, BUTTERFLY_API_KEY, ENV_FILE_NAME,
    OPENAI_API_KEY, SECRET_KEY,
};

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "butterfly.toml";

const MAX_RETRIES: u32 = 10;
const MAX_BACKOFF_MILLIS: u64 = 60_000;
const MAX_TOKEN_MINUTES: i64 = 7 * 24 * 60;

/// Main configuration struct for the application
///
/// Loaded from `butterfly.toml` at the project root, then overridden from
/// the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory that is analysed
    pub project_root: PathBuf,
    /// Seconds between scheduled analyses
    pub scan_interval_secs: u64,
    /// Directory names never descended into
    pub ignore_patterns: Vec<String>,
    /// Directory walk limits
    pub selection: SelectionConfig,
    /// Completion endpoint settings
    pub completion: CompletionConfig,
    /// Per-task system prompt overrides
    pub prompts: PromptOverrides,
    /// Where keys and reports are kept
    pub storage: StorageConfig,
    /// HTTP service settings
    pub server: ServerConfig,
    /// API key issuance settings
    pub keys: KeysConfig,
    /// User accounts and access tokens
    pub auth: AuthConfig,
    /// Consolidated report settings
    pub report: ReportConfig,
    /// Secrets, only ever read from the environment
    #[serde(skip)]
    pub api_keys: ApiKeys,
}

/// Directory walk limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Maximum directory depth below the root
    pub max_depth: usize,
    /// Follow symbolic links
    pub follow_links: bool,
    /// Stop collecting files after this many bytes
    pub max_total_bytes: Option<u64>,
}

/// Settings for the OpenAI-compatible completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Base URL, `/chat/completions` is appended
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Retries for transient failures
    pub max_retries: u32,
    /// Delay before the first retry, doubled each time
    pub backoff_millis: u64,
    /// Tasks allowed in flight at once
    pub max_concurrent: usize,
}

/// Optional system prompt replacements, one per task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOverrides {
    /// Architecture task
    pub architecture: Option<String>,
    /// Static analysis task
    #[serde(rename = "static")]
    pub static_analysis: Option<String>,
    /// Code quality task
    pub quality: Option<String>,
    /// Dependency task
    pub dependency: Option<String>,
    /// Performance task
    pub performance: Option<String>,
}

/// Locations of persisted state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database, relative paths resolve against the project root
    pub database_path: PathBuf,
    /// Pretty-printed JSON copy of the latest report, if wanted
    pub report_json: Option<PathBuf>,
    /// Owner recorded with every stored report
    pub user_id: String,
}

/// HTTP service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// `POST /api_key` requests allowed per client address per minute
    pub key_requests_per_minute: usize,
    /// `POST /register` requests allowed per client address per minute
    pub register_requests_per_minute: usize,
    /// `POST /token` requests allowed per client address per minute
    pub login_requests_per_minute: usize,
}

/// API key issuance settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Lifetime of a newly issued key
    pub validity_days: i64,
}

/// Access token settings; the signing secret comes from `SECRET_KEY`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of a token issued by `POST /token`
    pub token_minutes: i64,
}

/// Consolidated report settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Cap on `prioritizedActionItems`
    pub max_action_items: usize,
}

impl Config {
    /// Creates a default configuration rooted at `project_root`
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            scan_interval_secs: 3600,
            ignore_patterns: DEFAULT_IGNORE_DIRS.iter().map(|d| d.to_string()).collect(),
            selection: SelectionConfig::default(),
            completion: CompletionConfig::default(),
            prompts: PromptOverrides::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            keys: KeysConfig::default(),
            auth: AuthConfig::default(),
            report: ReportConfig::default(),
            api_keys: ApiKeys::default(),
        }
    }

    /// Walks up from `start` to the first directory holding `butterfly.toml`
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
        start
            .ancestors()
            .find(|dir| dir.join(CONFIG_FILE_NAME).is_file())
            .map(Path::to_path_buf)
    }

    /// Loads the project configuration that governs `start`.
    ///
    /// Falls back to defaults rooted at `start` when no `butterfly.toml` is
    /// found. The project's `.env` is loaded and environment overrides are
    /// applied either way.
    pub fn load(start: &Path) -> Result<Self> {
        let mut config = match Self::find_root(start) {
            Some(root) => Self::from_file(&root.join(CONFIG_FILE_NAME))?,
            None => {
                debug!("No {} above {}, using defaults", CONFIG_FILE_NAME, start.display());
                Self::new(start.to_path_buf())
            }
        };
        load_env_file(&config.project_root)?;
        config.apply_env();
        Ok(config)
    }

    /// Reads one configuration file without touching the environment.
    ///
    /// A relative `project_root` resolves against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ButterflyError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| {
            ButterflyError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        if config.project_root.is_relative() {
            config.project_root = base.join(&config.project_root);
        }
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Creates `butterfly.toml` in `project_root` unless one exists.
    ///
    /// Returns the path of the file.
    pub fn write_default(project_root: &Path) -> Result<PathBuf> {
        let path = project_root.join(CONFIG_FILE_NAME);
        if path.exists() {
            debug!("{} already exists", path.display());
            return Ok(path);
        }

        let config = Self::new(PathBuf::from("."));
        let content = toml::to_string_pretty(&config)
            .map_err(|e| ButterflyError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(&path, content)?;
        info!("Created {}", path.display());
        Ok(path)
    }

    /// Applies overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_with(get_env_value);
    }

    /// Applies overrides read through `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.completion.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.completion.model = model;
        }
        for kind in AnalysisKind::ALL {
            if let Some(prompt) = lookup(kind.prompt_env_var()) {
                self.prompts.set(kind, prompt);
            }
        }
        self.api_keys = ApiKeys::from_lookup(&lookup);
    }

    /// Rejects settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_secs == 0 {
            return Err(ButterflyError::Config("scan_interval_secs must be positive".into()));
        }
        if self.completion.base_url.trim().is_empty() {
            return Err(ButterflyError::Config("completion.base_url is empty".into()));
        }
        if self.completion.max_concurrent == 0 {
            return Err(ButterflyError::Config("completion.max_concurrent must be positive".into()));
        }
        if !(1..=MAX_VALIDITY_DAYS).contains(&self.keys.validity_days) {
            return Err(ButterflyError::Config(format!(
                "keys.validity_days must be between 1 and {}",
                MAX_VALIDITY_DAYS
            )));
        }
        if self.completion.max_retries > MAX_RETRIES {
            return Err(ButterflyError::Config(format!(
                "completion.max_retries must be at most {}",
                MAX_RETRIES
            )));
        }
        if self.completion.backoff_millis > MAX_BACKOFF_MILLIS {
            return Err(ButterflyError::Config(format!(
                "completion.backoff_millis must be at most {}",
                MAX_BACKOFF_MILLIS
            )));
        }
        if !(1..=MAX_TOKEN_MINUTES).contains(&self.auth.token_minutes) {
            return Err(ButterflyError::Config(format!(
                "auth.token_minutes must be between 1 and {}",
                MAX_TOKEN_MINUTES
            )));
        }
        Ok(())
    }

    /// The five analysis tasks with configured prompt overrides applied
    pub fn tasks(&self) -> Vec<AnalysisTask> {
        AnalysisTask::builtin_all()
            .into_iter()
            .map(|task| match self.prompts.get(task.kind) {
                Some(prompt) => task.with_system_prompt(prompt),
                None => task,
            })
            .collect()
    }

    /// Walk limits for the file selector
    pub fn selection_limits(&self) -> SelectionLimits {
        SelectionLimits {
            max_depth: self.selection.max_depth,
            follow_links: self.selection.follow_links,
            max_total_bytes: self.selection.max_total_bytes,
            ignore_dirs: self.ignore_patterns.clone(),
            exclude_files: self.own_files(),
        }
    }

    /// Files this tool writes or reads inside the project root. They carry
    /// secrets or earlier verdicts and are never sent for analysis.
    pub fn own_files(&self) -> Vec<PathBuf> {
        let mut files = vec![
            self.project_root.join(ENV_FILE_NAME),
            self.project_root.join(CONFIG_FILE_NAME),
            self.database_path(),
        ];
        files.extend(self.report_json_path());
        files
    }

    /// Time between scheduled analyses
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Database location, resolved against the project root
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.storage.database_path)
    }

    /// JSON report location, resolved against the project root
    pub fn report_json_path(&self) -> Option<PathBuf> {
        self.storage.report_json.as_deref().map(|p| self.resolve(p))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

impl CompletionConfig {
    /// Retry behaviour derived from these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_millis),
        }
    }
}

impl PromptOverrides {
    /// Override for one task
    pub fn get(&self, kind: AnalysisKind) -> Option<&str> {
        match kind {
            AnalysisKind::Architecture => self.architecture.as_deref(),
            AnalysisKind::Static => self.static_analysis.as_deref(),
            AnalysisKind::Quality => self.quality.as_deref(),
            AnalysisKind::Dependency => self.dependency.as_deref(),
            AnalysisKind::Performance => self.performance.as_deref(),
        }
    }

    /// Sets the override for one task
    pub fn set(&mut self, kind: AnalysisKind, prompt: String) {
        let slot = match kind {
            AnalysisKind::Architecture => &mut self.architecture,
            AnalysisKind::Static => &mut self.static_analysis,
            AnalysisKind::Quality => &mut self.quality,
            AnalysisKind::Dependency => &mut self.dependency,
            AnalysisKind::Performance => &mut self.performance,
        };
        *slot = Some(prompt);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        let limits = SelectionLimits::default();
        Self {
            max_depth: limits.max_depth,
            follow_links: limits.follow_links,
            max_total_bytes: limits.max_total_bytes,
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
            max_retries: 2,
            backoff_millis: 500,
            max_concurrent: AnalysisKind::ALL.len(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("butterfly.db"),
            report_json: Some(PathBuf::from("butterfly-report.json")),
            user_id: "local".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            key_requests_per_minute: 3,
            register_requests_per_minute: 3,
            login_requests_per_minute: 5,
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self { validity_days: 365 }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { token_minutes: 30 }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_action_items: DEFAULT_MAX_ACTION_ITEMS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = Config::new(PathBuf::from("/srv/app"));
        assert_eq!(config.scan_interval(), Duration::from_secs(3600));
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.keys.validity_days, 365);
        assert_eq!(config.server.key_requests_per_minute, 3);
        assert_eq!(config.database_path(), PathBuf::from("/srv/app/butterfly.db"));
        assert!(config.ignore_patterns.iter().any(|p| p == "node_modules"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_write_default_then_load() -> Result<()> {
        let temp = TempDir::new()?;
        let path = Config::write_default(temp.path())?;
        assert!(path.ends_with(CONFIG_FILE_NAME));

        let nested = temp.path().join("src/module");
        fs::create_dir_all(&nested)?;
        let root = Config::find_root(&nested).unwrap();
        assert_eq!(root, temp.path().canonicalize()?);

        let config = Config::from_file(&path)?;
        assert_eq!(config.scan_interval_secs, 3600);
        assert_eq!(config.project_root, temp.path().join("."));
        Ok(())
    }

    #[test]
    fn test_write_default_keeps_existing_file() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "scan_interval_secs = 60\n")?;

        Config::write_default(temp.path())?;
        assert_eq!(fs::read_to_string(&path)?, "scan_interval_secs = 60\n");
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            "scan_interval_secs = 60\n\n[completion]\nmodel = \"local-model\"\n\n[prompts]\nstatic = \"be terse\"\n",
        )?;

        let config = Config::from_file(&path)?;
        assert_eq!(config.scan_interval_secs, 60);
        assert_eq!(config.completion.model, "local-model");
        assert_eq!(config.completion.max_retries, 2);
        assert_eq!(config.prompts.get(AnalysisKind::Static), Some("be terse"));
        Ok(())
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_PATH", "/tmp/keys.db"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("ARCHITECTURE_SYS_PROMPT", "focus on auth"),
            ("OPENAI_API_KEY", "sk-test"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::new(PathBuf::from("/srv/app"));
        config.apply_env_with(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.database_path(), PathBuf::from("/tmp/keys.db"));
        assert_eq!(config.completion.model, "gpt-4o");
        assert_eq!(config.api_keys.openai_api_key.as_deref(), Some("sk-test"));
        assert!(config.api_keys.secret_key.is_none());

        let tasks = config.tasks();
        let architecture = tasks.iter().find(|t| t.kind == AnalysisKind::Architecture).unwrap();
        assert_eq!(architecture.system_prompt, "focus on auth");
        let quality = tasks.iter().find(|t| t.kind == AnalysisKind::Quality).unwrap();
        assert_ne!(quality.system_prompt, "focus on auth");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::new(PathBuf::from("."));
        config.scan_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ButterflyError::Config(_))));
    }

    #[test_case(|c: &mut Config| { c.keys.validity_days = 0 } ; "zero validity")]
    #[test_case(|c: &mut Config| { c.keys.validity_days = i64::MAX } ; "endless validity")]
    #[test_case(|c: &mut Config| { c.completion.backoff_millis = u64::MAX } ; "huge backoff")]
    #[test_case(|c: &mut Config| { c.completion.max_retries = 1_000 } ; "too many retries")]
    #[test_case(|c: &mut Config| { c.auth.token_minutes = 0 } ; "zero token lifetime")]
    fn test_out_of_range_settings_are_rejected(tweak: fn(&mut Config)) {
        let mut config = Config::new(PathBuf::from("."));
        tweak(&mut config);
        assert!(matches!(config.validate(), Err(ButterflyError::Config(_))));
    }

    #[test]
    fn test_own_files_are_excluded_from_selection() {
        let config = Config::new(PathBuf::from("/srv/app"));
        let limits = config.selection_limits();
        for file in [".env", "butterfly.toml", "butterfly.db", "butterfly-report.json"] {
            assert!(limits.exclude_files.contains(&PathBuf::from("/srv/app").join(file)), "{}", file);
        }
    }
}
