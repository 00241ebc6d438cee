use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

const ENV_PREFIX: &str = "COURSEPAGER_";

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for the course database
    pub data_dir: PathBuf,

    /// Explicit database file; defaults to `<data_dir>/courses.db`
    pub database_path: Option<PathBuf>,

    /// Collection the browser pages through
    pub collection: String,

    /// Courses per page
    pub page_size: usize,

    /// Pages shown on each side of the current one in the pager
    pub window_delta: usize,

    /// How often the change feed polls the store
    pub poll_interval_ms: u64,

    /// How long change journal entries are kept before pruning
    pub journal_retention_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_path: None,
            collection: "courses".to_string(),
            page_size: 10,
            window_delta: 2,
            poll_interval_ms: 500,
            journal_retention_secs: 600,
        }
    }
}

impl Config {
    /// Initialize configuration from various sources
    pub async fn init() -> Result<Self> {
        debug!("Initializing configuration");

        let mut config = Self::default();

        // Config files first, the environment wins over them
        if let Ok(file_config) = Self::load_from_file().await {
            config.merge_with(file_config);
        }
        config.load_from_env();

        let database = config.database_path();
        if let Some(parent) = database.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(config)
    }

    /// Load configuration from `COURSEPAGER_*` environment variables
    pub fn load_from_env(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(name) = key.strip_prefix(ENV_PREFIX) {
                self.apply_env_var(name, &value);
            }
        }
    }

    /// Apply one variable, named without its prefix
    fn apply_env_var(&mut self, name: &str, value: &str) {
        match name {
            "DATA_DIR" => self.data_dir = PathBuf::from(value),
            "DATABASE" => self.database_path = Some(PathBuf::from(value)),
            "COLLECTION" => self.collection = value.to_string(),
            "PAGE_SIZE" => match value.parse() {
                Ok(size) => self.page_size = size,
                Err(_) => warn!("Ignoring invalid {}PAGE_SIZE: {}", ENV_PREFIX, value),
            },
            "WINDOW_DELTA" => match value.parse() {
                Ok(delta) => self.window_delta = delta,
                Err(_) => warn!("Ignoring invalid {}WINDOW_DELTA: {}", ENV_PREFIX, value),
            },
            "POLL_MS" => match value.parse() {
                Ok(ms) => self.poll_interval_ms = ms,
                Err(_) => warn!("Ignoring invalid {}POLL_MS: {}", ENV_PREFIX, value),
            },
            "JOURNAL_RETENTION_SECS" => match value.parse() {
                Ok(secs) => self.journal_retention_secs = secs,
                Err(_) => warn!("Ignoring invalid {}JOURNAL_RETENTION_SECS: {}", ENV_PREFIX, value),
            },
            _ => {}
        }
    }

    /// Load configuration from the first config file found
    pub async fn load_from_file() -> Result<Self> {
        // 1. ./.coursepager.json
        // 2. ./coursepager.json
        // 3. $CONFIG_DIR/coursepager/config.json
        let mut config_paths = vec![
            PathBuf::from("./.coursepager.json"),
            PathBuf::from("./coursepager.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            config_paths.push(config_dir.join("coursepager").join("config.json"));
        }

        for path in config_paths {
            if path.exists() {
                debug!("Loading configuration from: {}", path.display());
                let content = tokio::fs::read_to_string(&path).await?;
                let config: Self = serde_json::from_str(&content)?;
                return Ok(config);
            }
        }

        Err(anyhow::anyhow!("No configuration file found"))
    }

    /// Merge another configuration into this one; only values that differ
    /// from the defaults override
    pub fn merge_with(&mut self, other: Self) {
        let defaults = Self::default();

        if other.data_dir != defaults.data_dir {
            self.data_dir = other.data_dir;
        }
        if other.database_path.is_some() {
            self.database_path = other.database_path;
        }
        if !other.collection.is_empty() && other.collection != defaults.collection {
            self.collection = other.collection;
        }
        if other.page_size != defaults.page_size {
            self.page_size = other.page_size;
        }
        if other.window_delta != defaults.window_delta {
            self.window_delta = other.window_delta;
        }
        if other.poll_interval_ms != defaults.poll_interval_ms {
            self.poll_interval_ms = other.poll_interval_ms;
        }
        if other.journal_retention_secs != defaults.journal_retention_secs {
            self.journal_retention_secs = other.journal_retention_secs;
        }
    }

    /// Database file to open
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("courses.db"))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(anyhow::anyhow!("collection name is required"));
        }

        if self.page_size == 0 || self.page_size > 1000 {
            return Err(anyhow::anyhow!("page_size must be between 1 and 1000"));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("poll_interval_ms must be greater than 0"));
        }

        // Readers must get several polls in before their entries are pruned
        if self.journal_retention_secs.saturating_mul(1000) < self.poll_interval_ms.saturating_mul(10) {
            return Err(anyhow::anyhow!(
                "journal_retention_secs must cover at least ten poll intervals"
            ));
        }

        Ok(())
    }
}
