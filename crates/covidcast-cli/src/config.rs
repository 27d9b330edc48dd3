use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use covidcast::config::{DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_ROWS_PER_CALL, default_excluded_sources};
use covidcast::{RetryPolicy, SyncConfig, UnchangedPolicy};
use covidcast_delphi::EpidataClientConfig;
use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Bucket named in every change entry. Required, from the file or `S3_BUCKET`.
    pub bucket: Option<String>,
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,
    pub epidata_base_url: Option<String>,
    /// Where the object and revision databases live; the platform data
    /// directory when unset.
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Tunables copied into [`SyncConfig`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    pub max_rows_per_call: u64,
    pub max_batch_size: usize,
    pub excluded_sources: Vec<String>,
    pub window_concurrency: usize,
    pub max_partition_workers: usize,
    pub retry: RetryPolicy,
    pub unchanged_policy: UnchangedPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_rows_per_call: DEFAULT_MAX_ROWS_PER_CALL,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            excluded_sources: default_excluded_sources(),
            window_concurrency: 16,
            max_partition_workers: 4,
            retry: RetryPolicy::default(),
            unchanged_policy: UnchangedPolicy::default(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            dataset_name: default_dataset_name(),
            epidata_base_url: None,
            data_dir: None,
            request_timeout_secs: default_request_timeout_secs(),
            sync: SyncSettings::default(),
        }
    }
}

fn default_dataset_name() -> String {
    "covidcast".into()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Config file path: `~/.config/covidcast-sync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("covidcast-sync").join("config.toml"))
}

/// Load config from `explicit`, or from the default path falling back to
/// defaults if missing. An explicit path that cannot be read is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        return toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()));
    }

    if let Some(path) = config_path()
        && let Ok(contents) = std::fs::read_to_string(&path)
    {
        match toml::from_str::<AppConfig>(&contents) {
            Ok(config) => return Ok(config),
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config, using defaults"
            ),
        }
    }

    Ok(AppConfig::default())
}

impl AppConfig {
    /// Apply `S3_BUCKET`, `DATA_SET_NAME` and `EPIDATA_BASE_URL` overrides.
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(bucket) = var("S3_BUCKET") {
            self.bucket = Some(bucket);
        }
        if let Some(name) = var("DATA_SET_NAME") {
            self.dataset_name = name;
        }
        if let Some(url) = var("EPIDATA_BASE_URL") {
            self.epidata_base_url = Some(url);
        }
    }

    pub fn to_sync_config(&self) -> Result<SyncConfig> {
        let Some(bucket) = self.bucket.as_deref() else {
            bail!("no bucket configured; set `bucket` in the config file or S3_BUCKET");
        };

        let mut config = SyncConfig::new(bucket, &self.dataset_name);
        config.max_rows_per_call = self.sync.max_rows_per_call;
        config.max_batch_size = self.sync.max_batch_size;
        config.excluded_sources = self.sync.excluded_sources.clone();
        config.window_concurrency = self.sync.window_concurrency;
        config.max_partition_workers = self.sync.max_partition_workers;
        config.retry = self.sync.retry;
        config.unchanged_policy = self.sync.unchanged_policy;
        config.validate()?;
        Ok(config)
    }

    pub fn client_config(&self) -> EpidataClientConfig {
        EpidataClientConfig {
            base_url: self.epidata_base_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            ..EpidataClientConfig::default()
        }
    }

    /// Directory for the local databases, created if needed.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .context("could not determine data directory")?
                .join("covidcast-sync"),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.bucket, None);
        assert_eq!(config.dataset_name, "covidcast");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.sync.max_batch_size, 100);
        assert_eq!(config.sync.excluded_sources, vec!["covid-act-now"]);
    }

    #[test]
    fn parse_full_config_from_toml() {
        let toml_str = r#"
bucket = "covidcast-bucket"
dataset_name = "covid-19-delphi"
epidata_base_url = "http://localhost:8080/api.php"
request_timeout_secs = 5

[sync]
max_rows_per_call = 1000
excluded_sources = []
max_partition_workers = 8
unchanged_policy = "always-republish"

[sync.retry]
max_attempts = 3
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.bucket.as_deref(), Some("covidcast-bucket"));
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.sync.max_rows_per_call, 1000);
        assert!(config.sync.excluded_sources.is_empty());
        assert_eq!(config.sync.unchanged_policy, UnchangedPolicy::AlwaysRepublish);
        assert_eq!(config.sync.retry.max_attempts, 3);
        assert_eq!(config.sync.retry.base_delay_ms, 200);
        // Unset tunables keep their defaults.
        assert_eq!(config.sync.window_concurrency, 16);

        let sync = config.to_sync_config().unwrap();
        assert_eq!(sync.dataset_key_prefix, "covid-19-delphi/dataset/");
        assert_eq!(sync.max_partition_workers, 8);
        assert!(!sync.is_excluded("covid-act-now"));

        let client = config.client_config();
        assert_eq!(client.base_url.as_deref(), Some("http://localhost:8080/api.php"));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config: AppConfig = toml::from_str(r#"bucket = "from-file""#).unwrap();
        config.apply_env(|name| match name {
            "S3_BUCKET" => Some("from-env".into()),
            "DATA_SET_NAME" => Some("covid-19-delphi".into()),
            "EPIDATA_BASE_URL" => Some("  ".into()),
            _ => None,
        });

        assert_eq!(config.bucket.as_deref(), Some("from-env"));
        assert_eq!(config.dataset_name, "covid-19-delphi");
        assert_eq!(config.epidata_base_url, None);
    }

    #[test]
    fn missing_bucket_is_an_error() {
        let mut config = AppConfig::default();
        config.apply_env(no_env);
        let err = config.to_sync_config().unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let toml_str = r#"
bucket = "b"

[sync]
max_batch_size = 0
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(config.to_sync_config().is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/covidcast-sync.toml")));
        assert!(result.is_err());
    }
}
