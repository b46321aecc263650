//! Context Configuration Module
//!
//! Loads [`ContextConfig`] from TOML files with environment-specific overrides
//! and `STRAND_*` environment variables.

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sizing and timing for one actor context
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Context name, packed into a `CtxId` atom
    pub ctxid: String,

    /// Worker threads; zero is treated as one
    pub thread_num: usize,

    pub per_thread_service_num: usize,

    pub nonblocked_num: usize,

    pub actor_pool_reserve_size: usize,

    /// Zero means unbounded
    pub actor_pool_max_size: usize,

    pub mailbox_node_reserve_size: usize,

    pub cache_match_size: usize,

    pub max_tick_handle_size: usize,

    pub default_request_timeout_ms: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ctxid: defaults::CTXID.to_string(),
            thread_num: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(defaults::FALLBACK_THREAD_NUM),
            per_thread_service_num: defaults::PER_THREAD_SERVICE_NUM,
            nonblocked_num: defaults::NONBLOCKED_NUM,
            actor_pool_reserve_size: defaults::pool::ACTOR_RESERVE_SIZE,
            actor_pool_max_size: defaults::pool::ACTOR_MAX_SIZE,
            mailbox_node_reserve_size: defaults::mailbox::NODE_RESERVE_SIZE,
            cache_match_size: defaults::mailbox::CACHE_MATCH_SIZE,
            max_tick_handle_size: defaults::MAX_TICK_HANDLE_SIZE,
            default_request_timeout_ms: defaults::REQUEST_TIMEOUT_MS,
        }
    }
}

impl ContextConfig {
    /// Load configuration from files with environment overrides
    ///
    /// `base_path` defaults to `config/context.toml`; a missing base file leaves every
    /// field at its default. The overlay is `<base dir>/environments/<env>.toml`.
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        Self::load_with_env(base_path, environment, None)
    }

    /// [`ContextConfig::load`] with an explicit variable map in place of the process environment
    pub fn load_with_env(
        base_path: Option<&Path>,
        environment: Option<&str>,
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self> {
        let default_path = default_config_path();
        let base = base_path.unwrap_or(default_path.as_path());

        let mut builder = Config::builder().add_source(File::from(base).required(false));

        if let Some(env) = environment {
            let env_file = base
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables (STRAND_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("STRAND")
                .try_parsing(true)
                .source(env_vars),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        debug!(
            ctxid = %config.ctxid,
            thread_num = config.thread_num,
            strands = config.strand_count(),
            "Context configuration loaded"
        );
        Ok(config)
    }

    /// Parse a TOML document; absent keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse context TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ctxid.is_empty() {
            bail!("ctxid must not be empty");
        }
        if self.max_tick_handle_size == 0 {
            bail!("max_tick_handle_size must be at least 1");
        }
        if self.per_thread_service_num == 0 {
            bail!("per_thread_service_num must be at least 1");
        }
        if self.actor_pool_max_size != 0 && self.actor_pool_max_size < self.actor_pool_reserve_size {
            bail!(
                "actor_pool_max_size ({}) is below actor_pool_reserve_size ({})",
                self.actor_pool_max_size,
                self.actor_pool_reserve_size
            );
        }
        Ok(())
    }

    pub fn effective_thread_num(&self) -> usize {
        self.thread_num.max(1)
    }

    /// Strands hosting coroutine actors
    pub fn service_strand_count(&self) -> usize {
        self.effective_thread_num() * self.per_thread_service_num
    }

    /// Every strand, utility strands included
    pub fn strand_count(&self) -> usize {
        self.service_strand_count() + self.nonblocked_num
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.default_request_timeout_ms)
    }

    /// Slot ceiling per strand, `None` when unbounded
    pub fn actor_pool_limit(&self) -> Option<usize> {
        (self.actor_pool_max_size != 0).then_some(self.actor_pool_max_size)
    }
}

/// Convenience function to load configuration from the default location
pub fn load_config(environment: Option<&str>) -> Result<ContextConfig> {
    ContextConfig::load(None, environment)
}

/// Default location of the base file, relative to the working directory
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config/context.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ContextConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ctxid, "local");
        assert!(config.thread_num >= 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(180));
        assert_eq!(config.actor_pool_limit(), None);
    }

    #[test]
    fn test_load_base_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("context.toml");

        let config_content = r#"
ctxid = "node1"
thread_num = 2
per_thread_service_num = 3
cache_match_size = 8
"#;

        fs::write(&config_path, config_content).unwrap();

        let config =
            ContextConfig::load_with_env(Some(&config_path), None, Some(HashMap::new())).unwrap();

        assert_eq!(config.ctxid, "node1");
        assert_eq!(config.thread_num, 2);
        assert_eq!(config.service_strand_count(), 6);
        assert_eq!(config.strand_count(), 7);
        assert_eq!(config.cache_match_size, 8);
        assert_eq!(config.max_tick_handle_size, defaults::MAX_TICK_HANDLE_SIZE);
    }

    #[test]
    fn test_environment_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("context.toml");
        fs::write(&config_path, "thread_num = 2\nnonblocked_num = 1\n").unwrap();
        fs::create_dir(dir.path().join("environments")).unwrap();
        fs::write(
            dir.path().join("environments").join("test.toml"),
            "thread_num = 4\n",
        )
        .unwrap();

        let vars = HashMap::from([("STRAND_NONBLOCKED_NUM".to_string(), "3".to_string())]);
        let config =
            ContextConfig::load_with_env(Some(&config_path), Some("test"), Some(vars)).unwrap();

        assert_eq!(config.thread_num, 4);
        assert_eq!(config.nonblocked_num, 3);
    }

    #[test]
    fn test_missing_environment_file_keeps_base() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("context.toml");
        fs::write(&config_path, "thread_num = 5\n").unwrap();

        let config =
            ContextConfig::load_with_env(Some(&config_path), Some("nope"), Some(HashMap::new()))
                .unwrap();
        assert_eq!(config.thread_num, 5);
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        let err = ContextConfig::from_toml_str("max_tick_handle_size = 0").unwrap_err();
        assert!(err.to_string().contains("max_tick_handle_size"));

        let err = ContextConfig::from_toml_str(
            "actor_pool_reserve_size = 10\nactor_pool_max_size = 4",
        )
        .unwrap_err();
        assert!(err.to_string().contains("below"));

        let ok = ContextConfig::from_toml_str("actor_pool_reserve_size = 4\nactor_pool_max_size = 4")
            .unwrap();
        assert_eq!(ok.actor_pool_limit(), Some(4));
    }

    #[test]
    fn test_zero_threads_means_one() {
        let config = ContextConfig::from_toml_str("thread_num = 0").unwrap();
        assert_eq!(config.effective_thread_num(), 1);
    }
}
