//! Loader configuration.
//!
//! Values are layered with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. `tsb.toml` in the working directory, or an explicit file
//! 3. `TSB_*` environment variables (`__` separates nested keys, e.g.
//!    `TSB_CACHE__DIR=/tmp/tsb`)

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::compiler::{CompileOptions, default_pool_size};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "tsb.toml";

/// Default iteration budget for graph resolution.
pub const DEFAULT_MAX_RESOLUTION_STEPS: usize = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Complete loader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Number of compiler units; derived from the host when unset.
    pub pool_size: Option<usize>,

    /// Prefer a single compiler unit (low-memory or low-bandwidth hosts).
    pub constrained: bool,

    /// Resolution fails after this many fetch+compile completions.
    pub max_resolution_steps: usize,

    pub compile: CompileOptions,

    pub cache: CacheConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            pool_size: None,
            constrained: false,
            max_resolution_steps: DEFAULT_MAX_RESOLUTION_STEPS,
            compile: CompileOptions::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from defaults, a config file and the environment.
    ///
    /// Without an explicit path, `tsb.toml` is used when it exists.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_file: Option<PathBuf> = config_path.map(Path::to_path_buf).or_else(|| {
            let default_path = Path::new(CONFIG_FILE);
            default_path.exists().then(|| default_path.to_path_buf())
        });

        Self::from_figment(Self::figment(config_file.as_deref()))
    }

    /// Extract and validate a configuration from any provider stack.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Layered provider, exposed so callers can merge their own overrides.
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("TSB_").split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "pool_size".to_string(),
                reason: "at least one compiler unit is required".to_string(),
            });
        }
        if self.max_resolution_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_resolution_steps".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.compile.jsx && self.compile.jsx_pragma.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "compile.jsx_pragma".to_string(),
                reason: "required when jsx is enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Pool size after applying defaults.
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size
            .unwrap_or_else(|| default_pool_size(self.constrained))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.pool_size, None);
        assert_eq!(config.max_resolution_steps, DEFAULT_MAX_RESOLUTION_STEPS);
        assert!(!config.cache.enabled);
        assert!(config.validate().is_ok());
        assert!((1..=4).contains(&config.effective_pool_size()));
    }

    #[test]
    fn test_constrained_uses_one_unit() {
        let config = LoaderConfig {
            constrained: true,
            ..LoaderConfig::default()
        };
        assert_eq!(config.effective_pool_size(), 1);

        let config = LoaderConfig {
            constrained: true,
            pool_size: Some(3),
            ..LoaderConfig::default()
        };
        assert_eq!(config.effective_pool_size(), 3);
    }

    #[test]
    fn test_validation() {
        let zero_pool = LoaderConfig {
            pool_size: Some(0),
            ..LoaderConfig::default()
        };
        assert!(matches!(
            zero_pool.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "pool_size"
        ));

        let zero_budget = LoaderConfig {
            max_resolution_steps: 0,
            ..LoaderConfig::default()
        };
        assert!(zero_budget.validate().is_err());
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                    pool_size = 2
                    max_resolution_steps = 50

                    [compile]
                    jsx = true

                    [cache]
                    enabled = true
                    dir = "build/cache"
                "#,
            )?;
            jail.set_env("TSB_POOL_SIZE", "3");
            jail.set_env("TSB_CACHE__FORCE_REFRESH", "true");

            let config = LoaderConfig::load(None).map_err(|e| e.to_string())?;
            assert_eq!(config.pool_size, Some(3));
            assert_eq!(config.max_resolution_steps, 50);
            assert!(config.compile.jsx);
            assert_eq!(config.compile.jsx_pragma, "React.createElement");
            assert!(config.cache.enabled);
            assert!(config.cache.force_refresh);
            assert_eq!(config.cache.dir, PathBuf::from("build/cache"));
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_value_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "pool_size = 0")?;
            let result = LoaderConfig::load(Some(Path::new("custom.toml")));
            assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
            Ok(())
        });
    }
}
