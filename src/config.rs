//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::cache::FingerprintCacheConfig;
use crate::prefetch::{PolicyKind, PrefetchConfig};

const ENV_PREFIX: &str = "SMC__";

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmcConfig {
    /// Fingerprint cache configuration.
    pub cache: Option<CacheConfigSpec>,
    /// Speculative prefetch configuration.
    pub prefetch: Option<PrefetchConfigSpec>,
}

impl SmcConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the `SMC_CONFIG` env var (if set),
    /// then apply `SMC__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var("SMC_CONFIG").ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            if !key.starts_with(ENV_PREFIX) {
                continue;
            }
            let path = key[ENV_PREFIX.len()..].to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim().to_string();

            match parts.as_slice() {
                ["cache", "capacity"] => {
                    self.cache_mut().capacity = Some(parse_value(&key, &value)?);
                }
                ["cache", "enabled"] => {
                    self.cache_mut().enabled = Some(parse_value(&key, &value)?);
                }
                ["prefetch", "enabled"] => {
                    self.prefetch_mut().enabled = Some(parse_value(&key, &value)?);
                }
                ["prefetch", "policy"] => {
                    self.prefetch_mut().policy = Some(value.to_ascii_lowercase());
                }
                ["prefetch", "max_pages"] => {
                    self.prefetch_mut().max_pages = Some(parse_value(&key, &value)?);
                }
                ["prefetch", "max_bytes"] => {
                    self.prefetch_mut().max_bytes = Some(parse_value(&key, &value)?);
                }
                ["prefetch", "batch_pages"] => {
                    self.prefetch_mut().batch_pages = Some(parse_value(&key, &value)?);
                }
                ["prefetch", "sample_ratio"] => {
                    self.prefetch_mut().sample_ratio = Some(parse_value(&key, &value)?);
                }
                ["prefetch", "seed"] => {
                    self.prefetch_mut().seed = Some(parse_value(&key, &value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        self.validate()
    }

    /// Build a `FingerprintCacheConfig` using defaults plus overrides.
    pub fn to_cache_config(&self) -> FingerprintCacheConfig {
        let mut config = FingerprintCacheConfig::default();
        if let Some(cache) = &self.cache {
            cache.apply_to(&mut config);
        }
        config
    }

    /// Build a `PrefetchConfig` using defaults plus overrides.
    pub fn to_prefetch_config(&self) -> PrefetchConfig {
        let mut config = PrefetchConfig::default();
        if let Some(prefetch) = &self.prefetch {
            prefetch.apply_to(&mut config);
        }
        config
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(policy) = self.prefetch.as_ref().and_then(|p| p.policy.as_deref()) {
            policy
                .parse::<PolicyKind>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "prefetch.policy".into(),
                    value: policy.into(),
                })?;
        }
        Ok(())
    }

    fn cache_mut(&mut self) -> &mut CacheConfigSpec {
        self.cache.get_or_insert_with(CacheConfigSpec::default)
    }

    fn prefetch_mut(&mut self) -> &mut PrefetchConfigSpec {
        self.prefetch.get_or_insert_with(PrefetchConfigSpec::default)
    }
}

/// Fingerprint cache configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfigSpec {
    /// Maximum number of remembered pages.
    pub capacity: Option<usize>,
    /// Whether the cache is used.
    pub enabled: Option<bool>,
}

impl CacheConfigSpec {
    fn apply_to(&self, config: &mut FingerprintCacheConfig) {
        if let Some(value) = self.capacity {
            config.capacity = value;
        }
        if let Some(value) = self.enabled {
            config.enabled = value;
        }
    }
}

/// Prefetch configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrefetchConfigSpec {
    /// Whether the standby speculates.
    pub enabled: Option<bool>,
    /// Policy name: "all", "budget", "sampled" or "none".
    pub policy: Option<String>,
    /// Page budget per epoch.
    pub max_pages: Option<usize>,
    /// Byte budget per epoch.
    pub max_bytes: Option<u64>,
    /// Pages per request frame.
    pub batch_pages: Option<usize>,
    /// Sampled policy ratio.
    pub sample_ratio: Option<f64>,
    /// Sampled policy seed.
    pub seed: Option<u64>,
}

impl PrefetchConfigSpec {
    fn apply_to(&self, config: &mut PrefetchConfig) {
        if let Some(value) = self.enabled {
            config.enabled = value;
        }
        if let Some(policy) = self.policy.as_deref().and_then(|p| p.parse().ok()) {
            config.policy = policy;
        }
        if let Some(value) = self.max_pages {
            config.max_pages = value;
        }
        if let Some(value) = self.max_bytes {
            config.max_bytes = value;
        }
        if let Some(value) = self.batch_pages {
            config.batch_pages = value.max(1);
        }
        if let Some(value) = self.sample_ratio {
            config.sample_ratio = value.clamp(0.0, 1.0);
        }
        if let Some(value) = self.seed {
            config.seed = value;
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_without_sections() {
        let config = SmcConfig::default();
        assert_eq!(config.to_cache_config(), FingerprintCacheConfig::default());
        assert_eq!(config.to_prefetch_config(), PrefetchConfig::default());
    }

    #[test]
    fn test_toml_sections() {
        let config = SmcConfig::from_toml_str(
            r#"
            [cache]
            capacity = 512

            [prefetch]
            policy = "sampled"
            sample_ratio = 1.5
            batch_pages = 0
            "#,
        )
        .unwrap();

        let cache = config.to_cache_config();
        assert_eq!(cache.capacity, 512);
        assert!(cache.enabled);

        let prefetch = config.to_prefetch_config();
        assert_eq!(prefetch.policy, PolicyKind::Sampled);
        assert_eq!(prefetch.sample_ratio, 1.0);
        assert_eq!(prefetch.batch_pages, 1);
    }

    #[test]
    fn test_toml_rejects_unknown_and_invalid() {
        assert!(matches!(
            SmcConfig::from_toml_str("[cache]\nsize = 3\n"),
            Err(ConfigError::Toml(_))
        ));
        assert!(matches!(
            SmcConfig::from_toml_str("[prefetch]\npolicy = \"lru\"\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_env_overrides_cache_and_prefetch() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("SMC__cache__capacity", "4096");
        env::set_var("SMC__prefetch__policy", "ALL");
        env::set_var("SMC__prefetch__max_pages", "12");

        let mut config = SmcConfig::default();
        let result = config.apply_env_overrides();

        env::remove_var("SMC__cache__capacity");
        env::remove_var("SMC__prefetch__policy");
        env::remove_var("SMC__prefetch__max_pages");

        result.unwrap();
        assert_eq!(config.to_cache_config().capacity, 4096);
        let prefetch = config.to_prefetch_config();
        assert_eq!(prefetch.policy, PolicyKind::All);
        assert_eq!(prefetch.max_pages, 12);
    }

    #[test]
    fn test_env_unknown_key() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("SMC__cache__mem_size", "1");
        let result = SmcConfig::default().apply_env_overrides();
        env::remove_var("SMC__cache__mem_size");

        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_env_invalid_value() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::set_var("SMC__prefetch__enabled", "maybe");
        let result = SmcConfig::default().apply_env_overrides();
        env::remove_var("SMC__prefetch__enabled");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
