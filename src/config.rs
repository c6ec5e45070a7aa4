//! Configuration loading helpers.
//!
//! A [`Config`] is a plain value: it is handed to every collective
//! constructor and never mutated afterwards.
//! It can be read from a TOML file, from the `PGAS_RECLAIM_CONFIG` environment
//! variable and from `PGAS_RECLAIM__section__field` overrides.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

const ENV_FILE: &str = "PGAS_RECLAIM_CONFIG";
const ENV_PREFIX: &str = "PGAS_RECLAIM__";

/// The default number of nodes per unit arena.
pub const DEFAULT_CAPACITY: usize = 1 << 15;

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
    /// A combination of values that is rejected by validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Reclamation manager configuration.
    pub reclaim: ReclaimConfig,
    /// Backoff bounds for contended retry loops.
    pub backoff: BackoffConfig,
    /// Elimination stack tuning.
    pub elimination: EliminationConfig,
    /// Timestamp stack tuning.
    pub timestamp: TimestampConfig,
}

/********** impl inherent *************************************************************************/

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the `PGAS_RECLAIM_CONFIG` env var (if set),
    /// then apply `PGAS_RECLAIM__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = match env::var(ENV_FILE).ok() {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // variables that are not valid unicode can not carry an override
        let vars = env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        self.apply_overrides(vars)
    }

    fn apply_overrides(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        for (key, value) in vars {
            if !key.starts_with(ENV_PREFIX) {
                continue;
            }
            let path = key[ENV_PREFIX.len()..].to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim();

            match parts.as_slice() {
                ["reclaim", "capacity"] => self.reclaim.capacity = parse_value(&key, value)?,
                ["reclaim", "hazards_per_unit"] => {
                    self.reclaim.hazards_per_unit = parse_value(&key, value)?
                }
                ["backoff", "initial"] => self.backoff.initial = parse_value(&key, value)?,
                ["backoff", "max"] => self.backoff.max = parse_value(&key, value)?,
                ["elimination", "collision_delay"] => {
                    self.elimination.collision_delay = parse_value(&key, value)?
                }
                ["timestamp", "interval"] => self.timestamp.interval = parse_value(&key, value)?,
                ["timestamp", "clock"] => self.timestamp.clock = parse_value(&key, value)?,
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Checks the configuration for values no structure can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reclaim.capacity == 0 {
            return Err(ConfigError::Invalid("reclaim.capacity must be positive".into()));
        }
        if self.reclaim.hazards_per_unit < 2 {
            return Err(ConfigError::Invalid(format!(
                "reclaim.hazards_per_unit must be at least 2 (got {})",
                self.reclaim.hazards_per_unit
            )));
        }
        if self.backoff.initial > self.backoff.max {
            return Err(ConfigError::Invalid(format!(
                "backoff.initial ({}) exceeds backoff.max ({})",
                self.backoff.initial, self.backoff.max
            )));
        }

        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ReclaimConfig
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Sizing of the per-unit arenas and hazard slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReclaimConfig {
    /// Number of nodes each unit's arena can hold.
    pub capacity: usize,
    /// Number of hazard slots owned by each unit.
    pub hazards_per_unit: usize,
}

impl Default for ReclaimConfig {
    #[inline]
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, hazards_per_unit: 2 }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// BackoffConfig
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Backoff bounds in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
    pub initial: u64,
    pub max: u64,
}

impl Default for BackoffConfig {
    #[inline]
    fn default() -> Self {
        Self { initial: 2, max: 1 << 20 }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// EliminationConfig
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EliminationConfig {
    /// Delay in microseconds between advertising an operation and giving up
    /// on a collision.
    pub collision_delay: u64,
}

impl Default for EliminationConfig {
    #[inline]
    fn default() -> Self {
        Self { collision_delay: 1 }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// TimestampConfig
////////////////////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimestampConfig {
    /// Width of a minted interval in microseconds.
    pub interval: u64,
    /// The logical clock used to mint timestamps.
    pub clock: ClockKind,
}

impl Default for TimestampConfig {
    #[inline]
    fn default() -> Self {
        Self { interval: 1, clock: ClockKind::Interval }
    }
}

/// The logical clock backing a timestamp stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    /// Intervals minted with a compare-and-swap, possibly overlapping.
    Interval,
    /// Single points minted with fetch-and-add, never overlapping.
    Counter,
}

impl FromStr for ClockKind {
    type Err = ();

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interval" => Ok(ClockKind::Interval),
            "counter" => Ok(ClockKind::Counter),
            _ => Err(()),
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.reclaim.capacity, 1 << 15);
        assert_eq!(config.reclaim.hazards_per_unit, 2);
        assert_eq!(config.backoff.initial, 2);
        assert_eq!(config.backoff.max, 1 << 20);
        assert_eq!(config.timestamp.clock, ClockKind::Interval);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            [reclaim]
            capacity = 64

            [timestamp]
            clock = "counter"
            "#,
        )
        .unwrap();

        assert_eq!(config.reclaim.capacity, 64);
        assert_eq!(config.reclaim.hazards_per_unit, 2);
        assert_eq!(config.timestamp.clock, ClockKind::Counter);
        assert_eq!(config.backoff, BackoffConfig::default());
    }

    #[test]
    fn unknown_toml_field_is_rejected() {
        let err = Config::from_toml("[reclaim]\nslots = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(vars(&[
                ("PGAS_RECLAIM__reclaim__capacity", "128"),
                ("PGAS_RECLAIM__backoff__max", " 64 "),
                ("PGAS_RECLAIM__timestamp__clock", "counter"),
                ("UNRELATED", "1"),
            ]))
            .unwrap();

        assert_eq!(config.reclaim.capacity, 128);
        assert_eq!(config.backoff.max, 64);
        assert_eq!(config.timestamp.clock, ClockKind::Counter);
    }

    #[test]
    fn override_errors() {
        let mut config = Config::default();
        let err =
            config.apply_overrides(vars(&[("PGAS_RECLAIM__reclaim__size", "1")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey(_)));

        let err = config
            .apply_overrides(vars(&[("PGAS_RECLAIM__backoff__initial", "fast")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn env_overrides_tolerate_non_unicode_variables() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        env::set_var("PGAS_RECLAIM_TEST_NON_UNICODE", OsString::from_vec(vec![0x66, 0xff, 0x6f]));
        let mut config = Config::default();
        let res = config.apply_env_overrides();
        env::remove_var("PGAS_RECLAIM_TEST_NON_UNICODE");

        assert!(res.is_ok());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn validation() {
        let mut config = Config::default();
        config.backoff.initial = 10;
        config.backoff.max = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.reclaim.capacity = 0;
        assert!(config.validate().is_err());
    }
}
