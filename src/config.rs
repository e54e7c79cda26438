//! Scope configuration with environment and config file support.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set on [`ScopeConfigBuilder`]
//! 2. **Environment variables**: values from `LAYERSCOPE_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: [`ScopeConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `LAYERSCOPE_RELEASE_STRATEGY` | strategy | `release_strategy` |
//! | `LAYERSCOPE_LAYER_RELEASE_STRATEGY` | strategy | `layer_release_strategy` |
//!
//! Strategies are written `sequential`, `parallel`, or `parallel:N`.

use crate::error::{Error, Result};
use crate::types::ExecutionStrategy;
use serde::{Deserialize, Serialize};

/// Environment variable name for the scope release strategy.
pub const ENV_RELEASE_STRATEGY: &str = "LAYERSCOPE_RELEASE_STRATEGY";
/// Environment variable name for the per-layer release strategy.
pub const ENV_LAYER_RELEASE_STRATEGY: &str = "LAYERSCOPE_LAYER_RELEASE_STRATEGY";

/// Strategies used when scopes and memoized layers release their resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Strategy used by [`Scope::close`](crate::Scope::close).
    pub release_strategy: ExecutionStrategy,
    /// Strategy used to release each memoized layer's own resources.
    pub layer_release_strategy: ExecutionStrategy,
}

impl ScopeConfig {
    /// Returns a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> ScopeConfigBuilder {
        ScopeConfigBuilder::default()
    }

    /// Defaults with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        Ok(config)
    }
}

/// Builder resolving a [`ScopeConfig`] from all configuration sources.
#[derive(Debug, Clone, Default)]
pub struct ScopeConfigBuilder {
    release_strategy: Option<ExecutionStrategy>,
    layer_release_strategy: Option<ExecutionStrategy>,
    use_env: bool,
    #[cfg(feature = "config-file")]
    config_file: Option<std::path::PathBuf>,
}

impl ScopeConfigBuilder {
    /// Sets the scope release strategy.
    #[must_use]
    pub fn release_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.release_strategy = Some(strategy);
        self
    }

    /// Sets the per-layer release strategy.
    #[must_use]
    pub fn layer_release_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.layer_release_strategy = Some(strategy);
        self
    }

    /// Applies `LAYERSCOPE_*` environment overrides when building.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Loads the given TOML file when building.
    #[cfg(feature = "config-file")]
    #[must_use]
    pub fn config_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Resolves the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the config file or an environment
    /// variable holds an invalid value.
    pub fn build(self) -> Result<ScopeConfig> {
        self.build_with_lookup(read_env)
    }

    fn build_with_lookup(self, lookup: impl Fn(&str) -> Option<String>) -> Result<ScopeConfig> {
        let mut config = ScopeConfig::default();
        #[cfg(feature = "config-file")]
        if let Some(path) = &self.config_file {
            let parsed = parse_toml_file(path)?;
            apply_toml_config(&mut config, &parsed)?;
        }
        if self.use_env {
            apply_overrides_from(&mut config, lookup)?;
        }
        if let Some(strategy) = self.release_strategy {
            config.release_strategy = strategy;
        }
        if let Some(strategy) = self.layer_release_strategy {
            config.layer_release_strategy = strategy;
        }
        Ok(config)
    }
}

/// Apply environment variable overrides to a [`ScopeConfig`].
///
/// Only variables that are set in the environment are applied.
///
/// # Errors
///
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut ScopeConfig) -> Result<()> {
    apply_overrides_from(config, read_env)
}

fn apply_overrides_from(
    config: &mut ScopeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(val) = lookup(ENV_RELEASE_STRATEGY) {
        config.release_strategy = parse_strategy(ENV_RELEASE_STRATEGY, &val)?;
    }
    if let Some(val) = lookup(ENV_LAYER_RELEASE_STRATEGY) {
        config.layer_release_strategy = parse_strategy(ENV_LAYER_RELEASE_STRATEGY, &val)?;
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_strategy(var_name: &str, val: &str) -> Result<ExecutionStrategy> {
    val.parse::<ExecutionStrategy>()
        .map_err(|e| Error::config(format!("invalid value for {var_name}: {e}")))
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable scope configuration.
///
/// ```toml
/// [scope]
/// release_strategy = "sequential"
/// layer_release_strategy = "parallel:4"
/// ```
#[cfg(feature = "config-file")]
#[derive(Deserialize, Default, Debug)]
pub struct ScopeTomlConfig {
    /// Scope settings.
    #[serde(default)]
    pub scope: ScopeToml,
}

/// Scope section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(Deserialize, Default, Debug)]
pub struct ScopeToml {
    /// Strategy used when a scope closes.
    pub release_strategy: Option<String>,
    /// Strategy used when a memoized layer is torn down.
    pub layer_release_strategy: Option<String>,
}

/// Apply a parsed TOML config to a [`ScopeConfig`].
///
/// Only fields present in the file override the config.
///
/// # Errors
///
/// Returns an error if a strategy string is invalid.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut ScopeConfig, toml: &ScopeTomlConfig) -> Result<()> {
    if let Some(v) = &toml.scope.release_strategy {
        config.release_strategy = parse_strategy("scope.release_strategy", v)?;
    }
    if let Some(v) = &toml.scope.layer_release_strategy {
        config.layer_release_strategy = parse_strategy("scope.layer_release_strategy", v)?;
    }
    Ok(())
}

/// Parse a TOML string into a [`ScopeTomlConfig`].
///
/// # Errors
///
/// Returns an error if the string is not valid TOML of the expected shape.
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<ScopeTomlConfig> {
    toml::from_str(toml_str).map_err(|e| Error::config(format!("failed to parse TOML config: {e}")))
}

/// Read and parse a TOML file into a [`ScopeTomlConfig`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<ScopeTomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    parse_toml_str(&content)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::num::NonZeroUsize;

    fn env_of(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn parallel(n: usize) -> ExecutionStrategy {
        ExecutionStrategy::ParallelN(NonZeroUsize::new(n).expect("nonzero"))
    }

    #[test]
    fn defaults_are_sequential() {
        let config = ScopeConfig::default();
        assert_eq!(config.release_strategy, ExecutionStrategy::Sequential);
        assert_eq!(config.layer_release_strategy, ExecutionStrategy::Sequential);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = ScopeConfig::default();
        apply_overrides_from(
            &mut config,
            env_of(&[
                (ENV_RELEASE_STRATEGY, "parallel"),
                (ENV_LAYER_RELEASE_STRATEGY, "parallel:3"),
            ]),
        )
        .expect("valid env");
        assert_eq!(config.release_strategy, ExecutionStrategy::Parallel);
        assert_eq!(config.layer_release_strategy, parallel(3));
    }

    #[test]
    fn unset_env_leaves_defaults() {
        let mut config = ScopeConfig::default();
        apply_overrides_from(&mut config, env_of(&[])).expect("no vars");
        assert_eq!(config, ScopeConfig::default());
    }

    #[test]
    fn invalid_env_value_names_variable() {
        let mut config = ScopeConfig::default();
        let err = apply_overrides_from(&mut config, env_of(&[(ENV_RELEASE_STRATEGY, "sometimes")]))
            .expect_err("invalid value");
        assert!(err.to_string().contains(ENV_RELEASE_STRATEGY));
    }

    #[test]
    fn programmatic_beats_env() {
        let config = ScopeConfig::builder()
            .with_env()
            .release_strategy(parallel(2))
            .build_with_lookup(env_of(&[
                (ENV_RELEASE_STRATEGY, "parallel"),
                (ENV_LAYER_RELEASE_STRATEGY, "parallel"),
            ]))
            .expect("valid config");
        assert_eq!(config.release_strategy, parallel(2));
        assert_eq!(config.layer_release_strategy, ExecutionStrategy::Parallel);
    }

    #[test]
    fn env_ignored_unless_requested() {
        let config = ScopeConfig::builder()
            .build_with_lookup(env_of(&[(ENV_RELEASE_STRATEGY, "parallel")]))
            .expect("valid config");
        assert_eq!(config, ScopeConfig::default());
    }

    #[test]
    fn serde_round_trip_json() {
        let config = ScopeConfig {
            release_strategy: ExecutionStrategy::Parallel,
            layer_release_strategy: parallel(4),
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: ScopeConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, config);

        assert!(json.contains(r#""layer_release_strategy":"parallel:4""#));

        let partial: ScopeConfig =
            serde_json::from_str(r#"{"release_strategy":"parallel"}"#).expect("partial");
        assert_eq!(partial.layer_release_strategy, ExecutionStrategy::Sequential);
    }

    #[cfg(feature = "config-file")]
    mod toml_file {
        use super::*;
        use std::io::Write;

        #[test]
        fn parse_full_config() {
            let parsed = parse_toml_str(
                r#"
                [scope]
                release_strategy = "parallel"
                layer_release_strategy = "parallel:8"
                "#,
            )
            .expect("valid toml");
            let mut config = ScopeConfig::default();
            apply_toml_config(&mut config, &parsed).expect("valid strategies");
            assert_eq!(config.release_strategy, ExecutionStrategy::Parallel);
            assert_eq!(config.layer_release_strategy, parallel(8));
        }

        #[test]
        fn empty_config_keeps_defaults() {
            let parsed = parse_toml_str("").expect("empty toml");
            let mut config = ScopeConfig::default();
            apply_toml_config(&mut config, &parsed).expect("nothing to apply");
            assert_eq!(config, ScopeConfig::default());
        }

        #[test]
        fn invalid_strategy_in_file() {
            let parsed = parse_toml_str("[scope]\nrelease_strategy = \"parallel:0\"\n")
                .expect("valid toml");
            let mut config = ScopeConfig::default();
            assert!(apply_toml_config(&mut config, &parsed).is_err());
        }

        #[test]
        fn env_beats_file() {
            let mut file = tempfile::NamedTempFile::new().expect("temp file");
            writeln!(
                file,
                "[scope]\nrelease_strategy = \"parallel\"\nlayer_release_strategy = \"parallel:2\""
            )
            .expect("write");
            let config = ScopeConfig::builder()
                .config_file(file.path())
                .with_env()
                .build_with_lookup(env_of(&[(ENV_LAYER_RELEASE_STRATEGY, "sequential")]))
                .expect("valid config");
            assert_eq!(config.release_strategy, ExecutionStrategy::Parallel);
            assert_eq!(
                config.layer_release_strategy,
                ExecutionStrategy::Sequential
            );
        }

        #[test]
        fn missing_file_is_config_error() {
            let err = parse_toml_file(std::path::Path::new("/nonexistent/layerscope.toml"))
                .expect_err("missing file");
            assert!(matches!(err, Error::Config { .. }));
        }
    }
}
