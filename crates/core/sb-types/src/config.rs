//! Configuration types for script stages.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Display name used for inline scripts in diagnostics.
pub const DEFAULT_SCRIPT_NAME: &str = "main.rhai";

/// Configuration for a script processor stage.
///
/// Exactly one of `code` and `file` must be set; an empty string counts as unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// Inline script source
    #[serde(default)]
    pub code: Option<String>,

    /// Path to a script file
    #[serde(default)]
    pub file: Option<String>,

    /// Cache resources the script may address, in order; the first is the
    /// target of `getCache`/`setCache`
    #[serde(default)]
    pub cache_res: Vec<String>,

    /// Folders searched when a script imports a module
    #[serde(default)]
    pub registry_global_folders: Vec<String>,

    /// Engine safety limits
    #[serde(default)]
    pub limits: EngineLimits,
}

impl ScriptConfig {
    /// Creates a config with an inline script.
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    /// Creates a config with a script file path.
    pub fn with_file(path: impl Into<String>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the permitted cache resources.
    pub fn with_cache_res<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cache_res = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the module search folders.
    pub fn with_global_folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry_global_folders = folders.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the engine limits.
    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Inline code, ignoring empty strings.
    pub fn inline_code(&self) -> Option<&str> {
        self.code.as_deref().filter(|c| !c.is_empty())
    }

    /// Script file path, ignoring empty strings.
    pub fn script_file(&self) -> Option<&str> {
        self.file.as_deref().filter(|f| !f.is_empty())
    }
}

/// Configuration for a script output stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Script, cache and module settings shared with the processor
    #[serde(flatten)]
    pub script: ScriptConfig,

    /// Downstream sinks the script may emit to
    #[serde(default)]
    pub output_res: Vec<String>,

    /// Grace period for each owned sink to confirm close, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl OutputConfig {
    /// Wraps a script config with no output resources.
    pub fn new(script: ScriptConfig) -> Self {
        Self {
            script,
            output_res: Vec::new(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }

    /// Sets the permitted output resources.
    pub fn with_output_res<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_res = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the sink close grace period.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_secs = timeout.as_secs();
        self
    }

    /// Sink close grace period.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::new(ScriptConfig::default())
    }
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

/// Safety limits applied to every script engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    /// Maximum operations per execution (0 = unlimited)
    pub max_operations: u64,

    /// Maximum function call nesting
    pub max_call_levels: usize,

    /// Maximum expression nesting at global level
    pub max_expr_depth: usize,

    /// Maximum expression nesting inside functions
    pub max_function_expr_depth: usize,

    /// Maximum string length
    pub max_string_size: usize,

    /// Maximum array length
    pub max_array_size: usize,

    /// Maximum object map size
    pub max_map_size: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_operations: 100_000,
            max_call_levels: 16,
            max_expr_depth: 64,
            max_function_expr_depth: 64,
            max_string_size: 1_000_000,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_with_code() {
        let config = ScriptConfig::with_code("setMeta(\"a\", \"b\");");
        assert!(config.inline_code().is_some());
        assert!(config.script_file().is_none());
    }

    #[test]
    fn test_empty_strings_count_as_unset() {
        let config = ScriptConfig {
            code: Some(String::new()),
            file: Some(String::new()),
            ..ScriptConfig::default()
        };
        assert!(config.inline_code().is_none());
        assert!(config.script_file().is_none());
    }

    #[test]
    fn test_processor_config_yaml() {
        let yaml = r#"
code: 'setMeta("k", "v");'
cache_res: [primary, secondary]
registry_global_folders: [./modules]
limits:
  max_operations: 5000
"#;
        let config: ScriptConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cache_res, vec!["primary", "secondary"]);
        assert_eq!(config.registry_global_folders, vec!["./modules"]);
        assert_eq!(config.limits.max_operations, 5000);
        assert_eq!(config.limits.max_call_levels, 16);
    }

    #[test]
    fn test_output_config_yaml_flattens_script() {
        let yaml = r#"
file: ./script.rhai
cache_res: [memo]
output_res: [archive, alerts]
"#;
        let config: OutputConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.script.script_file(), Some("./script.rhai"));
        assert_eq!(config.script.cache_res, vec!["memo"]);
        assert_eq!(config.output_res, vec!["archive", "alerts"]);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_serde_json() {
        let config = OutputConfig::new(ScriptConfig::with_code("1").with_cache_res(["c"]))
            .with_output_res(["out"])
            .with_shutdown_timeout(Duration::from_secs(2));

        let json = serde_json::to_string(&config).unwrap();
        let parsed: OutputConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
