//! Lint configuration.
//!
//! The engine consumes an already-parsed [`LintConfig`]. The loaders here
//! (`from_file`, `discover`) are the thin YAML/JSON layer the CLI uses.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::ignore::{RulePattern, ScopedPattern};

/// Default config file names, searched in order.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &[
    ".layerlint.yaml",
    ".layerlint.yml",
    ".layerlint.json",
    "layerlint.yaml",
];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LintConfig {
    /// Discovery namespaces; empty means every built-in rule.
    pub namespaces: Vec<String>,
    /// Options keyed by rule id or rule-family prefix (`"*"` for all rules).
    pub rules: BTreeMap<String, Value>,
    /// Repo, directory and file level ignore directives.
    pub ignore: Vec<IgnoreEntry>,
    /// Glob patterns (relative to the project root) excluded from traversal.
    pub exclude: Vec<String>,
    pub parallel: ParallelConfig,
    pub cache: CacheConfig,
}

/// One configured ignore directive.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct IgnoreEntry {
    /// Rule pattern; a leading `!` re-enables the rule at this scope.
    pub rule: String,
    /// File or directory the directive governs; absent for repo scope.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl IgnoreEntry {
    pub fn repo(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            path: None,
            reason: None,
        }
    }

    pub fn at(rule: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            path: Some(path.into()),
            reason: None,
        }
    }
}

/// Parallel dispatch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
    pub workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Cross-file store persistence settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Persist the store between runs (default: true).
    pub enabled: bool,
    /// Override the cache directory (default: the user cache dir).
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl LintConfig {
    /// Load a config file, choosing the parser by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // An empty YAML document deserializes to unit, not a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Find a default config file in `dir`.
    pub fn discover<P: AsRef<Path>>(dir: P) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.as_ref().join(name))
            .find(|p| p.is_file())
    }

    /// Validate everything that would otherwise fail mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in self.rules.keys() {
            RulePattern::parse(key)?;
        }
        for (key, value) in &self.rules {
            if !value.is_object() && !value.is_null() {
                return Err(ConfigError::InvalidRuleOptions { key: key.clone() });
            }
        }
        for entry in &self.ignore {
            ScopedPattern::parse(&entry.rule)?;
        }
        for ns in &self.namespaces {
            RulePattern::parse(ns)?;
        }
        self.exclude_matcher()?;
        if self.parallel.workers == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        Ok(())
    }

    /// Compile the `exclude` globs.
    pub fn exclude_matcher(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern).map_err(|e| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| ConfigError::InvalidGlob {
            pattern: self.exclude.join(", "),
            reason: e.to_string(),
        })
    }

    /// Options for a rule, merged from the broadest matching key to the
    /// exact rule id.
    pub fn config_for(&self, rule_id: &str) -> RuleOptions {
        let mut matching: Vec<(usize, &Map<String, Value>)> = self
            .rules
            .iter()
            .filter_map(|(key, value)| {
                let pattern = RulePattern::parse(key).ok()?;
                if !pattern.matches(rule_id) {
                    return None;
                }
                value.as_object().map(|obj| (pattern.specificity(), obj))
            })
            .collect();
        matching.sort_by_key(|(specificity, _)| *specificity);

        let mut merged = Map::new();
        for (_, obj) in matching {
            for (k, v) in obj {
                merged.insert(k.clone(), v.clone());
            }
        }
        RuleOptions(merged)
    }

    /// Whether a rule is enabled (`enabled: false` turns it off).
    pub fn is_rule_enabled(&self, rule_id: &str) -> bool {
        self.config_for(rule_id).get_bool("enabled", true)
    }
}

/// Opaque per-rule options map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleOptions(pub Map<String, Value>);

impl RuleOptions {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Stable fingerprint of the options, used to invalidate cached
    /// check output when configuration changes.
    pub fn fingerprint(&self) -> String {
        let text = serde_json::to_string(&self.0).unwrap_or_default();
        let seed = format!("{}\u{1f}{}", env!("CARGO_PKG_VERSION"), text);
        format!("{:016x}", xxhash_rust::xxh3::xxh3_64(seed.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
rules:
  nesting:
    max_depth: 3
  nesting.excessive-depth:
    max_depth: 5
    enabled: true
  dry:
    enabled: false
ignore:
  - rule: "magic"
  - rule: "nesting"
    path: "src/legacy"
exclude: ["**/node_modules/**"]
parallel:
  enabled: true
  workers: 2
"#;
        let config = LintConfig::from_yaml_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.ignore.len(), 2);
        assert_eq!(config.ignore[1].path.as_deref(), Some("src/legacy"));
        assert!(config.parallel.enabled);
        assert_eq!(config.parallel.workers, 2);
        assert!(config.cache.enabled);

        // Exact id overrides the family prefix.
        let opts = config.config_for("nesting.excessive-depth");
        assert_eq!(opts.get_usize("max_depth", 0), 5);

        assert!(!config.is_rule_enabled("dry.duplicate-code"));
        assert!(config.is_rule_enabled("stringly-typed.repeated-validation"));
    }

    #[test]
    fn test_prefix_must_align_on_segments() {
        let config = LintConfig::from_yaml_str("rules:\n  nest:\n    max_depth: 1\n").unwrap();
        assert!(config.config_for("nesting.excessive-depth").0.is_empty());
    }

    #[test]
    fn test_parse_json_config() {
        let json = r#"{"rules": {"*": {"min_occurrences": 3}}, "cache": {"enabled": false}}"#;
        let config = LintConfig::from_json_str(json).unwrap();
        assert!(!config.cache.enabled);
        assert_eq!(
            config
                .config_for("dry.duplicate-code")
                .get_usize("min_occurrences", 2),
            3
        );
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = LintConfig::from_yaml_str("  \n").unwrap();
        assert!(config.rules.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let config = LintConfig {
            exclude: vec!["src/[".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGlob { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_rule_pattern() {
        let config = LintConfig {
            ignore: vec![IgnoreEntry::repo("nesting..depth")],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRulePattern { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_non_mapping_options() {
        let config = LintConfig::from_yaml_str("rules:\n  nesting: 4\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRuleOptions { .. })
        ));
    }

    #[test]
    fn test_fingerprint_tracks_options() {
        let a = LintConfig::from_yaml_str("rules:\n  dry:\n    min_lines: 4\n").unwrap();
        let b = LintConfig::from_yaml_str("rules:\n  dry:\n    min_lines: 5\n").unwrap();
        let fa = a.config_for("dry.duplicate-code").fingerprint();
        let fb = b.config_for("dry.duplicate-code").fingerprint();
        assert_ne!(fa, fb);
        assert_eq!(fa, a.config_for("dry.duplicate-code").fingerprint());
    }
}
