//! Configuration: `docheal.toml` or `docheal.yaml`, validated before any file is touched.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::blocks::{DEFAULT_LINK_PATTERN, DEFAULT_MAX_FILE_SIZE};
use crate::bucket::VALID_BAND_COUNTS;
use crate::confidence::{ActionThresholds, ConfidenceWeights};
use crate::error::ConfigError;

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "docheal.toml";

pub const DUPLICATES_HEALER: &str = "resolve_duplicates";
pub const LINKS_HEALER: &str = "fix_broken_links";
pub const STALENESS_HEALER: &str = "detect_staleness";

/// Every healer name the registry can build, in default order.
pub const KNOWN_HEALERS: [&str; 3] = [LINKS_HEALER, STALENESS_HEALER, DUPLICATES_HEALER];

/// Cap on timestamp plus deprecated patterns.
pub const MAX_STALENESS_PATTERNS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub confidence: ConfidenceConfig,
    pub healers: HealersConfig,
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
    pub git: GitConfig,
    pub reporting: ReportingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub doc_root: PathBuf,
    /// Directory names skipped anywhere in the tree
    pub excluded_dirs: Vec<String>,
    /// Extra glob patterns to skip
    pub exclude: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            doc_root: PathBuf::from("docs"),
            excluded_dirs: [
                ".git",
                "node_modules",
                "venv",
                ".venv",
                "__pycache__",
                "target",
                "dist",
                "build",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub auto_commit_threshold: f64,
    pub auto_stage_threshold: f64,
    /// Minimum confidence for `heal`; falls back to `auto_commit_threshold`
    pub min_confidence: Option<f64>,
    pub weights: ConfidenceWeights,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        let thresholds = ActionThresholds::default();
        Self {
            auto_commit_threshold: thresholds.auto_commit,
            auto_stage_threshold: thresholds.auto_stage,
            min_confidence: None,
            weights: ConfidenceWeights::default(),
        }
    }
}

impl ConfidenceConfig {
    pub fn thresholds(&self) -> ActionThresholds {
        ActionThresholds {
            auto_commit: self.auto_commit_threshold,
            auto_stage: self.auto_stage_threshold,
        }
    }

    pub fn effective_min_confidence(&self) -> f64 {
        self.min_confidence.unwrap_or(self.auto_commit_threshold)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct HealersConfig {
    pub resolve_duplicates: DuplicatesConfig,
    pub fix_broken_links: LinksConfig,
    pub detect_staleness: StalenessConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DuplicatesConfig {
    pub enabled: bool,
    pub similarity_threshold: f64,
    pub min_block_size: usize,
    pub max_hamming_distance: u32,
    pub num_bands: u32,
    pub max_blocks: usize,
    pub max_file_size: u64,
    /// Path substrings, most canonical first
    pub hierarchy_rules: Vec<String>,
    pub file_extensions: Vec<String>,
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.80,
            min_block_size: 100,
            max_hamming_distance: 6,
            num_bands: 8,
            max_blocks: 100_000,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            hierarchy_rules: vec![
                "README.md".to_string(),
                "docs/index.md".to_string(),
                "docs/".to_string(),
            ],
            file_extensions: vec![".md".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinksConfig {
    pub enabled: bool,
    pub fuzzy_threshold: f64,
    /// Extensions of files that may be link targets
    pub file_extensions: Vec<String>,
    pub historical_success_rate: f64,
    pub link_pattern: String,
    /// Fallback scan runs only below this many indexed candidates
    pub min_indexed_candidates: usize,
    pub fallback_scan_limit: usize,
    pub max_links_per_file: usize,
    pub max_file_size: u64,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fuzzy_threshold: 0.5,
            file_extensions: [".md", ".py", ".json", ".sh", ".ts", ".tsx", ".js"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            historical_success_rate: 0.92,
            link_pattern: DEFAULT_LINK_PATTERN.to_string(),
            min_indexed_candidates: 10,
            fallback_scan_limit: 1000,
            max_links_per_file: 5000,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StalenessConfig {
    pub enabled: bool,
    /// Days a stamp may trail the file's last commit before it is rewritten
    pub threshold_days: u32,
    /// Regexes whose first capture group starts with a `YYYY-MM-DD` date
    pub timestamp_patterns: Vec<String>,
    pub deprecated_patterns: Vec<DeprecatedPattern>,
    pub file_extensions: Vec<String>,
    pub max_file_size: u64,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        let deprecated = |pattern: &str, message: &str, confidence: f64, replacement: &str| DeprecatedPattern {
            pattern: pattern.to_string(),
            message: message.to_string(),
            confidence,
            replacement: Some(replacement.to_string()),
        };
        Self {
            enabled: true,
            threshold_days: 30,
            timestamp_patterns: [
                r"\*\*Last Updated\*\*:\s*(\d{4}-\d{2}-\d{2})",
                r"Last updated:\s*(\d{4}-\d{2}-\d{2})",
                r"_Last modified:\s*(\d{4}-\d{2}-\d{2})_",
                r"Last Updated:\s*(\d{4}-\d{2}-\d{2})",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            deprecated_patterns: vec![
                deprecated(
                    r"docker-compose\s+",
                    "Deprecated `docker-compose`, use `docker compose` (Compose V2)",
                    0.95,
                    "docker compose ",
                ),
                deprecated(r"\bpython2\s+", "Python 2 reference, use `python3`", 0.85, "python3 "),
                deprecated(
                    r"git\s+checkout\s+-b\s+",
                    "Old branch creation, use `git switch -c`",
                    0.80,
                    "git switch -c ",
                ),
                deprecated(r"\bvirtualenv\s+", "Legacy virtualenv, use `python3 -m venv`", 0.85, "python3 -m venv "),
                deprecated(
                    r"\bsudo\s+pip\s+",
                    "`sudo pip` installs system-wide, use a virtual environment",
                    0.95,
                    "pip ",
                ),
            ],
            file_extensions: vec![".md".to_string()],
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

/// A command form that should no longer appear in code samples.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeprecatedPattern {
    pub pattern: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_deprecated_confidence")]
    pub confidence: f64,
    /// Text that replaces the match; without it the hit is only reported
    #[serde(default)]
    pub replacement: Option<String>,
}

fn default_deprecated_confidence() -> f64 {
    0.85
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl_seconds: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub healer_order: Vec<String>,
    pub parallel: bool,
    pub continue_on_error: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            healer_order: KNOWN_HEALERS.iter().map(|s| s.to_string()).collect(),
            parallel: false,
            continue_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GitConfig {
    pub enabled: bool,
    pub commit_message: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            commit_message: "docs: automated healing".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportingConfig {
    pub output_dir: PathBuf,
    pub format: ReportFormat,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(".docheal/reports"),
            format: ReportFormat::Markdown,
        }
    }
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub min_confidence: Option<f64>,
    pub parallel: Option<bool>,
    /// Run only this healer
    pub only: Option<String>,
    /// Healers to leave out
    pub skip: Vec<String>,
}

impl Config {
    /// Load a config file, picking the parser from its extension, then validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let mut config = match ext.as_str() {
            "toml" => Self::from_toml(&content),
            "yaml" | "yml" => Self::from_yaml(&content),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
        .map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `docheal.toml` when present, else compiled defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    let mut config = Self::default();
                    config.normalize();
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<string>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<config>".to_string(),
            message: e.to_string(),
        })
    }

    /// Lower-case extensions and give each a leading dot.
    pub fn normalize(&mut self) {
        normalize_extensions(&mut self.healers.resolve_duplicates.file_extensions);
        normalize_extensions(&mut self.healers.fix_broken_links.file_extensions);
        normalize_extensions(&mut self.healers.detect_staleness.file_extensions);
    }

    /// Apply command-line overrides. Validation runs again afterwards.
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) -> Result<(), ConfigError> {
        if let Some(min) = overrides.min_confidence {
            self.confidence.min_confidence = Some(min);
        }
        if let Some(parallel) = overrides.parallel {
            self.orchestrator.parallel = parallel;
        }
        if let Some(only) = &overrides.only {
            self.orchestrator.healer_order.retain(|name| name == only);
            if self.orchestrator.healer_order.is_empty() {
                self.orchestrator.healer_order.push(only.clone());
            }
        }
        self.orchestrator
            .healer_order
            .retain(|name| !overrides.skip.contains(name));
        self.validate().map(|_| ())
    }

    /// Check every value. Returns non-fatal warnings, or every error found at once.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let unit = |errors: &mut Vec<String>, key: &str, value: f64| {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("[{key}] must be between 0.0 and 1.0, got {value}"));
            }
        };
        let positive = |errors: &mut Vec<String>, key: &str, value: u64| {
            if value == 0 {
                errors.push(format!("[{key}] must be greater than 0"));
            }
        };

        // project
        if self
            .project
            .doc_root
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            errors.push(format!(
                "[project.doc_root] must not contain '..', got {}",
                self.project.doc_root.display()
            ));
        }
        for pattern in &self.project.exclude {
            if let Err(e) = globset::Glob::new(pattern) {
                errors.push(format!("[project.exclude] invalid glob '{pattern}': {e}"));
            }
        }

        // confidence
        let c = &self.confidence;
        unit(&mut errors, "confidence.auto_commit_threshold", c.auto_commit_threshold);
        unit(&mut errors, "confidence.auto_stage_threshold", c.auto_stage_threshold);
        if let Some(min) = c.min_confidence {
            unit(&mut errors, "confidence.min_confidence", min);
        }
        if let Err(e) = c.weights.validate() {
            errors.push(format!("[confidence.weights] {e}"));
        }
        if c.auto_commit_threshold < c.auto_stage_threshold {
            warnings.push(format!(
                "[confidence] auto_commit_threshold ({}) is below auto_stage_threshold ({}); every staged change will also be committed",
                c.auto_commit_threshold, c.auto_stage_threshold
            ));
        }

        // resolve_duplicates
        let d = &self.healers.resolve_duplicates;
        unit(&mut errors, "healers.resolve_duplicates.similarity_threshold", d.similarity_threshold);
        positive(&mut errors, "healers.resolve_duplicates.min_block_size", d.min_block_size as u64);
        positive(&mut errors, "healers.resolve_duplicates.max_blocks", d.max_blocks as u64);
        positive(&mut errors, "healers.resolve_duplicates.max_file_size", d.max_file_size);
        if !VALID_BAND_COUNTS.contains(&d.num_bands) {
            errors.push(format!(
                "[healers.resolve_duplicates.num_bands] must divide 64 (one of {:?}), got {}",
                VALID_BAND_COUNTS, d.num_bands
            ));
        } else if d.max_hamming_distance >= d.num_bands {
            errors.push(format!(
                "[healers.resolve_duplicates.max_hamming_distance] must be below num_bands ({}), got {}",
                d.num_bands, d.max_hamming_distance
            ));
        }
        if d.hierarchy_rules.iter().any(|r| r.trim().is_empty()) {
            errors.push("[healers.resolve_duplicates.hierarchy_rules] entries must not be empty".to_string());
        }
        if d.file_extensions.is_empty() {
            errors.push("[healers.resolve_duplicates.file_extensions] must not be empty".to_string());
        }

        // fix_broken_links
        let l = &self.healers.fix_broken_links;
        unit(&mut errors, "healers.fix_broken_links.fuzzy_threshold", l.fuzzy_threshold);
        unit(
            &mut errors,
            "healers.fix_broken_links.historical_success_rate",
            l.historical_success_rate,
        );
        positive(&mut errors, "healers.fix_broken_links.fallback_scan_limit", l.fallback_scan_limit as u64);
        positive(&mut errors, "healers.fix_broken_links.max_links_per_file", l.max_links_per_file as u64);
        positive(&mut errors, "healers.fix_broken_links.max_file_size", l.max_file_size);
        match Regex::new(&l.link_pattern) {
            Ok(re) if re.captures_len() != 3 => errors.push(format!(
                "[healers.fix_broken_links.link_pattern] needs exactly 2 capture groups (text, target), got {}",
                re.captures_len() - 1
            )),
            Ok(_) => {}
            Err(e) => errors.push(format!("[healers.fix_broken_links.link_pattern] invalid regex: {e}")),
        }

        // detect_staleness
        let st = &self.healers.detect_staleness;
        positive(&mut errors, "healers.detect_staleness.max_file_size", st.max_file_size);
        if st.file_extensions.is_empty() {
            errors.push("[healers.detect_staleness.file_extensions] must not be empty".to_string());
        }
        let pattern_count = st.timestamp_patterns.len() + st.deprecated_patterns.len();
        if pattern_count > MAX_STALENESS_PATTERNS {
            errors.push(format!(
                "[healers.detect_staleness] at most {MAX_STALENESS_PATTERNS} patterns, got {pattern_count}"
            ));
        }
        for pattern in &st.timestamp_patterns {
            match Regex::new(pattern) {
                Ok(re) if re.captures_len() < 2 => errors.push(format!(
                    "[healers.detect_staleness.timestamp_patterns] '{pattern}' needs a capture group for the date"
                )),
                Ok(_) => {}
                Err(e) => errors.push(format!(
                    "[healers.detect_staleness.timestamp_patterns] invalid regex '{pattern}': {e}"
                )),
            }
        }
        for deprecated in &st.deprecated_patterns {
            if let Err(e) = Regex::new(&deprecated.pattern) {
                errors.push(format!(
                    "[healers.detect_staleness.deprecated_patterns] invalid regex '{}': {e}",
                    deprecated.pattern
                ));
            }
            unit(
                &mut errors,
                "healers.detect_staleness.deprecated_patterns.confidence",
                deprecated.confidence,
            );
        }

        // cache
        positive(&mut errors, "cache.max_entries", self.cache.max_entries);
        positive(&mut errors, "cache.ttl_seconds", self.cache.ttl_seconds);

        // orchestrator
        for name in &self.orchestrator.healer_order {
            if !KNOWN_HEALERS.contains(&name.as_str()) {
                errors.push(format!(
                    "[orchestrator.healer_order] unknown healer '{name}' (known: {})",
                    KNOWN_HEALERS.join(", ")
                ));
            }
        }

        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Directory scanned for documentation.
    pub fn doc_path(&self) -> PathBuf {
        self.project.root.join(&self.project.doc_root)
    }

    pub fn is_enabled(&self, healer: &str) -> bool {
        match healer {
            DUPLICATES_HEALER => self.healers.resolve_duplicates.enabled,
            LINKS_HEALER => self.healers.fix_broken_links.enabled,
            STALENESS_HEALER => self.healers.detect_staleness.enabled,
            _ => false,
        }
    }
}

fn normalize_extensions(extensions: &mut Vec<String>) {
    for ext in extensions.iter_mut() {
        let lower = ext.trim().to_lowercase();
        *ext = if lower.starts_with('.') {
            lower
        } else {
            format!(".{lower}")
        };
    }
    extensions.sort();
    extensions.dedup();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn invalid_keys(config: &Config) -> Vec<String> {
        match config.validate() {
            Err(ConfigError::Invalid(errors)) => errors,
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        let warnings = config.validate().unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.confidence.effective_min_confidence(), 0.90);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
[healers.resolve_duplicates]
similarity_threshold = 0.9

[orchestrator]
parallel = true
"#,
        )
        .unwrap();
        assert_eq!(config.healers.resolve_duplicates.similarity_threshold, 0.9);
        assert_eq!(config.healers.resolve_duplicates.min_block_size, 100);
        assert!(config.orchestrator.parallel);
        assert_eq!(config.confidence.weights, ConfidenceWeights::default());
    }

    #[test]
    fn test_yaml_config() {
        let config = Config::from_yaml(
            "project:\n  doc_root: documentation\nconfidence:\n  auto_commit_threshold: 0.95\nreporting:\n  format: json\n",
        )
        .unwrap();
        assert_eq!(config.project.doc_root, PathBuf::from("documentation"));
        assert_eq!(config.confidence.auto_commit_threshold, 0.95);
        assert_eq!(config.reporting.format, ReportFormat::Json);
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = Config::default();
        config.confidence.auto_stage_threshold = 1.5;
        config.healers.fix_broken_links.fuzzy_threshold = -0.1;
        config.project.doc_root = PathBuf::from("../outside");
        config.healers.resolve_duplicates.hierarchy_rules.push("  ".to_string());

        let errors = invalid_keys(&config);
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("doc_root"));
        assert!(errors.iter().any(|e| e.contains("auto_stage_threshold")));
        assert!(errors.iter().any(|e| e.contains("fuzzy_threshold")));
        assert!(errors.iter().any(|e| e.contains("hierarchy_rules")));
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut config = Config::default();
        config.confidence.weights.pattern = 0.9;
        let errors = invalid_keys(&config);
        assert!(errors[0].contains("confidence.weights"));
    }

    #[test]
    fn test_banding_must_stay_sound() {
        let mut config = Config::default();
        config.healers.resolve_duplicates.max_hamming_distance = 8;
        assert!(invalid_keys(&config)[0].contains("max_hamming_distance"));

        config.healers.resolve_duplicates.num_bands = 6;
        assert!(invalid_keys(&config)[0].contains("num_bands"));

        config.healers.resolve_duplicates.num_bands = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_link_pattern_needs_two_groups() {
        let mut config = Config::default();
        config.healers.fix_broken_links.link_pattern = r"\[[^\]]+\]\(([^)]+)\)".to_string();
        assert!(invalid_keys(&config)[0].contains("2 capture groups"));

        config.healers.fix_broken_links.link_pattern = "([".to_string();
        assert!(invalid_keys(&config)[0].contains("invalid regex"));
    }

    #[test]
    fn test_staleness_patterns_validated() {
        let mut config = Config::default();
        config.healers.detect_staleness.timestamp_patterns = vec![r"Updated: \d{4}".to_string()];
        assert!(invalid_keys(&config)[0].contains("capture group"));

        let mut config = Config::default();
        config.healers.detect_staleness.deprecated_patterns[0].pattern = "(".to_string();
        config.healers.detect_staleness.deprecated_patterns[1].confidence = 1.2;
        let errors = invalid_keys(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("invalid regex"));
        assert!(errors[1].contains("confidence"));
    }

    #[test]
    fn test_deprecated_pattern_defaults_from_toml() {
        let config = Config::from_toml(
            r#"
[[healers.detect_staleness.deprecated_patterns]]
pattern = "npm i -g "
"#,
        )
        .unwrap();
        let patterns = &config.healers.detect_staleness.deprecated_patterns;
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].confidence, 0.85);
        assert_eq!(patterns[0].replacement, None);
        assert_eq!(config.healers.detect_staleness.threshold_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_healer_rejected() {
        let mut config = Config::default();
        config.orchestrator.healer_order.push("fix_typos".to_string());
        assert!(invalid_keys(&config)[0].contains("fix_typos"));
    }

    #[test]
    fn test_inverted_thresholds_only_warn() {
        let mut config = Config::default();
        config.confidence.auto_commit_threshold = 0.7;
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_extensions_are_normalized() {
        let mut config = Config::default();
        config.healers.resolve_duplicates.file_extensions =
            vec!["MD".to_string(), ".md".to_string(), "rst".to_string()];
        config.normalize();
        assert_eq!(
            config.healers.resolve_duplicates.file_extensions,
            vec![".md".to_string(), ".rst".to_string()]
        );
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(&CliOverrides {
                min_confidence: Some(0.85),
                parallel: Some(true),
                only: None,
                skip: vec![LINKS_HEALER.to_string()],
            })
            .unwrap();
        assert_eq!(config.confidence.effective_min_confidence(), 0.85);
        assert!(config.orchestrator.parallel);
        assert_eq!(
            config.orchestrator.healer_order,
            vec![STALENESS_HEALER.to_string(), DUPLICATES_HEALER.to_string()]
        );

        let mut config = Config::default();
        let err = config.apply_overrides(&CliOverrides {
            only: Some("nope".to_string()),
            ..CliOverrides::default()
        });
        assert!(err.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docheal.toml");
        fs::write(&path, "[git]\nenabled = true\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.git.enabled);

        let bad = dir.path().join("docheal.ini");
        fs::write(&bad, "x").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::UnsupportedFormat(_))));

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[git\nenabled = ").unwrap();
        match Config::load(&broken) {
            Err(ConfigError::Parse { path, .. }) => assert!(path.ends_with("broken.toml")),
            other => panic!("expected parse error, got {other:?}"),
        }

        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = Config::default().to_toml().unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
