use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug};

use crate::probe::target::TargetSpec;

/// Class-name keywords that mark a block as a repeated content item
pub const DEFAULT_ITEM_CLASS_KEYWORDS: &[&str] = &["post", "item", "entry", "content", "documento", "normativa"];

/// Class-name tokens that mark an element as carrying a date
pub const DEFAULT_DATE_CLASS_TOKENS: &[&str] = &["date", "fecha"];

/// Href tokens that disqualify a same-site link from the internal link sample
pub const DEFAULT_INTERNAL_LINK_SKIP: &[&str] = &["wp-content", "wp-admin", "categoria-normativa"];

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProbeConfig {
    pub targets: Vec<TargetSpec>,
    #[serde(default)]
    pub request: RequestSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
}

/// Request layer settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RequestSettings {
    pub timeout_secs: u64,
    pub pacing_delay_ms: (u64, u64), // Min and max delay before each fetch in milliseconds
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub proxy: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// Content validation settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ValidationSettings {
    pub min_body_bytes: usize,
}

/// Structure discovery settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DiscoverySettings {
    pub item_class_keywords: Vec<String>,
    pub date_class_tokens: Vec<String>,
    pub pagination_class_token: String,
    pub pdf_marker: String,
    pub internal_link_skip: Vec<String>,
    pub sample_markup_chars: usize,
    pub link_text_chars: usize,
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for RequestSettings {
    fn default() -> Self {
        // Accept-Encoding is left to reqwest, which only decodes bodies it negotiated itself
        let headers = [
            ("User-Agent", DEFAULT_USER_AGENT),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
            ("Accept-Language", "es-CL,es;q=0.9,en-US;q=0.8,en;q=0.7"),
            ("Cache-Control", "max-age=0"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Upgrade-Insecure-Requests", "1"),
            ("DNT", "1"),
            ("Connection", "keep-alive"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            timeout_secs: 30,
            pacing_delay_ms: (2000, 5000),
            follow_redirects: true,
            max_redirects: 10,
            proxy: None,
            headers,
        }
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self { min_body_bytes: 1000 }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            item_class_keywords: to_strings(DEFAULT_ITEM_CLASS_KEYWORDS),
            date_class_tokens: to_strings(DEFAULT_DATE_CLASS_TOKENS),
            pagination_class_token: "pag".to_string(),
            pdf_marker: ".pdf".to_string(),
            internal_link_skip: to_strings(DEFAULT_INTERNAL_LINK_SKIP),
            sample_markup_chars: 800,
            link_text_chars: 80,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        let targets = ["circulares", "oficios", "dictamenes", "jurisprudencia", "resoluciones"]
            .into_iter()
            .map(|category| TargetSpec {
                category: category.to_string(),
                url: format!("https://www.supereduc.cl/categoria-normativa/{}/", category),
            })
            .collect();

        Self {
            targets,
            request: RequestSettings::default(),
            validation: ValidationSettings::default(),
            discovery: DiscoverySettings::default(),
        }
    }
}

impl ProbeConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        match directories::ProjectDirs::from("com", "structure-probe", "structure-probe") {
            Some(proj_dirs) => proj_dirs.config_dir().to_path_buf(),
            None => PathBuf::from("./config"),
        }
    }

    /// Path of the default configuration file
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the default configuration file, or the built-in defaults when there is none
    pub fn load_default() -> Result<Self> {
        Self::load_or_default(&Self::default_path())
    }

    /// Load `path` if it exists. Nothing is written; `config --init` creates the file.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            info!("No configuration at {}, using built-in defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load an explicit file if given, the default configuration otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        Self::from_yaml(&contents)
            .context(format!("Invalid configuration file: {}", path.display()))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the probe cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.category.trim().is_empty() {
                anyhow::bail!("Target with url '{}' has an empty category", target.url);
            }
            if !seen.insert(target.category.as_str()) {
                anyhow::bail!("Duplicate target category: {}", target.category);
            }
            url::Url::parse(&target.url)
                .context(format!("Invalid url for category '{}': {}", target.category, target.url))?;
        }

        let (min, max) = self.request.pacing_delay_ms;
        if min > max {
            anyhow::bail!("pacing_delay_ms lower bound {} exceeds upper bound {}", min, max);
        }

        if self.request.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than zero");
        }

        // An empty token would match every element or every link
        if self.discovery.pagination_class_token.is_empty() || self.discovery.pdf_marker.is_empty() {
            anyhow::bail!("pagination_class_token and pdf_marker must not be empty");
        }

        Ok(())
    }

    /// Restrict the targets to the given categories, keeping configuration order
    pub fn select_targets(&self, only: &[String]) -> Result<Vec<TargetSpec>> {
        if only.is_empty() {
            return Ok(self.targets.clone());
        }

        for category in only {
            if !self.targets.iter().any(|t| &t.category == category) {
                anyhow::bail!("Unknown category: {}", category);
            }
        }

        Ok(self.targets.iter()
            .filter(|t| only.contains(&t.category))
            .cloned()
            .collect())
    }

    /// Save the configuration as the default
    pub fn save_as_default(&self) -> Result<PathBuf> {
        let config_path = Self::default_path();
        self.save_to_file(&config_path)?;
        Ok(config_path)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ProbeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.targets.len(), 5);
        assert_eq!(config.targets[0].category, "circulares");
        assert_eq!(config.targets[4].url, "https://www.supereduc.cl/categoria-normativa/resoluciones/");
    }

    #[test]
    fn yaml_keeps_target_order_and_fills_defaults() {
        let yaml = r#"
targets:
  - category: zeta
    url: https://example.com/z/
  - category: alfa
    url: https://example.com/a/
request:
  timeout_secs: 10
"#;
        let config = ProbeConfig::from_yaml(yaml).unwrap();
        let categories: Vec<_> = config.targets.iter().map(|t| t.category.as_str()).collect();
        assert_eq!(categories, vec!["zeta", "alfa"]);
        assert_eq!(config.request.timeout_secs, 10);
        assert_eq!(config.request.pacing_delay_ms, (2000, 5000));
        assert!(config.request.headers.contains_key("DNT"));
        assert_eq!(config.validation.min_body_bytes, 1000);
        assert_eq!(config.discovery.pagination_class_token, "pag");
    }

    #[test]
    fn duplicate_categories_are_rejected() {
        let yaml = r#"
targets:
  - category: oficios
    url: https://example.com/a/
  - category: oficios
    url: https://example.com/b/
"#;
        let err = ProbeConfig::from_yaml(yaml).unwrap_err();
        assert!(format!("{:#}", err).contains("Duplicate target category"));
    }

    #[test]
    fn inverted_pacing_bounds_are_rejected() {
        let mut config = ProbeConfig::default();
        config.request.pacing_delay_ms = (5000, 2000);
        assert!(config.validate().is_err());
    }

    #[test]
    fn select_targets_filters_in_config_order() {
        let config = ProbeConfig::default();
        let only = vec!["resoluciones".to_string(), "oficios".to_string()];
        let selected = config.select_targets(&only).unwrap();
        let categories: Vec<_> = selected.iter().map(|t| t.category.as_str()).collect();
        assert_eq!(categories, vec!["oficios", "resoluciones"]);

        assert!(config.select_targets(&["leyes".to_string()]).is_err());
        assert_eq!(config.select_targets(&[]).unwrap().len(), 5);
    }

    #[test]
    fn missing_file_yields_defaults_without_writing() {
        let dir = std::env::temp_dir().join(format!("structure-probe-{}", uuid::Uuid::new_v4()));
        let path = dir.join("default.yaml");

        let config = ProbeConfig::load_or_default(&path).unwrap();
        assert_eq!(config.targets, ProbeConfig::default().targets);
        assert!(!path.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn empty_discovery_tokens_are_rejected() {
        let mut config = ProbeConfig::default();
        config.discovery.pagination_class_token.clear();
        assert!(config.validate().is_err());

        let mut config = ProbeConfig::default();
        config.discovery.pdf_marker.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_a_file() {
        let path = std::env::temp_dir()
            .join(format!("structure-probe-{}", uuid::Uuid::new_v4()))
            .join("probe.yaml");
        let config = ProbeConfig::default();
        config.save_to_file(&path).unwrap();

        let loaded = ProbeConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.targets, config.targets);
        assert_eq!(loaded.discovery.item_class_keywords, config.discovery.item_class_keywords);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
