//! Site configuration (folio.yml / folio.toml)

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Main site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    // Site
    pub title: String,
    pub description: String,
    pub author: String,

    // URL
    pub url: String,
    pub root: String,

    // Languages
    /// Language assigned to files without a language suffix
    pub language: String,
    /// Accepted language suffixes; empty means any well-formed code
    #[serde(default)]
    pub languages: Vec<String>,
    /// IANA zone used for front-matter dates without an offset
    pub timezone: String,

    // Directory
    pub content_dir: String,
    pub public_dir: String,
    pub tag_dir: String,
    pub category_dir: String,
    #[serde(default)]
    pub ignore: Vec<String>,

    // Writing
    /// Short-tag names rendered as callout containers
    pub callouts: Vec<String>,
    #[serde(default)]
    pub highlight: HighlightConfig,

    // Pagination
    pub per_page: usize,

    // Store any additional fields
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Folio".to_string(),
            description: String::new(),
            author: String::new(),

            url: "http://example.com".to_string(),
            root: "/".to_string(),

            language: "en".to_string(),
            languages: Vec::new(),
            timezone: "UTC".to_string(),

            content_dir: "content".to_string(),
            public_dir: "public".to_string(),
            tag_dir: "tags".to_string(),
            category_dir: "categories".to_string(),
            ignore: Vec::new(),

            callouts: ["quote", "note", "tip", "warning"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            highlight: HighlightConfig::default(),

            per_page: 10,
            extra: HashMap::new(),
        }
    }
}

impl SiteConfig {
    /// Load configuration from a file, choosing the format by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;

        let config: SiteConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {:?}", path))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML in {:?}", path))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Find the config file in a site directory, preferring YAML
    pub fn locate<P: AsRef<Path>>(base_dir: P) -> Option<std::path::PathBuf> {
        ["folio.yml", "folio.yaml", "folio.toml"]
            .iter()
            .map(|name| base_dir.as_ref().join(name))
            .find(|p| p.exists())
    }

    fn validate(&self) -> Result<()> {
        if self.per_page == 0 {
            anyhow::bail!("per_page must be greater than zero");
        }
        self.tz()?;
        for pattern in &self.ignore {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid ignore pattern {:?}", pattern))?;
        }
        Ok(())
    }

    /// Parsed `timezone`
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone {:?}: {}", self.timezone, e))
    }

    /// Compiled `ignore` patterns; invalid ones were rejected at load time
    pub fn ignore_patterns(&self) -> Vec<glob::Pattern> {
        self.ignore
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect()
    }

    /// Whether a language is the one unsuffixed files belong to
    pub fn is_default_language(&self, lang: &str) -> bool {
        self.language.eq_ignore_ascii_case(lang)
    }
}

/// Code highlighting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HighlightConfig {
    pub theme: String,
    pub line_numbers: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            theme: "base16-ocean.dark".to_string(),
            line_numbers: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SiteConfig::default();
        assert_eq!(config.title, "Folio");
        assert_eq!(config.language, "en");
        assert_eq!(config.per_page, 10);
        assert!(config.callouts.contains(&"quote".to_string()));
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
title: Database Notes
language: pt-br
languages: [en, pt-br]
timezone: America/Sao_Paulo
per_page: 5
analytics: xyz
"#;
        let config: SiteConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.title, "Database Notes");
        assert_eq!(config.language, "pt-br");
        assert_eq!(config.languages, vec!["en", "pt-br"]);
        assert_eq!(config.per_page, 5);
        assert_eq!(config.tz().unwrap(), chrono_tz::America::Sao_Paulo);
        assert!(config.extra.contains_key("analytics"));
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        fs::write(
            &path,
            "title = \"Notes\"\nignore = [\"drafts/**\"]\n\n[highlight]\nline_numbers = true\n",
        )
        .unwrap();

        assert_eq!(SiteConfig::locate(dir.path()), Some(path.clone()));
        let config = SiteConfig::load(&path).unwrap();
        assert_eq!(config.title, "Notes");
        assert!(config.highlight.line_numbers);
        assert_eq!(config.ignore_patterns().len(), 1);
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.yml");
        fs::write(&path, "timezone: Mars/Olympus\n").unwrap();
        assert!(SiteConfig::load(&path).is_err());
    }
}
