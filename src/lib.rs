//! folio: a static publishing pipeline for multilingual Markdown posts
//!
//! Posts are Markdown files with a YAML header, grouped into language
//! variants by slug, transformed into document trees and assembled into a
//! site index that the generator writes out as HTML with Tera templates.

pub mod commands;
pub mod config;
pub mod content;
pub mod generator;
pub mod helpers;
pub mod site;
pub mod templates;

use anyhow::Result;
use std::path::{Path, PathBuf};

use commands::build::BuildReport;

/// A site rooted at a directory, with its configuration
#[derive(Debug, Clone)]
pub struct Site {
    /// Site configuration
    pub config: config::SiteConfig,
    /// Base directory
    pub base_dir: PathBuf,
    /// Config file the configuration came from, if any
    pub config_path: Option<PathBuf>,
    /// Content (posts) directory
    pub content_dir: PathBuf,
    /// Public (output) directory
    pub public_dir: PathBuf,
}

impl Site {
    /// Open a site directory, reading `folio.yml`/`folio.toml` when present
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let config_path = config::SiteConfig::locate(base_dir);

        let config = match &config_path {
            Some(path) => config::SiteConfig::load(path)?,
            None => {
                tracing::debug!("No config file in {:?}, using defaults", base_dir);
                config::SiteConfig::default()
            }
        };

        let mut site = Self::with_config(base_dir, config);
        site.config_path = config_path;
        Ok(site)
    }

    /// Site with an explicit configuration
    pub fn with_config<P: AsRef<Path>>(base_dir: P, config: config::SiteConfig) -> Self {
        let base_dir = base_dir.as_ref().to_path_buf();
        let content_dir = base_dir.join(&config.content_dir);
        let public_dir = base_dir.join(&config.public_dir);

        Self {
            config,
            base_dir,
            config_path: None,
            content_dir,
            public_dir,
        }
    }

    /// Load, assemble and write the site
    pub fn build(&self) -> Result<BuildReport> {
        commands::build::run(self)
    }

    /// Load and assemble without writing anything
    pub fn check(&self) -> Result<BuildReport> {
        commands::check::run(self)
    }

    /// Remove the public directory
    pub fn clean(&self) -> Result<()> {
        commands::clean::run(self)
    }

    /// Scaffold a new post, returning the created file
    pub fn new_post(&self, title: &str, lang: Option<&str>) -> Result<PathBuf> {
        commands::new::create_post(self, title, lang)
    }
}
