//! Site registry configuration
//!
//! Maps domain patterns (exact hostnames or `*.base` wildcards) to per-site
//! interception settings. The registry is a point-in-time snapshot of the
//! synchronized store: callers re-load it on every change notification and
//! re-resolve the current hostname against it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Per-site interception settings, keyed by domain pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub selectors: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

/// Domain pattern → site config mapping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteRegistry {
    #[serde(default)]
    pub sites: HashMap<String, SiteConfig>,
}

/// True iff `hostname` is `base` itself or a subdomain of it.
/// Plain suffix containment is not enough: "evilbase.com" must not
/// match "*.base.com".
fn wildcard_matches(hostname: &str, base: &str) -> bool {
    hostname == base || hostname.strip_suffix(base).is_some_and(|rest| rest.ends_with('.'))
}

impl SiteRegistry {
    /// Resolve the site config applicable to `hostname`.
    ///
    /// An exact key match wins unconditionally. Otherwise the `*.base`
    /// wildcard with the longest matching base domain wins, which keeps the
    /// result deterministic when several wildcards cover the same hostname.
    /// Hostnames are compared exactly as given; no normalization.
    pub fn resolve(&self, hostname: &str) -> Option<&SiteConfig> {
        if hostname.is_empty() {
            return None;
        }
        if let Some(site) = self.sites.get(hostname) {
            debug!(domain = %hostname, site = %site.name, "Resolved site config by exact match");
            return Some(site);
        }

        self.sites
            .iter()
            .filter_map(|(pattern, site)| {
                let base = pattern.strip_prefix("*.")?;
                wildcard_matches(hostname, base).then_some((base, site))
            })
            .max_by_key(|(base, _)| base.len())
            .map(|(base, site)| {
                debug!(domain = %hostname, base = %base, site = %site.name, "Resolved site config by wildcard match");
                site
            })
    }

    /// Replace the registry contents with an incoming config document,
    /// keeping each domain's previously chosen `enabled` state. Domains
    /// absent from the incoming document are dropped.
    pub fn replace_sites(&mut self, incoming: HashMap<String, SiteConfig>) {
        let mut sites = incoming;
        for (domain, site) in sites.iter_mut() {
            if let Some(existing) = self.sites.get(domain) {
                site.enabled = existing.enabled;
            }
        }
        info!(count = sites.len(), "Replaced site registry contents");
        self.sites = sites;
    }

    /// Default registry file location under the user config dir
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    /// Load the registry from a JSON file, creating a default one if missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Registry file not found, creating default registry at {:?}", path);
            let registry = SiteRegistry::default_sites();
            registry.save(path)?;
            return Ok(registry);
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read site registry from {path:?}"))?;

        let registry: SiteRegistry = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON from {path:?}"))?;

        info!(count = registry.sites.len(), "Loaded site registry");
        Ok(registry)
    }

    /// Save the registry as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {parent:?}"))?;
        }

        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize site registry to JSON")?;

        fs::write(path, json)
            .with_context(|| format!("Failed to write site registry to {path:?}"))?;

        info!("Saved site registry to {:?}", path);
        Ok(())
    }

    /// Built-in registry covering well-known chat sites
    pub fn default_sites() -> Self {
        let mut sites = HashMap::new();
        sites.insert(
            "chatgpt.com".to_string(),
            SiteConfig {
                name: "ChatGPT".to_string(),
                enabled: true,
                selectors: vec!["#prompt-textarea".to_string()],
            },
        );
        sites.insert(
            "claude.ai".to_string(),
            SiteConfig {
                name: "Claude".to_string(),
                enabled: true,
                selectors: vec!["div[contenteditable=true]".to_string()],
            },
        );
        sites.insert(
            "*.slack.com".to_string(),
            SiteConfig {
                name: "Slack".to_string(),
                enabled: true,
                selectors: vec![".ql-editor".to_string()],
            },
        );
        sites.insert(
            "discord.com".to_string(),
            SiteConfig {
                name: "Discord".to_string(),
                enabled: true,
                selectors: vec!["div[role=textbox]".to_string()],
            },
        );
        sites.insert(
            "gemini.google.com".to_string(),
            SiteConfig {
                name: "Gemini".to_string(),
                enabled: true,
                selectors: vec!["div.ql-editor".to_string()],
            },
        );
        SiteRegistry { sites }
    }
}
