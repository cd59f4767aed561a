//! Default request settings, loaded from TOML.

use crate::backend::types::{BackendKind, RequestSpec};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Defaults applied to requests that do not set the option explicitly.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfig {
    /// Default User-Agent header
    pub user_agent: Option<String>,

    /// Default per-attempt timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Preferred method
    #[serde(default = "default_method")]
    pub method: BackendKind,

    /// Whether to fall back to other backends
    #[serde(default = "default_true")]
    pub fallback: bool,

    /// Default proxy URL
    pub proxy: Option<String>,

    /// Skip TLS certificate verification by default
    #[serde(default)]
    pub insecure: bool,
}

fn default_timeout() -> u64 {
    30
}

fn default_method() -> BackendKind {
    BackendKind::Auto
}

fn default_true() -> bool {
    true
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout: default_timeout(),
            method: default_method(),
            fallback: true,
            proxy: None,
            insecure: false,
        }
    }
}

impl FetchConfig {
    /// Load configuration from the standard hierarchy.
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/fetch-mux/config.toml
    /// 3. .fetch-mux.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".fetch-mux.toml"))
            .unwrap_or_else(|| PathBuf::from(".fetch-mux.toml"));
        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/fetch-mux/config.toml).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fetch-mux/config.toml"))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Self) {
        if other.user_agent.is_some() {
            self.user_agent = other.user_agent;
        }
        if other.timeout != default_timeout() {
            self.timeout = other.timeout;
        }
        if other.method != default_method() {
            self.method = other.method;
        }
        if !other.fallback {
            self.fallback = other.fallback;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
        if other.insecure {
            self.insecure = other.insecure;
        }
    }

    /// Build a request for `url` with these defaults applied.
    pub fn request(&self, url: impl Into<String>) -> RequestSpec {
        let mut spec = RequestSpec::new(url)
            .with_method(self.method)
            .with_fallback(self.fallback)
            .with_timeout(Duration::from_secs(self.timeout))
            .with_insecure(self.insecure);
        if let Some(agent) = &self.user_agent {
            spec = spec.with_user_agent(agent.clone());
        }
        if let Some(proxy) = &self.proxy {
            spec = spec.with_proxy(proxy.clone());
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let config: FetchConfig = toml::from_str("").unwrap();
        assert_eq!(config.timeout, 30);
        assert_eq!(config.method, BackendKind::Auto);
        assert!(config.fallback);
        assert!(!config.insecure);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            user_agent = "fetch-mux/0.1"
            timeout = 120
            method = "wget"
            fallback = false
            proxy = "http://proxy:3128"
            insecure = true
        "#;
        let config: FetchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.user_agent.as_deref(), Some("fetch-mux/0.1"));
        assert_eq!(config.timeout, 120);
        assert_eq!(config.method, BackendKind::Wget);
        assert!(!config.fallback);
        assert!(config.insecure);
    }

    #[test]
    fn test_reject_unknown_fields() {
        let result: Result<FetchConfig, _> = toml::from_str("retries = 3");
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_other_wins() {
        let mut base = FetchConfig::default();
        let overlay: FetchConfig = toml::from_str(
            r#"
            method = "curl"
            timeout = 5
        "#,
        )
        .unwrap();
        base.merge(overlay);
        assert_eq!(base.method, BackendKind::Curl);
        assert_eq!(base.timeout, 5);
        // Untouched fields keep their defaults
        assert!(base.fallback);
    }

    #[test]
    fn test_request_applies_defaults() {
        let config: FetchConfig = toml::from_str(
            r#"
            user_agent = "agent/1"
            timeout = 9
            proxy = "http://p:1"
        "#,
        )
        .unwrap();
        let spec = config.request("https://example.com");
        assert_eq!(spec.user_agent.as_deref(), Some("agent/1"));
        assert_eq!(spec.timeout, Duration::from_secs(9));
        assert_eq!(spec.proxy.as_deref(), Some("http://p:1"));
    }
}
