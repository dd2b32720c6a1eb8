use crate::cache::ProviderSource;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/routeros-adblock.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub updates: UpdateConfig,

    /// Values every router inherits unless it sets its own.
    #[serde(default)]
    pub defaults: RouterDefaults,

    #[serde(default)]
    pub routers: Vec<RouterEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct UpdateConfig {
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,
    #[serde(default = "default_max_parallel_routers")]
    pub max_parallel_routers: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterDefaults {
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default)]
    pub ip_to_redirect: Option<IpAddr>,
    #[serde(default)]
    pub allowed_domains_file: Option<PathBuf>,
    #[serde(default)]
    pub sources_file: Option<PathBuf>,
    #[serde(default)]
    pub sources: Vec<ProviderSource>,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_max_age", with = "humantime_serde")]
    pub max_age: Duration,
    #[serde(default = "default_comment")]
    pub comment: String,
    #[serde(default = "default_api_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// A `[[routers]]` table as written; unset fields fall back to `[defaults]`.
#[derive(Debug, Deserialize, Clone)]
pub struct RouterEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ip_to_redirect: Option<IpAddr>,
    #[serde(default)]
    pub allowed_domains_file: Option<PathBuf>,
    #[serde(default)]
    pub sources_file: Option<PathBuf>,
    #[serde(default)]
    pub sources: Option<Vec<ProviderSource>>,
    #[serde(default, with = "humantime_serde")]
    pub max_age: Option<Duration>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Fully resolved settings for one managed router.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub ip_to_redirect: IpAddr,
    pub allowed_domains_file: PathBuf,
    pub sources: Vec<ProviderSource>,
    /// Extra provider URLs, read at the start of every cycle.
    pub sources_file: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub max_age: Duration,
    pub comment: String,
    pub timeout: Duration,
}

// Defaults
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_concurrent_downloads() -> usize {
    4
}
fn default_max_parallel_routers() -> usize {
    1
}
fn default_user_agent() -> String {
    concat!("routeros-adblock/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}
fn default_api_port() -> u16 {
    8728
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/routeros-adblock")
}
fn default_max_age() -> Duration {
    Duration::from_secs(24 * 3600)
}
fn default_comment() -> String {
    "ADBlock".to_string()
}
fn default_api_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            concurrent_downloads: default_concurrent_downloads(),
            max_parallel_routers: default_max_parallel_routers(),
            user_agent: default_user_agent(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

impl Default for RouterDefaults {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            ip_to_redirect: None,
            allowed_domains_file: None,
            sources_file: None,
            sources: Vec::new(),
            cache_dir: default_cache_dir(),
            max_age: default_max_age(),
            comment: default_comment(),
            timeout: default_api_timeout(),
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse config TOML")?;
        Ok(config)
    }

    /// Resolves every `[[routers]]` entry against `[defaults]`.
    pub fn router_configs(&self) -> Result<Vec<RouterConfig>> {
        self.routers
            .iter()
            .map(|entry| self.resolve(entry))
            .collect()
    }

    fn resolve(&self, entry: &RouterEntry) -> Result<RouterConfig> {
        let d = &self.defaults;
        let name = entry.name.clone().unwrap_or_else(|| entry.host.clone());

        let ip_to_redirect = entry
            .ip_to_redirect
            .or(d.ip_to_redirect)
            .ok_or_else(|| anyhow!("router '{}': ip_to_redirect is not set", name))?;
        let allowed_domains_file = entry
            .allowed_domains_file
            .clone()
            .or_else(|| d.allowed_domains_file.clone())
            .ok_or_else(|| anyhow!("router '{}': allowed_domains_file is not set", name))?;

        let sources = entry.sources.clone().unwrap_or_else(|| d.sources.clone());
        let sources_file = entry.sources_file.clone().or_else(|| d.sources_file.clone());
        if sources.is_empty() && sources_file.is_none() {
            return Err(anyhow!(
                "router '{}': no block-list sources or sources_file configured",
                name
            ));
        }

        Ok(RouterConfig {
            host: entry.host.clone(),
            port: entry.port.unwrap_or(d.port),
            username: entry.username.clone(),
            password: entry.password.clone(),
            ip_to_redirect,
            allowed_domains_file,
            sources,
            sources_file,
            cache_dir: d.cache_dir.clone(),
            max_age: entry.max_age.unwrap_or(d.max_age),
            comment: entry.comment.clone().unwrap_or_else(|| d.comment.clone()),
            timeout: entry.timeout.unwrap_or(d.timeout),
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [logging]
        level = "debug"

        [defaults]
        ip_to_redirect = "0.0.0.0"
        allowed_domains_file = "/etc/adblock/allowed.txt"
        sources_file = "/etc/adblock/urls.txt"
        max_age = "2h"

        [[routers]]
        name = "office"
        host = "192.168.88.1"
        username = "admin"
        password = "secret"

        [[routers]]
        host = "10.0.0.1"
        port = 8729
        username = "api"
        ip_to_redirect = "::1"
        max_age = "30m"
        timeout = "3s"

        [[routers.sources]]
        url = "https://lists.example/hosts"
        cache_path = "/tmp/hosts.json"
    "#;

    #[test]
    fn test_resolves_defaults() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.updates.concurrent_downloads, 4);

        let routers = config.router_configs().unwrap();
        assert_eq!(routers.len(), 2);

        let office = &routers[0];
        assert_eq!(office.name, "office");
        assert_eq!(office.port, 8728);
        assert_eq!(office.ip_to_redirect, "0.0.0.0".parse::<IpAddr>().unwrap());
        assert_eq!(office.max_age, Duration::from_secs(2 * 3600));
        assert_eq!(office.comment, "ADBlock");
        assert_eq!(office.timeout, Duration::from_secs(10));
        assert_eq!(
            office.sources_file.as_deref(),
            Some(Path::new("/etc/adblock/urls.txt"))
        );
        assert!(office.sources.is_empty());

        let second = &routers[1];
        assert_eq!(second.name, "10.0.0.1");
        assert_eq!(second.port, 8729);
        assert_eq!(second.password, "");
        assert_eq!(second.ip_to_redirect, "::1".parse::<IpAddr>().unwrap());
        assert_eq!(second.max_age, Duration::from_secs(30 * 60));
        assert_eq!(second.timeout, Duration::from_secs(3));
        assert_eq!(second.sources.len(), 1);
        assert_eq!(second.sources[0].cache_path, PathBuf::from("/tmp/hosts.json"));
    }

    #[test]
    fn test_missing_redirect_ip_is_rejected() {
        let config = Config::parse(
            r#"
            [defaults]
            allowed_domains_file = "/a.txt"
            sources_file = "/u.txt"

            [[routers]]
            host = "192.168.88.1"
            username = "admin"
            "#,
        )
        .unwrap();

        let err = config.router_configs().unwrap_err();
        assert!(err.to_string().contains("ip_to_redirect"));
    }

    #[test]
    fn test_invalid_duration_fails_to_parse() {
        let result = Config::parse(
            r#"
            [defaults]
            max_age = "soon"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_config_has_no_routers() {
        let config = Config::parse("").unwrap();
        assert!(config.router_configs().unwrap().is_empty());
        assert_eq!(config.defaults.port, 8728);
    }
}
