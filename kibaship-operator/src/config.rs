//! Operator configuration
//!
//! Loaded once at startup into an immutable value and handed to every
//! component at construction. Nothing reads the environment during a
//! reconciliation.

use kibaship_core::profile::ResourceProfile;
use regex::Regex;
use std::time::Duration;

/// Operator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base domain for generated hostnames (`<uuid>.apps.<domain>`)
    pub base_domain: String,

    /// Serving port for applications that do not declare one
    pub default_port: u16,

    /// CPU/memory preset applied to materialized workloads
    pub resource_profile: ResourceProfile,

    /// Concurrency ceiling of the build trigger controller
    pub build_concurrency: usize,

    /// Concurrency ceiling of the progress controller
    pub progress_concurrency: usize,

    /// Concurrency ceiling of each condition watcher
    pub watcher_concurrency: usize,

    /// Upper bound on a single reconciliation
    pub reconcile_timeout: Duration,

    /// Delay before re-checking a dependency that is not available yet
    pub dependency_requeue: Duration,

    /// Webhook target; notifications are dropped when unset
    pub webhook_url: Option<String>,

    /// HMAC key for webhook signatures
    pub webhook_secret: Option<String>,

    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// API listen address
    pub bind_addr: String,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            base_domain: base_domain.into(),
            default_port: 3000,
            resource_profile: ResourceProfile::Standard,
            build_concurrency: 10,
            progress_concurrency: 20,
            watcher_concurrency: 10,
            reconcile_timeout: Duration::from_secs(30),
            dependency_requeue: Duration::from_secs(5),
            webhook_url: None,
            webhook_secret: None,
            database_url: None,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - KIBASHIP_OPERATOR_DOMAIN (required)
    /// - KIBASHIP_DEFAULT_PORT (optional, default: 3000)
    /// - KIBASHIP_RESOURCE_PROFILE (optional, default: standard)
    /// - KIBASHIP_BUILD_CONCURRENCY (optional, default: 10)
    /// - KIBASHIP_PROGRESS_CONCURRENCY (optional, default: 20)
    /// - KIBASHIP_WATCHER_CONCURRENCY (optional, default: 10)
    /// - KIBASHIP_RECONCILE_TIMEOUT_SECS (optional, default: 30)
    /// - KIBASHIP_WEBHOOK_URL, KIBASHIP_WEBHOOK_SECRET (optional)
    /// - DATABASE_URL (optional)
    /// - KIBASHIP_BIND_ADDR (optional, default: 0.0.0.0:8080)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_domain = lookup("KIBASHIP_OPERATOR_DOMAIN")
            .filter(|d| !d.is_empty())
            .ok_or_else(|| anyhow::anyhow!("KIBASHIP_OPERATOR_DOMAIN environment variable not set"))?;

        let mut config = Config::new(base_domain);

        if let Some(port) = lookup("KIBASHIP_DEFAULT_PORT") {
            let port: u32 = port
                .parse()
                .map_err(|_| anyhow::anyhow!("KIBASHIP_DEFAULT_PORT is not a number: {}", port))?;
            if port == 0 || port > 65535 {
                anyhow::bail!("KIBASHIP_DEFAULT_PORT must be between 1 and 65535, got {}", port);
            }
            config.default_port = port as u16;
        }

        if let Some(profile) = lookup("KIBASHIP_RESOURCE_PROFILE") {
            config.resource_profile = profile.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }

        config.build_concurrency = lookup("KIBASHIP_BUILD_CONCURRENCY")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(config.build_concurrency);

        config.progress_concurrency = lookup("KIBASHIP_PROGRESS_CONCURRENCY")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(config.progress_concurrency);

        config.watcher_concurrency = lookup("KIBASHIP_WATCHER_CONCURRENCY")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(config.watcher_concurrency);

        config.reconcile_timeout = lookup("KIBASHIP_RECONCILE_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.reconcile_timeout);

        config.webhook_url = lookup("KIBASHIP_WEBHOOK_URL").filter(|s| !s.is_empty());
        config.webhook_secret = lookup("KIBASHIP_WEBHOOK_SECRET").filter(|s| !s.is_empty());
        config.database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());

        if let Some(addr) = lookup("KIBASHIP_BIND_ADDR") {
            config.bind_addr = addr;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let dns = Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$")?;
        if !dns.is_match(&self.base_domain) {
            anyhow::bail!("invalid base domain format: {}", self.base_domain);
        }

        if self.default_port == 0 {
            anyhow::bail!("default_port must be greater than 0");
        }

        if self.build_concurrency == 0 || self.progress_concurrency == 0 || self.watcher_concurrency == 0 {
            anyhow::bail!("controller concurrency must be greater than 0");
        }

        if self.reconcile_timeout.is_zero() {
            anyhow::bail!("reconcile_timeout must be greater than 0");
        }

        if let Some(url) = &self.webhook_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("webhook_url must start with http:// or https://");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("KIBASHIP_OPERATOR_DOMAIN", "example.com")])).unwrap();
        assert_eq!(config.base_domain, "example.com");
        assert_eq!(config.default_port, 3000);
        assert_eq!(config.resource_profile, ResourceProfile::Standard);
        assert_eq!(config.build_concurrency, 10);
        assert_eq!(config.progress_concurrency, 20);
        assert!(config.webhook_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_domain_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("KIBASHIP_OPERATOR_DOMAIN", "")])).is_err());
    }

    #[test]
    fn test_invalid_domain_rejected() {
        for domain in ["Example.com", "-bad.com", "bad-.com", "a..b"] {
            let config = Config::new(domain);
            assert!(config.validate().is_err(), "{} should be rejected", domain);
        }
        assert!(Config::new("apps.kibaship.dev").validate().is_ok());
    }

    #[test]
    fn test_port_bounds() {
        let base = ("KIBASHIP_OPERATOR_DOMAIN", "example.com");
        assert!(Config::from_lookup(lookup(&[base, ("KIBASHIP_DEFAULT_PORT", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[base, ("KIBASHIP_DEFAULT_PORT", "70000")])).is_err());
        assert!(Config::from_lookup(lookup(&[base, ("KIBASHIP_DEFAULT_PORT", "abc")])).is_err());

        let config = Config::from_lookup(lookup(&[base, ("KIBASHIP_DEFAULT_PORT", "8080")])).unwrap();
        assert_eq!(config.default_port, 8080);
    }

    #[test]
    fn test_profile_and_webhook() {
        let config = Config::from_lookup(lookup(&[
            ("KIBASHIP_OPERATOR_DOMAIN", "example.com"),
            ("KIBASHIP_RESOURCE_PROFILE", "minimal"),
            ("KIBASHIP_WEBHOOK_URL", "ftp://nope"),
        ]))
        .unwrap();
        assert_eq!(config.resource_profile, ResourceProfile::Minimal);
        assert!(config.validate().is_err());
    }
}
