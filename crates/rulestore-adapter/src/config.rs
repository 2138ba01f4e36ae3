use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

pub const DEFAULT_OP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

// Adapter configuration sourced from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Deadline applied to every storage call (a load's whole cursor walk counts as one).
    pub op_timeout: Duration,
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_PG_MAX_CONNECTIONS,
            connect_timeout_ms: DEFAULT_PG_CONNECT_TIMEOUT_MS,
            acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            postgres: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AdapterConfigOverride {
    op_timeout_ms: Option<u64>,
    postgres: Option<PostgresConfigOverride>,
}

#[derive(Debug, Default, Deserialize)]
struct PostgresConfigOverride {
    url: Option<String>,
    max_connections: Option<u32>,
    connect_timeout_ms: Option<u64>,
    acquire_timeout_ms: Option<u64>,
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("RULESTORE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read RULESTORE_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let op_timeout_ms = match lookup("RULESTORE_OP_TIMEOUT_MS") {
            Some(value) => value
                .parse()
                .with_context(|| "parse RULESTORE_OP_TIMEOUT_MS")?,
            None => DEFAULT_OP_TIMEOUT_MS,
        };
        let postgres = match lookup("RULESTORE_POSTGRES_URL") {
            Some(url) => {
                let mut pg = PostgresConfig::new(url);
                if let Some(value) = lookup("RULESTORE_POSTGRES_MAX_CONNECTIONS") {
                    pg.max_connections = value
                        .parse()
                        .with_context(|| "parse RULESTORE_POSTGRES_MAX_CONNECTIONS")?;
                }
                if let Some(value) = lookup("RULESTORE_POSTGRES_CONNECT_TIMEOUT_MS") {
                    pg.connect_timeout_ms = value
                        .parse()
                        .with_context(|| "parse RULESTORE_POSTGRES_CONNECT_TIMEOUT_MS")?;
                }
                if let Some(value) = lookup("RULESTORE_POSTGRES_ACQUIRE_TIMEOUT_MS") {
                    pg.acquire_timeout_ms = value
                        .parse()
                        .with_context(|| "parse RULESTORE_POSTGRES_ACQUIRE_TIMEOUT_MS")?;
                }
                Some(pg)
            }
            None => None,
        };
        Ok(Self {
            op_timeout: Duration::from_millis(op_timeout_ms),
            postgres,
        })
    }

    /// Overlay values from a YAML document onto this config.
    pub fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: AdapterConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse rulestore config yaml")?;
        if let Some(value) = override_cfg.op_timeout_ms {
            self.op_timeout = Duration::from_millis(value);
        }
        if let Some(pg_override) = override_cfg.postgres {
            let mut pg = match (self.postgres.take(), pg_override.url) {
                (Some(existing), Some(url)) => PostgresConfig { url, ..existing },
                (None, Some(url)) => PostgresConfig::new(url),
                (Some(existing), None) => existing,
                (None, None) => anyhow::bail!("postgres config requires a url"),
            };
            if let Some(value) = pg_override.max_connections {
                pg.max_connections = value;
            }
            if let Some(value) = pg_override.connect_timeout_ms {
                pg.connect_timeout_ms = value;
            }
            if let Some(value) = pg_override.acquire_timeout_ms {
                pg.acquire_timeout_ms = value;
            }
            self.postgres = Some(pg);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = AdapterConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, AdapterConfig::default());
        assert_eq!(config.op_timeout, Duration::from_secs(10));
        assert!(config.postgres.is_none());
    }

    #[test]
    fn env_values_are_parsed() {
        let config = AdapterConfig::from_lookup(lookup(&[
            ("RULESTORE_OP_TIMEOUT_MS", "250"),
            ("RULESTORE_POSTGRES_URL", "postgres://localhost/rules"),
            ("RULESTORE_POSTGRES_MAX_CONNECTIONS", "3"),
        ]))
        .expect("config");
        assert_eq!(config.op_timeout, Duration::from_millis(250));
        let pg = config.postgres.expect("postgres");
        assert_eq!(pg.url, "postgres://localhost/rules");
        assert_eq!(pg.max_connections, 3);
        assert_eq!(pg.acquire_timeout_ms, DEFAULT_PG_ACQUIRE_TIMEOUT_MS);
    }

    #[test]
    fn invalid_env_value_is_rejected() {
        let err = AdapterConfig::from_lookup(lookup(&[("RULESTORE_OP_TIMEOUT_MS", "soon")]))
            .expect_err("invalid timeout");
        assert!(err.to_string().contains("RULESTORE_OP_TIMEOUT_MS"));
    }

    #[test]
    fn yaml_overrides_env_values() {
        let mut config = AdapterConfig::from_lookup(lookup(&[(
            "RULESTORE_POSTGRES_URL",
            "postgres://env/rules",
        )]))
        .expect("config");
        config
            .apply_yaml("op_timeout_ms: 500\npostgres:\n  max_connections: 2\n")
            .expect("yaml");
        assert_eq!(config.op_timeout, Duration::from_millis(500));
        let pg = config.postgres.expect("postgres");
        assert_eq!(pg.url, "postgres://env/rules");
        assert_eq!(pg.max_connections, 2);
    }

    #[test]
    fn yaml_postgres_section_needs_a_url() {
        let mut config = AdapterConfig::default();
        let err = config
            .apply_yaml("postgres:\n  max_connections: 2\n")
            .expect_err("missing url");
        assert!(err.to_string().contains("url"));

        config
            .apply_yaml("postgres:\n  url: postgres://yaml/rules\n")
            .expect("yaml");
        assert_eq!(
            config.postgres,
            Some(PostgresConfig::new("postgres://yaml/rules"))
        );
    }
}
