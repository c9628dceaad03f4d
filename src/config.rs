use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::model::RetentionRule;
use crate::rules::RuleSet;

/// Process-level settings from the environment.
pub struct Settings {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub policy_path: PathBuf,
    pub listen_addr: SocketAddr,
    pub scrape_interval: Duration,
    pub request_timeout: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("JANITOR_REGISTRY_URL")
            .context("JANITOR_REGISTRY_URL is required")?
            .trim_end_matches('/')
            .to_string();

        let listen_addr: SocketAddr = env::var("JANITOR_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:9184".to_string())
            .parse()
            .context("invalid JANITOR_ADDR")?;

        let policy_path = env::var("JANITOR_POLICY")
            .unwrap_or_else(|_| "janitor.toml".to_string())
            .into();

        let scrape_interval = parse_duration("JANITOR_SCRAPE_SECONDS", 60)?;
        let request_timeout = parse_duration("JANITOR_TIMEOUT_SECONDS", 10)?;

        Ok(Self {
            base_url,
            username: env::var("JANITOR_USERNAME").ok(),
            password: env::var("JANITOR_PASSWORD").ok(),
            policy_path,
            listen_addr,
            scrape_interval,
            request_timeout,
        })
    }
}

fn parse_duration(env_key: &str, default_secs: u64) -> Result<Duration> {
    let raw = env::var(env_key).unwrap_or_else(|_| default_secs.to_string());
    let secs: u64 = raw
        .parse()
        .with_context(|| format!("{env_key} must be an integer number of seconds"))?;

    Ok(Duration::from_secs(secs))
}

/// Per-pattern thresholds as written in the policy file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub retention_days: Option<i64>,
    pub reserved: Option<usize>,
    pub min_days_since_last_download: Option<i64>,
}

/// The retention policy file (TOML).
///
/// `rules` keeps the file's table order, which is the tie-break order for
/// equally specific patterns.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    pub max_retention_days: Option<i64>,
    #[serde(default)]
    pub no_match: RuleSpec,
    #[serde(default)]
    pub rules: IndexMap<String, RuleSpec>,
}

impl PolicyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read policy file {}", path.display()))?;
        let policy: PolicyFile = toml::from_str(&raw)
            .with_context(|| format!("failed to parse policy file {}", path.display()))?;

        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<()> {
        for (pattern, spec) in self
            .rules
            .iter()
            .chain(std::iter::once((&"no_match".to_string(), &self.no_match)))
        {
            if spec.retention_days.is_some_and(|days| days < 0) {
                bail!("rule '{pattern}': retention_days must be non-negative");
            }
            if spec.min_days_since_last_download.is_some_and(|days| days < 0) {
                bail!("rule '{pattern}': min_days_since_last_download must be non-negative");
            }
        }

        if self.max_retention_days.is_some_and(|days| days < 0) {
            bail!("max_retention_days must be non-negative");
        }

        Ok(())
    }

    /// Compile patterns into the ruleset handed to the retention engine.
    pub fn compile(&self) -> Result<RuleSet> {
        let no_match = RetentionRule::no_match(
            self.no_match.retention_days,
            self.no_match.reserved,
            self.no_match.min_days_since_last_download,
        );
        let mut rules = RuleSet::new(no_match, self.max_retention_days);

        for (pattern, spec) in &self.rules {
            rules
                .add_rule(
                    pattern,
                    spec.retention_days,
                    spec.reserved,
                    spec.min_days_since_last_download,
                )
                .with_context(|| format!("invalid rule pattern '{pattern}'"))?;
        }

        Ok(rules)
    }
}
