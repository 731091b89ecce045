//! Run configuration.
//!
//! Loaded from a `.json`, `.yaml` or `.yml` file; every field except the
//! cluster has a default.

use crate::error::{NetmigError, NetmigResult};
use crate::migration::UnmatchedPolicy;
use crate::task::WaitPolicy;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Migration run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Settings for one run against one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MigrationConfig {
    /// Cluster whose hosts and VMs are in scope
    pub cluster: String,
    /// Standard switch to create, or to create port groups on
    #[serde(default)]
    pub vswitch: Option<String>,
    /// Physical NICs bonded to a newly created standard switch
    #[serde(default = "default_uplinks")]
    pub uplinks: Vec<String>,
    /// Behavior when no distributed port group matches during migratetodvs
    #[serde(default)]
    pub unmatched_policy: UnmatchedPolicy,
    #[serde(default)]
    pub wait: WaitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_uplinks() -> Vec<String> {
    vec!["vmnic7".to_string()]
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            vswitch: None,
            uplinks: default_uplinks(),
            unmatched_policy: UnmatchedPolicy::default(),
            wait: WaitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MigrationConfig {
    pub fn from_json_str(text: &str) -> NetmigResult<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml_str(text: &str) -> NetmigResult<Self> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a file, picking the format from its extension.
    pub fn load(path: impl AsRef<Path>) -> NetmigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            other => Err(NetmigError::config(format!(
                "Unsupported config format {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> NetmigResult<()> {
        if self.cluster.trim().is_empty() {
            return Err(NetmigError::config("cluster must be set"));
        }
        if self.wait.poll_interval_ms == 0 {
            return Err(NetmigError::config("wait.pollIntervalMs must be positive"));
        }
        if matches!(&self.vswitch, Some(name) if name.trim().is_empty()) {
            return Err(NetmigError::invalid_name("vswitch name is empty"));
        }
        Ok(())
    }

    /// Switch name required by the create operations.
    pub fn require_vswitch(&self) -> NetmigResult<&str> {
        self.vswitch
            .as_deref()
            .ok_or_else(|| NetmigError::config("vswitch must be set for this operation"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Task waiting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaitConfig {
    /// Delay between task status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up on a task after this many seconds; unset waits forever
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_secs: None,
        }
    }
}

impl WaitConfig {
    pub fn policy(&self) -> WaitPolicy {
        WaitPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Emit one JSON object per line instead of human-readable text
    #[serde(default)]
    pub json: bool,
    /// `tracing` filter directive; `RUST_LOG` overrides it
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: default_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetmigErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn yaml_fills_defaults() {
        let cfg = MigrationConfig::from_yaml_str("cluster: prod\n").unwrap();
        assert_eq!(cfg.cluster, "prod");
        assert_eq!(cfg.uplinks, vec!["vmnic7".to_string()]);
        assert_eq!(cfg.unmatched_policy, UnmatchedPolicy::Abort);
        assert_eq!(cfg.wait.policy().poll_interval, Duration::from_millis(500));
        assert_eq!(cfg.wait.policy().timeout, None);
        assert_eq!(cfg.logging.filter, "info");
    }

    #[test]
    fn json_reads_camel_case() {
        let cfg = MigrationConfig::from_json_str(
            r#"{
                "cluster": "prod",
                "vswitch": "vSwitch1",
                "uplinks": ["vmnic4", "vmnic5"],
                "unmatchedPolicy": "skip",
                "wait": { "pollIntervalMs": 100, "timeoutSecs": 60 },
                "logging": { "json": true }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.require_vswitch().unwrap(), "vSwitch1");
        assert_eq!(cfg.unmatched_policy, UnmatchedPolicy::Skip);
        assert_eq!(cfg.wait.policy().timeout, Some(Duration::from_secs(60)));
        assert!(cfg.logging.json);
    }

    #[test]
    fn missing_cluster_is_rejected() {
        let err = MigrationConfig::from_yaml_str("cluster: ''\n").unwrap_err();
        assert_eq!(err.kind, NetmigErrorKind::ConfigError);
    }

    #[test]
    fn require_vswitch_when_unset() {
        let cfg = MigrationConfig {
            cluster: "prod".into(),
            ..MigrationConfig::default()
        };
        assert_eq!(cfg.require_vswitch().unwrap_err().kind, NetmigErrorKind::ConfigError);
    }

    #[test]
    fn load_picks_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netmig.yml");
        std::fs::write(&path, "cluster: lab\nvswitch: vSwitch2\n").unwrap();
        let cfg = MigrationConfig::load(&path).unwrap();
        assert_eq!(cfg.cluster, "lab");

        let bad = dir.path().join("netmig.toml");
        std::fs::write(&bad, "cluster = 'lab'").unwrap();
        assert_eq!(
            MigrationConfig::load(&bad).unwrap_err().kind,
            NetmigErrorKind::ConfigError
        );
    }
}
