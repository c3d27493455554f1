//! Node configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete node configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeConfig {
    pub node: NodeSection,

    #[serde(default)]
    pub genesis: GenesisSection,

    #[serde(default)]
    pub collateral: CollateralSection,

    #[serde(default)]
    pub reputation: ReputationSection,

    #[serde(default)]
    pub supernode: SuperNodeSection,

    #[serde(default)]
    pub penalty: PenaltySection,

    #[serde(default)]
    pub snapshot: SnapshotSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSection {
    pub data_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_network_name")]
    pub network_name: String,
    #[serde(default = "default_network_version")]
    pub network_version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenesisSection {
    #[serde(default = "default_initial_reputation")]
    pub initial_reputation: f64,
    #[serde(default = "default_genesis_reputation")]
    pub genesis_reputation: f64,
    #[serde(default = "default_min_inviter_reputation")]
    pub min_inviter_reputation: f64,
    #[serde(default = "default_invitation_valid_hours")]
    pub invitation_valid_hours: i64,
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,
    #[serde(default = "default_min_neighbors")]
    pub min_neighbors: usize,
    #[serde(default)]
    pub bootstrap_nodes: Vec<String>,
}

impl Default for GenesisSection {
    fn default() -> Self {
        Self {
            initial_reputation: default_initial_reputation(),
            genesis_reputation: default_genesis_reputation(),
            min_inviter_reputation: default_min_inviter_reputation(),
            invitation_valid_hours: default_invitation_valid_hours(),
            max_neighbors: default_max_neighbors(),
            min_neighbors: default_min_neighbors(),
            bootstrap_nodes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollateralSection {
    #[serde(default = "default_min_amount")]
    pub min_amount: f64,
    #[serde(default = "default_slash_ratio")]
    pub default_slash_ratio: f64,
    #[serde(default = "default_min_guarantor_collateral")]
    pub min_guarantor_collateral: f64,
}

impl Default for CollateralSection {
    fn default() -> Self {
        Self {
            min_amount: default_min_amount(),
            default_slash_ratio: default_slash_ratio(),
            min_guarantor_collateral: default_min_guarantor_collateral(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReputationSection {
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    #[serde(default = "default_delta")]
    pub delta: f64,
    #[serde(default = "default_half_life_days")]
    pub half_life_days: i64,
}

impl Default for ReputationSection {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            lambda: default_lambda(),
            delta: default_delta(),
            half_life_days: default_half_life_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SuperNodeSection {
    #[serde(default = "default_min_candidate_reputation")]
    pub min_reputation: f64,
    #[serde(default = "default_min_stake")]
    pub min_stake: f64,
    #[serde(default = "default_max_super_nodes")]
    pub max_super_nodes: usize,
    #[serde(default = "default_election_duration_secs")]
    pub election_duration_secs: i64,
    #[serde(default = "default_term_duration_secs")]
    pub term_duration_secs: i64,
    #[serde(default = "default_auditors_per_task")]
    pub auditors_per_task: usize,
    #[serde(default = "default_audit_threshold")]
    pub audit_threshold: f64,
    /// Seed for auditor selection; random when absent
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for SuperNodeSection {
    fn default() -> Self {
        Self {
            min_reputation: default_min_candidate_reputation(),
            min_stake: default_min_stake(),
            max_super_nodes: default_max_super_nodes(),
            election_duration_secs: default_election_duration_secs(),
            term_duration_secs: default_term_duration_secs(),
            auditors_per_task: default_auditors_per_task(),
            audit_threshold: default_audit_threshold(),
            rng_seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PenaltySection {
    #[serde(default = "default_true")]
    pub auto_slash: bool,
    #[serde(default = "default_auditor_purpose")]
    pub auditor_purpose: String,
}

impl Default for PenaltySection {
    fn default() -> Self {
        Self {
            auto_slash: true,
            auditor_purpose: default_auditor_purpose(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotSection {
    #[serde(default = "default_snapshot_interval")]
    pub interval: u64,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            interval: default_snapshot_interval(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_network_name() -> String {
    "daan".to_string()
}

fn default_network_version() -> String {
    "1".to_string()
}

fn default_initial_reputation() -> f64 {
    1.0
}

fn default_genesis_reputation() -> f64 {
    100.0
}

fn default_min_inviter_reputation() -> f64 {
    10.0
}

fn default_invitation_valid_hours() -> i64 {
    72
}

fn default_max_neighbors() -> usize {
    16
}

fn default_min_neighbors() -> usize {
    4
}

fn default_min_amount() -> f64 {
    10.0
}

fn default_slash_ratio() -> f64 {
    0.5
}

fn default_min_guarantor_collateral() -> f64 {
    100.0
}

fn default_alpha() -> f64 {
    0.8
}

fn default_lambda() -> f64 {
    0.1
}

fn default_delta() -> f64 {
    0.2
}

fn default_half_life_days() -> i64 {
    30
}

fn default_min_candidate_reputation() -> f64 {
    0.5
}

fn default_min_stake() -> f64 {
    100.0
}

fn default_max_super_nodes() -> usize {
    21
}

fn default_election_duration_secs() -> i64 {
    3600
}

fn default_term_duration_secs() -> i64 {
    7 * 24 * 3600
}

fn default_auditors_per_task() -> usize {
    3
}

fn default_audit_threshold() -> f64 {
    0.6
}

fn default_auditor_purpose() -> String {
    "supernode_auditor".to_string()
}

fn default_snapshot_interval() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        let config: NodeConfig =
            toml::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Minimal configuration rooted at a data directory
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            node: NodeSection {
                data_dir,
                log_level: default_log_level(),
                network_name: default_network_name(),
                network_version: default_network_version(),
            },
            genesis: GenesisSection::default(),
            collateral: CollateralSection::default(),
            reputation: ReputationSection::default(),
            supernode: SuperNodeSection::default(),
            penalty: PenaltySection::default(),
            snapshot: SnapshotSection::default(),
        }
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.node.network_name.is_empty() {
            anyhow::bail!("network_name must not be empty");
        }
        if !(0.0..=1.0).contains(&self.supernode.audit_threshold) {
            anyhow::bail!(
                "audit_threshold must be in [0, 1], got {}",
                self.supernode.audit_threshold
            );
        }
        if self.genesis.min_neighbors > self.genesis.max_neighbors {
            anyhow::bail!(
                "min_neighbors ({}) exceeds max_neighbors ({})",
                self.genesis.min_neighbors,
                self.genesis.max_neighbors
            );
        }
        if self.collateral.default_slash_ratio <= 0.0 || self.collateral.default_slash_ratio > 1.0 {
            anyhow::bail!(
                "default_slash_ratio must be in (0, 1], got {}",
                self.collateral.default_slash_ratio
            );
        }
        if self.snapshot.interval == 0 {
            anyhow::bail!("snapshot interval must be positive");
        }
        Ok(())
    }

    // --- derived paths --------------------------------------------------

    pub fn data_dir(&self) -> &Path {
        &self.node.data_dir
    }

    pub fn key_path(&self) -> PathBuf {
        self.node.data_dir.join("node_key.hex")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.node.data_dir.join("ledger.json")
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.node.data_dir.join("snapshots")
    }

    pub fn collateral_path(&self) -> PathBuf {
        self.node.data_dir.join("collateral.json")
    }

    pub fn supernode_path(&self) -> PathBuf {
        self.node.data_dir.join("supernode.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [node]
            data_dir = "/tmp/daan"
            "#,
        )
        .unwrap();

        assert_eq!(config.node.log_level, "info");
        assert_eq!(config.genesis.invitation_valid_hours, 72);
        assert_eq!(config.supernode.auditors_per_task, 3);
        assert_eq!(config.supernode.audit_threshold, 0.6);
        assert_eq!(config.snapshot.interval, 100);
        assert!(config.penalty.auto_slash);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let mut config = NodeConfig::with_data_dir(PathBuf::from("/tmp/daan"));
        config.supernode.audit_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_slash_ratio() {
        let mut config = NodeConfig::with_data_dir(PathBuf::from("/tmp/daan"));
        config.collateral.default_slash_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_paths() {
        let config = NodeConfig::with_data_dir(PathBuf::from("/data/daan"));
        assert_eq!(config.key_path(), PathBuf::from("/data/daan/node_key.hex"));
        assert_eq!(config.ledger_path(), PathBuf::from("/data/daan/ledger.json"));
        assert_eq!(config.snapshot_dir(), PathBuf::from("/data/daan/snapshots"));
    }
}
