//! Candidate, election, super-node, and audit types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use daan_core::{NodeId, Timestamp};

/// A node applying for committee membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub node_id: NodeId,
    pub reputation: f64,
    pub stake: f64,
    pub applied_at: Timestamp,
    /// Aggregate vote weight received
    pub vote_weight: f64,
    /// One vote per voter; weights sum into `vote_weight`
    pub voters: BTreeMap<NodeId, f64>,
}

/// Election lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElectionStatus {
    Open,
    Closed,
    Finalized,
}

/// A committee election over a captured candidate snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Election {
    pub id: String,
    pub started_at: Timestamp,
    pub ends_at: Timestamp,
    /// Deep copy of the candidate pool at start
    pub candidates: Vec<Candidate>,
    /// Winners ordered by vote weight, descending
    pub winners: Vec<NodeId>,
    pub status: ElectionStatus,
    pub finalized_at: Option<Timestamp>,
}

/// An elected committee member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperNode {
    pub node_id: NodeId,
    /// Reputation at election time
    pub reputation: f64,
    /// Stake at election time
    pub stake: f64,
    pub term_start: Timestamp,
    pub term_end: Timestamp,
    /// Rolling mean of agreement with finalized audit verdicts
    pub pass_rate: f64,
    /// Audits this node has submitted a verdict for
    pub audit_count: u64,
    pub active: bool,
}

/// What kind of target an audit verifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditType {
    Task,
    Reputation,
    Behavior,
}

/// An auditor's verdict, or the audit's finalized outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Pass,
    Fail,
    Pending,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Pass => "pass",
            AuditResult::Fail => "fail",
            AuditResult::Pending => "pending",
        }
    }
}

/// One auditor's signed verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub auditor_id: NodeId,
    pub result: AuditResult,
    pub evidence: String,
    pub submitted_at: Timestamp,
    pub signature: String,
}

/// How far a deviating verdict strayed from the finalized one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationSeverity {
    Minor,
    Severe,
}

impl DeviationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviationSeverity::Minor => "minor",
            DeviationSeverity::Severe => "severe",
        }
    }
}

/// An individual auditor's verdict differing from the finalized verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDeviation {
    pub audit_id: String,
    pub auditor_id: NodeId,
    /// The finalized verdict
    pub expected: AuditResult,
    /// What the auditor actually submitted
    pub actual: AuditResult,
    pub severity: DeviationSeverity,
    pub detected_at: Timestamp,
}

/// A multi-party verification of one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiAudit {
    pub id: String,
    pub audit_type: AuditType,
    pub target_id: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    /// Randomly assigned active super-nodes
    pub auditors: Vec<NodeId>,
    /// Verdicts keyed by auditor
    pub records: BTreeMap<NodeId, AuditRecord>,
    pub final_result: AuditResult,
    pub finalized: bool,
    pub deviations: Vec<AuditDeviation>,
}

impl MultiAudit {
    /// True once every assigned auditor has submitted
    pub fn all_submitted(&self) -> bool {
        self.records.len() == self.auditors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags() {
        assert_eq!(serde_json::to_string(&AuditResult::Pass).unwrap(), "\"pass\"");
        assert_eq!(
            serde_json::to_string(&DeviationSeverity::Severe).unwrap(),
            "\"severe\""
        );
        assert_eq!(serde_json::to_string(&AuditType::Task).unwrap(), "\"task\"");
        assert_eq!(
            serde_json::to_string(&ElectionStatus::Finalized).unwrap(),
            "\"finalized\""
        );
    }
}
