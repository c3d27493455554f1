//! Collateral instruments and their lifecycle types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use daan_core::{Amount, NodeId, Timestamp};

/// What a collateral is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollateralType {
    Token,
    Stake,
    Reputation,
    Service,
}

impl CollateralType {
    /// Parse a wire tag
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "token" => Some(CollateralType::Token),
            "stake" => Some(CollateralType::Stake),
            "reputation" => Some(CollateralType::Reputation),
            "service" => Some(CollateralType::Service),
            _ => None,
        }
    }
}

/// Lifecycle status. `Slashed`, `Returned`, and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollateralStatus {
    Pending,
    Active,
    Locked,
    Slashed,
    Returned,
    Expired,
}

impl CollateralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollateralStatus::Pending => "pending",
            CollateralStatus::Active => "active",
            CollateralStatus::Locked => "locked",
            CollateralStatus::Slashed => "slashed",
            CollateralStatus::Returned => "returned",
            CollateralStatus::Expired => "expired",
        }
    }
}

/// A posted collateral instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collateral {
    pub id: String,
    pub owner: NodeId,
    pub collateral_type: CollateralType,
    pub amount: Amount,
    pub status: CollateralStatus,
    /// What the collateral backs, e.g. "guarantee" or "supernode_auditor"
    pub purpose: String,
    /// Set when the collateral is locked for a beneficiary
    pub beneficiary: Option<NodeId>,
    pub created_at: Timestamp,
    pub locked_at: Option<Timestamp>,
    pub slashed_at: Option<Timestamp>,
    pub returned_at: Option<Timestamp>,
    pub expires_at: Timestamp,
    /// Cumulative amount confiscated from this instrument
    pub slash_amount: Amount,
    /// Opaque caller-supplied context
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Record of one slash against an owner's collateral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlashEvent {
    pub id: String,
    pub collateral_id: String,
    pub owner: NodeId,
    pub amount: Amount,
    pub ratio: f64,
    pub reason: String,
    pub evidence: String,
    pub slashed_at: Timestamp,
}

/// Verification result for a single collateral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralProof {
    pub collateral_id: String,
    pub owner: NodeId,
    pub amount: Amount,
    pub is_valid: bool,
    pub checked_at: Timestamp,
}

/// A declared requirement checked against an owner's posted collateral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateralRequirement {
    /// Minimum total amount over matching collaterals
    pub min_amount: Amount,
    /// Accepted denominations; empty accepts all
    pub accepted_types: Vec<CollateralType>,
    /// Required remaining life in seconds
    pub lock_period: i64,
    /// Required purpose tag; empty accepts all
    pub purpose: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_parse() {
        assert_eq!(CollateralType::parse("token"), Some(CollateralType::Token));
        assert_eq!(CollateralType::parse("service"), Some(CollateralType::Service));
        assert_eq!(CollateralType::parse("gold"), None);
    }

    #[test]
    fn test_status_wire_tags() {
        assert_eq!(
            serde_json::to_string(&CollateralStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(CollateralStatus::Slashed.as_str(), "slashed");
    }
}
