//! The reputation scoring engine

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use daan_core::traits::{Clock, SystemClock};
use daan_core::NodeId;

use crate::error::{ReputationError, Result};
use crate::metrics::ReputationMetrics;
use crate::types::{Agent, EngineConfig, Rating, ReputationRecord};

/// Aggregate statistics over all agents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub total_agents: usize,
    pub average_score: f64,
    pub highest_score: f64,
    pub lowest_score: f64,
}

/// Per-agent reputation scores with weighted, time-decayed ratings.
///
/// Agents live in a concurrent map; each operation touches one agent
/// entry, so raters on different agents never contend.
pub struct ReputationEngine {
    config: EngineConfig,
    agents: DashMap<NodeId, Agent>,
    clock: Arc<dyn Clock>,
    metrics: ReputationMetrics,
}

impl ReputationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            agents: DashMap::new(),
            clock: Arc::new(SystemClock),
            metrics: ReputationMetrics::new().expect("reputation metrics registration"),
        }
    }

    /// Override the clock (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register an agent with its owner-trust contribution
    pub fn register(&self, id: &NodeId, owner_trust: f64) -> Result<()> {
        if self.agents.contains_key(id) {
            return Err(ReputationError::AlreadyRegistered(id.clone()));
        }
        self.agents.insert(
            id.clone(),
            Agent::new(id.clone(), owner_trust.clamp(0.0, 1.0), self.clock.now_unix()),
        );
        Ok(())
    }

    /// Queue a rating for the recipient's next score update
    pub fn add_rating(&self, rating: Rating) -> Result<()> {
        if !(-1.0..=1.0).contains(&rating.score) {
            return Err(ReputationError::InvalidScore(rating.score));
        }
        if rating.weight < 0.0 {
            return Err(ReputationError::InvalidWeight(rating.weight));
        }
        let mut agent = self
            .agents
            .get_mut(&rating.to)
            .ok_or_else(|| ReputationError::AgentNotFound(rating.to.clone()))?;
        agent.pending_ratings.push(rating);
        Ok(())
    }

    /// Accumulate a non-negative penalty term
    pub fn add_penalty(&self, id: &NodeId, penalty: f64) -> Result<()> {
        if penalty < 0.0 {
            return Err(ReputationError::InvalidPenalty(penalty));
        }
        let mut agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| ReputationError::AgentNotFound(id.clone()))?;
        agent.penalty += penalty;
        self.metrics.penalties_total.inc();
        Ok(())
    }

    /// Append a historical record for decayed queries
    pub fn add_reputation_record(
        &self,
        id: &NodeId,
        score: f64,
        source: &str,
        source_node: &NodeId,
    ) -> Result<()> {
        let max_history = self.config.max_history;
        let mut agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| ReputationError::AgentNotFound(id.clone()))?;
        agent.history.push(ReputationRecord {
            score,
            source: source.to_string(),
            source_node: source_node.clone(),
            recorded_at: self.clock.now_unix(),
        });
        if agent.history.len() > max_history {
            let excess = agent.history.len() - max_history;
            agent.history.drain(..excess);
        }
        Ok(())
    }

    /// Consume pending ratings and recompute the score:
    ///
    /// `score' = clip(a*score + (1-a)*weighted_avg - l*penalty + d*owner_trust, -1, 1)`
    ///
    /// where `weighted_avg` is the decay-weighted mean of pending ratings.
    /// With no pending ratings the rating term keeps the previous score.
    pub fn update_score(&self, id: &NodeId) -> Result<f64> {
        let now = self.clock.now_unix();
        let mut agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| ReputationError::AgentNotFound(id.clone()))?;

        let weighted_avg = if agent.pending_ratings.is_empty() {
            agent.score
        } else {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for rating in &agent.pending_ratings {
                let w = rating.weight * self.decay_factor(now - rating.timestamp);
                numerator += w * rating.score;
                denominator += w;
            }
            if denominator > 0.0 {
                numerator / denominator
            } else {
                agent.score
            }
        };

        let new_score = (self.config.alpha * agent.score
            + (1.0 - self.config.alpha) * weighted_avg
            - self.config.lambda * agent.penalty
            + self.config.delta * agent.owner_trust)
            .clamp(-1.0, 1.0);

        agent.score = new_score;
        agent.pending_ratings.clear();
        agent.last_updated = now;

        self.metrics.updates_total.inc();
        self.metrics.score.with_label_values(&[id.as_str()]).set(new_score);
        debug!(agent = %id, score = new_score, "Reputation updated");
        Ok(new_score)
    }

    /// Current score without folding pending ratings
    pub fn get_score(&self, id: &NodeId) -> Result<f64> {
        self.agents
            .get(id)
            .map(|agent| agent.score)
            .ok_or_else(|| ReputationError::AgentNotFound(id.clone()))
    }

    /// Score plus the decayed contribution of the record history
    pub fn get_score_with_decay(&self, id: &NodeId) -> Result<f64> {
        let now = self.clock.now_unix();
        let agent = self
            .agents
            .get(id)
            .ok_or_else(|| ReputationError::AgentNotFound(id.clone()))?;

        let decayed: f64 = agent
            .history
            .iter()
            .map(|record| self.decay_factor(now - record.recorded_at) * record.score)
            .sum();
        Ok((agent.score + decayed).clamp(-1.0, 1.0))
    }

    /// Deep copy of one agent
    pub fn get_agent(&self, id: &NodeId) -> Result<Agent> {
        self.agents
            .get(id)
            .map(|agent| agent.clone())
            .ok_or_else(|| ReputationError::AgentNotFound(id.clone()))
    }

    /// Agents ranked by score, descending, limited to `limit`
    pub fn ranked(&self, limit: usize) -> Vec<(NodeId, f64)> {
        let mut agents: Vec<(NodeId, f64)> = self
            .agents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().score))
            .collect();
        agents.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        agents.truncate(limit);
        agents
    }

    /// Aggregate statistics
    pub fn get_statistics(&self) -> EngineStatistics {
        let mut stats = EngineStatistics {
            lowest_score: f64::MAX,
            highest_score: f64::MIN,
            ..Default::default()
        };
        for entry in self.agents.iter() {
            let score = entry.value().score;
            stats.total_agents += 1;
            stats.average_score += score;
            stats.highest_score = stats.highest_score.max(score);
            stats.lowest_score = stats.lowest_score.min(score);
        }
        if stats.total_agents > 0 {
            stats.average_score /= stats.total_agents as f64;
            self.metrics.mean_score.set(stats.average_score);
        } else {
            stats.highest_score = 0.0;
            stats.lowest_score = 0.0;
        }
        stats
    }

    /// Number of registered agents
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Metrics registry for scraping
    pub fn metrics(&self) -> &ReputationMetrics {
        &self.metrics
    }

    /// `max(min_decay_factor, 0.5^(age / half_life))`
    fn decay_factor(&self, age_secs: i64) -> f64 {
        let age = age_secs.max(0) as f64;
        let half_lives = age / self.config.half_life_secs as f64;
        0.5f64.powf(half_lives).max(self.config.min_decay_factor)
    }
}

impl Default for ReputationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
