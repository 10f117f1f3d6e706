//! Tier vocabulary and cross-tier cost/latency accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One identification attempt at a given cost/accuracy level.
/// Tier1 is cheapest and streaming-capable; Tier3 most expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Tier1,
    #[serde(rename = "tier1_5")]
    Tier1_5,
    Tier2,
    Tier3,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tier1 => write!(f, "tier1"),
            Self::Tier1_5 => write!(f, "tier1_5"),
            Self::Tier2 => write!(f, "tier2"),
            Self::Tier3 => write!(f, "tier3"),
        }
    }
}

/// Audit record for one executed tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierResult {
    pub model: String,
    pub confidence: u8,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Cost/latency/provenance aggregated across every tier actually
/// executed, not just the one whose output was surfaced. Attached to
/// the final result for audit and UI display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EscalationMeta {
    /// At most one entry per tier key
    pub tiers: BTreeMap<Tier, TierResult>,
    pub final_tier: Option<Tier>,
    pub total_cost_usd: f64,
    pub total_latency_ms: u64,
}

impl EscalationMeta {
    /// Record a tier execution. A repeat record for the same tier
    /// replaces the prior entry (its cost is backed out first), so the
    /// map never holds more than one entry per tier and totals always
    /// sum over what the map holds.
    pub fn record(&mut self, tier: Tier, result: TierResult) {
        if let Some(prior) = self.tiers.insert(tier, result.clone()) {
            self.total_cost_usd -= prior.cost_usd;
            self.total_latency_ms = self.total_latency_ms.saturating_sub(prior.latency_ms);
        }
        self.total_cost_usd += result.cost_usd;
        self.total_latency_ms += result.latency_ms;
    }

    /// Mark which tier's output was ultimately surfaced.
    pub fn finish(&mut self, tier: Tier) {
        self.final_tier = Some(tier);
    }
}
