//! Token spend, task effectiveness, and agent utilization bookkeeping
//! (§4.7 FinanceTracker). Rates and the stability rule are carried over
//! unchanged from the legacy tracker.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// $/prompt-token, matching gpt-4o-mini-class pricing the legacy tracker
/// hardcoded.
const PROMPT_TOKEN_RATE: f64 = 0.000_000_15;
/// $/completion-token.
const COMPLETION_TOKEN_RATE: f64 = 0.000_000_6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub timestamp: DateTime<Utc>,
    pub amount: f64,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
    pub estimated_cost: f64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EffectivenessMetrics {
    pub total_tasks: u64,
    pub first_time_pass: u64,
    pub second_time_pass: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub net: f64,
    pub total_spent: f64,
    pub tokens: TokenMetrics,
    pub completion_rate: f64,
    pub first_pass_rate: f64,
    pub utilization: BTreeMap<String, u64>,
}

/// Tracks money in/out, token spend, and per-agent call counts. A single
/// instance is shared (behind a mutex by its caller) across the whole run.
#[derive(Debug, Default)]
pub struct FinanceTracker {
    ledger: Vec<Transaction>,
    total_in: f64,
    total_out: f64,
    tokens: TokenMetrics,
    effectiveness: EffectivenessMetrics,
    utilization: BTreeMap<String, u64>,
}

impl FinanceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records token usage and books its estimated cost as a ledger entry.
    pub fn log_tokens(&mut self, prompt: u64, completion: u64, model: &str) {
        self.tokens.prompt += prompt;
        self.tokens.completion += completion;
        self.tokens.total += prompt + completion;

        #[allow(clippy::cast_precision_loss)]
        let cost = (prompt as f64) * PROMPT_TOKEN_RATE + (completion as f64) * COMPLETION_TOKEN_RATE;
        self.tokens.estimated_cost += cost;
        self.log_transaction(-cost, "token_cost", &format!("tokens for {model}"));
    }

    pub fn log_effectiveness(&mut self, attempts: u32, success: bool) {
        self.effectiveness.total_tasks += 1;
        if success {
            match attempts {
                1 => self.effectiveness.first_time_pass += 1,
                2 => self.effectiveness.second_time_pass += 1,
                _ => {}
            }
        } else {
            self.effectiveness.failures += 1;
        }
    }

    pub fn log_utilization(&mut self, agent_id: impl Into<String>) {
        *self.utilization.entry(agent_id.into()).or_insert(0) += 1;
    }

    /// Appends a ledger entry. Positive amounts are revenue, negative are
    /// spend; `total_in`/`total_out` track the unsigned magnitudes.
    pub fn log_transaction(&mut self, amount: f64, category: &str, description: &str) {
        self.ledger.push(Transaction {
            timestamp: Utc::now(),
            amount,
            category: category.to_string(),
            description: description.to_string(),
        });
        if amount > 0.0 {
            self.total_in += amount;
        } else {
            self.total_out += amount.abs();
        }
        info!(category, amount, description, "financial event");
    }

    #[must_use]
    pub fn get_profitability(&self) -> f64 {
        self.total_in - self.total_out
    }

    /// §4.7: operation is no longer viable once spend outruns ten times
    /// revenue plus a $100 floor.
    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.total_out <= self.total_in * 10.0 + 100.0
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        let total_tasks = self.effectiveness.total_tasks.max(1) as f64;
        let completion_rate = (self.effectiveness.first_time_pass
            + self.effectiveness.second_time_pass) as f64
            / total_tasks;
        let first_pass_rate = self.effectiveness.first_time_pass as f64 / total_tasks;
        Summary {
            net: self.get_profitability(),
            total_spent: self.total_out,
            tokens: self.tokens.clone(),
            completion_rate,
            first_pass_rate,
            utilization: self.utilization.clone(),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &[Transaction] {
        &self.ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_cost_matches_legacy_rates() {
        let mut tracker = FinanceTracker::new();
        tracker.log_tokens(1_000_000, 1_000_000, "gpt-4o-mini");
        assert!((tracker.tokens.estimated_cost - 0.75).abs() < 1e-9);
        assert!(tracker.get_profitability() < 0.0);
    }

    #[test]
    fn stability_rule_matches_legacy_threshold() {
        let mut tracker = FinanceTracker::new();
        tracker.log_transaction(0.0, "seed", "no revenue yet");
        tracker.log_transaction(-100.0, "spend", "within floor");
        assert!(tracker.is_stable());
        tracker.log_transaction(-1.0, "spend", "over the floor");
        assert!(!tracker.is_stable());
    }

    #[test]
    fn effectiveness_buckets_by_attempt_count() {
        let mut tracker = FinanceTracker::new();
        tracker.log_effectiveness(1, true);
        tracker.log_effectiveness(2, true);
        tracker.log_effectiveness(1, false);
        let summary = tracker.summary();
        assert_eq!(summary.first_pass_rate, 1.0 / 3.0);
    }
}
