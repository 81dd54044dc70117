// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Thread-safe token/cost accumulator shared across every agent invocation.
//! Mirrors the original `usage_tracker.py` singleton: one process-wide
//! instance, one lock, per-agent sub-totals.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use relay_config::{ModelPricing, TelemetryConfig};
use serde::Serialize;

#[derive(Debug, Default, Clone, Serialize)]
pub struct AgentUsage {
    pub prompt_tokens: u64,
    pub cached_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub total_prompt_tokens: u64,
    pub total_cached_tokens: u64,
    pub total_output_tokens: u64,
    pub cache_hit_rate_pct: f64,
    pub estimated_cost_usd: f64,
    pub estimated_cost_without_cache_usd: f64,
    pub estimated_savings_usd: f64,
    pub per_agent: HashMap<String, AgentUsage>,
}

struct Inner {
    started_at: Instant,
    total_prompt_tokens: u64,
    total_cached_tokens: u64,
    total_output_tokens: u64,
    total_requests: u64,
    estimated_cost_usd: f64,
    estimated_cost_without_cache_usd: f64,
    per_agent: HashMap<String, AgentUsage>,
}

impl Inner {
    fn fresh() -> Self {
        Self {
            started_at: Instant::now(),
            total_prompt_tokens: 0,
            total_cached_tokens: 0,
            total_output_tokens: 0,
            total_requests: 0,
            estimated_cost_usd: 0.0,
            estimated_cost_without_cache_usd: 0.0,
            per_agent: HashMap::new(),
        }
    }
}

/// The accumulator. One instance is expected to live for the life of the
/// process; `Clone` is not provided on purpose, share it behind an `Arc`.
pub struct UsageTracker {
    pricing: TelemetryConfig,
    inner: Mutex<Inner>,
}

impl UsageTracker {
    pub fn new(pricing: TelemetryConfig) -> Self {
        Self {
            pricing,
            inner: Mutex::new(Inner::fresh()),
        }
    }

    /// Resolves pricing by longest matching model-name prefix, falling back
    /// to the `_default` row on miss.
    fn pricing_for(&self, model: &str) -> ModelPricing {
        let lower = model.to_ascii_lowercase();
        let mut best: Option<(&str, &ModelPricing)> = None;
        for (prefix, price) in &self.pricing.pricing {
            if prefix == "_default" {
                continue;
            }
            if lower.starts_with(prefix.as_str()) {
                if best.map(|(p, _)| prefix.len() > p.len()).unwrap_or(true) {
                    best = Some((prefix.as_str(), price));
                }
            }
        }
        best.map(|(_, p)| p.clone()).unwrap_or_else(|| {
            self.pricing
                .pricing
                .get("_default")
                .cloned()
                .unwrap_or(ModelPricing {
                    input_price: 0.0,
                    cached_price: 0.0,
                    output_price: 0.0,
                })
        })
    }

    /// Records one invocation's token usage. Never returns an error: any
    /// internal failure is logged and swallowed, since telemetry is
    /// read-only observability and must never affect the pipeline.
    pub fn record(
        &self,
        prompt_tokens: u64,
        cached_tokens: u64,
        output_tokens: u64,
        agent_name: &str,
        model: &str,
    ) {
        let Ok(mut guard) = self.inner.lock() else {
            tracing::warn!("telemetry mutex poisoned, dropping this record");
            return;
        };

        let price = self.pricing_for(model);
        let fresh_input = prompt_tokens.saturating_sub(cached_tokens);
        let cost = (fresh_input as f64 / 1e6) * price.input_price
            + (cached_tokens as f64 / 1e6) * price.cached_price
            + (output_tokens as f64 / 1e6) * price.output_price;
        let cost_without_cache = (prompt_tokens as f64 / 1e6) * price.input_price
            + (output_tokens as f64 / 1e6) * price.output_price;

        guard.total_prompt_tokens += prompt_tokens;
        guard.total_cached_tokens += cached_tokens;
        guard.total_output_tokens += output_tokens;
        guard.total_requests += 1;
        guard.estimated_cost_usd += cost;
        guard.estimated_cost_without_cache_usd += cost_without_cache;

        let agent = guard.per_agent.entry(agent_name.to_string()).or_default();
        agent.prompt_tokens += prompt_tokens;
        agent.cached_tokens += cached_tokens;
        agent.output_tokens += output_tokens;
        agent.requests += 1;
        agent.cost_usd += cost;
    }

    pub fn snapshot(&self) -> Snapshot {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let cache_rate = if guard.total_prompt_tokens > 0 {
            guard.total_cached_tokens as f64 / guard.total_prompt_tokens as f64 * 100.0
        } else {
            0.0
        };
        Snapshot {
            uptime_seconds: guard.started_at.elapsed().as_secs_f64(),
            total_requests: guard.total_requests,
            total_prompt_tokens: guard.total_prompt_tokens,
            total_cached_tokens: guard.total_cached_tokens,
            total_output_tokens: guard.total_output_tokens,
            cache_hit_rate_pct: cache_rate,
            estimated_cost_usd: guard.estimated_cost_usd,
            estimated_cost_without_cache_usd: guard.estimated_cost_without_cache_usd,
            estimated_savings_usd: guard.estimated_cost_without_cache_usd - guard.estimated_cost_usd,
            per_agent: guard.per_agent.clone(),
        }
    }

    pub fn reset(&self) {
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        *guard = Inner::fresh();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> UsageTracker {
        UsageTracker::new(TelemetryConfig::default())
    }

    #[test]
    fn record_is_additive_across_calls() {
        let t = tracker();
        t.record(100, 0, 50, "agent-a", "gemini-2.0-flash");
        t.record(200, 10, 25, "agent-a", "gemini-2.0-flash");
        let snap = t.snapshot();
        assert_eq!(snap.total_prompt_tokens, 300);
        assert_eq!(snap.total_cached_tokens, 10);
        assert_eq!(snap.total_output_tokens, 75);
        assert_eq!(snap.total_requests, 2);
    }

    #[test]
    fn unknown_model_falls_back_to_default_pricing() {
        let t = tracker();
        t.record(1_000_000, 0, 0, "agent", "some-unlisted-model");
        let snap = t.snapshot();
        // default pricing in Config::default() has zero rates, so cost stays zero
        assert_eq!(snap.estimated_cost_usd, 0.0);
    }

    #[test]
    fn longest_prefix_match_wins_over_shorter_one() {
        let mut cfg = TelemetryConfig::default();
        cfg.pricing.insert(
            "gemini".into(),
            ModelPricing {
                input_price: 1.0,
                cached_price: 1.0,
                output_price: 1.0,
            },
        );
        cfg.pricing.insert(
            "gemini-2.0-flash".into(),
            ModelPricing {
                input_price: 2.0,
                cached_price: 2.0,
                output_price: 2.0,
            },
        );
        let t = UsageTracker::new(cfg);
        t.record(1_000_000, 0, 0, "a", "gemini-2.0-flash-lite");
        let snap = t.snapshot();
        assert_eq!(snap.estimated_cost_usd, 2.0);
    }

    #[test]
    fn per_agent_breakdown_is_isolated() {
        let t = tracker();
        t.record(100, 0, 0, "a", "gemini-2.0-flash");
        t.record(50, 0, 0, "b", "gemini-2.0-flash");
        let snap = t.snapshot();
        assert_eq!(snap.per_agent["a"].prompt_tokens, 100);
        assert_eq!(snap.per_agent["b"].prompt_tokens, 50);
    }

    #[test]
    fn reset_clears_all_counters_and_restarts_uptime() {
        let t = tracker();
        t.record(100, 0, 0, "a", "gemini-2.0-flash");
        t.reset();
        let snap = t.snapshot();
        assert_eq!(snap.total_requests, 0);
        assert!(snap.per_agent.is_empty());
    }
}
