//! Per-model token pricing and best-effort cost computation.

use serde::{Deserialize, Serialize};

use super::types::Usage;

/// USD prices per 1M tokens for each usage bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(default)]
    pub input_per_mtok_usd: f64,
    #[serde(default)]
    pub output_per_mtok_usd: f64,
    #[serde(default)]
    pub cache_read_per_mtok_usd: f64,
    #[serde(default)]
    pub cache_write_per_mtok_usd: f64,
}

/// USD cost for a usage snapshot under the given pricing.
pub fn calculate_cost(usage: &Usage, pricing: &ModelPricing) -> f64 {
    let per_mtok = |tokens: u64, price: f64| (tokens as f64 / 1_000_000.0) * price;
    per_mtok(usage.input_tokens, pricing.input_per_mtok_usd)
        + per_mtok(usage.output_tokens, pricing.output_per_mtok_usd)
        + per_mtok(usage.cache_read_tokens, pricing.cache_read_per_mtok_usd)
        + per_mtok(usage.cache_write_tokens, pricing.cache_write_per_mtok_usd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_sums_all_buckets() {
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 500_000,
            cache_read_tokens: 2_000_000,
            cache_write_tokens: 100_000,
            ..Usage::default()
        };
        let pricing = ModelPricing {
            input_per_mtok_usd: 3.0,
            output_per_mtok_usd: 15.0,
            cache_read_per_mtok_usd: 0.3,
            cache_write_per_mtok_usd: 3.75,
        };
        let cost = calculate_cost(&usage, &pricing);
        let expected = 3.0 + 7.5 + 0.6 + 0.375;
        assert!((cost - expected).abs() < 1e-9, "cost = {cost}");
    }

    #[test]
    fn zero_usage_costs_nothing() {
        let pricing = ModelPricing {
            input_per_mtok_usd: 3.0,
            ..ModelPricing::default()
        };
        assert_eq!(calculate_cost(&Usage::default(), &pricing), 0.0);
    }
}
