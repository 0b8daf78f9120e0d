//! Static price table (§4.13 "Cost calculation"): `model_name →
//! (input_price_per_1k, output_price_per_1k)`. Unknown models contribute
//! zero cost and emit a warning rather than failing the record.

use std::collections::HashMap;

use sable_core::TokensConfig;

/// USD price per 1,000 tokens, input and output separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Price {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

/// A handful of realistic entries covering the provider families this
/// workspace's model clients target; callers override or extend via
/// `tokens.price_table`.
#[derive(Debug, Clone)]
pub struct PriceTable {
    entries: HashMap<String, Price>,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert("gpt-4o".to_string(), Price { input_per_1k: 0.0025, output_per_1k: 0.010 });
        entries.insert("gpt-4o-mini".to_string(), Price { input_per_1k: 0.00015, output_per_1k: 0.0006 });
        entries.insert("gemini-1.5-pro".to_string(), Price { input_per_1k: 0.00125, output_per_1k: 0.005 });
        entries.insert("deepseek-chat".to_string(), Price { input_per_1k: 0.00014, output_per_1k: 0.00028 });
        entries.insert("mistral-large-latest".to_string(), Price { input_per_1k: 0.002, output_per_1k: 0.006 });
        Self { entries }
    }
}

impl PriceTable {
    /// Build the default table with `config.price_table` entries layered
    /// on top, each overriding or adding to a default entry.
    pub fn from_config(config: &TokensConfig) -> Self {
        let mut table = Self::default();
        for (model, (input_per_1k, output_per_1k)) in &config.price_table {
            table.entries.insert(model.clone(), Price { input_per_1k: *input_per_1k, output_per_1k: *output_per_1k });
        }
        table
    }

    /// Cost in USD for the given token counts, or `None` for an
    /// unrecognized model — the caller logs the warning and treats it as
    /// zero cost (§4.13).
    pub fn cost(&self, model: &str, input_tokens: u32, output_tokens: u32) -> Option<f64> {
        let price = self.entries.get(model)?;
        let input_cost = (input_tokens as f64 / 1000.0) * price.input_per_1k;
        let output_cost = (output_tokens as f64 / 1000.0) * price.output_per_1k;
        Some(input_cost + output_cost)
    }
}
