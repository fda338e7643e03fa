use std::collections::HashMap;

use bigdecimal::{BigDecimal, RoundingMode};

use crate::config::{LlmConfig, ModelPricing};

/// Credits are stored with this many decimal places.
pub const CREDIT_SCALE: i64 = 8;

/// Per-million-token prices by model identifier.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: HashMap<String, ModelPricing>,
    fallback: ModelPricing,
}

impl PricingTable {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            models: config
                .pricing
                .iter()
                .map(|p| (p.model.clone(), p.clone()))
                .collect(),
            fallback: config.default_pricing.clone(),
        }
    }

    pub fn price_for(&self, model: &str) -> &ModelPricing {
        self.models.get(model).unwrap_or(&self.fallback)
    }

    /// `prompt/1e6 × input + completion/1e6 × output`, rounded to credit scale.
    pub fn cost(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> BigDecimal {
        let pricing = self.price_for(model);
        let per_million = BigDecimal::from(1_000_000);
        let input = BigDecimal::from(prompt_tokens) * &pricing.input_price / &per_million;
        let output = BigDecimal::from(completion_tokens) * &pricing.output_price / &per_million;
        (input + output).with_scale_round(CREDIT_SCALE, RoundingMode::HalfUp)
    }
}
