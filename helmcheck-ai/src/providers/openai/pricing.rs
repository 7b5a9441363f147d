//! Model pricing and context windows

/// USD per 1,000 tokens
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

pub const GPT_4: &str = "gpt-4";
pub const GPT_4_TURBO: &str = "gpt-4-turbo-preview";
pub const GPT_4O: &str = "gpt-4o";
pub const GPT_35_TURBO: &str = "gpt-3.5-turbo";

const GPT_4_PRICING: ModelPricing = ModelPricing {
    prompt_per_1k: 0.03,
    completion_per_1k: 0.06,
};

/// Pricing for `model`; unknown models are priced as gpt-4
pub fn model_pricing(model: &str) -> ModelPricing {
    match model {
        GPT_4_TURBO => ModelPricing {
            prompt_per_1k: 0.01,
            completion_per_1k: 0.03,
        },
        GPT_4O => ModelPricing {
            prompt_per_1k: 0.005,
            completion_per_1k: 0.015,
        },
        GPT_35_TURBO => ModelPricing {
            prompt_per_1k: 0.0005,
            completion_per_1k: 0.0015,
        },
        _ => GPT_4_PRICING,
    }
}

pub fn calculate_cost(prompt_tokens: u64, completion_tokens: u64, model: &str) -> f64 {
    let pricing = model_pricing(model);
    prompt_tokens as f64 / 1000.0 * pricing.prompt_per_1k
        + completion_tokens as f64 / 1000.0 * pricing.completion_per_1k
}

/// Maximum context length in tokens, when known
pub fn context_window(model: &str) -> Option<u64> {
    match model {
        GPT_4 => Some(8_192),
        GPT_4_TURBO | GPT_4O => Some(128_000),
        GPT_35_TURBO => Some(16_385),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost() {
        let cost = calculate_cost(1000, 1000, GPT_4O);
        assert!((cost - 0.02).abs() < 1e-9);

        let unknown = calculate_cost(1000, 0, "custom-model");
        assert!((unknown - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_context_windows() {
        assert_eq!(context_window(GPT_4), Some(8_192));
        assert_eq!(context_window(GPT_4O), Some(128_000));
        assert_eq!(context_window("mystery"), None);
    }
}
