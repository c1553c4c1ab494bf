//! Price output post-processing
//!
//! Rounds raw model output to whole currency units and renders it for
//! presentation.

/// Lowest quote considered plausible for a Leipzig apartment (EUR)
pub const MIN_PLAUSIBLE_PRICE: i64 = 20_000;

/// Highest quote considered plausible (EUR)
pub const MAX_PLAUSIBLE_PRICE: i64 = 1_400_000;

/// Round to the nearest whole unit, halves away from zero
pub fn round_price(raw: f64) -> i64 {
    raw.round() as i64
}

/// Configuration for price rendering
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub currency_symbol: String,
    pub thousands_separator: char,
    pub min_plausible: i64,
    pub max_plausible: i64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "€".to_string(),
            thousands_separator: ' ',
            min_plausible: MIN_PLAUSIBLE_PRICE,
            max_plausible: MAX_PLAUSIBLE_PRICE,
        }
    }
}

/// Renders rounded prices for the caller
pub struct PriceFormatter {
    config: OutputConfig,
}

impl PriceFormatter {
    pub fn new() -> Self {
        Self {
            config: OutputConfig::default(),
        }
    }

    pub fn with_config(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Group digits in thousands, e.g. `184865` -> `184 865 €`
    pub fn format(&self, price: i64) -> String {
        let digits = price.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (idx, ch) in digits.chars().enumerate() {
            if idx > 0 && (digits.len() - idx) % 3 == 0 {
                grouped.push(self.config.thousands_separator);
            }
            grouped.push(ch);
        }
        let sign = if price < 0 { "-" } else { "" };
        format!("{}{} {}", sign, grouped, self.config.currency_symbol)
    }

    /// Explain why a quote falls outside the range the model was fitted on
    pub fn plausibility_note(&self, price: i64) -> Option<String> {
        if price < self.config.min_plausible {
            Some("Estimate is below the range of observed offers; small apartments are underestimated by the linear model".to_string())
        } else if price > self.config.max_plausible {
            Some("Estimate is above the range of observed offers".to_string())
        } else {
            None
        }
    }
}

impl Default for PriceFormatter {
    fn default() -> Self {
        Self::new()
    }
}
