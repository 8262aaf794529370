use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, Result};
use crate::types::LimitBase;

/// engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub term_rules: TermRules,
    pub prepayment_rules: PrepaymentRules,
    pub underwriting_rules: UnderwritingRules,
}

/// bounds on term length
///
/// Canadian terms run 3-5 years by convention; the half-year tolerance on
/// either side accepts the odd 2.5 or 5.5 year product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermRules {
    pub min_term_years: Decimal,
    pub max_term_years: Decimal,
}

/// annual prepayment allowance rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepaymentRules {
    /// amount the limit percent applies to
    pub limit_base: LimitBase,
    /// fallback when a mortgage does not specify its own limit percent
    pub default_annual_limit_percent: u32,
    /// skipped payments allowed per calendar year
    pub max_skips_per_year: u32,
}

/// regulatory ceilings applied when opening or updating a mortgage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnderwritingRules {
    pub max_ltv_percent: Decimal,
    pub max_ltv_percent_high_ratio: Decimal,
    pub max_amortization_months: u32,
    pub max_amortization_months_high_ratio: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            term_rules: TermRules {
                min_term_years: dec!(2.5),
                max_term_years: dec!(6.0),
            },
            prepayment_rules: PrepaymentRules {
                limit_base: LimitBase::OriginalPrincipal,
                default_annual_limit_percent: 20,
                max_skips_per_year: 2,
            },
            underwriting_rules: UnderwritingRules {
                max_ltv_percent: dec!(80),
                max_ltv_percent_high_ratio: dec!(95),
                max_amortization_months: 360,
                max_amortization_months_high_ratio: 300,
            },
        }
    }
}

impl EngineConfig {
    /// check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.term_rules.min_term_years <= Decimal::ZERO
            || self.term_rules.min_term_years >= self.term_rules.max_term_years
        {
            return Err(EngineError::InvalidConfiguration {
                message: format!(
                    "term length bounds inverted: {} to {}",
                    self.term_rules.min_term_years, self.term_rules.max_term_years
                ),
            });
        }

        if self.prepayment_rules.default_annual_limit_percent > 100 {
            return Err(EngineError::InvalidConfiguration {
                message: format!(
                    "annual prepayment limit percent out of range: {}",
                    self.prepayment_rules.default_annual_limit_percent
                ),
            });
        }

        let ltv = &self.underwriting_rules;
        if ltv.max_ltv_percent <= Decimal::ZERO
            || ltv.max_ltv_percent > dec!(100)
            || ltv.max_ltv_percent_high_ratio <= Decimal::ZERO
            || ltv.max_ltv_percent_high_ratio > dec!(100)
        {
            return Err(EngineError::InvalidConfiguration {
                message: "ltv ceilings must lie in (0, 100]".to_string(),
            });
        }

        if ltv.max_amortization_months == 0 || ltv.max_amortization_months_high_ratio == 0 {
            return Err(EngineError::InvalidConfiguration {
                message: "amortization ceilings must be positive".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prepayment_rules.max_skips_per_year, 2);
        assert_eq!(config.term_rules.min_term_years, dec!(2.5));
    }

    #[test]
    fn test_inverted_term_bounds_rejected() {
        let mut config = EngineConfig::default();
        config.term_rules.min_term_years = dec!(7);
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.prepayment_rules.default_annual_limit_percent, 20);
    }
}
