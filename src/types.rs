use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// unique identifier for a mortgage
pub type MortgageId = Uuid;

/// unique identifier for a mortgage term
pub type TermId = Uuid;

/// unique identifier for a payment record
pub type PaymentId = Uuid;

/// unique identifier for a user
pub type UserId = Uuid;

/// payment frequency for Canadian mortgages
///
/// Accelerated frequencies share the period count of their ordinary
/// counterpart; the acceleration comes from the payment amount (half or a
/// quarter of the monthly payment), not from the rate conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentFrequency {
    Monthly,
    SemiMonthly,
    Biweekly,
    AcceleratedBiweekly,
    Weekly,
    AcceleratedWeekly,
}

impl PaymentFrequency {
    /// number of payments per year
    pub fn periods_per_year(&self) -> u32 {
        match self {
            PaymentFrequency::Monthly => 12,
            PaymentFrequency::SemiMonthly => 24,
            PaymentFrequency::Biweekly => 26,
            PaymentFrequency::AcceleratedBiweekly => 26,
            PaymentFrequency::Weekly => 52,
            PaymentFrequency::AcceleratedWeekly => 52,
        }
    }

    /// whether the payment amount derives from the monthly payment
    pub fn is_accelerated(&self) -> bool {
        matches!(
            self,
            PaymentFrequency::AcceleratedBiweekly | PaymentFrequency::AcceleratedWeekly
        )
    }
}

/// rate arrangement for a mortgage term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TermType {
    /// rate locked for the whole term
    Fixed,
    /// payment recalculates when prime changes
    VariableChanging,
    /// payment stays constant, principal portion absorbs rate moves
    VariableFixed,
}

impl TermType {
    pub fn is_variable(&self) -> bool {
        matches!(self, TermType::VariableChanging | TermType::VariableFixed)
    }
}

/// derived lifecycle state of a term relative to "today"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermStatus {
    /// start date is still in the future
    Pending,
    /// today falls within [start, end]
    Active,
    /// end date has passed
    Expired,
}

/// base amount the annual prepayment cap is computed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitBase {
    /// cap = limit percent of the original principal (lender convention)
    OriginalPrincipal,
    /// cap = limit percent of the current balance
    CurrentBalance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periods_per_year() {
        assert_eq!(PaymentFrequency::Monthly.periods_per_year(), 12);
        assert_eq!(PaymentFrequency::SemiMonthly.periods_per_year(), 24);
        assert_eq!(PaymentFrequency::Biweekly.periods_per_year(), 26);
        assert_eq!(PaymentFrequency::AcceleratedBiweekly.periods_per_year(), 26);
        assert_eq!(PaymentFrequency::Weekly.periods_per_year(), 52);
        assert_eq!(PaymentFrequency::AcceleratedWeekly.periods_per_year(), 52);
    }

    #[test]
    fn test_term_type_variants() {
        assert!(!TermType::Fixed.is_variable());
        assert!(TermType::VariableChanging.is_variable());
        assert!(TermType::VariableFixed.is_variable());
    }

    #[test]
    fn test_frequency_serde_names() {
        let json = serde_json::to_string(&PaymentFrequency::AcceleratedBiweekly).unwrap();
        assert_eq!(json, "\"accelerated-biweekly\"");

        let parsed: PaymentFrequency = serde_json::from_str("\"semi-monthly\"").unwrap();
        assert_eq!(parsed, PaymentFrequency::SemiMonthly);
    }
}
