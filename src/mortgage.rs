//! Mortgage aggregate operations: opening, updating, cascade deletion.
//!
//! Canadian underwriting ceilings apply on create and update: LTV at most
//! 80% uninsured or 95% insured, amortization at most 30 years uninsured or
//! 25 years insured.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::model::{Mortgage, MortgagePatch, NewMortgage};
use crate::store::{MortgageStore, PaymentStore, TermStore};
use crate::types::{MortgageId, UserId};

/// validates and mutates mortgage records
pub struct MortgageManager {
    mortgages: Arc<dyn MortgageStore>,
    terms: Arc<dyn TermStore>,
    payments: Arc<dyn PaymentStore>,
    config: EngineConfig,
}

impl MortgageManager {
    pub fn new(
        mortgages: Arc<dyn MortgageStore>,
        terms: Arc<dyn TermStore>,
        payments: Arc<dyn PaymentStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            mortgages,
            terms,
            payments,
            config,
        }
    }

    fn authorize(&self, mortgage_id: MortgageId, user_id: UserId) -> Result<Mortgage> {
        let mortgage = self
            .mortgages
            .find_by_id(mortgage_id)?
            .ok_or(EngineError::NotFound {
                entity: "mortgage",
                id: mortgage_id,
            })?;
        if mortgage.user_id != user_id {
            return Err(EngineError::Unauthorized {
                mortgage_id,
                user_id,
            });
        }
        Ok(mortgage)
    }

    /// open a mortgage for a user
    pub fn create_mortgage(&self, user_id: UserId, input: NewMortgage) -> Result<Mortgage> {
        let mortgage = Mortgage {
            id: Uuid::new_v4(),
            user_id,
            property_price: input.property_price,
            down_payment: input.down_payment,
            original_amount: input.original_amount,
            current_balance: input.current_balance,
            start_date: input.start_date,
            amortization_years: input.amortization_years,
            amortization_months: input.amortization_months,
            payment_frequency: input.payment_frequency,
            annual_prepayment_limit_percent: input.annual_prepayment_limit_percent,
            insurance: input.insurance,
            is_high_ratio: input.is_high_ratio,
        };
        self.validate(&mortgage)?;
        self.mortgages.insert(mortgage.clone())?;
        Ok(mortgage)
    }

    /// fetch a mortgage the user owns
    pub fn get_mortgage(&self, mortgage_id: MortgageId, user_id: UserId) -> Result<Mortgage> {
        self.authorize(mortgage_id, user_id)
    }

    /// all mortgages owned by a user
    pub fn list_for_user(&self, user_id: UserId) -> Result<Vec<Mortgage>> {
        self.mortgages.find_by_user(user_id)
    }

    /// apply a partial update, re-validating the merged record
    pub fn update_mortgage(
        &self,
        mortgage_id: MortgageId,
        user_id: UserId,
        patch: MortgagePatch,
    ) -> Result<Mortgage> {
        let mut mortgage = self.authorize(mortgage_id, user_id)?;

        if let Some(property_price) = patch.property_price {
            mortgage.property_price = property_price;
        }
        if let Some(down_payment) = patch.down_payment {
            mortgage.down_payment = down_payment;
        }
        if let Some(current_balance) = patch.current_balance {
            mortgage.current_balance = current_balance;
        }
        if let Some(years) = patch.amortization_years {
            mortgage.amortization_years = years;
        }
        if let Some(months) = patch.amortization_months {
            mortgage.amortization_months = months;
        }
        if let Some(frequency) = patch.payment_frequency {
            mortgage.payment_frequency = frequency;
        }
        if let Some(limit) = patch.annual_prepayment_limit_percent {
            mortgage.annual_prepayment_limit_percent = Some(limit);
        }
        if let Some(insurance) = patch.insurance {
            mortgage.insurance = insurance;
        }
        if let Some(is_high_ratio) = patch.is_high_ratio {
            mortgage.is_high_ratio = is_high_ratio;
        }

        self.validate(&mortgage)?;
        self.mortgages.update(&mortgage)?;
        Ok(mortgage)
    }

    /// delete a mortgage and everything under it
    ///
    /// Children go first (payments, then terms, then the mortgage itself) so
    /// a failure partway never leaves orphaned payments pointing at a
    /// missing parent.
    pub fn delete_mortgage(&self, mortgage_id: MortgageId, user_id: UserId) -> Result<()> {
        self.authorize(mortgage_id, user_id)?;
        self.payments.delete_by_mortgage(mortgage_id)?;
        self.terms.delete_by_mortgage(mortgage_id)?;
        self.mortgages.delete(mortgage_id)
    }

    fn validate(&self, mortgage: &Mortgage) -> Result<()> {
        if !mortgage.property_price.is_positive() {
            return Err(EngineError::InvalidConfiguration {
                message: "property price must be greater than zero".to_string(),
            });
        }

        let rules = &self.config.underwriting_rules;
        let max_ltv = if mortgage.is_high_ratio {
            rules.max_ltv_percent_high_ratio
        } else {
            rules.max_ltv_percent
        };
        let ltv = mortgage.original_amount.as_decimal()
            / mortgage.property_price.as_decimal()
            * dec!(100);
        if ltv > max_ltv {
            return Err(EngineError::LtvExceeded {
                ltv: ltv.round_dp(1),
                max_ltv,
                is_high_ratio: mortgage.is_high_ratio,
            });
        }

        let max_months = if mortgage.is_high_ratio {
            rules.max_amortization_months_high_ratio
        } else {
            rules.max_amortization_months
        };
        let months = mortgage.total_amortization_months();
        if months > max_months {
            return Err(EngineError::AmortizationTooLong {
                months,
                max_months,
                is_high_ratio: mortgage.is_high_ratio,
            });
        }

        Ok(())
    }
}

/// loan-to-value as a percentage, for display surfaces
pub fn ltv_percent(original_amount: Decimal, property_price: Decimal) -> Option<Decimal> {
    if property_price <= Decimal::ZERO {
        return None;
    }
    Some((original_amount / property_price * dec!(100)).round_dp(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::model::{MortgagePayment, MortgageTerm};
    use crate::decimal::Rate;
    use crate::store::MemoryStore;
    use crate::types::{PaymentFrequency, TermType};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::from_str_exact(s).unwrap()
    }

    fn manager() -> (Arc<MemoryStore>, MortgageManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = MortgageManager::new(
            Arc::clone(&store) as Arc<dyn MortgageStore>,
            Arc::clone(&store) as Arc<dyn TermStore>,
            Arc::clone(&store) as Arc<dyn PaymentStore>,
            EngineConfig::default(),
        );
        (store, manager)
    }

    fn new_mortgage(original: &str, property: &str, years: u32, high_ratio: bool) -> NewMortgage {
        NewMortgage {
            property_price: money(property),
            down_payment: money("150000.00"),
            original_amount: money(original),
            current_balance: money(original),
            start_date: date(2020, 1, 1),
            amortization_years: years,
            amortization_months: 0,
            payment_frequency: PaymentFrequency::Monthly,
            annual_prepayment_limit_percent: Some(20),
            insurance: None,
            is_high_ratio: high_ratio,
        }
    }

    #[test]
    fn test_conventional_ltv_ceiling() {
        let (_, manager) = manager();
        let user = Uuid::new_v4();

        // exactly 80% passes
        manager
            .create_mortgage(user, new_mortgage("600000.00", "750000.00", 25, false))
            .unwrap();

        // 85% uninsured fails
        let err = manager
            .create_mortgage(user, new_mortgage("637500.00", "750000.00", 25, false))
            .unwrap_err();
        assert!(matches!(err, EngineError::LtvExceeded { .. }));

        // but the same ratio is fine when insured
        manager
            .create_mortgage(user, new_mortgage("637500.00", "750000.00", 25, true))
            .unwrap();
    }

    #[test]
    fn test_amortization_ceilings() {
        let (_, manager) = manager();
        let user = Uuid::new_v4();

        manager
            .create_mortgage(user, new_mortgage("600000.00", "750000.00", 30, false))
            .unwrap();

        let err = manager
            .create_mortgage(user, new_mortgage("600000.00", "750000.00", 31, false))
            .unwrap_err();
        assert!(matches!(err, EngineError::AmortizationTooLong { .. }));

        // insured mortgages cap at 25 years
        let err = manager
            .create_mortgage(user, new_mortgage("600000.00", "750000.00", 30, true))
            .unwrap_err();
        assert!(matches!(err, EngineError::AmortizationTooLong { .. }));
    }

    #[test]
    fn test_update_revalidates() {
        let (_, manager) = manager();
        let user = Uuid::new_v4();
        let mortgage = manager
            .create_mortgage(user, new_mortgage("600000.00", "750000.00", 25, false))
            .unwrap();

        // dropping the property value below the LTV ceiling fails
        let err = manager
            .update_mortgage(
                mortgage.id,
                user,
                MortgagePatch {
                    property_price: Some(money("700000.00")),
                    ..MortgagePatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::LtvExceeded { .. }));

        let updated = manager
            .update_mortgage(
                mortgage.id,
                user,
                MortgagePatch {
                    current_balance: Some(money("550000.00")),
                    ..MortgagePatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.current_balance, money("550000.00"));
    }

    #[test]
    fn test_delete_cascades_children_first() {
        let (store, manager) = manager();
        let user = Uuid::new_v4();
        let mortgage = manager
            .create_mortgage(user, new_mortgage("600000.00", "750000.00", 25, false))
            .unwrap();

        let term = MortgageTerm {
            id: Uuid::new_v4(),
            mortgage_id: mortgage.id,
            term_type: TermType::Fixed,
            start_date: date(2020, 1, 1),
            end_date: date(2025, 1, 1),
            term_years: 5,
            fixed_rate: Some(Rate::from_percent("5.490".parse().unwrap())),
            prime_rate: None,
            locked_spread: None,
            variable_rate_cap: None,
            variable_rate_floor: None,
            payment_frequency: PaymentFrequency::Monthly,
            regular_payment_amount: money("3500.00"),
        };
        TermStore::insert(&*store, term.clone()).unwrap();
        PaymentStore::insert(
            &*store,
            MortgagePayment {
                id: Uuid::new_v4(),
                mortgage_id: mortgage.id,
                term_id: term.id,
                payment_date: date(2021, 6, 1),
                payment_period_label: None,
                regular_payment_amount: money("3500.00"),
                prepayment_amount: Money::ZERO,
                payment_amount: money("3500.00"),
                principal_paid: money("900.00"),
                interest_paid: money("2600.00"),
                remaining_balance: money("580000.00"),
                prime_rate: None,
                effective_rate: Rate::from_percent("5.490".parse().unwrap()),
                trigger_rate_hit: false,
                is_skipped: false,
                skipped_interest_accrued: Money::ZERO,
                remaining_amortization_months: 280,
                corrects_payment_id: None,
            },
        )
        .unwrap();

        manager.delete_mortgage(mortgage.id, user).unwrap();

        assert!(MortgageStore::find_by_id(&*store, mortgage.id)
            .unwrap()
            .is_none());
        assert!(TermStore::find_by_mortgage(&*store, mortgage.id)
            .unwrap()
            .is_empty());
        assert!(PaymentStore::find_by_mortgage(&*store, mortgage.id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_ownership_checked() {
        let (_, manager) = manager();
        let owner = Uuid::new_v4();
        let mortgage = manager
            .create_mortgage(owner, new_mortgage("600000.00", "750000.00", 25, false))
            .unwrap();

        let err = manager
            .delete_mortgage(mortgage.id, Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized { .. }));
        assert!(manager.get_mortgage(mortgage.id, owner).is_ok());
    }

    #[test]
    fn test_ltv_helper() {
        assert_eq!(
            ltv_percent(dec!(600000), dec!(750000)),
            Some(dec!(80.0))
        );
        assert_eq!(ltv_percent(dec!(600000), Decimal::ZERO), None);
    }
}
