use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{
    MortgageId, PaymentFrequency, PaymentId, TermId, TermStatus, TermType, UserId,
};

/// mortgage default insurance details for high-ratio mortgages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsuranceInfo {
    /// e.g. "CMHC", "Sagen"
    pub provider: String,
    pub premium: Money,
    pub added_to_principal: bool,
}

/// principal-level aggregate: one mortgage on one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mortgage {
    pub id: MortgageId,
    pub user_id: UserId,
    pub property_price: Money,
    pub down_payment: Money,
    pub original_amount: Money,
    pub current_balance: Money,
    pub start_date: NaiveDate,
    pub amortization_years: u32,
    pub amortization_months: u32,
    pub payment_frequency: PaymentFrequency,
    /// annual prepayment allowance as a percent of the limit base (10-20
    /// typical); `None` falls back to the engine's configured default
    pub annual_prepayment_limit_percent: Option<u32>,
    pub insurance: Option<InsuranceInfo>,
    pub is_high_ratio: bool,
}

impl Mortgage {
    /// full amortization length in months
    pub fn total_amortization_months(&self) -> u32 {
        self.amortization_years * 12 + self.amortization_months
    }
}

/// input for opening a mortgage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMortgage {
    pub property_price: Money,
    pub down_payment: Money,
    pub original_amount: Money,
    pub current_balance: Money,
    pub start_date: NaiveDate,
    pub amortization_years: u32,
    pub amortization_months: u32,
    pub payment_frequency: PaymentFrequency,
    pub annual_prepayment_limit_percent: Option<u32>,
    pub insurance: Option<InsuranceInfo>,
    pub is_high_ratio: bool,
}

/// partial update for a mortgage; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MortgagePatch {
    pub property_price: Option<Money>,
    pub down_payment: Option<Money>,
    pub current_balance: Option<Money>,
    pub amortization_years: Option<u32>,
    pub amortization_months: Option<u32>,
    pub payment_frequency: Option<PaymentFrequency>,
    pub annual_prepayment_limit_percent: Option<u32>,
    pub insurance: Option<Option<InsuranceInfo>>,
    pub is_high_ratio: Option<bool>,
}

/// a rate-lock period belonging to exactly one mortgage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortgageTerm {
    pub id: TermId,
    pub mortgage_id: MortgageId,
    pub term_type: TermType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub term_years: u32,
    /// nominal annual rate, set only for fixed terms
    pub fixed_rate: Option<Rate>,
    /// prime rate snapshot, set only for variable terms
    pub prime_rate: Option<Rate>,
    /// spread relative to prime locked at origination, set only for variable terms
    pub locked_spread: Option<Rate>,
    /// maximum rate increase relative to the current rate
    pub variable_rate_cap: Option<Rate>,
    /// absolute rate floor
    pub variable_rate_floor: Option<Rate>,
    pub payment_frequency: PaymentFrequency,
    pub regular_payment_amount: Money,
}

impl MortgageTerm {
    /// annualized rate in force: the fixed rate, or prime plus locked spread
    pub fn effective_rate(&self) -> Rate {
        match self.term_type {
            TermType::Fixed => self.fixed_rate.unwrap_or(Rate::ZERO),
            TermType::VariableChanging | TermType::VariableFixed => {
                self.prime_rate.unwrap_or(Rate::ZERO)
                    + self.locked_spread.unwrap_or(Rate::ZERO)
            }
        }
    }

    /// lifecycle state relative to `today`
    pub fn status(&self, today: NaiveDate) -> TermStatus {
        if today < self.start_date {
            TermStatus::Pending
        } else if today > self.end_date {
            TermStatus::Expired
        } else {
            TermStatus::Active
        }
    }

    /// whether a date falls within the term, boundaries included
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// apply the term's floor and relative cap to a proposed effective rate
    ///
    /// Returns the adjusted rate and whether clamping occurred. The cap is
    /// relative to the rate currently in force; the floor is absolute.
    pub fn clamp_rate(&self, proposed: Rate) -> (Rate, bool) {
        let mut adjusted = proposed;
        if let Some(floor) = self.variable_rate_floor {
            if adjusted < floor {
                adjusted = floor;
            }
        }
        if let Some(cap) = self.variable_rate_cap {
            let max_allowed = self.effective_rate() + cap;
            if adjusted > max_allowed {
                adjusted = max_allowed;
            }
        }
        (adjusted, adjusted != proposed)
    }
}

/// input for creating a term on a mortgage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTerm {
    pub term_type: TermType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub term_years: u32,
    pub fixed_rate: Option<Rate>,
    pub prime_rate: Option<Rate>,
    pub locked_spread: Option<Rate>,
    pub variable_rate_cap: Option<Rate>,
    pub variable_rate_floor: Option<Rate>,
    pub payment_frequency: PaymentFrequency,
    pub regular_payment_amount: Money,
}

/// partial update for a term; `None` leaves the field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermPatch {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub term_years: Option<u32>,
    pub fixed_rate: Option<Option<Rate>>,
    pub prime_rate: Option<Option<Rate>>,
    pub locked_spread: Option<Option<Rate>>,
    pub variable_rate_cap: Option<Option<Rate>>,
    pub variable_rate_floor: Option<Option<Rate>>,
    pub payment_frequency: Option<PaymentFrequency>,
    pub regular_payment_amount: Option<Money>,
}

/// append-only payment record belonging to one term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MortgagePayment {
    pub id: PaymentId,
    pub mortgage_id: MortgageId,
    pub term_id: TermId,
    /// business-day-adjusted date the payment lands on
    pub payment_date: NaiveDate,
    pub payment_period_label: Option<String>,
    pub regular_payment_amount: Money,
    pub prepayment_amount: Money,
    /// regular + prepayment
    pub payment_amount: Money,
    pub principal_paid: Money,
    pub interest_paid: Money,
    pub remaining_balance: Money,
    /// prime rate snapshot for variable terms
    pub prime_rate: Option<Rate>,
    pub effective_rate: Rate,
    pub trigger_rate_hit: bool,
    pub is_skipped: bool,
    pub skipped_interest_accrued: Money,
    pub remaining_amortization_months: u32,
    /// set when this record supersedes an earlier payment
    pub corrects_payment_id: Option<PaymentId>,
}

/// input for recording a payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    pub term_id: TermId,
    pub payment_date: NaiveDate,
    pub payment_period_label: Option<String>,
    pub regular_payment_amount: Money,
    pub prepayment_amount: Money,
    /// rate to use instead of the term's current rate, for backfilled payments
    pub effective_rate_override: Option<Rate>,
    pub remaining_amortization_months: Option<u32>,
}

/// append-only record of a published prime rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimeRateEntry {
    pub id: uuid::Uuid,
    pub rate: Rate,
    pub effective_date: NaiveDate,
    pub source: String,
}
