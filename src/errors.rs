use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::decimal::Money;
use crate::types::{MortgageId, PaymentFrequency, TermId, UserId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: uuid::Uuid,
    },

    #[error("mortgage {mortgage_id} is not owned by user {user_id}")]
    Unauthorized {
        mortgage_id: MortgageId,
        user_id: UserId,
    },

    #[error("term end date must be after start date: start {start}, end {end}")]
    InvalidDateOrder { start: NaiveDate, end: NaiveDate },

    #[error("term length must be between 3-5 years: got {years:.1} years (allowed {min}-{max})")]
    InvalidTermLength {
        years: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("term dates overlap existing term {conflicting_term_id} ({existing_start} to {existing_end})")]
    TermOverlap {
        conflicting_term_id: TermId,
        existing_start: NaiveDate,
        existing_end: NaiveDate,
    },

    #[error("fixed rate is required and must be positive for fixed terms")]
    MissingFixedRate,

    #[error("locked spread is required for variable terms")]
    MissingLockedSpread,

    #[error("payment date {date} is in the future (today is {today})")]
    PaymentInFuture { date: NaiveDate, today: NaiveDate },

    #[error("payment date {date} precedes mortgage start date {mortgage_start}")]
    PaymentBeforeMortgageStart {
        date: NaiveDate,
        mortgage_start: NaiveDate,
    },

    #[error("payment date {date} falls outside the term ({term_start} to {term_end})")]
    PaymentOutsideTerm {
        date: NaiveDate,
        term_start: NaiveDate,
        term_end: NaiveDate,
    },

    #[error("annual prepayment limit exceeded: limit {limit}, already used {year_to_date}, requested {requested}")]
    PrepaymentLimitExceeded {
        limit: Money,
        year_to_date: Money,
        requested: Money,
    },

    #[error("payment skip limit reached: {skips_used} of {max_skips} allowed this year")]
    SkipLimitExceeded { skips_used: u32, max_skips: u32 },

    #[error("payment amounts cannot be recalculated for fixed rate terms")]
    FixedRateNotRecalculable,

    #[error("new frequency must be different from current frequency {frequency:?}")]
    FrequencyUnchanged { frequency: PaymentFrequency },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount { amount: Money },

    #[error("ltv ratio {ltv}% exceeds maximum {max_ltv}%")]
    LtvExceeded {
        ltv: Decimal,
        max_ltv: Decimal,
        is_high_ratio: bool,
    },

    #[error("amortization of {months} months exceeds maximum of {max_months} months")]
    AmortizationTooLong {
        months: u32,
        max_months: u32,
        is_high_ratio: bool,
    },

    #[error("prime rate fetch failed: {message}")]
    RateFetchFailed { message: String },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("calculation error: {message}")]
    CalculationError { message: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;
