//! Term lifecycle: creation, validation, recalculation, frequency changes.
//!
//! A term is a rate-lock period on a mortgage. Terms move Pending -> Active
//! -> Expired purely by date; nothing cancels a term, it is only deleted
//! (together with its payments).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::days_between;
use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::math;
use crate::model::{Mortgage, MortgageTerm, NewTerm, TermPatch};
use crate::prime_rate::PrimeRateFeed;
use crate::store::{MortgageStore, PaymentStore, TermStore};
use crate::types::{MortgageId, PaymentFrequency, TermId, TermType, UserId};

/// result of a variable-rate payment recalculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalculationOutcome {
    pub term: MortgageTerm,
    /// new payment amount, set only for variable-changing terms
    pub new_payment_amount: Option<Money>,
    /// trigger status, set only for variable-fixed terms
    pub trigger_rate_hit: Option<bool>,
}

/// result of a payment frequency change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyChangeOutcome {
    pub term: MortgageTerm,
    pub old_frequency: PaymentFrequency,
    pub new_frequency: PaymentFrequency,
    pub old_payment_amount: Money,
    pub new_payment_amount: Money,
    pub remaining_amortization_months: u32,
}

/// validates and mutates mortgage terms
pub struct TermManager {
    mortgages: Arc<dyn MortgageStore>,
    terms: Arc<dyn TermStore>,
    payments: Arc<dyn PaymentStore>,
    feed: Arc<dyn PrimeRateFeed>,
    config: EngineConfig,
    events: Mutex<EventStore>,
    // serializes validate-and-insert per mortgage so concurrent creations
    // cannot jointly pass the overlap check
    gates: Mutex<HashMap<MortgageId, Arc<Mutex<()>>>>,
}

impl TermManager {
    pub fn new(
        mortgages: Arc<dyn MortgageStore>,
        terms: Arc<dyn TermStore>,
        payments: Arc<dyn PaymentStore>,
        feed: Arc<dyn PrimeRateFeed>,
        config: EngineConfig,
    ) -> Self {
        Self {
            mortgages,
            terms,
            payments,
            feed,
            config,
            events: Mutex::new(EventStore::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    fn authorize_mortgage(&self, mortgage_id: MortgageId, user_id: UserId) -> Result<Mortgage> {
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

    fn authorize_term(&self, term_id: TermId, user_id: UserId) -> Result<(Mortgage, MortgageTerm)> {
        let term = self.terms.find_by_id(term_id)?.ok_or(EngineError::NotFound {
            entity: "term",
            id: term_id,
        })?;
        let mortgage = self.authorize_mortgage(term.mortgage_id, user_id)?;
        Ok((mortgage, term))
    }

    fn gate(&self, mortgage_id: MortgageId) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(gates.entry(mortgage_id).or_default())
    }

    fn emit(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .emit(event);
    }

    /// drain emitted events
    pub fn take_events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take_events()
    }

    /// all terms for a mortgage, ordered by start date
    pub fn list_for_mortgage(
        &self,
        mortgage_id: MortgageId,
        user_id: UserId,
    ) -> Result<Vec<MortgageTerm>> {
        self.authorize_mortgage(mortgage_id, user_id)?;
        self.terms.find_by_mortgage(mortgage_id)
    }

    /// create a term on a mortgage
    pub fn create_term(
        &self,
        mortgage_id: MortgageId,
        user_id: UserId,
        input: NewTerm,
    ) -> Result<MortgageTerm> {
        self.authorize_mortgage(mortgage_id, user_id)?;
        self.validate_dates(input.start_date, input.end_date)?;
        self.validate_rate_fields(input.term_type, input.fixed_rate, input.locked_spread)?;

        let gate = self.gate(mortgage_id);
        let _guard = gate.lock().unwrap_or_else(|e| e.into_inner());

        let existing = self.terms.find_by_mortgage(mortgage_id)?;
        validate_no_overlap(&existing, None, input.start_date, input.end_date)?;

        let term = MortgageTerm {
            id: Uuid::new_v4(),
            mortgage_id,
            term_type: input.term_type,
            start_date: input.start_date,
            end_date: input.end_date,
            term_years: input.term_years,
            fixed_rate: input.fixed_rate,
            prime_rate: input.prime_rate,
            locked_spread: input.locked_spread,
            variable_rate_cap: input.variable_rate_cap,
            variable_rate_floor: input.variable_rate_floor,
            payment_frequency: input.payment_frequency,
            regular_payment_amount: input.regular_payment_amount,
        };
        self.terms.insert(term.clone())?;

        self.emit(Event::TermCreated {
            mortgage_id,
            term_id: term.id,
            start_date: term.start_date,
            end_date: term.end_date,
        });
        Ok(term)
    }

    /// update a term, re-validating the merged date range
    pub fn update_term(
        &self,
        term_id: TermId,
        user_id: UserId,
        patch: TermPatch,
    ) -> Result<MortgageTerm> {
        let (_, term) = self.authorize_term(term_id, user_id)?;

        let merged_start = patch.start_date.unwrap_or(term.start_date);
        let merged_end = patch.end_date.unwrap_or(term.end_date);
        self.validate_dates(merged_start, merged_end)?;

        let gate = self.gate(term.mortgage_id);
        let _guard = gate.lock().unwrap_or_else(|e| e.into_inner());

        let existing = self.terms.find_by_mortgage(term.mortgage_id)?;
        validate_no_overlap(&existing, Some(term_id), merged_start, merged_end)?;

        let updated = apply_patch(term, patch);
        self.validate_rate_fields(updated.term_type, updated.fixed_rate, updated.locked_spread)?;
        self.terms.update(&updated)?;

        self.emit(Event::TermUpdated { term_id });
        Ok(updated)
    }

    /// re-price a variable term against a new prime rate
    ///
    /// Fixed terms are rejected outright. Variable-changing terms get a new
    /// payment amount persisted; variable-fixed terms keep their payment and
    /// only report whether the trigger rate has been hit.
    pub fn recalculate_payment(
        &self,
        term_id: TermId,
        user_id: UserId,
        forced_prime_rate: Option<Rate>,
    ) -> Result<RecalculationOutcome> {
        let (mortgage, mut term) = self.authorize_term(term_id, user_id)?;

        if term.term_type == TermType::Fixed {
            return Err(EngineError::FixedRateNotRecalculable);
        }

        let new_prime = match forced_prime_rate {
            Some(rate) => rate,
            None => self.feed.fetch_latest()?.rate,
        };

        let spread = term.locked_spread.unwrap_or(Rate::ZERO);
        let (final_rate, clamped) = term.clamp_rate(new_prime + spread);
        if clamped {
            log::warn!(
                "term {term_id}: recalculation rate clamped by cap/floor to {final_rate}"
            );
        }
        term.prime_rate = Some(final_rate - spread);

        let (balance, remaining_months) = self.latest_position(&mortgage, term_id)?;

        match term.term_type {
            TermType::VariableChanging => {
                let old_amount = term.regular_payment_amount;
                let new_amount = math::calculate_payment(
                    balance,
                    final_rate,
                    remaining_months,
                    term.payment_frequency,
                );
                term.regular_payment_amount = new_amount;
                self.terms.update(&term)?;

                if new_amount != old_amount {
                    self.emit(Event::PaymentAmountChanged {
                        term_id,
                        old_amount,
                        new_amount,
                        reason: format!("prime rate changed to {}", new_prime),
                    });
                }

                Ok(RecalculationOutcome {
                    term,
                    new_payment_amount: Some(new_amount),
                    trigger_rate_hit: None,
                })
            }
            TermType::VariableFixed => {
                // the payment is never silently altered; only reported on
                self.terms.update(&term)?;

                let hit = math::is_trigger_rate_hit(
                    final_rate,
                    term.regular_payment_amount,
                    balance,
                    term.payment_frequency,
                );
                if hit {
                    self.emit(Event::TriggerRateBreached {
                        term_id,
                        effective_rate: final_rate,
                        trigger_rate: math::calculate_trigger_rate(
                            term.regular_payment_amount,
                            balance,
                            term.payment_frequency,
                        ),
                    });
                }

                Ok(RecalculationOutcome {
                    term,
                    new_payment_amount: None,
                    trigger_rate_hit: Some(hit),
                })
            }
            TermType::Fixed => unreachable!("rejected above"),
        }
    }

    /// switch a term to a new payment frequency
    ///
    /// The payment amount is recomputed from the current balance, the rate in
    /// force, and the remaining amortization; frequency and amount persist as
    /// one update.
    pub fn change_payment_frequency(
        &self,
        term_id: TermId,
        user_id: UserId,
        new_frequency: PaymentFrequency,
        time_provider: &SafeTimeProvider,
    ) -> Result<FrequencyChangeOutcome> {
        let (mortgage, mut term) = self.authorize_term(term_id, user_id)?;

        let old_frequency = term.payment_frequency;
        if old_frequency == new_frequency {
            return Err(EngineError::FrequencyUnchanged {
                frequency: old_frequency,
            });
        }

        let (balance, mut remaining_months) = self.latest_position(&mortgage, term_id)?;
        if self.payments.find_by_term(term_id)?.is_empty() {
            // no payment history: estimate remaining amortization from time
            // elapsed since the mortgage started
            let today = time_provider.now().date_naive();
            remaining_months = estimate_remaining_months(&mortgage, today);
        }

        if balance.is_zero() {
            return Err(EngineError::CalculationError {
                message: "current balance is zero, nothing to reschedule".to_string(),
            });
        }

        let old_amount = term.regular_payment_amount;
        let new_amount = math::calculate_payment(
            balance,
            term.effective_rate(),
            remaining_months,
            new_frequency,
        );

        term.payment_frequency = new_frequency;
        term.regular_payment_amount = new_amount;
        self.terms.update(&term)?;

        self.emit(Event::PaymentFrequencyChanged {
            term_id,
            old_frequency,
            new_frequency,
            old_amount,
            new_amount,
        });

        Ok(FrequencyChangeOutcome {
            term,
            old_frequency,
            new_frequency,
            old_payment_amount: old_amount,
            new_payment_amount: new_amount,
            remaining_amortization_months: remaining_months,
        })
    }

    /// delete a term and its payments, payments first
    pub fn delete_term(&self, term_id: TermId, user_id: UserId) -> Result<()> {
        self.authorize_term(term_id, user_id)?;
        self.payments.delete_by_term(term_id)?;
        self.terms.delete(term_id)?;
        self.emit(Event::TermDeleted {
            term_id,
            payments_removed: true,
        });
        Ok(())
    }

    /// latest known balance and remaining amortization for a term
    ///
    /// Prefers the most recent payment's recorded figures, falling back to
    /// the mortgage's current balance and full amortization.
    fn latest_position(&self, mortgage: &Mortgage, term_id: TermId) -> Result<(Money, u32)> {
        let payments = self.payments.find_by_term(term_id)?;
        match payments.iter().max_by_key(|p| p.payment_date) {
            Some(latest) => Ok((latest.remaining_balance, latest.remaining_amortization_months)),
            None => Ok((
                mortgage.current_balance,
                mortgage.total_amortization_months(),
            )),
        }
    }

    fn validate_dates(&self, start: NaiveDate, end: NaiveDate) -> Result<()> {
        if end <= start {
            return Err(EngineError::InvalidDateOrder { start, end });
        }

        let years = Decimal::from(days_between(start, end)) / dec!(365.25);
        let rules = &self.config.term_rules;
        if years < rules.min_term_years || years > rules.max_term_years {
            return Err(EngineError::InvalidTermLength {
                years: years.round_dp(2),
                min: rules.min_term_years,
                max: rules.max_term_years,
            });
        }
        Ok(())
    }

    fn validate_rate_fields(
        &self,
        term_type: TermType,
        fixed_rate: Option<Rate>,
        locked_spread: Option<Rate>,
    ) -> Result<()> {
        match term_type {
            TermType::Fixed => match fixed_rate {
                Some(rate) if !rate.is_zero() && !rate.is_negative() => Ok(()),
                _ => Err(EngineError::MissingFixedRate),
            },
            TermType::VariableChanging | TermType::VariableFixed => {
                if locked_spread.is_none() {
                    return Err(EngineError::MissingLockedSpread);
                }
                Ok(())
            }
        }
    }
}

/// reject `[start, end)` ranges that overlap any other term on the mortgage
fn validate_no_overlap(
    existing: &[MortgageTerm],
    exclude: Option<TermId>,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<()> {
    for other in existing {
        if Some(other.id) == exclude {
            continue;
        }
        if start < other.end_date && end > other.start_date {
            return Err(EngineError::TermOverlap {
                conflicting_term_id: other.id,
                existing_start: other.start_date,
                existing_end: other.end_date,
            });
        }
    }
    Ok(())
}

fn apply_patch(mut term: MortgageTerm, patch: TermPatch) -> MortgageTerm {
    if let Some(start_date) = patch.start_date {
        term.start_date = start_date;
    }
    if let Some(end_date) = patch.end_date {
        term.end_date = end_date;
    }
    if let Some(term_years) = patch.term_years {
        term.term_years = term_years;
    }
    if let Some(fixed_rate) = patch.fixed_rate {
        term.fixed_rate = fixed_rate;
    }
    if let Some(prime_rate) = patch.prime_rate {
        term.prime_rate = prime_rate;
    }
    if let Some(locked_spread) = patch.locked_spread {
        term.locked_spread = locked_spread;
    }
    if let Some(cap) = patch.variable_rate_cap {
        term.variable_rate_cap = cap;
    }
    if let Some(floor) = patch.variable_rate_floor {
        term.variable_rate_floor = floor;
    }
    if let Some(frequency) = patch.payment_frequency {
        term.payment_frequency = frequency;
    }
    if let Some(amount) = patch.regular_payment_amount {
        term.regular_payment_amount = amount;
    }
    term
}

/// months left on the original schedule given time elapsed since the start
fn estimate_remaining_months(mortgage: &Mortgage, today: NaiveDate) -> u32 {
    let elapsed_days = days_between(mortgage.start_date, today).max(0);
    let elapsed_months = (elapsed_days as f64 / 30.44).floor() as u32;
    mortgage
        .total_amortization_months()
        .saturating_sub(elapsed_months)
        .max(1)
}
