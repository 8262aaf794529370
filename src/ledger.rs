//! Payment ledger: recording, skipping and correcting mortgage payments.
//!
//! Every stored payment date is business-day adjusted, and the adjusted
//! date's calendar year is the one the annual prepayment allowance is
//! accounted in. The year-to-date aggregation and the insert run under an
//! advisory lock keyed by (mortgage, year) so concurrent writers cannot
//! jointly exceed the cap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Datelike, NaiveDate};
use hourglass_rs::SafeTimeProvider;
use uuid::Uuid;

use crate::calendar::adjust_to_business_day;
use crate::config::EngineConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{EngineError, Result};
use crate::events::{Event, EventStore};
use crate::math;
use crate::model::{Mortgage, MortgagePayment, MortgageTerm, NewPayment};
use crate::store::{MortgageStore, PaymentStore, TermStore};
use crate::types::{LimitBase, MortgageId, PaymentId, TermId, UserId};

/// computed financial breakdown of a payment
struct PaymentBreakdown {
    interest_paid: Money,
    principal_paid: Money,
    remaining_balance: Money,
    trigger_rate_hit: bool,
    remaining_amortization_months: u32,
    effective_rate: Rate,
}

/// creates and validates payment records
pub struct PaymentLedger {
    mortgages: Arc<dyn MortgageStore>,
    terms: Arc<dyn TermStore>,
    payments: Arc<dyn PaymentStore>,
    config: EngineConfig,
    events: Mutex<EventStore>,
    // advisory locks serializing the cap check-and-insert per mortgage-year
    year_gates: Mutex<HashMap<(MortgageId, i32), Arc<Mutex<()>>>>,
}

impl PaymentLedger {
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
            events: Mutex::new(EventStore::new()),
            year_gates: Mutex::new(HashMap::new()),
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

    fn term_of(&self, mortgage_id: MortgageId, term_id: TermId) -> Result<MortgageTerm> {
        let term = self.terms.find_by_id(term_id)?.ok_or(EngineError::NotFound {
            entity: "term",
            id: term_id,
        })?;
        if term.mortgage_id != mortgage_id {
            return Err(EngineError::NotFound {
                entity: "term",
                id: term_id,
            });
        }
        Ok(term)
    }

    fn year_gate(&self, mortgage_id: MortgageId, year: i32) -> Arc<Mutex<()>> {
        let mut gates = self.year_gates.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(gates.entry((mortgage_id, year)).or_default())
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

    /// payments recorded against a mortgage, ordered by date
    pub fn list_by_mortgage(
        &self,
        mortgage_id: MortgageId,
        user_id: UserId,
    ) -> Result<Vec<MortgagePayment>> {
        self.authorize_mortgage(mortgage_id, user_id)?;
        self.payments.find_by_mortgage(mortgage_id)
    }

    /// payments recorded against a term, ordered by date
    pub fn list_by_term(&self, term_id: TermId, user_id: UserId) -> Result<Vec<MortgagePayment>> {
        let term = self.terms.find_by_id(term_id)?.ok_or(EngineError::NotFound {
            entity: "term",
            id: term_id,
        })?;
        self.authorize_mortgage(term.mortgage_id, user_id)?;
        self.payments.find_by_term(term_id)
    }

    /// annual prepayment cap for a mortgage
    pub fn prepayment_cap(&self, mortgage: &Mortgage) -> Money {
        let base = match self.config.prepayment_rules.limit_base {
            LimitBase::OriginalPrincipal => mortgage.original_amount,
            LimitBase::CurrentBalance => mortgage.current_balance,
        };
        let percent = mortgage
            .annual_prepayment_limit_percent
            .unwrap_or(self.config.prepayment_rules.default_annual_limit_percent);
        base.percentage(percent.into())
    }

    /// prepayments already booked in a calendar year (by adjusted date)
    fn year_to_date_prepayments(&self, mortgage_id: MortgageId, year: i32) -> Result<Money> {
        Ok(self
            .payments
            .find_by_mortgage(mortgage_id)?
            .iter()
            .filter(|p| p.payment_date.year() == year)
            .fold(Money::ZERO, |sum, p| sum + p.prepayment_amount))
    }

    /// record a single payment
    pub fn create_payment(
        &self,
        mortgage_id: MortgageId,
        user_id: UserId,
        input: NewPayment,
        time_provider: &SafeTimeProvider,
    ) -> Result<MortgagePayment> {
        let mortgage = self.authorize_mortgage(mortgage_id, user_id)?;
        let term = self.term_of(mortgage_id, input.term_id)?;
        let today = time_provider.now().date_naive();

        let adjusted = adjust_to_business_day(input.payment_date);
        validate_payment_date(&mortgage, &term, adjusted, today)?;
        validate_amounts(&input)?;

        let year = adjusted.year();
        let gate = self.year_gate(mortgage_id, year);
        let _guard = gate.lock().unwrap_or_else(|e| e.into_inner());

        if input.prepayment_amount.is_positive() {
            let year_to_date = self.year_to_date_prepayments(mortgage_id, year)?;
            self.enforce_prepayment_limit(&mortgage, year_to_date, input.prepayment_amount)?;
        }

        let previous = self.latest_payment(input.term_id)?;
        let record = self.build_record(&mortgage, &term, previous.as_ref(), &input, adjusted);
        self.payments.insert(record.clone())?;

        self.emit(Event::PaymentRecorded {
            mortgage_id,
            payment_id: record.id,
            payment_date: record.payment_date,
            amount: record.payment_amount,
            prepayment: record.prepayment_amount,
        });
        Ok(record)
    }

    /// record a batch of payments, all or nothing
    ///
    /// Items validate sequentially with the running year-to-date total
    /// accumulated across the batch itself, so two items in one call stack
    /// against the same annual cap. Any failure discards the whole batch.
    pub fn create_bulk(
        &self,
        mortgage_id: MortgageId,
        user_id: UserId,
        inputs: Vec<NewPayment>,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<MortgagePayment>> {
        let mortgage = self.authorize_mortgage(mortgage_id, user_id)?;
        let today = time_provider.now().date_naive();

        // adjust everything up front so the gate years are known
        let mut adjusted_dates = Vec::with_capacity(inputs.len());
        let mut years: Vec<i32> = Vec::new();
        for input in &inputs {
            let adjusted = adjust_to_business_day(input.payment_date);
            if !years.contains(&adjusted.year()) {
                years.push(adjusted.year());
            }
            adjusted_dates.push(adjusted);
        }
        // lock in sorted year order so concurrent batches cannot deadlock
        years.sort_unstable();
        let gates: Vec<Arc<Mutex<()>>> = years
            .iter()
            .map(|year| self.year_gate(mortgage_id, *year))
            .collect();
        let _guards: Vec<MutexGuard<'_, ()>> = gates
            .iter()
            .map(|gate| gate.lock().unwrap_or_else(|e| e.into_inner()))
            .collect();

        let mut ytd_by_year: HashMap<i32, Money> = HashMap::new();
        for year in &years {
            ytd_by_year.insert(*year, self.year_to_date_prepayments(mortgage_id, *year)?);
        }

        // chained previous payment per term, so balances flow through the batch
        let mut chain: HashMap<TermId, MortgagePayment> = HashMap::new();
        let mut records = Vec::with_capacity(inputs.len());

        for (input, adjusted) in inputs.iter().zip(adjusted_dates) {
            let term = self.term_of(mortgage_id, input.term_id)?;
            validate_payment_date(&mortgage, &term, adjusted, today)?;
            validate_amounts(input)?;

            if input.prepayment_amount.is_positive() {
                let ytd = ytd_by_year.entry(adjusted.year()).or_insert(Money::ZERO);
                self.enforce_prepayment_limit(&mortgage, *ytd, input.prepayment_amount)?;
                *ytd += input.prepayment_amount;
            }

            let previous = match chain.get(&input.term_id) {
                Some(prior) => Some(prior.clone()),
                None => self.latest_payment(input.term_id)?,
            };
            let record = self.build_record(&mortgage, &term, previous.as_ref(), input, adjusted);
            chain.insert(input.term_id, record.clone());
            records.push(record);
        }

        self.payments.insert_many(records.clone())?;

        for record in &records {
            self.emit(Event::PaymentRecorded {
                mortgage_id,
                payment_id: record.id,
                payment_date: record.payment_date,
                amount: record.payment_amount,
                prepayment: record.prepayment_amount,
            });
        }
        Ok(records)
    }

    /// skip a scheduled payment
    ///
    /// No principal or interest is paid: the period's interest capitalizes
    /// into the balance and the amortization extends by one payment period.
    /// Limited per calendar year, counted by adjusted date.
    pub fn skip_payment(
        &self,
        mortgage_id: MortgageId,
        user_id: UserId,
        term_id: TermId,
        payment_date: NaiveDate,
        max_skips_per_year: Option<u32>,
        time_provider: &SafeTimeProvider,
    ) -> Result<MortgagePayment> {
        let mortgage = self.authorize_mortgage(mortgage_id, user_id)?;
        let term = self.term_of(mortgage_id, term_id)?;
        let today = time_provider.now().date_naive();

        let adjusted = adjust_to_business_day(payment_date);
        validate_payment_date(&mortgage, &term, adjusted, today)?;

        let max_skips =
            max_skips_per_year.unwrap_or(self.config.prepayment_rules.max_skips_per_year);
        let year = adjusted.year();
        let skips_used = self
            .payments
            .find_by_mortgage(mortgage_id)?
            .iter()
            .filter(|p| p.is_skipped && p.payment_date.year() == year)
            .count() as u32;
        if skips_used >= max_skips {
            return Err(EngineError::SkipLimitExceeded {
                skips_used,
                max_skips,
            });
        }

        let previous = self.latest_payment(term_id)?;
        let balance_before = previous
            .as_ref()
            .map(|p| p.remaining_balance)
            .unwrap_or(mortgage.current_balance);
        let current_months = previous
            .as_ref()
            .map(|p| p.remaining_amortization_months)
            .unwrap_or_else(|| mortgage.total_amortization_months());

        let rate = term.effective_rate();
        let interest_accrued =
            math::interest_portion(balance_before, rate, term.payment_frequency);
        let new_balance = balance_before + interest_accrued;
        // one payment period's worth of extra months, e.g. ~0.46 for biweekly
        let months_per_payment = 12.0 / term.payment_frequency.periods_per_year() as f64;
        let extended_months = (current_months as f64 + months_per_payment).round() as u32;

        let record = MortgagePayment {
            id: Uuid::new_v4(),
            mortgage_id,
            term_id,
            payment_date: adjusted,
            payment_period_label: None,
            regular_payment_amount: Money::ZERO,
            prepayment_amount: Money::ZERO,
            payment_amount: Money::ZERO,
            principal_paid: Money::ZERO,
            interest_paid: Money::ZERO,
            remaining_balance: new_balance,
            prime_rate: term.prime_rate,
            effective_rate: rate,
            trigger_rate_hit: false,
            is_skipped: true,
            skipped_interest_accrued: interest_accrued,
            remaining_amortization_months: extended_months,
            corrects_payment_id: None,
        };
        self.payments.insert(record.clone())?;

        self.emit(Event::PaymentSkipped {
            mortgage_id,
            payment_id: record.id,
            payment_date: record.payment_date,
            interest_accrued,
        });
        Ok(record)
    }

    /// append a correcting record for an existing payment
    ///
    /// The original payment is never edited or deleted; the correction points
    /// back at it and goes through the same validation, with the original's
    /// prepayment released from the year's allowance first.
    pub fn correct_payment(
        &self,
        mortgage_id: MortgageId,
        user_id: UserId,
        payment_id: PaymentId,
        input: NewPayment,
        time_provider: &SafeTimeProvider,
    ) -> Result<MortgagePayment> {
        let mortgage = self.authorize_mortgage(mortgage_id, user_id)?;
        let original = self
            .payments
            .find_by_mortgage(mortgage_id)?
            .into_iter()
            .find(|p| p.id == payment_id)
            .ok_or(EngineError::NotFound {
                entity: "payment",
                id: payment_id,
            })?;
        let term = self.term_of(mortgage_id, input.term_id)?;
        let today = time_provider.now().date_naive();

        let adjusted = adjust_to_business_day(input.payment_date);
        validate_payment_date(&mortgage, &term, adjusted, today)?;
        validate_amounts(&input)?;

        let year = adjusted.year();
        let gate = self.year_gate(mortgage_id, year);
        let _guard = gate.lock().unwrap_or_else(|e| e.into_inner());

        if input.prepayment_amount.is_positive() {
            let mut year_to_date = self.year_to_date_prepayments(mortgage_id, year)?;
            if original.payment_date.year() == year {
                year_to_date = (year_to_date - original.prepayment_amount).max(Money::ZERO);
            }
            self.enforce_prepayment_limit(&mortgage, year_to_date, input.prepayment_amount)?;
        }

        // recompute from the payment preceding the one being corrected
        let previous = self
            .payments
            .find_by_term(input.term_id)?
            .into_iter()
            .filter(|p| p.payment_date < original.payment_date && p.id != original.id)
            .max_by_key(|p| p.payment_date);

        let mut record = self.build_record(&mortgage, &term, previous.as_ref(), &input, adjusted);
        record.corrects_payment_id = Some(payment_id);
        self.payments.insert(record.clone())?;

        self.emit(Event::PaymentCorrected {
            original_payment_id: payment_id,
            correction_payment_id: record.id,
        });
        Ok(record)
    }

    fn enforce_prepayment_limit(
        &self,
        mortgage: &Mortgage,
        year_to_date: Money,
        requested: Money,
    ) -> Result<()> {
        let limit = self.prepayment_cap(mortgage);
        if year_to_date + requested > limit {
            return Err(EngineError::PrepaymentLimitExceeded {
                limit,
                year_to_date,
                requested,
            });
        }
        Ok(())
    }

    fn latest_payment(&self, term_id: TermId) -> Result<Option<MortgagePayment>> {
        Ok(self
            .payments
            .find_by_term(term_id)?
            .into_iter()
            .max_by_key(|p| p.payment_date))
    }

    /// compute the authoritative breakdown and assemble the stored record
    fn build_record(
        &self,
        mortgage: &Mortgage,
        term: &MortgageTerm,
        previous: Option<&MortgagePayment>,
        input: &NewPayment,
        adjusted_date: NaiveDate,
    ) -> MortgagePayment {
        let breakdown = self.breakdown(mortgage, term, previous, input);
        MortgagePayment {
            id: Uuid::new_v4(),
            mortgage_id: mortgage.id,
            term_id: term.id,
            payment_date: adjusted_date,
            payment_period_label: input.payment_period_label.clone(),
            regular_payment_amount: input.regular_payment_amount,
            prepayment_amount: input.prepayment_amount,
            payment_amount: input.regular_payment_amount + input.prepayment_amount,
            principal_paid: breakdown.principal_paid,
            interest_paid: breakdown.interest_paid,
            remaining_balance: breakdown.remaining_balance,
            prime_rate: term.prime_rate,
            effective_rate: breakdown.effective_rate,
            trigger_rate_hit: breakdown.trigger_rate_hit,
            is_skipped: false,
            skipped_interest_accrued: Money::ZERO,
            remaining_amortization_months: breakdown.remaining_amortization_months,
            corrects_payment_id: None,
        }
    }

    /// principal/interest split and amortization position after a payment
    fn breakdown(
        &self,
        mortgage: &Mortgage,
        term: &MortgageTerm,
        previous: Option<&MortgagePayment>,
        input: &NewPayment,
    ) -> PaymentBreakdown {
        let rate = input.effective_rate_override.unwrap_or_else(|| term.effective_rate());
        let frequency = term.payment_frequency;

        let balance_before = previous
            .map(|p| p.remaining_balance)
            .unwrap_or(mortgage.current_balance);
        let payment_amount = input.regular_payment_amount + input.prepayment_amount;

        let interest_paid = math::interest_portion(balance_before, rate, frequency);
        let principal_paid = payment_amount - interest_paid;
        let remaining_balance = math::remaining_balance(
            balance_before,
            principal_paid - input.prepayment_amount,
            input.prepayment_amount,
        );

        let trigger_rate_hit = math::is_trigger_rate_hit(
            rate,
            input.regular_payment_amount,
            balance_before,
            frequency,
        );

        let fallback_months = input
            .remaining_amortization_months
            .or(previous.map(|p| p.remaining_amortization_months))
            .unwrap_or_else(|| mortgage.total_amortization_months());
        let remaining_amortization_months = if trigger_rate_hit || remaining_balance.is_zero() {
            if remaining_balance.is_zero() { 0 } else { fallback_months }
        } else {
            math::remaining_amortization_months(remaining_balance, payment_amount, rate, frequency)
                .unwrap_or(fallback_months)
        };

        PaymentBreakdown {
            interest_paid,
            principal_paid,
            remaining_balance,
            trigger_rate_hit,
            remaining_amortization_months,
            effective_rate: rate,
        }
    }
}

fn validate_payment_date(
    mortgage: &Mortgage,
    term: &MortgageTerm,
    adjusted: NaiveDate,
    today: NaiveDate,
) -> Result<()> {
    if adjusted > today {
        return Err(EngineError::PaymentInFuture {
            date: adjusted,
            today,
        });
    }
    if adjusted < mortgage.start_date {
        return Err(EngineError::PaymentBeforeMortgageStart {
            date: adjusted,
            mortgage_start: mortgage.start_date,
        });
    }
    if !term.contains(adjusted) {
        return Err(EngineError::PaymentOutsideTerm {
            date: adjusted,
            term_start: term.start_date,
            term_end: term.end_date,
        });
    }
    Ok(())
}

fn validate_amounts(input: &NewPayment) -> Result<()> {
    if input.regular_payment_amount.is_negative() || input.prepayment_amount.is_negative() {
        return Err(EngineError::InvalidPaymentAmount {
            amount: input.regular_payment_amount.min(input.prepayment_amount),
        });
    }
    if input.regular_payment_amount.is_zero() && input.prepayment_amount.is_zero() {
        return Err(EngineError::InvalidPaymentAmount {
            amount: Money::ZERO,
        });
    }
    Ok(())
}
