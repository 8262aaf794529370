//! Prime-rate tracking and fan-out to active variable terms.
//!
//! A periodic caller (cron, out of scope) invokes `check_and_update`. When
//! the published prime differs from the last recorded one, the change is
//! written to history and pushed into every currently-active variable term's
//! `prime_rate` snapshot. Payment amounts are never recalculated here; that
//! stays an explicit, user-triggered call on the term manager.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Rate;
use crate::errors::Result;
use crate::events::{Event, EventStore};
use crate::model::PrimeRateEntry;
use crate::store::{PrimeRateStore, TermStore};
use crate::types::TermId;

/// a published prime rate observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimeRateQuote {
    pub rate: Rate,
    pub effective_date: NaiveDate,
    pub source: String,
}

/// external source of published prime rates
pub trait PrimeRateFeed: Send + Sync {
    /// latest published rate; fails fast with `RateFetchFailed` on error
    fn fetch_latest(&self) -> Result<PrimeRateQuote>;

    /// historical series for a date range, oldest first
    fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PrimeRateQuote>>;
}

/// scripted prime rate feed for testing
pub struct MockPrimeRateFeed {
    quotes: Mutex<Vec<PrimeRateQuote>>,
    failing: Mutex<bool>,
}

impl MockPrimeRateFeed {
    pub fn new(rate: Rate, effective_date: NaiveDate) -> Self {
        Self {
            quotes: Mutex::new(vec![PrimeRateQuote {
                rate,
                effective_date,
                source: "Bank of Canada".to_string(),
            }]),
            failing: Mutex::new(false),
        }
    }

    /// publish a new rate, making it the latest
    pub fn publish(&self, rate: Rate, effective_date: NaiveDate) {
        let mut quotes = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        quotes.push(PrimeRateQuote {
            rate,
            effective_date,
            source: "Bank of Canada".to_string(),
        });
    }

    /// make subsequent fetches fail
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }
}

impl PrimeRateFeed for MockPrimeRateFeed {
    fn fetch_latest(&self) -> Result<PrimeRateQuote> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(crate::errors::EngineError::RateFetchFailed {
                message: "mock feed set to fail".to_string(),
            });
        }
        self.quotes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
            .ok_or(crate::errors::EngineError::RateFetchFailed {
                message: "no rate published".to_string(),
            })
    }

    fn fetch_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PrimeRateQuote>> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(crate::errors::EngineError::RateFetchFailed {
                message: "mock feed set to fail".to_string(),
            });
        }
        let mut quotes: Vec<_> = self
            .quotes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|q| q.effective_date >= start && q.effective_date <= end)
            .cloned()
            .collect();
        quotes.sort_by_key(|q| q.effective_date);
        Ok(quotes)
    }
}

/// a term update that failed during fan-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermUpdateFailure {
    pub term_id: TermId,
    pub message: String,
}

/// result of a prime rate check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimeRateChangeOutcome {
    pub changed: bool,
    pub previous_rate: Option<Rate>,
    pub new_rate: Rate,
    pub effective_date: NaiveDate,
    pub terms_updated: usize,
    pub failures: Vec<TermUpdateFailure>,
}

/// polls the rate feed and propagates changes into active variable terms
pub struct PrimeRateTracker {
    feed: Arc<dyn PrimeRateFeed>,
    history: Arc<dyn PrimeRateStore>,
    terms: Arc<dyn TermStore>,
    events: Mutex<EventStore>,
}

impl PrimeRateTracker {
    pub fn new(
        feed: Arc<dyn PrimeRateFeed>,
        history: Arc<dyn PrimeRateStore>,
        terms: Arc<dyn TermStore>,
    ) -> Self {
        Self {
            feed,
            history,
            terms,
            events: Mutex::new(EventStore::new()),
        }
    }

    /// check the feed and, if prime changed, record it and fan it out
    ///
    /// Per-term update failures are collected, not fatal: a stuck term must
    /// not block rate propagation to the rest.
    pub fn check_and_update(&self, time_provider: &SafeTimeProvider) -> Result<PrimeRateChangeOutcome> {
        let quote = self.feed.fetch_latest()?;

        let previous_rate = self.history.find_latest()?.map(|entry| entry.rate);
        let changed = previous_rate != Some(quote.rate);

        if !changed {
            return Ok(PrimeRateChangeOutcome {
                changed: false,
                previous_rate,
                new_rate: quote.rate,
                effective_date: quote.effective_date,
                terms_updated: 0,
                failures: Vec::new(),
            });
        }

        // history is append-only with at most one entry per effective date
        if !self.history.exists_for_date(quote.effective_date)? {
            self.history.insert(PrimeRateEntry {
                id: Uuid::new_v4(),
                rate: quote.rate,
                effective_date: quote.effective_date,
                source: quote.source.clone(),
            })?;
        }

        let today = time_provider.now().date_naive();
        let mut terms_updated = 0;
        let mut failures = Vec::new();

        for mut term in self.terms.find_all()? {
            if !term.term_type.is_variable() || !term.contains(today) {
                continue;
            }

            let spread = term.locked_spread.unwrap_or(Rate::ZERO);
            let (final_rate, clamped) = term.clamp_rate(quote.rate + spread);
            if clamped {
                log::warn!(
                    "term {}: prime update clamped by cap/floor to {}",
                    term.id,
                    final_rate
                );
            }

            term.prime_rate = Some(final_rate - spread);
            match self.terms.update(&term) {
                Ok(()) => terms_updated += 1,
                Err(err) => {
                    log::warn!("term {}: prime rate update failed: {err}", term.id);
                    failures.push(TermUpdateFailure {
                        term_id: term.id,
                        message: err.to_string(),
                    });
                }
            }
        }

        self.emit(Event::PrimeRateChanged {
            old_rate: previous_rate,
            new_rate: quote.rate,
            effective_date: quote.effective_date,
            terms_updated,
        });

        Ok(PrimeRateChangeOutcome {
            changed: true,
            previous_rate,
            new_rate: quote.rate,
            effective_date: quote.effective_date,
            terms_updated,
            failures,
        })
    }

    /// pull the feed's historical series and insert any missing entries
    ///
    /// Used to backfill rates for terms that started in the past. Returns
    /// the number of entries inserted; already-recorded dates are skipped.
    pub fn backfill_history(&self, start: NaiveDate, end: NaiveDate) -> Result<usize> {
        let quotes = self.feed.fetch_range(start, end)?;
        let mut inserted = 0;
        for quote in quotes {
            if self.history.exists_for_date(quote.effective_date)? {
                continue;
            }
            self.history.insert(PrimeRateEntry {
                id: Uuid::new_v4(),
                rate: quote.rate,
                effective_date: quote.effective_date,
                source: quote.source,
            })?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// recorded history within a date range
    pub fn history(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PrimeRateEntry>> {
        self.history.find_by_date_range(start, end)
    }

    /// most recent recorded rate
    pub fn latest(&self) -> Result<Option<PrimeRateEntry>> {
        self.history.find_latest()
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
}
