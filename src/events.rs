use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::types::{MortgageId, PaymentFrequency, PaymentId, TermId};

/// all events emitted by the engine's services
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // term lifecycle
    TermCreated {
        mortgage_id: MortgageId,
        term_id: TermId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    TermUpdated {
        term_id: TermId,
    },
    TermDeleted {
        term_id: TermId,
        payments_removed: bool,
    },

    // payment ledger
    PaymentRecorded {
        mortgage_id: MortgageId,
        payment_id: PaymentId,
        payment_date: NaiveDate,
        amount: Money,
        prepayment: Money,
    },
    PaymentSkipped {
        mortgage_id: MortgageId,
        payment_id: PaymentId,
        payment_date: NaiveDate,
        interest_accrued: Money,
    },
    PaymentCorrected {
        original_payment_id: PaymentId,
        correction_payment_id: PaymentId,
    },

    // rate and payment changes
    PaymentAmountChanged {
        term_id: TermId,
        old_amount: Money,
        new_amount: Money,
        reason: String,
    },
    PaymentFrequencyChanged {
        term_id: TermId,
        old_frequency: PaymentFrequency,
        new_frequency: PaymentFrequency,
        old_amount: Money,
        new_amount: Money,
    },
    PrimeRateChanged {
        old_rate: Option<Rate>,
        new_rate: Rate,
        effective_date: NaiveDate,
        terms_updated: usize,
    },
    TriggerRateBreached {
        term_id: TermId,
        effective_rate: Rate,
        trigger_rate: Rate,
    },
}

/// collects events emitted during service operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// emit an event
    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    /// get all events without clearing
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// take all events, clearing the store
    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_emit_and_take() {
        let mut store = EventStore::new();
        assert!(store.is_empty());

        store.emit(Event::TermUpdated {
            term_id: Uuid::new_v4(),
        });
        assert_eq!(store.len(), 1);

        let events = store.take_events();
        assert_eq!(events.len(), 1);
        assert!(store.is_empty());
    }
}
