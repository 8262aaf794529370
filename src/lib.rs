pub mod calendar;
pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod math;
pub mod model;
pub mod mortgage;
pub mod prime_rate;
pub mod store;
pub mod terms;
pub mod types;

// re-export key types
pub use config::{EngineConfig, PrepaymentRules, TermRules, UnderwritingRules};
pub use decimal::{Money, Rate};
pub use errors::{EngineError, Result};
pub use events::{Event, EventStore};
pub use ledger::PaymentLedger;
pub use model::{
    InsuranceInfo, Mortgage, MortgagePatch, MortgagePayment, MortgageTerm, NewMortgage,
    NewPayment, NewTerm, PrimeRateEntry, TermPatch,
};
pub use mortgage::MortgageManager;
pub use prime_rate::{
    MockPrimeRateFeed, PrimeRateChangeOutcome, PrimeRateFeed, PrimeRateQuote, PrimeRateTracker,
};
pub use store::{MemoryStore, MortgageStore, PaymentStore, PrimeRateStore, TermStore};
pub use terms::{FrequencyChangeOutcome, RecalculationOutcome, TermManager};
pub use types::{
    LimitBase, MortgageId, PaymentFrequency, PaymentId, TermId, TermStatus, TermType, UserId,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
