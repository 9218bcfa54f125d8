//! Usage control for finalized contracts. The transfer layer asks this crate
//! whether an agreement still permits access before serving any request; the
//! negotiation layer registers a usage counter whenever an agreement comes to
//! life. Decisions are deny-by-default: anything the evaluator doesn't
//! understand counts against the agreement.

pub mod constraint;
pub mod counter;
pub mod engine;

pub use constraint::UsageSnapshot;
pub use counter::{AccessCounterStore, CounterError, InMemoryCounterStore};
pub use engine::{EnforcementEngine, EnforcementError};
