//! Per-event policy evaluators
//!
//! Each evaluator is independent of the others and holds no task state; the
//! dispatcher decides which ones apply to a notification and in what order.

pub mod admission;
pub mod duplicate;
pub mod seed;

pub use admission::{
    AdmissionPolicy, DailyUsage, InMemoryUsage, LimitKind, LimitViolation, TransferKind,
    UsageTracker,
};
pub use duplicate::{DuplicateEvaluator, DuplicateMatch, candidate_name};
pub use seed::{SeedDecision, SeedStats};
