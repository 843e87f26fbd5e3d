//! Plan model and normalization.
//!
//! This module turns step definitions from configuration into immutable
//! plans, and decides which steps a set of run conditions selects.

mod condition;
mod hash;
mod normalize;
mod plan;
mod step;

pub use condition::{Condition, ConditionSet, should_run};
pub use hash::PlanHasher;
pub use normalize::{PlanNormalizer, RawPlan};
pub use plan::{Phase, Plan, PlanKind};
pub use step::{ClassStep, CommandStep, ParallelGroup, Priority, Step, StepVariant};
