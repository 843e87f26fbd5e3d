// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Deckhand
//!
//! A plan execution engine for building and deploying applications.
//!
//! ## Overview
//!
//! A build or deploy is described as a plan of five ordered step lists:
//! preflight, clean, steps, rollback-preflight and rollback steps. Deckhand
//! lets you:
//!
//! - Write steps as shell commands, registered callables, registered step
//!   types, or concurrent groups of those
//! - Select which main steps run from the active conditions (code, assets,
//!   databases, ...)
//! - Give steps only the capabilities they declare (shell, mounts,
//!   maintenance, ...)
//! - Roll back automatically when a step fails, then surface the original
//!   failure
//!
//! ## Architecture
//!
//! 1. **Normalization**: raw YAML step definitions become a typed [`Plan`]
//!    before anything runs
//! 2. **Dispatch**: the [`StepDispatcher`] runs one step, injecting the
//!    capabilities it asks for
//! 3. **Running**: the [`PlanRunner`] walks the lists and owns rollback
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`planner`]: Step model, conditions, normalization and fingerprints
//! - [`runner`]: Capabilities, registry, dispatcher and plan runner
//! - [`shell`]: Shell execution
//! - [`steps`]: Built-in step types and callables
//! - [`orchestrator`]: Build and deploy entry points
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! application:
//!   name: shop
//!   code_root: /srv/shop
//!
//! deploy:
//!   steps:
//!     - command: mkdir -p var/log
//!       triggers: [skeleton]
//!     - command: rsync -a "$BUILD_PATH/" ./
//!       triggers: [code-build]
//!   rollback_steps:
//!     - bin/console cache:clear
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod runner;
pub mod shell;
pub mod steps;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DeckhandConfig};
pub use error::{DeckhandError, Result};
pub use orchestrator::{ApplicationBuilder, ApplicationDeployer};
pub use planner::{Condition, ConditionSet, Plan, PlanHasher, PlanKind, PlanNormalizer, RawPlan};
pub use runner::{PlanRunner, RunReport, StepDispatcher, StepRegistry};
pub use shell::LocalShell;
