//! Domain types for Trellis — the run-state orchestration core
//!
//! A **run** is a unit of trackable work passing through a finite set of
//! lifecycle stages. Runs come in two kinds: a top-level flow run and a
//! nested task run belonging to one; both share the same state-machine
//! shape.
//!
//! # Key Concepts
//!
//! - **Run**: the unit of work. Carries exactly one *current*
//!   [`StateValue`]; prior states are retained as immutable history by
//!   the store, never mutated.
//! - **StateValue**: an immutable snapshot of a run's status at a point
//!   in time. A transition always creates a new one.
//! - **SetStateStatus / OrchestrationResult**: the structured outcome of
//!   a transition attempt. "The transition was considered but rejected"
//!   is a normal result, not an error.
//! - **RunFilter / RunSort**: independent predicate fragments combined
//!   with AND semantics for list and count operations.
//!
//! # Design Principles
//!
//! 1. State values are never edited. Changing a run's status means
//!    committing a new state and retiring the old one into history.
//! 2. Runs are mutated only through the orchestration engine (state) or
//!    direct field update (non-state attributes).
//! 3. Every transition attempt produces exactly one terminal status:
//!    Accept, Reject, Abort, or Wait.

#![deny(unsafe_code)]

mod filter;
mod history;
mod response;
mod run;
mod state;

pub use filter::*;
pub use history::*;
pub use response::*;
pub use run::*;
pub use state::*;
