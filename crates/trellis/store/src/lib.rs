//! Run storage for Trellis
//!
//! The [`RunStore`] trait is the persistence boundary of the
//! orchestration core: durable, transactional storage of runs and
//! their state history, with two primitives the engine depends on:
//!
//! - **Per-run exclusive locks** ([`RunStore::lock_run`]): at most one
//!   in-flight transition per run. Attempts against different runs
//!   never contend.
//! - **Idempotent insert** ([`RunStore::create_run_idempotent`]): a
//!   conditional insert over `(owning scope, idempotency key)` that
//!   reports whether the row was genuinely newly inserted, so callers
//!   never have to infer creation from timestamps.
//!
//! [`InMemoryRunStore`] is the reference backend, suitable for tests
//! and development. A SQL backend would implement the same trait with
//! row-level locks (`SELECT ... FOR UPDATE`) and a uniqueness
//! constraint for the idempotent insert.

#![deny(unsafe_code)]

mod error;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemoryRunStore;
pub use traits::{RunLock, RunStore, TimingUpdate};
