//! The Trellis run lifecycle service
//!
//! Ties the layers together: runs are created and listed against a
//! [`trellis_store::RunStore`], every state change goes through the
//! orchestration engine's rule chains, scheduled task runs fan out to
//! topic queues, and consumers follow them through [`Subscription`]
//! sessions with explicit acknowledgement.

#![deny(unsafe_code)]

mod config;
mod error;
mod history;
mod service;
mod sink;

pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use service::{RunService, Subscription, MAX_HISTORY_BUCKETS};
