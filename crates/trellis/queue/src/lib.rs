//! Topic-keyed fan-out queues with at-least-once delivery
//!
//! Scheduled runs fan out to workers through named topics. Each topic
//! is a FIFO delivering every item to exactly one consumer; consumers
//! acknowledge each [`Delivery`] explicitly, and an unacknowledged
//! handle requeues its item at the front on drop. [`MultiQueue`] lets
//! one consumer wait across several topics, and [`QueueRegistry`] is
//! the process-wide name-to-queue map with idle reclamation.

#![deny(unsafe_code)]

mod delivery;
mod error;
mod multi;
mod registry;
mod topic;

pub use delivery::Delivery;
pub use error::{QueueError, Result};
pub use multi::MultiQueue;
pub use registry::QueueRegistry;
pub use topic::TopicQueue;
