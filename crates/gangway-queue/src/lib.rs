//! gangway-queue — the scheduling unit queue.
//!
//! Units wait here ordered by `(priority desc, enqueue time asc, key
//! asc)`, strictly FIFO within a priority band. Group units park in a
//! pending set until they gather `min_member` members; parked too
//! long, they are expelled by the gang-timeout sweep.

pub mod shared;
pub mod unit_queue;

pub use shared::SharedUnitQueue;
pub use unit_queue::{TimedOutUnit, UnitQueue};
