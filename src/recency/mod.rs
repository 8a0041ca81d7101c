//! Recency module for deciding whether listing items are still in window
//!
//! # Components
//!
//! - `parse_timestamp`: normalizes the textual timestamp formats found on
//!   remote listings into a `NaiveDateTime`
//! - `Clock`: injectable source of "now" (system clock or a fixed instant)
//! - `Cutoff` / `RecencyGate`: the window definition and its resolved,
//!   immutable predicate shared by every walk in a fan-out batch

mod clock;
mod gate;
mod timestamp;

pub use clock::{Clock, FixedClock, SystemClock};
pub use gate::{Cutoff, Recency, RecencyGate};
pub use timestamp::{parse_timestamp, TimestampFormat, SHORT_FORM_TOLERANCE_HOURS};
