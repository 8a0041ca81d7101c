//! Recency gate
//!
//! A `Cutoff` describes the window as configured. Resolving it against a
//! `Clock` yields a `RecencyGate` holding both `now` and the threshold, so
//! every walk in one fan-out batch judges items against the same instant.

use crate::recency::{parse_timestamp, Clock};
use chrono::{Duration, Months, NaiveDateTime};

/// Window definition, resolved once per dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    /// Fixed duration before now
    Window(Duration),
    /// Calendar months before now (clamped to month end)
    Months(u32),
    /// Absolute instant
    Since(NaiveDateTime),
}

impl Cutoff {
    /// Computes the threshold for the given instant
    ///
    /// A window reaching past the earliest representable instant resolves
    /// to that instant, so everything counts as recent.
    pub fn resolve(&self, now: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::Window(window) => now
                .checked_sub_signed(*window)
                .unwrap_or(NaiveDateTime::MIN),
            Self::Months(months) => now
                .checked_sub_months(Months::new(*months))
                .unwrap_or(NaiveDateTime::MIN),
            Self::Since(instant) => *instant,
        }
    }
}

impl Default for Cutoff {
    fn default() -> Self {
        Self::Months(6)
    }
}

/// Outcome of judging one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    Recent,
    Stale,
    /// The timestamp matched no known format; treated as not recent
    Unparseable,
}

impl Recency {
    pub fn is_recent(&self) -> bool {
        matches!(self, Self::Recent)
    }
}

/// Resolved, immutable recency predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyGate {
    now: NaiveDateTime,
    threshold: NaiveDateTime,
}

impl RecencyGate {
    /// Resolves a cutoff against the clock
    pub fn new(cutoff: Cutoff, clock: &dyn Clock) -> Self {
        Self::at(cutoff, clock.now())
    }

    /// Resolves a cutoff against a known instant
    pub fn at(cutoff: Cutoff, now: NaiveDateTime) -> Self {
        Self {
            now,
            threshold: cutoff.resolve(now),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn threshold(&self) -> NaiveDateTime {
        self.threshold
    }

    /// Judges a raw listing timestamp
    ///
    /// Items at exactly the threshold count as recent.
    pub fn evaluate(&self, timestamp: &str) -> Recency {
        match parse_timestamp(timestamp, self.now) {
            Ok((parsed, _)) if parsed >= self.threshold => Recency::Recent,
            Ok(_) => Recency::Stale,
            Err(e) => {
                tracing::warn!("Dropping item with unusable timestamp: {}", e);
                Recency::Unparseable
            }
        }
    }

    pub fn is_recent(&self, timestamp: &str) -> bool {
        self.evaluate(timestamp).is_recent()
    }
}
