/// Parent status for resumable fan-out
///
/// Records that act as parents (forum topics) carry a status column. A
/// parent is `Unused` until its child walk completes, then `Done`.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentStatus {
    /// Children not yet harvested, or the parent changed since
    Unused,

    /// Child walk finished
    Done,
}

impl ParentStatus {
    /// Converts the status to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Done => "done",
        }
    }

    /// Parses a status from its database representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "unused" => Some(Self::Unused),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn all_statuses() -> [Self; 2] {
        [Self::Unused, Self::Done]
    }
}

impl fmt::Display for ParentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
