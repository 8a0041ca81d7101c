/// Walk termination reasons
///
/// Every walk ends in exactly one of these states.
use std::fmt;

/// Why a page walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkStop {
    // ===== Natural Ends =====
    /// A page came back with no items
    EmptyPage,

    /// A page held fewer items than the nominal page size
    ShortPage,

    /// An item fell outside the recency window
    StaleItem,

    /// The source reported no further cursor
    Exhausted,

    // ===== Imposed Ends =====
    /// The configured page cap was reached
    PageLimit,

    /// The shared cancellation token fired
    Cancelled,

    // ===== Failure =====
    /// A fetch or persist failed; the error travels with the result
    Error,
}

impl WalkStop {
    /// Returns true if the listing itself signalled the end
    pub fn is_natural(&self) -> bool {
        matches!(
            self,
            Self::EmptyPage | Self::ShortPage | Self::StaleItem | Self::Exhausted
        )
    }

    /// Returns true if a walk ending this way covered its whole window
    ///
    /// A page cap cuts the walk short, so the parent is not complete.
    pub fn is_complete(&self) -> bool {
        self.is_natural()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyPage => "empty_page",
            Self::ShortPage => "short_page",
            Self::StaleItem => "stale_item",
            Self::Exhausted => "exhausted",
            Self::PageLimit => "page_limit",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for WalkStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
