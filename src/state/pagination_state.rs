/// Pagination state definitions for one partition traversal
///
/// This module defines the states a partition passes through while its pages
/// are loaded, parsed, and advanced.
use std::fmt;

/// Represents the current state of a partition's pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginationState {
    // ===== Active States =====
    /// Partition selected, nothing requested yet
    Start,

    /// First page of the partition is being loaded
    Loading,

    /// A page has been extracted and committed
    HasPage,

    /// Asking the renderer for the next page
    Advancing,

    // ===== Terminal States =====
    /// No further page exists
    Done,

    /// Retries exhausted, structure broken, or loop suspected
    Failed,
}

impl PaginationState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if the state machine allows moving to `next`
    ///
    /// Every active state may fail; terminal states never move again.
    pub fn can_transition_to(&self, next: PaginationState) -> bool {
        match (self, next) {
            (Self::Start, Self::Loading) => true,
            (Self::Loading, Self::HasPage) => true,
            (Self::HasPage, Self::Advancing) => true,
            (Self::Advancing, Self::HasPage) => true,
            (Self::Advancing, Self::Done) => true,
            (from, Self::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Loading => "loading",
            Self::HasPage => "has_page",
            Self::Advancing => "advancing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PaginationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
