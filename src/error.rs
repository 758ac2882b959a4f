//! Error types shared by every part of the search engine.
//!
//! Simulator failures are not errors here: a failed step marks the new
//! node terminal and the search carries on. Everything below is either a
//! protocol violation or an exhausted search, and stops the iteration that
//! hit it.

use crate::tree::NodeId;
use thiserror::Error;

/// Errors raised by the tree, the samplers and the stage driver.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tree policy was asked to descend from a root with nothing left to expand.
    #[error("node {node} is fully explored; nothing left to expand below it")]
    ExplorationExhausted { node: NodeId },

    /// Expansion asked for an action that is not untried at the node.
    #[error("invalid expansion request at node {node}: {reason}")]
    InvalidActionRequest { node: NodeId, reason: String },

    /// A distribution was asked to draw from an empty candidate set.
    #[error("cannot sample from an empty pool")]
    SamplingPoolEmpty,

    /// Unpaired reserve/release, or a mutation without holding the reservation.
    #[error("reservation misuse at node {node}: {reason}")]
    ReservationMisuse { node: NodeId, reason: String },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// True for the one error a worker treats as a normal end of work.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, SearchError::ExplorationExhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_mentions_node() {
        let err = SearchError::ExplorationExhausted { node: NodeId(7) };
        assert!(err.to_string().contains("#7"));
        assert!(err.is_exhausted());
    }

    #[test]
    fn test_misuse_is_not_exhaustion() {
        let err = SearchError::ReservationMisuse {
            node: NodeId(0),
            reason: "release without reserve".into(),
        };
        assert!(!err.is_exhausted());
        assert!(err.to_string().contains("release without reserve"));
    }
}
