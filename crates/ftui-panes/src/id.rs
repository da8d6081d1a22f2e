#![forbid(unsafe_code)]

//! Stable identifiers for panes and tree nodes.
//!
//! Both id spaces are non-zero `u64` values handed out by monotonic counters
//! owned by the model. `0` is reserved so a zeroed field can never alias a
//! live entity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "u64", into = "u64")]
        pub struct $name(u64);

        impl TryFrom<u64> for $name {
            type Error = ModelError;

            fn try_from(raw: u64) -> Result<Self, Self::Error> {
                Self::new(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl $name {
            /// Lowest valid id.
            pub const MIN: Self = Self(1);

            /// Create an id, rejecting 0.
            pub fn new(raw: u64) -> Result<Self, ModelError> {
                if raw == 0 {
                    return Err(ModelError::ZeroId { kind: $prefix });
                }
                Ok(Self(raw))
            }

            /// Raw numeric value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// The id after this one, or an error on overflow.
            pub fn checked_next(self) -> Result<Self, ModelError> {
                match self.0.checked_add(1) {
                    Some(next) => Ok(Self(next)),
                    None => Err(ModelError::IdOverflow { kind: $prefix }),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::MIN
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a pane (a leaf position holding content).
    PaneId,
    "pane"
);

define_id!(
    /// Identifier of any node in the layout tree, leaf or split.
    NodeId,
    "node"
);

/// Monotonic id source for one model.
///
/// Counters only move forward. Restoring an older model state keeps the
/// higher counter so ids freed by undo or rollback are never handed out
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdAllocator {
    next_pane: PaneId,
    next_node: NodeId,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next_pane: PaneId::MIN,
            next_node: NodeId::MIN,
        }
    }
}

impl IdAllocator {
    /// Start from explicit counters.
    #[must_use]
    pub const fn with_next(next_pane: PaneId, next_node: NodeId) -> Self {
        Self {
            next_pane,
            next_node,
        }
    }

    /// Next pane id that would be allocated.
    #[must_use]
    pub const fn peek_pane(&self) -> PaneId {
        self.next_pane
    }

    /// Next node id that would be allocated.
    #[must_use]
    pub const fn peek_node(&self) -> NodeId {
        self.next_node
    }

    /// Allocate a fresh pane id.
    pub fn allocate_pane(&mut self) -> Result<PaneId, ModelError> {
        let current = self.next_pane;
        self.next_pane = current.checked_next()?;
        Ok(current)
    }

    /// Allocate a fresh node id.
    pub fn allocate_node(&mut self) -> Result<NodeId, ModelError> {
        let current = self.next_node;
        self.next_node = current.checked_next()?;
        Ok(current)
    }

    /// Make sure `id` is never allocated in the future.
    pub fn reserve_pane(&mut self, id: PaneId) -> Result<(), ModelError> {
        if id >= self.next_pane {
            self.next_pane = id.checked_next()?;
        }
        Ok(())
    }

    /// Make sure `id` is never allocated in the future.
    pub fn reserve_node(&mut self, id: NodeId) -> Result<(), ModelError> {
        if id >= self.next_node {
            self.next_node = id.checked_next()?;
        }
        Ok(())
    }

    /// Component-wise maximum, used when an older state is restored.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            next_pane: self.next_pane.max(other.next_pane),
            next_node: self.next_node.max(other.next_node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(PaneId::new(0).is_err());
        assert!(NodeId::new(0).is_err());
        assert_eq!(PaneId::new(7).expect("non-zero").get(), 7);
    }

    #[test]
    fn allocator_is_monotonic() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.allocate_pane().expect("pane 1").get(), 1);
        assert_eq!(ids.allocate_pane().expect("pane 2").get(), 2);
        assert_eq!(ids.allocate_node().expect("node 1").get(), 1);
        assert_eq!(ids.peek_pane().get(), 3);
    }

    #[test]
    fn reserve_skips_past_explicit_ids() {
        let mut ids = IdAllocator::default();
        ids.reserve_pane(PaneId::new(10).expect("non-zero"))
            .expect("reserve");
        assert_eq!(ids.allocate_pane().expect("pane").get(), 11);

        // Reserving an id below the counter never moves it backwards.
        ids.reserve_pane(PaneId::new(3).expect("non-zero"))
            .expect("reserve");
        assert_eq!(ids.peek_pane().get(), 12);
    }

    #[test]
    fn max_keeps_highest_counters() {
        let low = IdAllocator::default();
        let mut high = IdAllocator::default();
        let _ = high.allocate_node().expect("node");
        let merged = low.max(high);
        assert_eq!(merged.peek_node().get(), 2);
        assert_eq!(merged.peek_pane().get(), 1);
    }

    #[test]
    fn overflow_is_reported() {
        let last = PaneId::new(u64::MAX).expect("non-zero");
        assert!(last.checked_next().is_err());
    }

    #[test]
    fn display_is_prefixed() {
        assert_eq!(PaneId::MIN.to_string(), "pane#1");
        assert_eq!(NodeId::new(4).expect("non-zero").to_string(), "node#4");
    }

    #[test]
    fn serde_uses_plain_numbers_and_rejects_zero() {
        let json = serde_json::to_string(&PaneId::new(9).expect("non-zero")).expect("serialize");
        assert_eq!(json, "9");
        let back: NodeId = serde_json::from_str("9").expect("deserialize");
        assert_eq!(back.get(), 9);
        assert!(serde_json::from_str::<PaneId>("0").is_err());
    }
}
