//! Update functions applied to a register's value
//!
//! An [`Update`] is a plain value rather than a closure over caller state,
//! so it can be applied on whichever task finishes the prepare phase. It is
//! applied exactly once per successful round.

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Register value. Absence is the empty state.
pub type State = Bytes;

/// Pure state transformation used by [`Custom`](Update::Custom).
pub type UpdateFn = Arc<dyn Fn(&State) -> State + Send + Sync>;

/// Transformation proposed for a key.
#[derive(Clone)]
pub enum Update {
    /// Leave the value unchanged; proposing it is a linearizable read
    Identity,
    /// Install `set` if the current value equals `expect`, otherwise keep it
    CompareAndSet { expect: State, set: State },
    /// Install the empty state if the current value equals `expect`
    Delete { expect: State },
    Custom(UpdateFn),
}

impl Update {
    pub fn compare_and_set(expect: impl Into<State>, set: impl Into<State>) -> Self {
        Update::CompareAndSet {
            expect: expect.into(),
            set: set.into(),
        }
    }

    pub fn delete(expect: impl Into<State>) -> Self {
        Update::Delete {
            expect: expect.into(),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&State) -> State + Send + Sync + 'static,
    {
        Update::Custom(Arc::new(f))
    }

    /// Compute the candidate state from the prepared base value.
    pub fn apply(&self, current: &State) -> State {
        match self {
            Update::Identity => current.clone(),
            Update::CompareAndSet { expect, set } => {
                if current == expect {
                    set.clone()
                } else {
                    current.clone()
                }
            }
            Update::Delete { expect } => {
                if current == expect {
                    State::new()
                } else {
                    current.clone()
                }
            }
            Update::Custom(f) => f(current),
        }
    }

    /// Short name used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Update::Identity => "identity",
            Update::CompareAndSet { .. } => "cas",
            Update::Delete { .. } => "delete",
            Update::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Identity => write!(f, "Identity"),
            Update::CompareAndSet { expect, set } => f
                .debug_struct("CompareAndSet")
                .field("expect", expect)
                .field("set", set)
                .finish(),
            Update::Delete { expect } => f.debug_struct("Delete").field("expect", expect).finish(),
            Update::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
