use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::error::ExecError;

/// Polls an opaque external condition and emits a boolean per tick.
///
/// `poll` is called at most once per tick per action, in unspecified
/// order, and must be side-effect-free with respect to scheduler data —
/// it may read external state (a button, a sensor, a flag) but must not
/// reach back into the scheduler. An `Err` is treated as `false` for
/// that tick and reported via `tracing::warn!`.
pub trait Action: Debug {
    /// Checks whether the condition this action represents is currently
    /// met.
    fn poll(&mut self) -> Result<bool, ExecError>;
}

/// A shared, cloneable handle to an [`Action`].
///
/// Identity is by pointer: two handles produced by cloning the same
/// `ActionHandle::new(..)` call refer to the same action and compare
/// equal, regardless of how many clones exist. This is what lets the
/// same action be bound to several commands (or the same command bound
/// under several conditions) without the scheduler needing to own it
/// outright.
#[derive(Clone)]
pub struct ActionHandle(pub(crate) Rc<RefCell<dyn Action>>);

impl ActionHandle {
    /// Wraps a user-implemented [`Action`] in a shareable handle.
    pub fn new(action: impl Action + 'static) -> Self {
        Self(Rc::new(RefCell::new(action)))
    }

    /// Polls the underlying action.
    pub(crate) fn poll(&self) -> Result<bool, ExecError> {
        self.0.borrow_mut().poll()
    }

    /// A stable key suitable for hashing/equality, derived from pointer
    /// identity.
    pub(crate) fn key(&self) -> ActionKey {
        ActionKey(Rc::as_ptr(&self.0).cast::<()>() as usize)
    }
}

impl Debug for ActionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandle")
            .field("action", &self.0.borrow())
            .finish()
    }
}

impl PartialEq for ActionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for ActionHandle {}

/// Pointer-derived identity for an [`ActionHandle`], used internally to
/// key per-action edge state and toggle latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ActionKey(usize);
