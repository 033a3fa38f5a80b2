use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::ExecError;
use crate::subsystem::SubsystemId;

/// A long-lived unit of work that acts on one or more exclusive
/// [`crate::Subsystem`]s.
///
/// Lifecycle, enforced by the scheduler rather than the trait itself:
/// `initialize` is called exactly once per scheduling episode before the
/// first `execute`; `is_finished` and `execute` are called each tick the
/// command remains scheduled, starting the tick *after* the one it was
/// accepted in; `end` is called exactly once per episode, after either a
/// `true` from `is_finished` (`interrupted = false`) or a scheduler-forced
/// termination (`interrupted = true`).
pub trait Command: Debug {
    /// A stable, human-readable name, used for diagnostics.
    fn name(&self) -> String {
        "unnamed command".to_owned()
    }

    /// The subsystems this command requires exclusive use of.
    ///
    /// Established at construction and read-only thereafter — the trait
    /// exposes no setter, only this accessor.
    fn requirements(&self) -> &HashSet<SubsystemId>;

    /// Called exactly once per scheduling episode, before the first
    /// `execute`.
    fn initialize(&mut self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Called each tick (after the first) before `execute`. Returning
    /// `true` causes normal termination this tick.
    fn is_finished(&mut self) -> Result<bool, ExecError> {
        Ok(false)
    }

    /// Called each tick the command remains scheduled and not finishing.
    fn execute(&mut self) -> Result<(), ExecError> {
        Ok(())
    }

    /// Called exactly once per scheduling episode, after termination.
    /// `interrupted` is `true` if the scheduler forced the termination
    /// rather than `is_finished` returning `true`.
    fn end(&mut self, _interrupted: bool) -> Result<(), ExecError> {
        Ok(())
    }

    /// Invoked when `execute` fails. Returning `true` absorbs the error
    /// and keeps the command scheduled; any other outcome (including
    /// this method itself panicking) forces interruption this tick.
    fn handle_exception(&mut self, _err: &ExecError) -> bool {
        false
    }
}

/// A shared, cloneable handle to a [`Command`].
///
/// Identity is by pointer, like [`crate::ActionHandle`]. The scheduler
/// holds its own clone for as long as the command is in any of its
/// populations and drops it the instant the command leaves all of them;
/// a caller that kept its own clone can still inspect the command's
/// state afterwards (per the spec's "commands maintain their state after
/// being unscheduled as long as a reference is maintained").
#[derive(Clone)]
pub struct CommandHandle(pub(crate) Rc<RefCell<dyn Command>>);

impl CommandHandle {
    /// Wraps a user-implemented [`Command`] in a shareable handle.
    pub fn new(command: impl Command + 'static) -> Self {
        Self(Rc::new(RefCell::new(command)))
    }

    /// The command's diagnostic name.
    pub fn name(&self) -> String {
        self.0.borrow().name()
    }

    /// The subsystems this command requires.
    pub fn requirements(&self) -> HashSet<SubsystemId> {
        self.0.borrow().requirements().clone()
    }

    pub(crate) fn initialize(&self) -> Result<(), ExecError> {
        self.0.borrow_mut().initialize()
    }

    pub(crate) fn is_finished(&self) -> Result<bool, ExecError> {
        self.0.borrow_mut().is_finished()
    }

    pub(crate) fn execute(&self) -> Result<(), ExecError> {
        self.0.borrow_mut().execute()
    }

    pub(crate) fn end(&self, interrupted: bool) -> Result<(), ExecError> {
        self.0.borrow_mut().end(interrupted)
    }

    /// Invokes `handle_exception`, treating a panic from it the same as
    /// a non-`true` return (Open Question #3: the crate has no way to
    /// let an arbitrary user callback "raise during error handling"
    /// other than unwind, so this is the one place that catches one).
    pub(crate) fn handle_exception(&self, err: &ExecError) -> bool {
        let cell = &self.0;
        catch_unwind(AssertUnwindSafe(|| cell.borrow_mut().handle_exception(err)))
            .unwrap_or(false)
    }

    pub(crate) fn key(&self) -> CommandKey {
        CommandKey(Rc::as_ptr(&self.0).cast::<()>() as usize)
    }
}

impl Debug for CommandHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandle")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl PartialEq for CommandHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for CommandHandle {}

/// Pointer-derived identity for a [`CommandHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CommandKey(usize);
