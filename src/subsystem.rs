use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::command::CommandHandle;
use crate::error::ConfigError;

/// An exclusive resource with an always-on periodic hook.
///
/// `periodic` is called once per tick for every registered subsystem,
/// regardless of whether a command currently requires it.
pub trait Subsystem: Debug {
    /// A stable, human-readable name. Used only for diagnostics; does
    /// not need to be unique.
    fn name(&self) -> &str {
        "unnamed subsystem"
    }

    /// Called every tick by the scheduler.
    fn periodic(&mut self) {}
}

/// Pointer-derived identity for a [`SubsystemHandle`].
///
/// `Command::requirements` is expressed in terms of this id rather than
/// the handle itself so that a command can declare its requirements
/// without holding a strong reference to the subsystem (see the
/// command↔subsystem cycle note in `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubsystemId(usize);

struct SubsystemInner {
    behavior: RefCell<Box<dyn Subsystem>>,
    current_command: RefCell<Option<CommandHandle>>,
    default_command: RefCell<Option<CommandHandle>>,
}

/// A shared handle to a registered [`Subsystem`].
///
/// Mirrors the original framework's subsystem object, which carries its
/// own `current_command`/`default_command` properties rather than the
/// scheduler keeping a parallel side table. `current_command` is
/// scheduler-owned (only `Scheduler` ever calls the crate-private
/// setter); `default_command` is user-settable, with the requirement
/// containment check enforced at assignment time.
#[derive(Clone)]
pub struct SubsystemHandle(Rc<SubsystemInner>);

impl SubsystemHandle {
    /// Wraps a user-implemented [`Subsystem`] in a shareable handle.
    ///
    /// This does not register the subsystem with a scheduler; pass it to
    /// [`crate::Scheduler::register_subsystem`] to do that.
    pub fn new(behavior: impl Subsystem + 'static) -> Self {
        Self(Rc::new(SubsystemInner {
            behavior: RefCell::new(Box::new(behavior)),
            current_command: RefCell::new(None),
            default_command: RefCell::new(None),
        }))
    }

    /// The subsystem's diagnostic name.
    pub fn name(&self) -> String {
        self.0.behavior.borrow().name().to_owned()
    }

    /// The command currently using this subsystem, if any.
    ///
    /// Equals the unique scheduled command that requires this
    /// subsystem, or the scheduled default command if any, or `None`.
    /// Updated by the scheduler after every tick's population commit.
    pub fn current_command(&self) -> Option<CommandHandle> {
        self.0.current_command.borrow().clone()
    }

    /// The command to run whenever no other command is using this
    /// subsystem.
    pub fn default_command(&self) -> Option<CommandHandle> {
        self.0.default_command.borrow().clone()
    }

    /// Assigns the default command for this subsystem.
    ///
    /// # Errors
    /// Returns [`ConfigError::DefaultCommandMissingRequirement`] if
    /// `command` does not list this subsystem among its requirements.
    pub fn set_default_command(
        &self,
        command: Option<CommandHandle>,
    ) -> Result<(), ConfigError> {
        if let Some(command) = &command {
            if !command.requirements().contains(&self.id()) {
                return Err(ConfigError::DefaultCommandMissingRequirement {
                    subsystem_name: self.name(),
                    command_name: command.name(),
                });
            }
        }
        *self.0.default_command.borrow_mut() = command;
        Ok(())
    }

    pub(crate) fn set_current_command(&self, command: Option<CommandHandle>) {
        *self.0.current_command.borrow_mut() = command;
    }

    pub(crate) fn periodic(&self) {
        self.0.behavior.borrow_mut().periodic();
    }

    pub(crate) fn id(&self) -> SubsystemId {
        SubsystemId(Rc::as_ptr(&self.0).cast::<()>() as usize)
    }
}

impl Debug for SubsystemHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubsystemHandle")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl PartialEq for SubsystemHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
impl Eq for SubsystemHandle {}
