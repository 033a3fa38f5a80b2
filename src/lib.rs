//! A single-threaded, tick-driven scheduler for orchestrating commands
//! that act on exclusive subsystems in response to polled actions.
//!
//! Three contracts are user-implemented — [`Action`], [`Command`],
//! [`Subsystem`] — and bound together through a [`Scheduler`], which
//! owns the bindings, arbitrates requirement conflicts, and drives the
//! eight-phase tick.
//!
//! # Examples
//!
//! ```
//! use command_scheduler::{Action, Command, Scheduler, Subsystem, SubsystemHandle};
//! use std::collections::HashSet;
//!
//! #[derive(Debug)]
//! struct Drivetrain;
//! impl Subsystem for Drivetrain {
//!     fn name(&self) -> &str {
//!         "drivetrain"
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct DriveForward {
//!     requirements: HashSet<command_scheduler::SubsystemId>,
//! }
//! impl Command for DriveForward {
//!     fn requirements(&self) -> &HashSet<command_scheduler::SubsystemId> {
//!         &self.requirements
//!     }
//! }
//!
//! let scheduler = Scheduler::new().expect("only scheduler this thread");
//! let drivetrain = SubsystemHandle::new(Drivetrain);
//! scheduler.register_subsystem(drivetrain);
//! scheduler.run_once();
//! ```

mod action;
mod arbiter;
mod command;
mod edge;
mod error;
mod registry;
mod scheduler;
mod subsystem;


pub use action::{Action, ActionHandle};
pub use command::{Command, CommandHandle};
pub use error::{ConfigError, ExecError};
pub use registry::Condition;
pub use scheduler::Scheduler;
pub use subsystem::{Subsystem, SubsystemHandle, SubsystemId};
