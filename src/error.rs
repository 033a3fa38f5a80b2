use thiserror::Error;

/// The error type returned by a user-implemented callback
/// (`Action::poll`, or any `Command` lifecycle method).
///
/// Boxed rather than generic since the concrete error originates in
/// arbitrary user code the scheduler has no type-level knowledge of.
pub type ExecError = Box<dyn std::error::Error>;

/// Configuration errors, raised synchronously to the caller.
///
/// These are the only errors this crate ever returns from a public
/// method; everything else (binding conflicts, lifecycle failures,
/// execute failures, poll failures) is contained within the tick and
/// reported via `tracing::warn!` instead, per the propagation policy.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A [`crate::Scheduler`] already exists on this thread.
    #[error("a scheduler already exists on this thread; drop it before constructing a new one")]
    SchedulerAlreadyExists,

    /// `clock_speed` was set to a non-positive value.
    #[error("clock_speed must be strictly positive, got {hz}")]
    InvalidClockSpeed {
        /// The rejected value.
        hz: f64,
    },

    /// A default command was assigned to a subsystem it does not require.
    #[error("command {command_name:?} cannot be the default command for {subsystem_name:?}: it does not require that subsystem")]
    DefaultCommandMissingRequirement {
        /// The subsystem the default command was assigned to.
        subsystem_name: String,
        /// The command that was rejected.
        command_name: String,
    },
}
