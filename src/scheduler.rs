use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use fxhash::{FxHashMap, FxHashSet};

use crate::arbiter;
use crate::command::{CommandHandle, CommandKey};
use crate::edge::EdgeDetector;
use crate::error::ConfigError;
use crate::registry::{BindingRegistry, Condition};
use crate::subsystem::{SubsystemHandle, SubsystemId};
use crate::ActionHandle;

thread_local! {
    static INSTANCE: RefCell<Weak<RefCell<SchedulerInner>>> = RefCell::new(Weak::new());
}

struct SchedulerInner {
    registry: BindingRegistry,
    edge: EdgeDetector,

    subsystems: Vec<SubsystemHandle>,
    known_subsystems: FxHashSet<SubsystemId>,

    all: FxHashMap<CommandKey, CommandHandle>,
    scheduled: FxHashSet<CommandKey>,
    interrupted: Vec<CommandHandle>,
    ended: Vec<CommandHandle>,
    requirement_holder: FxHashMap<SubsystemId, CommandHandle>,

    clock_speed: f64,
    stop: Cell<bool>,
    prestart: Option<Box<dyn FnMut()>>,
}

impl SchedulerInner {
    fn new() -> Self {
        Self {
            registry: BindingRegistry::new(),
            edge: EdgeDetector::new(),
            subsystems: Vec::new(),
            known_subsystems: FxHashSet::default(),
            all: FxHashMap::default(),
            scheduled: FxHashSet::default(),
            interrupted: Vec::new(),
            ended: Vec::new(),
            requirement_holder: FxHashMap::default(),
            // `clock_speed` is a rate in Hz; `execute` derives the tick
            // period as `1 / clock_speed`, so the default of 60 gives a
            // ~16.7 ms (~60 Hz) control loop, not a 60-second one.
            clock_speed: 60.0,
            stop: Cell::new(false),
            prestart: None,
        }
    }
}

/// The single-threaded, tick-driven scheduler.
///
/// At most one instance may exist per thread at a time (§4.9); dropping
/// every live handle permits a new one. `Scheduler` itself is a cheap,
/// cloneable handle around the shared state — cloning it does not create
/// a second scheduler, it just gives you another reference to the one
/// live instance.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Scheduler {
    /// Constructs a new scheduler.
    ///
    /// # Errors
    /// Returns [`ConfigError::SchedulerAlreadyExists`] if a scheduler is
    /// already live on this thread.
    pub fn new() -> Result<Self, ConfigError> {
        INSTANCE.with(|slot| {
            if slot.borrow().upgrade().is_some() {
                return Err(ConfigError::SchedulerAlreadyExists);
            }
            let inner = Rc::new(RefCell::new(SchedulerInner::new()));
            *slot.borrow_mut() = Rc::downgrade(&inner);
            tracing::debug!("constructed scheduler");
            Ok(Self { inner })
        })
    }

    /// The live scheduler instance, if one has been constructed and not
    /// yet dropped.
    #[must_use]
    pub fn instance() -> Option<Self> {
        INSTANCE.with(|slot| slot.borrow().upgrade().map(|inner| Self { inner }))
    }

    /// The current tick rate, in Hz. The tick period `execute` sleeps
    /// for is `1 / clock_speed`.
    #[must_use]
    pub fn clock_speed(&self) -> f64 {
        self.inner.borrow().clock_speed
    }

    /// Sets the tick rate.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidClockSpeed`], leaving the prior
    /// value unchanged, if `hz` is not strictly positive.
    pub fn set_clock_speed(&self, hz: f64) -> Result<(), ConfigError> {
        if hz <= 0.0 {
            return Err(ConfigError::InvalidClockSpeed { hz });
        }
        self.inner.borrow_mut().clock_speed = hz;
        Ok(())
    }

    /// Registers a hook to run once, just before `execute`'s first tick.
    /// No-op by default.
    pub fn set_prestart_setup(&self, f: impl FnMut() + 'static) {
        self.inner.borrow_mut().prestart = Some(Box::new(f));
    }

    /// Runs any configured prestart hook. Called automatically by
    /// [`Scheduler::execute`]; exposed so tests and custom drivers can
    /// invoke it directly.
    pub fn prestart_setup(&self) {
        let hook = self.inner.borrow_mut().prestart.take();
        if let Some(mut hook) = hook {
            hook();
            self.inner.borrow_mut().prestart = Some(hook);
        }
    }

    /// Registers `subsystem` so its `periodic` hook runs every tick.
    /// Idempotent — registering the same subsystem twice is a no-op.
    pub fn register_subsystem(&self, subsystem: SubsystemHandle) {
        let mut inner = self.inner.borrow_mut();
        if inner.known_subsystems.insert(subsystem.id()) {
            tracing::debug!(subsystem = %subsystem.name(), "registered subsystem");
            inner.subsystems.push(subsystem);
        }
    }

    /// Binds `command` to `action`, to be scheduled according to
    /// `condition`. See [`crate::BindingRegistry::bind`].
    pub fn bind_command(&self, action: &ActionHandle, command: CommandHandle, condition: Condition) {
        self.inner.borrow_mut().registry.bind(action, command, condition);
    }

    /// Immediately cancels and interrupts the given commands, calling
    /// `end(interrupted = true)` on each one currently tracked by this
    /// scheduler. A command not currently tracked is silently ignored.
    /// With no arguments, cancels every tracked command. Calling this
    /// with nothing left to cancel is a no-op.
    pub fn cancel(&self, commands: &[CommandHandle]) {
        let mut inner = self.inner.borrow_mut();
        let targets: Vec<CommandHandle> = if commands.is_empty() {
            inner.all.values().cloned().collect()
        } else {
            commands
                .iter()
                .filter(|c| inner.all.contains_key(&c.key()))
                .cloned()
                .collect()
        };
        for command in targets {
            end_and_remove(&mut inner, &command, true);
        }
    }

    /// Runs one complete tick: poll, classify, default-fill, interrupt,
    /// end finishers, initialize incoming, execute scheduled, commit.
    pub fn run_once(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.run_once();
    }

    /// Runs the fixed-rate event loop: `run_once` followed by a sleep for
    /// whatever remains of the tick period, repeated until
    /// [`Scheduler::shutdown`] is called. `sleep` is the caller-supplied
    /// timing primitive (e.g. `std::thread::sleep`) — the scheduler core
    /// has no clock/sleep primitive of its own (§1).
    pub fn execute(&self, mut sleep: impl FnMut(Duration)) {
        self.prestart_setup();
        loop {
            if self.inner.borrow().stop.get() {
                self.cancel(&[]);
                self.inner.borrow().stop.set(false);
                return;
            }
            let tick_start = Instant::now();
            self.run_once();
            let period = Duration::from_secs_f64(1.0 / self.clock_speed());
            let elapsed = tick_start.elapsed();
            if elapsed < period {
                sleep(period - elapsed);
            }
        }
    }

    /// Requests that [`Scheduler::execute`] stop at its next loop
    /// boundary, cancelling every tracked command first.
    ///
    /// Calling this from the thread currently blocked inside `execute`
    /// deadlocks — it can only take effect between ticks.
    pub fn shutdown(&self) {
        self.inner.borrow().stop.set(true);
    }
}

fn end_and_remove(inner: &mut SchedulerInner, command: &CommandHandle, interrupted: bool) {
    if let Err(err) = command.end(interrupted) {
        tracing::warn!(command = %command.name(), ?err, "command end() failed");
    }
    let key = command.key();
    inner.scheduled.remove(&key);
    inner.all.remove(&key);
    inner.requirement_holder.retain(|_, holder| holder.key() != key);
}

impl SchedulerInner {
    fn run_once(&mut self) {
        // Subsystem periodics run unconditionally every tick (§4.3),
        // ahead of the eight phases proper.
        for subsystem in &self.subsystems {
            subsystem.periodic();
        }

        // Phase 1+2: poll actions, classify intents.
        let scheduled = self.scheduled.clone();
        let intents = self.edge.poll_all(&self.registry, |c| scheduled.contains(&c.key()));

        let mut new_interrupts: Vec<CommandHandle> = Vec::new();
        let mut interrupted_keys: FxHashSet<CommandKey> =
            FxHashSet::default();
        for cancel in intents.cancels {
            let key = cancel.key();
            if self.scheduled.contains(&key) && interrupted_keys.insert(key) {
                new_interrupts.push(cancel);
            }
        }

        // Dedup candidates, dropping any already scheduled (re-triggering
        // an already-running command's schedule intent is a no-op).
        let mut seen_candidates: FxHashSet<CommandKey> =
            FxHashSet::default();
        let candidates: Vec<CommandHandle> = intents
            .candidates
            .into_iter()
            .filter(|c| {
                let key = c.key();
                !self.scheduled.contains(&key) && seen_candidates.insert(key)
            })
            .collect();

        let already_interrupted =
            |c: &CommandHandle| interrupted_keys.contains(&c.key());
        let resolution = arbiter::resolve(
            candidates,
            |c| self.scheduled.contains(&c.key()),
            |req| self.requirement_holder.get(&req).cloned(),
            already_interrupted,
        );

        for displaced in &resolution.displaced {
            if interrupted_keys.insert(displaced.key()) {
                new_interrupts.push(displaced.clone());
            }
        }

        // Phase 3: default-command fill, using the requirement map as it
        // stands after conflict resolution. `taken = scheduled_prev \
        // interrupted` (§4.6 step 1) — `interrupted_keys` is the
        // superset that covers both arbiter-displaced holders and
        // commands interrupted this tick via a direct cancel intent, so
        // a cancelled command's subsystem is free for default-fill the
        // same tick it's cancelled, not one tick late.
        let mut effective_taken: FxHashSet<SubsystemId> = self
            .requirement_holder
            .iter()
            .filter(|(_, holder)| !interrupted_keys.contains(&holder.key()))
            .map(|(id, _)| *id)
            .collect();
        for incoming in &resolution.incoming {
            effective_taken.extend(incoming.requirements());
        }
        let incoming_keys: FxHashSet<CommandKey> =
            resolution.incoming.iter().map(CommandHandle::key).collect();
        let fill = arbiter::default_fill(
            &self.subsystems,
            |id| effective_taken.contains(&id),
            |c| incoming_keys.contains(&c.key()) || self.scheduled.contains(&c.key()),
        );

        let mut incoming_commands = resolution.incoming;
        incoming_commands.extend(fill);

        self.interrupted.extend(new_interrupts);

        // Phase 4: interrupt.
        let to_interrupt = std::mem::take(&mut self.interrupted);
        for command in to_interrupt {
            end_and_remove(self, &command, true);
        }

        // Phase 5: end finishers (populated by the previous tick's
        // phase 7).
        let to_end = std::mem::take(&mut self.ended);
        for command in to_end {
            end_and_remove(self, &command, false);
        }

        // Phase 6: initialize incoming.
        let mut just_initialized: FxHashSet<CommandKey> =
            FxHashSet::default();
        for command in incoming_commands {
            let key = command.key();
            self.all.insert(key, command.clone());
            match command.initialize() {
                Ok(()) => {
                    self.scheduled.insert(key);
                    just_initialized.insert(key);
                    for req in command.requirements() {
                        self.requirement_holder.insert(req, command.clone());
                    }
                }
                Err(err) => {
                    tracing::warn!(command = %command.name(), ?err, "command initialize() failed, discarding");
                    self.all.remove(&key);
                }
            }
        }

        // Phase 7: execute scheduled, excluding commands initialized
        // this same tick.
        let to_execute: Vec<CommandHandle> = self
            .scheduled
            .iter()
            .filter(|key| !just_initialized.contains(key))
            .filter_map(|key| self.all.get(key).cloned())
            .collect();

        for command in to_execute {
            match command.is_finished() {
                Ok(true) => self.ended.push(command),
                Ok(false) => {
                    if let Err(err) = command.execute() {
                        tracing::warn!(command = %command.name(), ?err, "command execute() failed");
                        if command.handle_exception(&err) {
                            tracing::debug!(command = %command.name(), "execute() error absorbed by handle_exception");
                        } else {
                            tracing::warn!(command = %command.name(), "execute() error not absorbed, interrupting next tick");
                            self.interrupted.push(command);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(command = %command.name(), ?err, "command is_finished() failed, discarding");
                    let key = command.key();
                    self.scheduled.remove(&key);
                    self.all.remove(&key);
                    self.requirement_holder.retain(|_, holder| holder.key() != key);
                }
            }
        }

        // Phase 8: commit. Update current_command pointers; per-tick
        // scratch state above was already consumed in place.
        for subsystem in &self.subsystems {
            let current = self.requirement_holder.get(&subsystem.id()).cloned();
            subsystem.set_current_command(current);
        }

        tracing::trace!("completed scheduler tick");
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        tracing::debug!("dropping scheduler");
    }
}
