use fxhash::FxHashMap;

use crate::action::ActionKey;
use crate::command::{CommandHandle, CommandKey};
use crate::registry::{BindingRegistry, Condition};

/// A tick's worth of scheduling intents emitted by the edge detector.
#[derive(Default)]
pub(crate) struct Intents {
    /// Commands provisionally accepted for scheduling this tick,
    /// pending conflict arbitration. Order matters — it is the
    /// candidate order the arbiter resolves ties with.
    pub(crate) candidates: Vec<CommandHandle>,
    /// Commands to cancel outright (added to `interrupted` if currently
    /// scheduled, a no-op otherwise).
    pub(crate) cancels: Vec<CommandHandle>,
}

/// Tracks, per action, the previous tick's poll result; and per
/// `(action, command)` pair bound under `toggle_when_activated`, a latch
/// bit flipped on each rising edge.
///
/// Grounded on the teacher's `Condition::on_true`/`on_false`
/// (`conditions.rs`), which compare a `Cell<bool>`-held `last_poll`
/// against the new poll result to detect exactly one of these two
/// edges; this generalizes that technique to the full five-condition
/// matrix plus the toggle latch.
#[derive(Default)]
pub(crate) struct EdgeDetector {
    prev: FxHashMap<ActionKey, bool>,
    toggle_latch: FxHashMap<(ActionKey, CommandKey), bool>,
}

impl EdgeDetector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Polls every action in `registry`'s registration order and emits
    /// the resulting intents. `is_scheduled` reports whether a command
    /// is currently in the scheduled population (needed for
    /// `when_held`'s "only if not already scheduled" rule).
    pub(crate) fn poll_all(
        &mut self,
        registry: &BindingRegistry,
        is_scheduled: impl Fn(&CommandHandle) -> bool,
    ) -> Intents {
        let mut intents = Intents::default();
        for binding in registry.actions_in_order() {
            let key = binding.handle.key();
            let now = match binding.handle.poll() {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(?err, "action poll failed, treating as false this tick");
                    false
                }
            };
            let prev = self.prev.get(&key).copied().unwrap_or(false);

            if !prev && now {
                self.on_rising_edge(&mut intents, binding, key);
            } else if prev && now {
                self.on_held(&mut intents, binding, &is_scheduled);
            } else if prev && !now {
                self.on_falling_edge(&mut intents, binding);
            }

            self.prev.insert(key, now);
        }
        intents
    }

    fn on_rising_edge(
        &mut self,
        intents: &mut Intents,
        binding: &crate::registry::ActionBinding,
        action_key: ActionKey,
    ) {
        for condition in Condition::VISIT_ORDER {
            for command in binding.conditions.list(condition) {
                match condition {
                    Condition::CancelWhenActivated => intents.cancels.push(command.clone()),
                    Condition::ToggleWhenActivated => {
                        let latch_key = (action_key, command.key());
                        let latch = self.toggle_latch.entry(latch_key).or_insert(false);
                        *latch = !*latch;
                        if *latch {
                            intents.candidates.push(command.clone());
                        } else {
                            intents.cancels.push(command.clone());
                        }
                    }
                    Condition::WhenActivated | Condition::WhenHeld => {
                        intents.candidates.push(command.clone());
                    }
                    Condition::WhenDeactivated => {}
                }
            }
        }
    }

    fn on_held(
        &mut self,
        intents: &mut Intents,
        binding: &crate::registry::ActionBinding,
        is_scheduled: &impl Fn(&CommandHandle) -> bool,
    ) {
        for command in binding.conditions.list(Condition::WhenHeld) {
            if !is_scheduled(command) {
                intents.candidates.push(command.clone());
            }
        }
    }

    fn on_falling_edge(&mut self, intents: &mut Intents, binding: &crate::registry::ActionBinding) {
        for command in binding.conditions.list(Condition::WhenDeactivated) {
            intents.candidates.push(command.clone());
        }
    }
}
