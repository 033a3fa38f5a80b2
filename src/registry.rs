use fxhash::FxHashMap;

use crate::action::{ActionHandle, ActionKey};
use crate::command::{CommandHandle, CommandKey};

/// The closed set of bind-time modifiers governing how an action's poll
/// result translates into schedule/cancel intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Cancel the bound command on the rising edge of the action.
    CancelWhenActivated,
    /// Toggle scheduling of the bound command on each rising edge.
    ToggleWhenActivated,
    /// Schedule the bound command on the rising edge of the action.
    WhenActivated,
    /// Schedule the bound command on the falling edge of the action.
    WhenDeactivated,
    /// Schedule the bound command on the rising edge, and keep it
    /// scheduled (re-scheduling if needed) for as long as the action
    /// stays active.
    WhenHeld,
}

impl Condition {
    /// The fixed visit order used for deterministic intent emission
    /// (§4.5): cancel, toggle, deactivated, activated, held.
    pub(crate) const VISIT_ORDER: [Self; 5] = [
        Self::CancelWhenActivated,
        Self::ToggleWhenActivated,
        Self::WhenDeactivated,
        Self::WhenActivated,
        Self::WhenHeld,
    ];
}

#[derive(Default)]
pub(crate) struct ConditionMap {
    lists: FxHashMap<Condition, Vec<CommandHandle>>,
}

impl ConditionMap {
    fn remove(&mut self, key: CommandKey) {
        for list in self.lists.values_mut() {
            list.retain(|c| c.key() != key);
        }
    }

    pub(crate) fn list(&self, condition: Condition) -> &[CommandHandle] {
        self.lists.get(&condition).map_or(&[], Vec::as_slice)
    }
}

pub(crate) struct ActionBinding {
    pub(crate) handle: ActionHandle,
    pub(crate) conditions: ConditionMap,
}

/// Stores the `action → condition → ordered command list` mapping and
/// enforces "one condition per command per action".
///
/// Actions are registered implicitly: the first time a given
/// [`ActionHandle`] is bound, it is appended to an internal registration
/// order that the edge detector and conflict arbiter both use as the
/// outer tie-break order (see `DESIGN.md`, Open Question #2).
#[derive(Default)]
pub struct BindingRegistry {
    order: Vec<ActionBinding>,
    index: FxHashMap<ActionKey, usize>,
}

impl BindingRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Binds `command` to `action` under `condition`.
    ///
    /// If `command` was previously bound to this `action` under a
    /// different condition, that binding is atomically removed first —
    /// after this call, `command` appears under exactly one
    /// `(action, *)` list, namely `condition`.
    pub fn bind(&mut self, action: &ActionHandle, command: CommandHandle, condition: Condition) {
        let idx = *self.index.entry(action.key()).or_insert_with(|| {
            self.order.push(ActionBinding {
                handle: action.clone(),
                conditions: ConditionMap::default(),
            });
            self.order.len() - 1
        });
        let binding = &mut self.order[idx];
        let key = command.key();
        binding.conditions.remove(key);
        let list = binding.conditions.lists.entry(condition).or_default();
        if !list.iter().any(|c| c.key() == key) {
            list.push(command);
        }
    }

    /// Iterates actions in registration order (first-bind order), the
    /// outer order the edge detector and conflict arbiter rely on for
    /// determinism.
    pub(crate) fn actions_in_order(&self) -> impl Iterator<Item = &ActionBinding> {
        self.order.iter()
    }
}
