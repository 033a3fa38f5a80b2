use fxhash::FxHashMap;

use crate::command::{CommandHandle, CommandKey};
use crate::subsystem::{SubsystemHandle, SubsystemId};

/// The outcome of one tick's conflict resolution: which commands are
/// newly accepted (`incoming`), and which previously-running commands
/// must be interrupted to make room for them.
#[derive(Default)]
pub(crate) struct Resolution {
    pub(crate) incoming: Vec<CommandHandle>,
    pub(crate) displaced: Vec<CommandHandle>,
}

/// Resolves requirement collisions among incoming candidates and
/// between incoming candidates and already-running commands.
///
/// Grounded on the teacher's `CommandManager::inner_schedule`
/// (`manager.rs`), which decides whether an incoming command may
/// displace the running command(s) holding its requirements
/// (`can_cancel`/`to_cancel`/`requirements`). That method only ever
/// arbitrates one incoming command against the running set; this
/// generalizes it to also arbitrate incoming-against-incoming conflicts
/// within a single tick, per SPEC_FULL §4.6.
///
/// `candidates` must already be in registry tie-break order — the first
/// acceptable candidate for a given subsystem wins.
pub(crate) fn resolve(
    candidates: Vec<CommandHandle>,
    scheduled: impl Fn(&CommandHandle) -> bool,
    running_requirement_holder: impl Fn(SubsystemId) -> Option<CommandHandle>,
    already_interrupted: impl Fn(&CommandHandle) -> bool,
) -> Resolution {
    let mut resolution = Resolution::default();
    // requirement -> command accepted THIS tick, for intra-tick conflict detection
    let mut taken_this_tick: FxHashMap<SubsystemId, CommandKey> = FxHashMap::default();
    let mut displaced_keys: FxHashMap<CommandKey, CommandHandle> = FxHashMap::default();
    let mut accepted_keys: std::collections::HashSet<CommandKey> =
        std::collections::HashSet::new();

    'candidate: for candidate in candidates {
        let key = candidate.key();
        if accepted_keys.contains(&key) {
            continue;
        }
        let reqs = candidate.requirements();

        for req in &reqs {
            if let Some(&holder) = taken_this_tick.get(req) {
                if holder != key {
                    tracing::warn!(
                        command = %candidate.name(),
                        "dropping candidate: requirement conflict with another incoming command this tick",
                    );
                    continue 'candidate;
                }
            }
        }

        for req in &reqs {
            if let Some(running) = running_requirement_holder(*req) {
                let running_key = running.key();
                if running_key != key && scheduled(&running) && !already_interrupted(&running) {
                    displaced_keys.insert(running_key, running.clone());
                }
            }
        }

        for req in &reqs {
            taken_this_tick.insert(*req, key);
        }
        accepted_keys.insert(key);
        resolution.incoming.push(candidate);
    }

    resolution.displaced = displaced_keys.into_values().collect();
    resolution
}

/// Default-command fill (§4.6 step 3): for each registered subsystem
/// with no incoming or already-scheduled command requiring it, schedule
/// its default command, if any. Defaults never displace non-defaults —
/// if a default's requirement is already taken, it is skipped silently.
pub(crate) fn default_fill(
    subsystems: &[SubsystemHandle],
    requirement_taken: impl Fn(SubsystemId) -> bool,
    already_incoming_or_scheduled: impl Fn(&CommandHandle) -> bool,
) -> Vec<CommandHandle> {
    let mut fill = Vec::new();
    let mut newly_taken: std::collections::HashSet<SubsystemId> = std::collections::HashSet::new();

    for subsystem in subsystems {
        let id = subsystem.id();
        if requirement_taken(id) || newly_taken.contains(&id) {
            continue;
        }
        let Some(default) = subsystem.default_command() else {
            continue;
        };
        if already_incoming_or_scheduled(&default) {
            continue;
        }
        // A default command's other requirements might already be
        // spoken for by this same fill pass or an earlier candidate;
        // skip silently rather than displacing anything.
        if default
            .requirements()
            .iter()
            .any(|req| requirement_taken(*req) || newly_taken.contains(req))
        {
            continue;
        }
        for req in default.requirements() {
            newly_taken.insert(req);
        }
        fill.push(default);
    }

    fill
}
