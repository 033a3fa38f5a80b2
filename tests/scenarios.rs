//! Black-box scenario tests (S1-S7), grounded directly in the scenario
//! table and exercised only through the public API.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use command_scheduler::{
    Action, Command, Condition, ExecError, Scheduler, Subsystem, SubsystemHandle, SubsystemId,
};

#[derive(Debug)]
struct ScriptedAction(Vec<bool>);
impl Action for ScriptedAction {
    fn poll(&mut self) -> Result<bool, ExecError> {
        Ok(if self.0.is_empty() { false } else { self.0.remove(0) })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Init,
    Execute,
    End(bool),
}

#[derive(Debug)]
struct TrackedCommand {
    requirements: HashSet<SubsystemId>,
    calls: Rc<RefCell<Vec<Call>>>,
}

impl TrackedCommand {
    fn new(requirements: HashSet<SubsystemId>) -> (Self, Rc<RefCell<Vec<Call>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                requirements,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl Command for TrackedCommand {
    fn requirements(&self) -> &HashSet<SubsystemId> {
        &self.requirements
    }

    fn initialize(&mut self) -> Result<(), ExecError> {
        self.calls.borrow_mut().push(Call::Init);
        Ok(())
    }

    fn execute(&mut self) -> Result<(), ExecError> {
        self.calls.borrow_mut().push(Call::Execute);
        Ok(())
    }

    fn end(&mut self, interrupted: bool) -> Result<(), ExecError> {
        self.calls.borrow_mut().push(Call::End(interrupted));
        Ok(())
    }
}

#[derive(Debug)]
struct Idle;
impl Subsystem for Idle {
    fn name(&self) -> &str {
        "idle"
    }
}

// S3 — default activation.
#[test]
fn default_activation() {
    let scheduler = Scheduler::new().unwrap();
    let subsystem = SubsystemHandle::new(Idle);
    scheduler.register_subsystem(subsystem.clone());

    let mut reqs = HashSet::new();
    reqs.insert(subsystem.id());
    let (default, calls) = TrackedCommand::new(reqs);
    let default = command_scheduler::CommandHandle::new(default);
    subsystem.set_default_command(Some(default.clone())).unwrap();

    scheduler.run_once();
    assert_eq!(*calls.borrow(), vec![Call::Init]);

    scheduler.run_once();
    assert_eq!(*calls.borrow(), vec![Call::Init, Call::Execute]);
    assert_eq!(subsystem.current_command(), Some(default));
}

// S4 — rising edge with conflict against a running default command.
#[test]
fn rising_edge_with_conflict() {
    let scheduler = Scheduler::new().unwrap();
    let subsystem = SubsystemHandle::new(Idle);
    scheduler.register_subsystem(subsystem.clone());

    let mut reqs = HashSet::new();
    reqs.insert(subsystem.id());

    let (default, default_calls) = TrackedCommand::new(reqs.clone());
    let default = command_scheduler::CommandHandle::new(default);
    subsystem.set_default_command(Some(default)).unwrap();

    let (x, x_calls) = TrackedCommand::new(reqs);
    let x = command_scheduler::CommandHandle::new(x);
    let action = command_scheduler::ActionHandle::new(ScriptedAction(vec![false, true]));
    scheduler.bind_command(&action, x.clone(), Condition::WhenActivated);

    scheduler.run_once(); // tick1: poll false, default initialized
    assert_eq!(*default_calls.borrow(), vec![Call::Init]);
    assert!(x_calls.borrow().is_empty());

    scheduler.run_once(); // tick2: poll true, X initialized, D interrupted
    assert_eq!(*x_calls.borrow(), vec![Call::Init]);
    assert_eq!(*default_calls.borrow(), vec![Call::Init, Call::End(true)]);

    scheduler.run_once(); // tick3: X executes
    assert_eq!(*x_calls.borrow(), vec![Call::Init, Call::Execute]);
    assert_eq!(subsystem.current_command(), Some(x));
}

// S5 — toggle semantics across rising/held/falling ticks.
#[test]
fn toggle_semantics() {
    let scheduler = Scheduler::new().unwrap();
    let subsystem = SubsystemHandle::new(Idle);
    scheduler.register_subsystem(subsystem);

    let (toggled, calls) = TrackedCommand::new(HashSet::new());
    let toggled = command_scheduler::CommandHandle::new(toggled);
    // true (rising #1), true (held), false (falling), true (rising #2)
    let action = command_scheduler::ActionHandle::new(ScriptedAction(vec![true, true, false, true]));
    scheduler.bind_command(&action, toggled, Condition::ToggleWhenActivated);

    scheduler.run_once(); // rising #1: scheduled
    assert_eq!(*calls.borrow(), vec![Call::Init]);

    scheduler.run_once(); // held: stays scheduled, executes
    assert_eq!(*calls.borrow(), vec![Call::Init, Call::Execute]);

    scheduler.run_once(); // falling: no-op for toggle, keeps executing
    assert_eq!(*calls.borrow(), vec![Call::Init, Call::Execute, Call::Execute]);

    scheduler.run_once(); // rising #2: interrupted
    assert_eq!(
        *calls.borrow(),
        vec![Call::Init, Call::Execute, Call::Execute, Call::End(true)]
    );
}

#[derive(Debug)]
struct FailOnce {
    requirements: HashSet<SubsystemId>,
    failed_once: bool,
    calls: Rc<RefCell<Vec<Call>>>,
}

impl Command for FailOnce {
    fn requirements(&self) -> &HashSet<SubsystemId> {
        &self.requirements
    }

    fn execute(&mut self) -> Result<(), ExecError> {
        if self.failed_once {
            self.calls.borrow_mut().push(Call::Execute);
            Ok(())
        } else {
            self.failed_once = true;
            Err("transient failure".into())
        }
    }

    fn handle_exception(&mut self, _err: &ExecError) -> bool {
        true
    }

    fn end(&mut self, interrupted: bool) -> Result<(), ExecError> {
        self.calls.borrow_mut().push(Call::End(interrupted));
        Ok(())
    }
}

// S6 — an absorbed execute failure keeps the command scheduled, with no end call.
#[test]
fn execute_failure_absorbed() {
    let scheduler = Scheduler::new().unwrap();
    let calls = Rc::new(RefCell::new(Vec::new()));
    let command = command_scheduler::CommandHandle::new(FailOnce {
        requirements: HashSet::new(),
        failed_once: false,
        calls: calls.clone(),
    });
    let action = command_scheduler::ActionHandle::new(ScriptedAction(vec![true]));
    scheduler.bind_command(&action, command.clone(), Condition::WhenActivated);

    scheduler.run_once(); // initialize only
    scheduler.run_once(); // execute fails, absorbed — no end call
    assert!(calls.borrow().is_empty());

    scheduler.run_once(); // execute succeeds this time
    assert_eq!(*calls.borrow(), vec![Call::Execute]);

    scheduler.cancel(&[command]);
    assert_eq!(*calls.borrow(), vec![Call::Execute, Call::End(true)]);
}

// S7 — cancel is idempotent, both for an untracked command and for an
// empty population.
#[test]
fn cancel_idempotence() {
    let scheduler = Scheduler::new().unwrap();
    let (untracked, untracked_calls) = TrackedCommand::new(HashSet::new());
    let untracked = command_scheduler::CommandHandle::new(untracked);

    scheduler.cancel(&[untracked]);
    assert!(untracked_calls.borrow().is_empty());

    let (tracked, calls) = TrackedCommand::new(HashSet::new());
    let tracked = command_scheduler::CommandHandle::new(tracked);
    let action = command_scheduler::ActionHandle::new(ScriptedAction(vec![true]));
    scheduler.bind_command(&action, tracked, Condition::WhenActivated);
    scheduler.run_once();

    scheduler.cancel(&[]);
    assert_eq!(*calls.borrow(), vec![Call::Init, Call::End(true)]);

    scheduler.cancel(&[]);
    assert_eq!(*calls.borrow(), vec![Call::Init, Call::End(true)]);
}

// S1/S2 rebinding behavior, exercised through the public bind_command API.
#[test]
fn rebinding_and_multi_command_same_action() {
    let scheduler = Scheduler::new().unwrap();
    let action = command_scheduler::ActionHandle::new(ScriptedAction(vec![]));

    let (c, c_calls) = TrackedCommand::new(HashSet::new());
    let c = command_scheduler::CommandHandle::new(c);
    scheduler.bind_command(&action, c.clone(), Condition::WhenActivated);
    scheduler.bind_command(&action, c.clone(), Condition::WhenDeactivated);

    let (c1, _) = TrackedCommand::new(HashSet::new());
    let c1 = command_scheduler::CommandHandle::new(c1);
    let (c2, _) = TrackedCommand::new(HashSet::new());
    let c2 = command_scheduler::CommandHandle::new(c2);
    scheduler.bind_command(&action, c1, Condition::WhenActivated);
    scheduler.bind_command(&action, c2, Condition::WhenActivated);

    // The action never fires in this test; nothing should ever be called.
    scheduler.run_once();
    assert!(c_calls.borrow().is_empty());
}
