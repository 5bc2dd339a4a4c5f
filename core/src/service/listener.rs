use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::task::TaskRef;
use crate::util::lock;

/// "Tasks changed" notification: the in-flight set of one service before
/// and after a registration or a deregistration.
///
/// Listeners of one service see changes in registry order: each change's
/// `old` is the previous change's `new`.
#[derive(Debug, Clone)]
pub struct TasksChanged {
    service: String,
    sequence: u64,
    old: Vec<TaskRef>,
    new: Vec<TaskRef>,
}

impl TasksChanged {
    pub(crate) fn new(service: impl Into<String>, old: Vec<TaskRef>, new: Vec<TaskRef>) -> Self {
        Self {
            service: service.into(),
            sequence: 0,
            old,
            new,
        }
    }

    pub(crate) fn sequenced(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Position of this change in the service's registry history, from 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn old(&self) -> &[TaskRef] {
        &self.old
    }

    pub fn new_tasks(&self) -> &[TaskRef] {
        &self.new
    }

    pub fn added(&self) -> Vec<TaskRef> {
        self.new
            .iter()
            .filter(|t| !self.old.contains(t))
            .cloned()
            .collect()
    }

    pub fn removed(&self) -> Vec<TaskRef> {
        self.old
            .iter()
            .filter(|t| !self.new.contains(t))
            .cloned()
            .collect()
    }
}

/// Puts changes back into registry order before delivery.
///
/// Changes are numbered under the registry lock but queued on the
/// coordinator after it is released, so two threads can queue them in the
/// opposite order. Out-of-order changes wait here until their predecessors
/// have been delivered.
#[derive(Default)]
pub(crate) struct ChangeSequencer {
    state: Mutex<SequencerState>,
}

#[derive(Default)]
struct SequencerState {
    next: u64,
    pending: BTreeMap<u64, TasksChanged>,
    delivering: bool,
}

impl ChangeSequencer {
    /// Buffers `change` and delivers every change that is now in order.
    ///
    /// Only one caller delivers at a time. A call made meanwhile, including
    /// one from inside a listener, just buffers its change and the running
    /// loop delivers it. `deliver` runs without the sequencer lock held.
    pub(crate) fn submit<F>(&self, change: TasksChanged, deliver: F)
    where
        F: Fn(&TasksChanged),
    {
        {
            let mut state = lock(&self.state);
            state.pending.insert(change.sequence, change);
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        loop {
            let ready = {
                let mut state = lock(&self.state);
                let next = state.next;
                match state.pending.remove(&next) {
                    Some(change) => {
                        state.next += 1;
                        change
                    }
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            deliver(&ready);
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        lock(&self.state).pending.len()
    }
}

/// Observer of a service's in-flight set. Called on the coordinator.
pub trait TasksListener: Send + Sync {
    fn tasks_changed(&self, change: &TasksChanged);
}

impl<F> TasksListener for F
where
    F: Fn(&TasksChanged) + Send + Sync,
{
    fn tasks_changed(&self, change: &TasksChanged) {
        self(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use std::cell::RefCell;

    fn change(sequence: u64) -> TasksChanged {
        let task: Task<()> = Task::new(format!("t{sequence}"), |_| Ok(()));
        TasksChanged::new("svc", vec![], vec![task.handle()]).sequenced(sequence)
    }

    #[test]
    fn test_sequencer_restores_order() {
        let sequencer = ChangeSequencer::default();
        let seen = RefCell::new(Vec::new());
        let record = |c: &TasksChanged| seen.borrow_mut().push(c.sequence());

        sequencer.submit(change(2), record);
        sequencer.submit(change(1), record);
        assert!(seen.borrow().is_empty());
        assert_eq!(sequencer.buffered(), 2);

        sequencer.submit(change(0), record);
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);

        sequencer.submit(change(3), record);
        assert_eq!(*seen.borrow(), vec![0, 1, 2, 3]);
        assert_eq!(sequencer.buffered(), 0);
    }

    #[test]
    fn test_sequencer_defers_nested_submissions() {
        let sequencer = ChangeSequencer::default();
        let seen = RefCell::new(Vec::new());
        let deliver = |c: &TasksChanged| {
            seen.borrow_mut().push(c.sequence());
            if c.sequence() == 0 {
                // a listener triggering another change sees it after it returns
                sequencer.submit(change(1), |n| seen.borrow_mut().push(n.sequence() + 100));
                seen.borrow_mut().push(50);
            }
        };
        sequencer.submit(change(0), deliver);
        assert_eq!(*seen.borrow(), vec![0, 50, 1]);
    }
}
