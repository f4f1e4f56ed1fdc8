//! Wait triggers
//!
//! One named condition variable per event kind. The daemon calls
//! [`Triggers::notify`] after each matching state change; queries with a
//! `WaitTrigger` block until a wake or their timeout. Every notification
//! also wakes the `all` trigger.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    All,
    Check,
    State,
    Log,
    Downtime,
    Comment,
    Command,
    Program,
}

const TRIGGER_COUNT: usize = 8;

impl Trigger {
    pub fn parse(name: &str) -> Option<Trigger> {
        Some(match name {
            "all" => Trigger::All,
            "check" => Trigger::Check,
            "state" => Trigger::State,
            "log" => Trigger::Log,
            "downtime" => Trigger::Downtime,
            "comment" => Trigger::Comment,
            "command" => Trigger::Command,
            "program" => Trigger::Program,
            _ => return None,
        })
    }

    fn index(self) -> usize {
        match self {
            Trigger::All => 0,
            Trigger::Check => 1,
            Trigger::State => 2,
            Trigger::Log => 3,
            Trigger::Downtime => 4,
            Trigger::Comment => 5,
            Trigger::Command => 6,
            Trigger::Program => 7,
        }
    }
}

struct Cell {
    sequence: Mutex<u64>,
    condvar: Condvar,
}

pub struct Triggers {
    cells: [Cell; TRIGGER_COUNT],
}

impl Default for Triggers {
    fn default() -> Self {
        Triggers {
            cells: std::array::from_fn(|_| Cell {
                sequence: Mutex::new(0),
                condvar: Condvar::new(),
            }),
        }
    }
}

impl Triggers {
    pub fn new() -> Triggers {
        Triggers::default()
    }

    /// Wake everyone waiting on `trigger`, and on `all`.
    pub fn notify(&self, trigger: Trigger) {
        self.bump(trigger);
        if trigger != Trigger::All {
            self.bump(Trigger::All);
        }
    }

    fn bump(&self, trigger: Trigger) {
        let cell = &self.cells[trigger.index()];
        let mut seq = cell.sequence.lock().unwrap();
        *seq += 1;
        cell.condvar.notify_all();
    }

    /// Block until `trigger` fires or `timeout` elapses. Returns false on
    /// timeout. The sequence counter makes wakeups that happen between the
    /// condition re-check and the next wait impossible to lose.
    pub fn wait_for(&self, trigger: Trigger, timeout: Duration) -> bool {
        let cell = &self.cells[trigger.index()];
        let deadline = Instant::now() + timeout;
        let mut seq = cell.sequence.lock().unwrap();
        let start = *seq;
        while *seq == start {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = cell
                .condvar
                .wait_timeout(seq, deadline - now)
                .unwrap();
            seq = guard;
            if result.timed_out() && *seq == start {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_wait_times_out() {
        let triggers = Triggers::new();
        assert!(!triggers.wait_for(Trigger::Check, Duration::from_millis(10)));
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let triggers = Arc::new(Triggers::new());
        let waiter = {
            let triggers = Arc::clone(&triggers);
            std::thread::spawn(move || triggers.wait_for(Trigger::State, Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        triggers.notify(Trigger::State);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_any_notify_wakes_all_trigger() {
        let triggers = Arc::new(Triggers::new());
        let waiter = {
            let triggers = Arc::clone(&triggers);
            std::thread::spawn(move || triggers.wait_for(Trigger::All, Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        triggers.notify(Trigger::Comment);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_unknown_trigger_name() {
        assert!(Trigger::parse("bogus").is_none());
        assert_eq!(Trigger::parse("downtime"), Some(Trigger::Downtime));
    }
}
