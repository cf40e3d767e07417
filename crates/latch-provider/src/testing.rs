//! Deterministic test doubles for the provider contracts.
//!
//! Time only moves through [`FakeClock::advance`]/[`FakeClock::set`], and
//! delayed tasks only run when the test calls [`FakeTaskRunner::run_due`], so
//! expiry and throttling behavior is reproducible without sleeping.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::{Clock, ConfigStore, ConfigStoreError, SaveDone, Task, TaskRunner};

/// Manually driven clock.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    /// Start the clock at an arbitrary fixed instant.
    pub fn new() -> Self {
        Self::at(Utc.timestamp_opt(1_400_000_000, 0).unwrap())
    }

    /// Start the clock at `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Start the clock at `secs` seconds past the Unix epoch.
    pub fn at_timestamp(secs: i64) -> Self {
        Self::at(Utc.timestamp_opt(secs, 0).unwrap())
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(delta).unwrap();
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

struct Scheduled {
    due: DateTime<Utc>,
    task: Task,
}

/// Task runner that queues work until the test releases it.
pub struct FakeTaskRunner {
    clock: Arc<FakeClock>,
    queue: Mutex<Vec<Scheduled>>,
}

impl FakeTaskRunner {
    /// Share `clock` with the code under test so due times line up.
    pub fn new(clock: Arc<FakeClock>) -> Self {
        Self {
            clock,
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Number of tasks not yet released.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Run every queued task whose due time has passed, including tasks
    /// scheduled by the tasks themselves. Returns how many ran.
    pub fn run_due(&self) -> usize {
        let mut ran = 0;
        loop {
            let now = self.clock.now();
            let due = {
                let mut queue = self.queue.lock().unwrap();
                match queue.iter().position(|s| s.due <= now) {
                    Some(index) => queue.remove(index),
                    None => break,
                }
            };
            (due.task)();
            ran += 1;
        }
        ran
    }
}

impl TaskRunner for FakeTaskRunner {
    fn post_delayed(&self, delay: Duration, task: Task) {
        let due = self.clock.now() + chrono::Duration::from_std(delay).unwrap();
        self.queue.lock().unwrap().push(Scheduled { due, task });
    }
}

/// In-memory settings store recording every save for assertions.
pub struct MemoryConfigStore {
    settings: Mutex<HashMap<String, String>>,
    saves: Mutex<Vec<(String, String)>>,
    fail_next_save: Mutex<bool>,
}

impl MemoryConfigStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            settings: Mutex::new(HashMap::new()),
            saves: Mutex::new(Vec::new()),
            fail_next_save: Mutex::new(false),
        }
    }

    /// Store pre-seeded with one key, as if left by a previous run.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store
            .settings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        store
    }

    /// Every value saved under `key`, oldest first.
    pub fn saves_for(&self, key: &str) -> Vec<String> {
        self.saves
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Make the next save report an IO error through `done`.
    pub fn fail_next_save(&self) {
        *self.fail_next_save.lock().unwrap() = true;
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load_settings(&self, key: &str) -> Option<String> {
        self.settings.lock().unwrap().get(key).cloned()
    }

    fn save_settings(&self, key: &str, value: String, done: Option<SaveDone>) {
        let fail = std::mem::take(&mut *self.fail_next_save.lock().unwrap());
        let result = if fail {
            Err(ConfigStoreError::Io(io::Error::other("injected save failure")))
        } else {
            self.settings
                .lock()
                .unwrap()
                .insert(key.to_string(), value.clone());
            self.saves.lock().unwrap().push((key.to_string(), value));
            Ok(())
        };
        if let Some(done) = done {
            done(result);
        }
    }
}
