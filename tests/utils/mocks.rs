use std::sync::{Arc, Mutex};

use kawa::{Delivery, Event, Listener, ListenerError};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Shared, ordered log of listener invocations
#[derive(Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    #[allow(dead_code)]
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// How a [`RecordingListener`] behaves after logging the call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)]
pub enum Behaviour {
    Succeed,
    Fail,
    Panic,
    Cancel,
}

/// Listener that records its name into a [`CallLog`] for every event
pub struct RecordingListener {
    name: String,
    log: CallLog,
    behaviour: Behaviour,
}

impl RecordingListener {
    pub fn new(name: &str, log: &CallLog) -> Arc<Self> {
        Self::with_behaviour(name, log, Behaviour::Succeed)
    }

    pub fn with_behaviour(name: &str, log: &CallLog, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: log.clone(),
            behaviour,
        })
    }
}

impl<E: Event> Listener<E> for RecordingListener {
    fn handle(&self, _event: &E, delivery: &mut Delivery) -> Result<(), ListenerError> {
        self.log.push(self.name.clone());
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(ListenerError::failed(format!("{} failed", self.name))),
            Behaviour::Panic => panic!("{} panicked", self.name),
            Behaviour::Cancel => {
                delivery.cancel();
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
