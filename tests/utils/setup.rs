use std::sync::{Arc, Mutex, Once};

use kawa::{
    BusConfig, DuplicatePolicy, Event, EventBus, FailureMode, ListenerFailure, SubscribeOptions,
    SubscriptionHandle,
};

use super::mocks::{Behaviour, CallLog, RecordingListener};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

static TRACING: Once = Once::new();

/// Route library logs to the test harness; honours RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kawa=warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

pub struct TestSetup {
    pub bus: EventBus,
    pub log: CallLog,
    /// Listener names seen by the bus error handler
    pub reported: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl TestSetup {
    /// Subscribe a recording listener for `E`
    pub fn listen<E: Event>(&self, name: &str, priority: i32) -> SubscriptionHandle {
        self.listen_with::<E>(name, priority, Behaviour::Succeed)
    }

    pub fn listen_with<E: Event>(
        &self,
        name: &str,
        priority: i32,
        behaviour: Behaviour,
    ) -> SubscriptionHandle {
        self.bus
            .subscribe_with(
                RecordingListener::with_behaviour(name, &self.log, behaviour),
                SubscribeOptions::<E>::new().priority(priority),
            )
            .expect("subscribe should succeed")
    }

    pub fn reported(&self) -> Vec<String> {
        self.reported.lock().unwrap().clone()
    }
}

pub struct TestSetupBuilder {
    config: BusConfig,
}

#[allow(dead_code)]
impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
        }
    }

    pub fn fail_fast(mut self) -> Self {
        self.config.failure_mode = FailureMode::FailFast;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.config.duplicate_policy = policy;
        self
    }

    pub fn build(self) -> TestSetup {
        init_tracing();

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reported);
        let bus = EventBus::builder()
            .with_config(self.config)
            .with_error_handler(move |failure: &ListenerFailure| {
                sink.lock().unwrap().push(failure.listener.clone());
            })
            .build();

        TestSetup {
            bus,
            log: CallLog::new(),
            reported,
        }
    }
}
