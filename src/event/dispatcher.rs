use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, instrument, trace};

use super::{
    events::{Event, Topic},
    handler::{Delivery, ListenerError, ListenerFailure},
    registry::{Route, SubscriptionRegistry},
};
use crate::config::{BusConfig, FailureMode};
use crate::shared::BusError;

/// Callback receiving every listener failure in continue mode
pub type ErrorHandler = Arc<dyn Fn(&ListenerFailure) + Send + Sync>;

/// Default error handler: log the failure and move on
pub fn log_failure(failure: &ListenerFailure) {
    error!(
        event = %failure.event,
        listener = %failure.listener,
        subscription = %failure.subscription,
        error = %failure.error,
        kind = failure.error.as_label(),
        "Listener failed"
    );
}

/// What happened during one publish
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub event: Topic,
    /// Listeners that ran and returned Ok
    pub delivered: usize,
    /// Listeners passed over by their filter or removed mid-dispatch
    pub skipped: usize,
    /// Failures reported in continue mode, in dispatch order
    pub failures: Vec<ListenerFailure>,
    /// A listener stopped propagation
    pub cancelled: bool,
}

impl DispatchReport {
    fn new(event: Topic) -> Self {
        Self {
            event,
            delivered: 0,
            skipped: 0,
            failures: Vec::new(),
            cancelled: false,
        }
    }

    /// Number of listeners that were actually invoked
    pub fn invoked(&self) -> usize {
        self.delivered + self.failures.len()
    }

    /// No listener failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Routes published events to the listeners resolved by a registry
///
/// The dispatcher keeps no subscription state of its own. Listeners are run
/// synchronously, one after another, on the caller's thread; each failure is
/// isolated from the listeners after it unless fail-fast is configured.
pub struct Dispatcher {
    failure_mode: FailureMode,
    catch_panics: bool,
    error_handler: ErrorHandler,
}

impl Dispatcher {
    /// Create a new dispatcher using the failure settings of `config`
    pub fn new(config: &BusConfig) -> Self {
        Self {
            failure_mode: config.failure_mode,
            catch_panics: config.catch_panics,
            error_handler: Arc::new(log_failure),
        }
    }

    /// Replace the default logging error handler
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Deliver `event` to every matching listener in `registry`
    ///
    /// Returns after all listeners ran or propagation was cancelled. In
    /// fail-fast mode the first failure is returned as
    /// [`BusError::ListenerInvocation`] and later listeners are not invoked.
    #[instrument(skip_all, fields(event = %Topic::of::<E>()))]
    pub fn post<E: Event>(
        &self,
        registry: &SubscriptionRegistry,
        event: &E,
    ) -> Result<DispatchReport, BusError> {
        self.dispatch(registry.routes::<E>(), event)
    }

    pub(crate) fn dispatch<E: Event>(
        &self,
        routes: Vec<Route>,
        event: &E,
    ) -> Result<DispatchReport, BusError> {
        let topic = Topic::of::<E>();
        let mut report = DispatchReport::new(topic);

        if routes.is_empty() {
            trace!("No listeners for event");
            return Ok(report);
        }

        let published: &dyn Any = event;
        for route in &routes {
            let subscription = &route.subscription;
            if !subscription.is_active() {
                report.skipped += 1;
                continue;
            }

            let payload = match &route.project {
                None => Some(published),
                Some(project) => project(published),
            };
            let Some(payload) = payload else {
                report.skipped += 1;
                continue;
            };
            if !subscription.listener().accepts(payload) {
                trace!(listener = subscription.name(), "Filtered out");
                report.skipped += 1;
                continue;
            }

            let mut delivery = Delivery::new(topic, subscription.handle(), E::CANCELLABLE);
            trace!(
                listener = subscription.name(),
                priority = subscription.priority(),
                "Invoking listener"
            );

            match self.invoke(route, payload, &mut delivery) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    let failure = ListenerFailure {
                        listener: subscription.name().to_string(),
                        subscription: subscription.handle(),
                        event: topic,
                        error,
                    };
                    match self.failure_mode {
                        FailureMode::FailFast => {
                            debug!(
                                listener = %failure.listener,
                                error = %failure.error,
                                "Aborting dispatch on first failure"
                            );
                            return Err(BusError::ListenerInvocation(failure));
                        }
                        FailureMode::Continue => {
                            (self.error_handler)(&failure);
                            report.failures.push(failure);
                        }
                    }
                }
            }

            if delivery.is_cancelled() {
                debug!(
                    listener = subscription.name(),
                    "Propagation cancelled by listener"
                );
                report.cancelled = true;
                break;
            }
        }

        debug!(
            listeners = routes.len(),
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "Event dispatched"
        );
        Ok(report)
    }

    fn invoke(
        &self,
        route: &Route,
        payload: &dyn Any,
        delivery: &mut Delivery,
    ) -> Result<(), ListenerError> {
        let listener = route.subscription.listener();
        if !self.catch_panics {
            return listener.invoke(payload, delivery);
        }

        match panic::catch_unwind(AssertUnwindSafe(|| listener.invoke(payload, delivery))) {
            Ok(result) => result,
            Err(panic) => Err(ListenerError::Panicked(panic_message(panic.as_ref()))),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("failure_mode", &self.failure_mode)
            .field("catch_panics", &self.catch_panics)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
