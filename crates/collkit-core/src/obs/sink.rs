//! Metrics sink boundary.
//!
//! Procedure and feed code never touches `obs::metrics` directly; every
//! counter flows through [`MetricsEvent`] and [`MetricsSink`].

use crate::obs::metrics::{self, EventReport};
use std::{cell::RefCell, sync::Arc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Arc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    MethodRegistered { name: &'a str },
    MethodCall { name: &'a str },
    MethodDenied { name: &'a str },
    MethodFailed { name: &'a str },
    FinisherFailed { name: &'a str },
    FeedRegistered { name: &'a str },
    FeedOpened { name: &'a str },
    FeedDenied { name: &'a str },
}

///
/// MetricsSink
///

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// GlobalMetricsSink
///
/// Default sink writing into the process-wide counters. Used whenever no
/// scoped override is installed on the current thread.
///

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        metrics::with_state_mut(|m| match event {
            MetricsEvent::MethodRegistered { .. } => {
                m.ops.methods_registered = m.ops.methods_registered.saturating_add(1);
            }
            MetricsEvent::MethodCall { name } => {
                m.ops.method_calls = m.ops.method_calls.saturating_add(1);
                let entry = m.methods.entry(name.to_string()).or_default();
                entry.calls = entry.calls.saturating_add(1);
            }
            MetricsEvent::MethodDenied { name } => {
                m.ops.method_denied = m.ops.method_denied.saturating_add(1);
                let entry = m.methods.entry(name.to_string()).or_default();
                entry.denied = entry.denied.saturating_add(1);
            }
            MetricsEvent::MethodFailed { name } => {
                m.ops.method_failed = m.ops.method_failed.saturating_add(1);
                let entry = m.methods.entry(name.to_string()).or_default();
                entry.failed = entry.failed.saturating_add(1);
            }
            MetricsEvent::FinisherFailed { name } => {
                m.ops.finisher_failed = m.ops.finisher_failed.saturating_add(1);
                let entry = m.methods.entry(name.to_string()).or_default();
                entry.finisher_failed = entry.finisher_failed.saturating_add(1);
            }
            MetricsEvent::FeedRegistered { .. } => {
                m.ops.feeds_registered = m.ops.feeds_registered.saturating_add(1);
            }
            MetricsEvent::FeedOpened { name } => {
                m.ops.feed_opens = m.ops.feed_opens.saturating_add(1);
                let entry = m.feeds.entry(name.to_string()).or_default();
                entry.opens = entry.opens.saturating_add(1);
            }
            MetricsEvent::FeedDenied { name } => {
                m.ops.feed_denied = m.ops.feed_denied.saturating_add(1);
                let entry = m.feeds.entry(name.to_string()).or_default();
                entry.denied = entry.denied.saturating_add(1);
            }
        });
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

pub(crate) fn record(event: MetricsEvent<'_>) {
    let sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a metrics sink override installed on this thread.
/// The previous sink is restored on every exit, including unwind.
pub fn with_metrics_sink<T>(sink: Arc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Arc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| *cell.borrow_mut() = prev);
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}
