use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Mutex};

///
/// EventState
///
/// Process-local counters for procedures and feeds. Ephemeral; reset by
/// [`reset_all`].
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    pub methods: BTreeMap<String, MethodCounters>,
    pub feeds: BTreeMap<String, FeedCounters>,
}

impl EventState {
    const fn new() -> Self {
        Self {
            ops: EventOps::new(),
            methods: BTreeMap::new(),
            feeds: BTreeMap::new(),
        }
    }
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Registration
    pub methods_registered: u64,
    pub feeds_registered: u64,

    // Procedure calls
    pub method_calls: u64,
    pub method_denied: u64,
    pub method_failed: u64,
    pub finisher_failed: u64,

    // Feed opens
    pub feed_opens: u64,
    pub feed_denied: u64,
}

impl EventOps {
    const fn new() -> Self {
        Self {
            methods_registered: 0,
            feeds_registered: 0,
            method_calls: 0,
            method_denied: 0,
            method_failed: 0,
            finisher_failed: 0,
            feed_opens: 0,
            feed_denied: 0,
        }
    }
}

///
/// MethodCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MethodCounters {
    pub calls: u64,
    pub denied: u64,
    pub failed: u64,
    pub finisher_failed: u64,
}

///
/// FeedCounters
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FeedCounters {
    pub opens: u64,
    pub denied: u64,
}

/// Snapshot returned by [`metrics_report`](crate::obs::metrics_report).
pub type EventReport = EventState;

static EVENT_STATE: Mutex<EventState> = Mutex::new(EventState::new());

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut state = EVENT_STATE
        .lock()
        .expect("metrics state lock should not be poisoned");
    f(&mut state)
}

pub(crate) fn report() -> EventReport {
    with_state_mut(|m| m.clone())
}

/// Reset all counters.
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::new());
}
