//! Event bus with memory.
//!
//! Every named event remembers whether it has fired. Listeners subscribe
//! to a single event or to an `any`/`all` combination; each listener runs
//! exactly once. Conditions that already hold when a listener subscribes
//! are delivered during `subscribe` instead of being missed.
//!
//! Delivery is synchronous. No lock is held while a listener runs, so a
//! listener may `emit` or `subscribe` on the same bus. A listener error
//! propagates to whoever called `emit`/`subscribe` and the remaining
//! deliveries of that call are dropped; failures are not isolated per
//! listener.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use crate::error::{HookError, PluginError, PluginResult};
use crate::registry::PluginTable;

use super::condition::{self, Condition, ConditionKind};

/// A bus listener. Runs at most once.
pub type Listener = Box<dyn FnOnce(&ListenerContext<'_>) -> Result<(), HookError> + Send>;

/// What a listener sees when it runs.
pub struct ListenerContext<'a> {
    bus: &'a EventBus,
}

impl<'a> ListenerContext<'a> {
    /// Read-only view of the registered plugins.
    pub fn plugins(&self) -> &'a PluginTable {
        &self.bus.plugins
    }

    /// The bus that delivered this listener, for nested emits and subscriptions.
    pub fn bus(&self) -> &'a EventBus {
        self.bus
    }
}

/// Per-event record.
#[derive(Default)]
struct EventRecord {
    /// Single-event listeners, in subscription order.
    listeners: Vec<Listener>,
    /// Permanent "has been emitted" marker.
    fired: bool,
}

/// A pending `any`/`all` subscription.
struct Trigger {
    kind: ConditionKind,
    events: BTreeSet<String>,
    listener: Listener,
}

impl Trigger {
    fn label(&self) -> String {
        let events: Vec<&str> = self.events.iter().map(String::as_str).collect();
        format!("{}({})", self.kind, events.join(", "))
    }
}

#[derive(Default)]
struct BusState {
    events: HashMap<String, EventRecord>,
    /// Events whose single listeners have all run. Triggers are evaluated
    /// against this set, never against events still mid-delivery.
    settled: HashSet<String>,
    /// Emission order.
    history: Vec<String>,
    triggers: Vec<Trigger>,
}

impl BusState {
    fn is_fired(&self, event: &str) -> bool {
        self.events.get(event).is_some_and(|r| r.fired)
    }

    /// Removes and returns every trigger whose condition now holds.
    fn take_satisfied(&mut self) -> Vec<Trigger> {
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.triggers)
            .into_iter()
            .partition(|t| condition::holds(t.kind, &t.events, &self.settled));
        self.triggers = pending;
        ready
    }
}

/// Process-local publish/subscribe bus shared by the coordinator and every plugin.
pub struct EventBus {
    /// Plugin table handed to listeners.
    plugins: Arc<PluginTable>,
    /// Event records and pending triggers.
    state: Mutex<BusState>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventBus")
            .field("fired", &state.history)
            .field("pending_triggers", &state.triggers.len())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

impl EventBus {
    /// Creates a bus whose listeners see the given plugin table.
    pub fn new(plugins: Arc<PluginTable>) -> Self {
        Self {
            plugins,
            state: Mutex::new(BusState::default()),
        }
    }

    /// The plugin table listeners receive.
    pub fn plugins(&self) -> &Arc<PluginTable> {
        &self.plugins
    }

    /// Registers `listener` against `condition`.
    ///
    /// A `single` condition on an event that already fired, and any pending
    /// `any`/`all` trigger that now holds, run before this call returns.
    pub fn subscribe<F>(&self, condition: Condition, listener: F) -> PluginResult<()>
    where
        F: FnOnce(&ListenerContext<'_>) -> Result<(), HookError> + Send + 'static,
    {
        condition.validate()?;

        let mut immediate: Option<(String, Listener)> = None;
        let ready = {
            let mut state = self.lock();
            match condition.kind {
                ConditionKind::Single => {
                    let event = condition.events[0].clone();
                    if state.is_fired(&event) {
                        immediate = Some((event, Box::new(listener)));
                    } else {
                        state
                            .events
                            .entry(event)
                            .or_default()
                            .listeners
                            .push(Box::new(listener));
                    }
                }
                ConditionKind::Any | ConditionKind::All => {
                    state.triggers.push(Trigger {
                        kind: condition.kind,
                        events: condition.event_set(),
                        listener: Box::new(listener),
                    });
                }
            }
            state.take_satisfied()
        };

        debug!(condition = %condition, "Listener subscribed");

        if let Some((event, listener)) = immediate {
            debug!(event = %event, "Event already fired, delivering on subscribe");
            self.invoke(&event, listener)?;
        }
        self.deliver_triggers(ready)
    }

    /// Subscribes to a single event.
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> PluginResult<()>
    where
        F: FnOnce(&ListenerContext<'_>) -> Result<(), HookError> + Send + 'static,
    {
        self.subscribe(Condition::single(event), listener)
    }

    /// Subscribes until the first of `events` fires.
    pub fn when_any<I, S, F>(&self, events: I, listener: F) -> PluginResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&ListenerContext<'_>) -> Result<(), HookError> + Send + 'static,
    {
        self.subscribe(Condition::any(events), listener)
    }

    /// Subscribes until all of `events` have fired.
    pub fn when_all<I, S, F>(&self, events: I, listener: F) -> PluginResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&ListenerContext<'_>) -> Result<(), HookError> + Send + 'static,
    {
        self.subscribe(Condition::all(events), listener)
    }

    /// Fires `event`.
    ///
    /// The event is marked fired before any listener runs, so re-emitting it
    /// from one of its own listeners is a no-op. Single listeners run in
    /// subscription order, then every `any`/`all` trigger that now holds.
    /// Emitting an event that already fired does nothing.
    pub fn emit(&self, event: &str) -> PluginResult<()> {
        let listeners = {
            let mut state = self.lock();
            if state.is_fired(event) {
                debug!(event = %event, "Event already fired, ignoring");
                return Ok(());
            }
            state.history.push(event.to_string());
            let record = state.events.entry(event.to_string()).or_default();
            record.fired = true;
            std::mem::take(&mut record.listeners)
        };

        debug!(event = %event, listeners = listeners.len(), "Emitting event");

        let delivered = listeners
            .into_iter()
            .try_for_each(|listener| self.invoke(event, listener));

        // Settle even when a listener failed, so later triggers still see the event.
        let ready = {
            let mut state = self.lock();
            state.settled.insert(event.to_string());
            if delivered.is_ok() {
                state.take_satisfied()
            } else {
                Vec::new()
            }
        };
        delivered?;
        self.deliver_triggers(ready)
    }

    /// Whether `event` has been emitted.
    pub fn is_fired(&self, event: &str) -> bool {
        self.lock().is_fired(event)
    }

    /// Fired events, in emission order.
    pub fn fired_events(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Number of single listeners still waiting on `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock()
            .events
            .get(event)
            .map(|r| r.listeners.len())
            .unwrap_or(0)
    }

    /// Number of `any`/`all` triggers that have not fired yet.
    pub fn pending_triggers(&self) -> usize {
        self.lock().triggers.len()
    }

    fn deliver_triggers(&self, ready: Vec<Trigger>) -> PluginResult<()> {
        for trigger in ready {
            let label = trigger.label();
            trace!(trigger = %label, "Condition satisfied");
            self.invoke(&label, trigger.listener)?;
        }
        Ok(())
    }

    fn invoke(&self, event: &str, listener: Listener) -> PluginResult<()> {
        let ctx = ListenerContext { bus: self };
        listener(&ctx).map_err(|source| PluginError::Listener {
            event: event.to_string(),
            source,
        })
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Arc::new(PluginTable::new()))
    }
}
