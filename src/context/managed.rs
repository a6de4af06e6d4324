//! Managed contexts
//!
//! A [`ManagedContext`] is one shared context slot ("current patient", "current
//! user"). It owns the committed and pending domain values, the subscriber list, and
//! the survey walk; the coordinator sequences its changes with every other slot.

use crate::context::items::ContextItemSet;
use crate::context::subscriber::{same_subscriber, subscriber_label, ContextSubscriber};
use crate::context::survey::{SurveyOutcome, SurveyResponse};
use crate::coordinator::{ChangeTicket, ContextCoordinator, ResponseCallback};
use crate::error::ContextError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Prefix of the event fired after a committed change.
pub const CONTEXT_CHANGED_EVENT: &str = "CONTEXT.CHANGED.";

/// Process-unique slot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SlotId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// Handle for a registered change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Object-safe view of a slot, as driven by the coordinator.
pub trait ManagedSlot: Send + Sync {
    fn slot_id(&self) -> SlotId;

    /// Unique context name, also the subject prefix of its context items.
    fn context_name(&self) -> &str;

    /// Registry order: higher priorities are initialized and reset first.
    fn priority(&self) -> i32;

    fn is_pending(&self) -> bool;

    /// Promote (accept) or drop the pending value. Always clears the pending cell.
    fn commit(&self, accept: bool);

    /// Stage the initial value when no saved context exists.
    fn init(&self);

    /// Stage the default value.
    fn reset(&self);

    /// Export the pending or current value as context items.
    fn context_items(&self, pending: bool) -> ContextItemSet;

    /// Stage a value derived from `items`. Returns false if `items` hold nothing
    /// this slot understands.
    fn set_context_items(&self, items: &ContextItemSet) -> bool;

    fn add_subscriber(&self, subscriber: Arc<dyn ContextSubscriber>) -> bool;

    fn remove_subscriber(&self, subscriber: &Arc<dyn ContextSubscriber>);

    /// Poll subscribers about the pending change. `callback` fires exactly once.
    fn survey_subscribers(&self, silent: bool, callback: ResponseCallback);

    /// Deliver committed/canceled to everyone (`all`) or only to those surveyed.
    fn notify_subscribers(&self, accept: bool, all: bool);

    /// Stop every survey round in flight. A parked round that is resumed later
    /// asks no further subscribers and reports its answer as is.
    fn abandon_surveys(&self);
}

/// Domain projection and policy for a [`ManagedContext`].
pub trait ContextBinding<T: PartialEq>: Send + Sync + 'static {
    fn priority(&self) -> i32 {
        0
    }

    /// Decides whether a requested value is really a different context.
    fn is_same_context(&self, a: Option<&T>, b: Option<&T>) -> bool {
        a == b
    }

    /// Value staged by `init`/`reset`.
    fn default_context(&self) -> Option<T> {
        None
    }

    /// Project `value` into context items (for example `Patient.Id`).
    fn to_context_items(&self, _value: &T, _items: &mut ContextItemSet) {}

    /// Derive a value from context items, if they describe one.
    fn from_context_items(&self, _items: &ContextItemSet) -> Option<T> {
        None
    }
}

/// Binding with default policy and no item projection.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainBinding;

impl<T: PartialEq> ContextBinding<T> for PlainBinding {}

struct SlotState<T> {
    current: Option<T>,
    pending: Option<T>,
    is_pending: bool,
}

type Listener<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

/// One shared context slot holding values of type `T`.
pub struct ManagedContext<T> {
    id: SlotId,
    name: String,
    me: Weak<ManagedContext<T>>,
    coordinator: ContextCoordinator,
    binding: Box<dyn ContextBinding<T>>,
    state: Mutex<SlotState<T>>,
    subscribers: Mutex<Vec<Arc<dyn ContextSubscriber>>>,
    surveyed: Arc<Mutex<Vec<Arc<dyn ContextSubscriber>>>>,
    survey_generation: Arc<AtomicU64>,
    listeners: Mutex<Vec<(ListenerId, Listener<T>)>>,
    next_listener: AtomicU64,
}

impl<T> ManagedContext<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a slot with the default binding and register it with `coordinator`.
    pub fn new(
        name: impl Into<String>,
        initial: Option<T>,
        coordinator: &ContextCoordinator,
    ) -> Arc<Self> {
        Self::with_binding(name, initial, PlainBinding, coordinator)
    }

    /// Create a slot with a custom binding and register it with `coordinator`.
    pub fn with_binding<B: ContextBinding<T>>(
        name: impl Into<String>,
        initial: Option<T>,
        binding: B,
        coordinator: &ContextCoordinator,
    ) -> Arc<Self> {
        let slot = Arc::new_cyclic(|me| ManagedContext {
            id: SlotId::next(),
            name: name.into(),
            me: me.clone(),
            coordinator: coordinator.clone(),
            binding: Box::new(binding),
            state: Mutex::new(SlotState {
                current: initial,
                pending: None,
                is_pending: false,
            }),
            subscribers: Mutex::new(Vec::new()),
            surveyed: Arc::new(Mutex::new(Vec::new())),
            survey_generation: Arc::new(AtomicU64::new(0)),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        });

        let handle: Arc<dyn ManagedSlot> = slot.clone();
        coordinator.register_slot(&handle);
        slot
    }

    /// Ask for `value` to become the shared context.
    ///
    /// Equal values are a no-op. The returned ticket settles once the transaction
    /// this change belongs to has been decided, which may be later if a subscriber
    /// defers its answer.
    pub fn request_context_change(
        &self,
        value: impl Into<Option<T>>,
    ) -> Result<ChangeTicket, ContextError> {
        let value = value.into();

        {
            let state = self.state.lock();
            if self
                .binding
                .is_same_context(value.as_ref(), state.current.as_ref())
            {
                return Ok(ChangeTicket::settled(SurveyOutcome::accepted()));
            }
            if state.is_pending {
                return Err(ContextError::AlreadyPending {
                    context: self.name.clone(),
                });
            }
        }

        let handle = self.handle()?;
        self.coordinator.local_change_begin(&handle)?;
        self.set_pending(value);

        let (ticket, callback) = ChangeTicket::pair();
        self.coordinator
            .local_change_end(&handle, false, false, Some(callback))?;
        Ok(ticket)
    }

    /// The pending value (if `pending`) or the committed one.
    pub fn get_context_object(&self, pending: bool) -> Option<T> {
        let state = self.state.lock();
        if pending {
            state.pending.clone()
        } else {
            state.current.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the event fired after a committed change.
    pub fn event_name(&self) -> String {
        format!("{}{}", CONTEXT_CHANGED_EVENT, self.name)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Add each subscriber. Returns true if any was added.
    pub fn add_subscribers<I>(&self, subscribers: I) -> bool
    where
        I: IntoIterator<Item = Arc<dyn ContextSubscriber>>,
    {
        subscribers
            .into_iter()
            .fold(false, |added, s| self.add_subscriber(s) || added)
    }

    pub fn remove_subscribers<'a, I>(&self, subscribers: I)
    where
        I: IntoIterator<Item = &'a Arc<dyn ContextSubscriber>>,
    {
        for subscriber in subscribers {
            self.remove_subscriber(subscriber);
        }
    }

    /// Register a listener for committed changes of this slot.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Option<&T>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Detach this slot from its coordinator.
    pub fn unregister(&self) {
        self.coordinator.unregister_slot(self.id);
    }

    fn handle(&self) -> Result<Arc<dyn ManagedSlot>, ContextError> {
        let slot: Arc<ManagedContext<T>> =
            self.me.upgrade().ok_or_else(|| ContextError::SlotUnavailable {
                context: self.name.clone(),
            })?;
        Ok(slot as Arc<dyn ManagedSlot>)
    }

    fn set_pending(&self, value: Option<T>) {
        let mut state = self.state.lock();
        state.pending = value;
        state.is_pending = true;
    }

    fn fire_listeners(&self) {
        let current = self.get_context_object(false);
        let listeners: Vec<Listener<T>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(current.as_ref());
        }

        self.coordinator
            .publish_context_changed(&self.name, &self.event_name(), &self.context_items(false));
    }
}

impl<T> ManagedSlot for ManagedContext<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn slot_id(&self) -> SlotId {
        self.id
    }

    fn context_name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.binding.priority()
    }

    fn is_pending(&self) -> bool {
        self.state.lock().is_pending
    }

    fn commit(&self, accept: bool) {
        let mut state = self.state.lock();
        if accept {
            state.current = state.pending.take();
        }
        state.pending = None;
        state.is_pending = false;
    }

    fn init(&self) {
        self.reset();
    }

    fn reset(&self) {
        self.set_pending(self.binding.default_context());
    }

    fn context_items(&self, pending: bool) -> ContextItemSet {
        let mut items = ContextItemSet::new();
        if let Some(value) = self.get_context_object(pending) {
            self.binding.to_context_items(&value, &mut items);
        }
        items
    }

    fn set_context_items(&self, items: &ContextItemSet) -> bool {
        match self.binding.from_context_items(items) {
            Some(value) => {
                self.set_pending(Some(value));
                true
            }
            None => false,
        }
    }

    fn add_subscriber(&self, subscriber: Arc<dyn ContextSubscriber>) -> bool {
        let mut subscribers = self.subscribers.lock();
        if subscribers.iter().any(|s| same_subscriber(s, &subscriber)) {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    fn remove_subscriber(&self, subscriber: &Arc<dyn ContextSubscriber>) {
        self.subscribers
            .lock()
            .retain(|s| !same_subscriber(s, subscriber));
        self.surveyed
            .lock()
            .retain(|s| !same_subscriber(s, subscriber));
    }

    fn survey_subscribers(&self, silent: bool, callback: ResponseCallback) {
        // A fresh round always asks everyone, from a snapshot of the list.
        let subscribers = self.subscribers.lock().clone();

        let walk = Arc::new(SurveyWalk {
            context: self.name.clone(),
            subscribers,
            next: Mutex::new(0),
            response: SurveyResponse::new(silent),
            surveyed: Arc::clone(&self.surveyed),
            generation: self.survey_generation.load(Ordering::SeqCst),
            current_generation: Arc::clone(&self.survey_generation),
            callback: Mutex::new(Some(callback)),
        });

        walk.advance();
    }

    fn notify_subscribers(&self, accept: bool, all: bool) {
        let targets = if all {
            self.subscribers.lock().clone()
        } else {
            self.surveyed.lock().clone()
        };
        self.surveyed.lock().clear();

        for subscriber in &targets {
            let result = if accept {
                subscriber.committed()
            } else {
                subscriber.canceled()
            };

            if let Err(err) = result {
                error!(
                    context = %self.name,
                    subscriber = %subscriber_label(subscriber),
                    action = if accept { "committed" } else { "canceled" },
                    error = %err,
                    "Error during notifySubscribers"
                );
            }
        }

        if accept {
            self.fire_listeners();
        }
    }

    fn abandon_surveys(&self) {
        self.survey_generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T> fmt::Debug for ManagedContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One survey round over a snapshot of subscribers.
///
/// The walk is driven iteratively; a deferred answer parks it and the response's
/// continuation resumes it from whichever stack delivers the answer.
struct SurveyWalk {
    context: String,
    subscribers: Vec<Arc<dyn ContextSubscriber>>,
    next: Mutex<usize>,
    response: SurveyResponse,
    surveyed: Arc<Mutex<Vec<Arc<dyn ContextSubscriber>>>>,
    generation: u64,
    current_generation: Arc<AtomicU64>,
    callback: Mutex<Option<ResponseCallback>>,
}

impl SurveyWalk {
    fn advance(self: &Arc<Self>) {
        loop {
            if self.is_abandoned() {
                debug!(context = %self.context, "Abandoned survey resumed; asking no one else");
                self.finish();
                return;
            }

            let Some(subscriber) = self.next_subscriber() else {
                self.finish();
                return;
            };

            {
                let mut surveyed = self.surveyed.lock();
                if !surveyed.iter().any(|s| same_subscriber(s, &subscriber)) {
                    surveyed.push(Arc::clone(&subscriber));
                }
            }

            let walk = Arc::clone(self);
            self.response.reset(Box::new(move || walk.advance()));

            if let Err(err) = subscriber.pending(&self.response) {
                // A failing subscriber cannot veto; see take_violation for the one exception.
                error!(
                    context = %self.context,
                    subscriber = %subscriber_label(&subscriber),
                    error = %err,
                    "Error during surveySubscribers"
                );
            }

            if let Some(violation) = self.response.take_violation() {
                warn!(
                    context = %self.context,
                    subscriber = %subscriber_label(&subscriber),
                    error = %violation,
                    "Subscriber answered a survey more than once"
                );
                self.response.record_rejection(violation.to_string());
            }

            if self.response.park() {
                debug!(context = %self.context, "Survey deferred by subscriber");
                return;
            }
        }
    }

    fn next_subscriber(&self) -> Option<Arc<dyn ContextSubscriber>> {
        if !self.response.is_silent() && self.response.rejected() {
            return None;
        }

        let mut next = self.next.lock();
        let subscriber = self.subscribers.get(*next).cloned();
        *next += 1;
        subscriber
    }

    fn is_abandoned(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) != self.generation
    }

    fn finish(&self) {
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback(self.response.outcome());
        }
    }
}
