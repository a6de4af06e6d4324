//! Context coordinator
//!
//! Sequences context-change transactions across every registered slot. A change is
//! bracketed by [`local_change_begin`](ContextCoordinator::local_change_begin) and
//! [`local_change_end`](ContextCoordinator::local_change_end); the pending stack guards
//! against reentrancy and the commit stack accumulates the batch that is committed or
//! canceled as a whole once the outermost change has been surveyed.

mod ticket;

pub use ticket::ChangeTicket;

use crate::config::ContextSettings;
use crate::context::items::ContextItemSet;
use crate::context::managed::{ManagedSlot, SlotId};
use crate::context::subscriber::ContextSubscriber;
use crate::context::survey::SurveyOutcome;
use crate::error::ContextError;
use crate::events::EventBus;
use crate::marshal::{ContextMarshaller, DigitalSignature};
use crate::remote::{RemoteContextBridge, RemoteContextListener, RemoteState, RemoteStatus};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

/// Receives the verdict of a survey or of a whole transaction. Fires exactly once.
pub type ResponseCallback = Box<dyn FnOnce(SurveyOutcome) + Send>;

/// Reason reported to changes still in flight when the coordinator is reset.
pub const SUPERSEDED_REASON: &str = "Context change superseded by reset";

#[derive(Default)]
struct TransactionStacks {
    pending: Vec<Arc<dyn ManagedSlot>>,
    commit: Vec<Arc<dyn ManagedSlot>>,
    /// Callbacks of nested changes that settle with the batch.
    waiting: Vec<ResponseCallback>,
    /// Slots canceled by a batch while their own survey was still running.
    preempted: HashMap<SlotId, SurveyOutcome>,
}

fn contains(stack: &[Arc<dyn ManagedSlot>], id: SlotId) -> bool {
    stack.iter().any(|slot| slot.slot_id() == id)
}

#[derive(Default)]
struct RemoteParticipation {
    enabled: bool,
    transaction: bool,
    bridge: Option<Arc<dyn RemoteContextBridge>>,
    listener: Option<Arc<dyn RemoteContextListener>>,
}

struct CoordinatorInner {
    settings: ContextSettings,
    /// Descending priority; registration order among equals.
    slots: Mutex<Vec<Weak<dyn ManagedSlot>>>,
    stacks: Mutex<TransactionStacks>,
    /// Bumped by every reset; surveys started before it no longer commit.
    epoch: AtomicU64,
    dispatch: ReentrantMutex<()>,
    remote: Mutex<RemoteParticipation>,
    events: Option<EventBus>,
}

enum EndAction {
    NothingPending,
    Survey,
}

/// Shared handle to one coordinator. Clones refer to the same transaction state.
#[derive(Clone)]
pub struct ContextCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl Default for ContextCoordinator {
    fn default() -> Self {
        Self::new(ContextSettings::default())
    }
}

impl ContextCoordinator {
    pub fn new(settings: ContextSettings) -> Self {
        Self::build(settings, None)
    }

    /// Coordinator that publishes change and remote-status events on `events`.
    pub fn with_events(settings: ContextSettings, events: EventBus) -> Self {
        Self::build(settings, Some(events))
    }

    fn build(settings: ContextSettings, events: Option<EventBus>) -> Self {
        let remote = RemoteParticipation {
            enabled: settings.remote_enabled,
            ..RemoteParticipation::default()
        };
        Self {
            inner: Arc::new(CoordinatorInner {
                settings,
                slots: Mutex::new(Vec::new()),
                stacks: Mutex::new(TransactionStacks::default()),
                epoch: AtomicU64::new(0),
                dispatch: ReentrantMutex::new(()),
                remote: Mutex::new(remote),
                events,
            }),
        }
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.inner.settings
    }

    // Registration

    /// Track `slot`. Registering the same slot twice is a no-op.
    pub fn register_slot(&self, slot: &Arc<dyn ManagedSlot>) {
        let mut slots = self.inner.slots.lock();
        slots.retain(|weak| weak.strong_count() > 0);

        let id = slot.slot_id();
        let live: Vec<Arc<dyn ManagedSlot>> = slots.iter().filter_map(Weak::upgrade).collect();
        if live.iter().any(|s| s.slot_id() == id) {
            return;
        }

        let priority = slot.priority();
        let position = live
            .iter()
            .position(|s| s.priority() < priority)
            .unwrap_or(live.len());
        slots.insert(position, Arc::downgrade(slot));
        debug!(context = %slot.context_name(), priority, "Registered shared context");
    }

    pub fn unregister_slot(&self, id: SlotId) {
        self.inner.slots.lock().retain(|weak| match weak.upgrade() {
            Some(slot) => slot.slot_id() != id,
            None => false,
        });
    }

    /// Live slots in registry order.
    pub fn shared_contexts(&self) -> Vec<Arc<dyn ManagedSlot>> {
        self.inner
            .slots
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Look up a slot by context name, ignoring case.
    pub fn shared_context(&self, name: &str) -> Option<Arc<dyn ManagedSlot>> {
        let name = name.to_lowercase();
        self.shared_contexts()
            .into_iter()
            .find(|slot| slot.context_name().to_lowercase() == name)
    }

    /// Remove `subscriber` from every slot.
    pub fn unregister_subscriber(&self, subscriber: &Arc<dyn ContextSubscriber>) {
        for slot in self.shared_contexts() {
            slot.remove_subscriber(subscriber);
        }
    }

    // Local transactions

    /// Push `slot` onto the pending stack.
    pub fn local_change_begin(&self, slot: &Arc<dyn ManagedSlot>) -> Result<(), ContextError> {
        let _dispatch = self.inner.dispatch.lock();
        let mut stacks = self.inner.stacks.lock();
        let id = slot.slot_id();

        if contains(&stacks.pending, id) || contains(&stacks.commit, id) {
            return Err(ContextError::CircularChange {
                context: slot.context_name().to_string(),
            });
        }

        stacks.pending.push(Arc::clone(slot));
        Ok(())
    }

    /// Survey the change begun for `slot` and settle it.
    ///
    /// `slot` must be on top of the pending stack. Unless `defer_commit` is set, a
    /// rejection or the end of the outermost change commits or cancels the whole batch.
    /// `callback` receives the verdict, possibly after this call returns if a
    /// subscriber deferred its answer.
    pub fn local_change_end(
        &self,
        slot: &Arc<dyn ManagedSlot>,
        silent: bool,
        defer_commit: bool,
        callback: Option<ResponseCallback>,
    ) -> Result<(), ContextError> {
        let _dispatch = self.inner.dispatch.lock();
        match self.enter_end(slot)? {
            EndAction::NothingPending => {
                if let Some(callback) = callback {
                    callback(SurveyOutcome::accepted());
                }
            }
            EndAction::Survey => self.survey_slot(slot, silent, defer_commit, callback),
        }
        Ok(())
    }

    fn enter_end(&self, slot: &Arc<dyn ManagedSlot>) -> Result<EndAction, ContextError> {
        let mut stacks = self.inner.stacks.lock();
        let on_top = stacks
            .pending
            .last()
            .is_some_and(|top| top.slot_id() == slot.slot_id());

        if !on_top {
            return Err(ContextError::IllegalNesting {
                context: slot.context_name().to_string(),
            });
        }

        if !slot.is_pending() {
            stacks.pending.pop();
            return Ok(EndAction::NothingPending);
        }

        stacks.commit.push(Arc::clone(slot));
        Ok(EndAction::Survey)
    }

    fn survey_slot(
        &self,
        slot: &Arc<dyn ManagedSlot>,
        silent: bool,
        defer_commit: bool,
        callback: Option<ResponseCallback>,
    ) {
        let coordinator = self.clone();
        let target = Arc::clone(slot);
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        slot.survey_subscribers(
            silent,
            Box::new(move |outcome| {
                if coordinator.inner.epoch.load(Ordering::SeqCst) != epoch {
                    debug!(context = %target.context_name(), "Survey finished after a reset");
                    if let Some(callback) = callback {
                        callback(SurveyOutcome::rejected_with(SUPERSEDED_REASON));
                    }
                    return;
                }
                coordinator.survey_finished(&target, defer_commit, outcome, callback);
            }),
        );
    }

    fn survey_finished(
        &self,
        slot: &Arc<dyn ManagedSlot>,
        defer_commit: bool,
        mut outcome: SurveyOutcome,
        callback: Option<ResponseCallback>,
    ) {
        let _dispatch = self.inner.dispatch.lock();
        let id = slot.slot_id();

        let (preempted, outermost) = {
            let mut stacks = self.inner.stacks.lock();
            stacks.pending.retain(|s| s.slot_id() != id);
            (stacks.preempted.remove(&id), stacks.pending.is_empty())
        };

        if let Some(preempted) = preempted {
            outcome.merge(&preempted);
        }

        if outcome.is_rejected() {
            debug!(
                context = %slot.context_name(),
                reason = %outcome,
                "Survey of managed context rejected"
            );
        }

        if defer_commit {
            if let Some(callback) = callback {
                callback(outcome);
            }
            return;
        }

        if outcome.is_rejected() || outermost {
            let accept = outcome.is_accepted();
            self.commit_contexts(accept, accept, &outcome);
            if let Some(callback) = callback {
                callback(outcome);
            }
        } else if let Some(callback) = callback {
            self.inner.stacks.lock().waiting.push(callback);
        }
    }

    /// Commit or cancel every slot of the batch, then notify, both in LIFO order.
    fn commit_contexts(&self, accept: bool, all: bool, outcome: &SurveyOutcome) {
        let _dispatch = self.inner.dispatch.lock();

        let (batch, waiting) = {
            let mut stacks = self.inner.stacks.lock();
            let batch = std::mem::take(&mut stacks.commit);

            if !accept {
                let still_surveying: Vec<SlotId> = stacks
                    .pending
                    .iter()
                    .map(|s| s.slot_id())
                    .filter(|id| contains(&batch, *id))
                    .collect();
                for id in still_surveying {
                    stacks.preempted.insert(id, outcome.clone());
                }
            }

            (batch, std::mem::take(&mut stacks.waiting))
        };

        debug!(accept, slots = batch.len(), "Settling context batch");

        for slot in batch.iter().rev() {
            if slot.is_pending() {
                slot.commit(accept);
            }
        }

        for slot in batch.iter().rev() {
            slot.notify_subscribers(accept, all);
        }

        for callback in waiting {
            callback(outcome.clone());
        }
    }

    /// Begin, stage and end one change, reporting any stack error as a rejection.
    fn change_slot(
        &self,
        slot: &Arc<dyn ManagedSlot>,
        silent: bool,
        defer_commit: bool,
        stage: impl FnOnce(),
        callback: ResponseCallback,
    ) {
        let entered = self.local_change_begin(slot).and_then(|()| {
            stage();
            self.enter_end(slot)
        });

        match entered {
            Ok(EndAction::NothingPending) => callback(SurveyOutcome::accepted()),
            Ok(EndAction::Survey) => self.survey_slot(slot, silent, defer_commit, Some(callback)),
            Err(err) => {
                error!(context = %slot.context_name(), error = %err, "Error during context change");
                callback(SurveyOutcome::rejected_with(err.to_string()));
            }
        }
    }

    // Reset and init

    /// Clear both stacks and reset every slot to its default value.
    ///
    /// A silent reset is forced through; vetoes are logged and ignored. Otherwise the
    /// first rejection aborts the reset and the batch is canceled. Changes still in
    /// flight settle as rejected with [`SUPERSEDED_REASON`].
    pub fn reset(&self, silent: bool) -> ChangeTicket {
        let _dispatch = self.inner.dispatch.lock();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let slots = self.shared_contexts();
        for slot in &slots {
            slot.abandon_surveys();
        }
        let stale = std::mem::take(&mut *self.inner.stacks.lock());
        for callback in stale.waiting {
            callback(SurveyOutcome::rejected_with(SUPERSEDED_REASON));
        }

        let (ticket, done) = ChangeTicket::pair();
        let coordinator = self.clone();
        let finish: ResponseCallback = Box::new(move |outcome| {
            let commit = silent || outcome.is_accepted();
            coordinator.commit_contexts(commit, commit, &outcome);
            done(outcome);
        });

        self.reset_next(
            silent,
            slots.into(),
            SurveyOutcome::accepted(),
            finish,
        );
        ticket
    }

    /// Reset for a logout, forced through unless `survey_silent_reset` is off.
    pub fn logout(&self) -> ChangeTicket {
        info!(silent = self.inner.settings.survey_silent_reset, "Resetting shared context for logout");
        self.reset(self.inner.settings.survey_silent_reset)
    }

    fn reset_next(
        &self,
        silent: bool,
        mut remaining: VecDeque<Arc<dyn ManagedSlot>>,
        outcome: SurveyOutcome,
        done: ResponseCallback,
    ) {
        let Some(slot) = remaining.pop_front() else {
            done(outcome);
            return;
        };

        let coordinator = self.clone();
        let name = slot.context_name().to_string();
        let next: ResponseCallback = Box::new(move |response| {
            let mut outcome = outcome;
            if silent {
                if response.is_rejected() {
                    debug!(context = %name, reason = %response, "Veto ignored by silent reset");
                }
            } else {
                outcome.merge(&response);
            }

            if silent || outcome.is_accepted() {
                coordinator.reset_next(silent, remaining, outcome, done);
            } else {
                done(outcome);
            }
        });

        self.change_slot(&slot, silent, true, || slot.reset(), next);
    }

    /// Initialize one slot, or every slot when `slot` is `None`.
    ///
    /// Slots whose subject appears in the remote common context are seeded from it;
    /// the others stage their default value.
    pub fn init(&self, slot: Option<&Arc<dyn ManagedSlot>>) -> ChangeTicket {
        let (ticket, done) = ChangeTicket::pair();
        self.init_with(slot, None, done);
        ticket
    }

    /// Like [`init`](Self::init), additionally seeding from `saved` items.
    pub fn init_from(&self, slot: Option<&Arc<dyn ManagedSlot>>, saved: &ContextItemSet) -> ChangeTicket {
        let (ticket, done) = ChangeTicket::pair();
        self.init_with(slot, Some(saved), done);
        ticket
    }

    fn init_with(
        &self,
        slot: Option<&Arc<dyn ManagedSlot>>,
        saved: Option<&ContextItemSet>,
        done: ResponseCallback,
    ) {
        let _dispatch = self.inner.dispatch.lock();

        let mut items = saved.cloned().unwrap_or_default();
        if let Some(bridge) = self.active_bridge() {
            items.add_items(&bridge.context());
        }
        let items = Arc::new(items);

        match slot {
            Some(slot) => self.init_slot(slot, &items, done),
            None => self.init_next(
                items,
                self.shared_contexts().into(),
                SurveyOutcome::accepted(),
                done,
            ),
        }
    }

    fn init_next(
        &self,
        items: Arc<ContextItemSet>,
        mut remaining: VecDeque<Arc<dyn ManagedSlot>>,
        outcome: SurveyOutcome,
        done: ResponseCallback,
    ) {
        let Some(slot) = remaining.pop_front() else {
            done(outcome);
            return;
        };

        let coordinator = self.clone();
        let seed = Arc::clone(&items);
        self.init_slot(
            &slot,
            &items,
            Box::new(move |response| {
                let mut outcome = outcome;
                outcome.merge(&response);
                coordinator.init_next(seed, remaining, outcome, done);
            }),
        );
    }

    fn init_slot(&self, slot: &Arc<dyn ManagedSlot>, items: &ContextItemSet, callback: ResponseCallback) {
        self.change_slot(
            slot,
            false,
            false,
            || {
                let seeded = items.contains_subject(slot.context_name()) && slot.set_context_items(items);
                if !seeded {
                    slot.init();
                }
            },
            callback,
        );
    }

    // Marshaled context

    /// Union of every slot's committed context items.
    pub fn marshaled_context(&self) -> ContextItemSet {
        let mut items = ContextItemSet::new();
        for slot in self.shared_contexts() {
            items.add_items(&slot.context_items(false));
        }
        items
    }

    /// Import `items` into every slot that finds a value in them.
    ///
    /// Each importing slot is surveyed silently. With `commit`, any rejection cancels
    /// the whole import for every slot; without it the batch is left for a later
    /// remote commit or cancel.
    pub fn set_marshaled_context(&self, items: &ContextItemSet, commit: bool) -> ChangeTicket {
        let (ticket, done) = ChangeTicket::pair();
        self.set_marshaled_with(items, commit, done);
        ticket
    }

    fn set_marshaled_with(&self, items: &ContextItemSet, commit: bool, done: ResponseCallback) {
        let _dispatch = self.inner.dispatch.lock();
        let coordinator = self.clone();
        let finish: ResponseCallback = Box::new(move |outcome| {
            if commit {
                let accept = outcome.is_accepted();
                coordinator.commit_contexts(accept, false, &outcome);
            }
            done(outcome);
        });

        self.import_next(
            Arc::new(items.clone()),
            self.shared_contexts().into(),
            SurveyOutcome::accepted(),
            finish,
        );
    }

    fn import_next(
        &self,
        items: Arc<ContextItemSet>,
        mut remaining: VecDeque<Arc<dyn ManagedSlot>>,
        outcome: SurveyOutcome,
        done: ResponseCallback,
    ) {
        loop {
            let Some(slot) = remaining.pop_front() else {
                done(outcome);
                return;
            };

            if !slot.set_context_items(&items) {
                continue;
            }

            let coordinator = self.clone();
            let next_items = Arc::clone(&items);
            self.change_slot(
                &slot,
                true,
                true,
                || {},
                Box::new(move |response| {
                    let mut outcome = outcome;
                    outcome.merge(&response);
                    coordinator.import_next(next_items, remaining, outcome, done);
                }),
            );
            return;
        }
    }

    /// Signed marshaler over this coordinator's aggregate context.
    pub fn context_marshaller(&self, signer: Arc<dyn DigitalSignature>) -> ContextMarshaller {
        ContextMarshaller::new(self.clone(), signer)
    }

    // Events

    pub(crate) fn publish_context_changed(&self, context: &str, event: &str, items: &ContextItemSet) {
        if let Some(events) = &self.inner.events {
            if let Err(err) = events.emit_context_changed(event, context, items) {
                debug!(context, error = %err, "Context change event not delivered");
            }
        }
    }

    // Remote participation

    pub fn set_remote_enabled(&self, enabled: bool) {
        let detached = {
            let mut remote = self.inner.remote.lock();
            remote.enabled = enabled;
            if enabled {
                None
            } else {
                remote.bridge.take().zip(remote.listener.take())
            }
        };

        if let Some((bridge, listener)) = detached {
            bridge.suspend();
            bridge.unsubscribe(&listener);
        }

        self.update_remote_status();
    }

    /// Join the common context through `bridge` and re-initialize every slot from it.
    ///
    /// If a bridge is already attached it is resumed instead. Should the
    /// initialization be rejected the bridge is suspended again.
    pub fn remote_join(&self, bridge: Arc<dyn RemoteContextBridge>) -> Result<ChangeTicket, ContextError> {
        if self.active_bridge().is_some() {
            return Ok(ChangeTicket::settled(SurveyOutcome::accepted()));
        }

        let (enabled, attached) = {
            let remote = self.inner.remote.lock();
            (remote.enabled, remote.bridge.clone())
        };

        if !enabled {
            return Err(ContextError::Remote(
                "remote context participation is disabled".to_string(),
            ));
        }

        let bridge = match attached {
            Some(bridge) => bridge,
            None => self.attach_bridge(bridge)?,
        };

        if !bridge.is_active() {
            bridge.resume();
        }

        let (ticket, done) = ChangeTicket::pair();
        let coordinator = self.clone();
        let joined = Arc::clone(&bridge);
        self.init_with(
            None,
            None,
            Box::new(move |outcome| {
                if outcome.is_rejected() {
                    joined.suspend();
                }
                coordinator.update_remote_status();
                done(outcome);
            }),
        );
        Ok(ticket)
    }

    fn attach_bridge(
        &self,
        bridge: Arc<dyn RemoteContextBridge>,
    ) -> Result<Arc<dyn RemoteContextBridge>, ContextError> {
        let listener: Arc<dyn RemoteContextListener> = Arc::new(CoordinatorListener {
            inner: Arc::downgrade(&self.inner),
        });
        bridge.subscribe(Arc::clone(&listener));

        let settings = &self.inner.settings;
        if !bridge.join(&settings.application_id, "", true, &settings.remote_filter) {
            bridge.unsubscribe(&listener);
            return Err(ContextError::Remote(format!(
                "join refused for {}",
                settings.application_id
            )));
        }

        let mut remote = self.inner.remote.lock();
        remote.bridge = Some(Arc::clone(&bridge));
        remote.listener = Some(listener);
        Ok(bridge)
    }

    /// Suspend participation, keeping the bridge attached for a later join.
    pub fn remote_leave(&self) {
        let bridge = self.inner.remote.lock().bridge.clone();
        if let Some(bridge) = bridge {
            if bridge.state() != RemoteState::Suspended {
                bridge.suspend();
            }
        }
        self.update_remote_status();
    }

    pub fn remote_status(&self) -> RemoteStatus {
        let (enabled, transaction, bridge) = {
            let remote = self.inner.remote.lock();
            (remote.enabled, remote.transaction, remote.bridge.clone())
        };

        match bridge {
            None if enabled => RemoteStatus::None,
            None => RemoteStatus::Disabled,
            Some(_) if transaction => RemoteStatus::Changing,
            Some(bridge) => match bridge.state() {
                RemoteState::Participating => RemoteStatus::Joined,
                RemoteState::Suspended => RemoteStatus::Broken,
                RemoteState::Unknown => RemoteStatus::None,
            },
        }
    }

    fn active_bridge(&self) -> Option<Arc<dyn RemoteContextBridge>> {
        let bridge = self.inner.remote.lock().bridge.clone();
        bridge.filter(|bridge| bridge.is_active())
    }

    fn update_remote_status(&self) {
        if !self.inner.remote.lock().enabled {
            return;
        }

        let status = self.remote_status();
        info!(status = %status, "Remote context status");
        if let Some(events) = &self.inner.events {
            if let Err(err) = events.emit_remote_status(status) {
                debug!(error = %err, "Remote status event not delivered");
            }
        }
    }

    fn set_remote_transaction(&self, active: bool) {
        self.inner.remote.lock().transaction = active;
        self.update_remote_status();
    }

    fn remote_pending(&self, items: &ContextItemSet) {
        self.set_remote_transaction(true);
        let coordinator = self.clone();
        self.set_marshaled_with(
            items,
            false,
            Box::new(move |outcome| {
                if outcome.is_rejected() {
                    let bridge = coordinator.inner.remote.lock().bridge.clone();
                    if let Some(bridge) = bridge {
                        bridge.set_survey_response(&outcome.reason());
                    }
                }
                coordinator.set_remote_transaction(false);
            }),
        );
    }

    fn remote_settled(&self, accept: bool) {
        let outcome = if accept {
            SurveyOutcome::accepted()
        } else {
            SurveyOutcome::rejected_with("Remote context change canceled")
        };
        self.commit_contexts(accept, false, &outcome);
    }
}

impl fmt::Debug for ContextCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stacks = self.inner.stacks.lock();
        f.debug_struct("ContextCoordinator")
            .field("slots", &self.inner.slots.lock().len())
            .field("pending", &stacks.pending.len())
            .field("commit", &stacks.commit.len())
            .finish_non_exhaustive()
    }
}

/// Routes bridge callbacks to a coordinator without keeping it alive.
struct CoordinatorListener {
    inner: Weak<CoordinatorInner>,
}

impl CoordinatorListener {
    fn coordinator(&self) -> Option<ContextCoordinator> {
        self.inner.upgrade().map(|inner| ContextCoordinator { inner })
    }
}

impl RemoteContextListener for CoordinatorListener {
    fn pending(&self, _sender: &dyn RemoteContextBridge, items: &ContextItemSet) {
        if let Some(coordinator) = self.coordinator() {
            coordinator.remote_pending(items);
        }
    }

    fn committed(&self, _sender: &dyn RemoteContextBridge) {
        if let Some(coordinator) = self.coordinator() {
            coordinator.remote_settled(true);
        }
    }

    fn canceled(&self, _sender: &dyn RemoteContextBridge) {
        if let Some(coordinator) = self.coordinator() {
            coordinator.remote_settled(false);
        }
    }
}
