//! # Optimistic toggles
//!
//! One [`ToggleEngine`] drives one relation key through `Idle -> Pending -> Idle`.
//! The local flip is published before the remote write starts; a failed write
//! restores the pre-toggle value and counter. While a write is in flight further
//! toggles on the same engine are ignored.
//!
//! [`MountedToggle`] is the widget-level wrapper: it performs the initial checks,
//! pumps real-time pushes into the engine and releases its subscriptions when dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use domains::{Actor, RouteId, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::relations::{RelationKey, RelationKind, RelationRepository, RelationSubject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Idle { value: bool },
    Pending { optimistic: bool, previous: bool },
}

impl Default for ToggleState {
    fn default() -> Self {
        ToggleState::Idle { value: false }
    }
}

impl ToggleState {
    /// The value shown to the actor.
    pub fn value(&self) -> bool {
        match *self {
            ToggleState::Idle { value } => value,
            ToggleState::Pending { optimistic, .. } => optimistic,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ToggleState::Pending { .. })
    }

    /// `Idle(v)` becomes `Pending(!v, v)` and returns the optimistic value.
    /// Returns `None` when already pending.
    pub fn begin(&mut self) -> Option<bool> {
        match *self {
            ToggleState::Idle { value } => {
                *self = ToggleState::Pending {
                    optimistic: !value,
                    previous: value,
                };
                Some(!value)
            }
            ToggleState::Pending { .. } => None,
        }
    }

    /// Settles a pending toggle: success keeps the optimistic value, failure restores the previous one.
    pub fn settle(&mut self, succeeded: bool) {
        if let ToggleState::Pending {
            optimistic,
            previous,
        } = *self
        {
            let value = if succeeded { optimistic } else { previous };
            *self = ToggleState::Idle { value };
        }
    }
}

/// Snapshot rendered by a like or favorite button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToggleView {
    pub active: bool,
    /// `None` for relations without a public counter.
    pub count: Option<u64>,
    pub busy: bool,
    /// `false` while nobody is signed in.
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Confirmed(bool),
    /// The write failed; the contained value is the restored one.
    RolledBack(bool),
    /// Another toggle on this key was still in flight.
    Ignored,
    /// No actor; nothing was sent.
    Disabled,
}

struct Inner {
    state: ToggleState,
    count: Option<u64>,
    /// Counter change applied by the pending toggle, reversed on failure.
    pending_delta: i64,
}

pub struct ToggleEngine {
    relations: RelationRepository,
    subject: RelationSubject,
    key: Option<RelationKey>,
    inner: Mutex<Inner>,
    view: watch::Sender<ToggleView>,
}

impl ToggleEngine {
    /// `actor == None` fixes the engine at `Idle(false)` with toggling disabled.
    pub fn new(
        relations: RelationRepository,
        subject: RelationSubject,
        actor: Option<&Actor>,
        initial_value: bool,
        initial_count: Option<u64>,
    ) -> Self {
        let key = actor.map(|a| subject.clone().for_actor(a.id.clone()));
        let value = key.is_some() && initial_value;
        let inner = Inner {
            state: ToggleState::Idle { value },
            count: initial_count,
            pending_delta: 0,
        };
        let (view, _) = watch::channel(Self::render(&inner, key.is_some()));
        Self {
            relations,
            subject,
            key,
            inner: Mutex::new(inner),
            view,
        }
    }

    pub fn subject(&self) -> &RelationSubject {
        &self.subject
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn state(&self) -> ToggleState {
        self.lock().state
    }

    pub fn view(&self) -> ToggleView {
        *self.view.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ToggleView> {
        self.view.subscribe()
    }

    #[instrument(skip(self), fields(subject = ?self.subject))]
    pub async fn toggle(&self) -> ToggleOutcome {
        let Some(key) = &self.key else {
            debug!("toggle ignored: not signed in");
            return ToggleOutcome::Disabled;
        };

        {
            let mut inner = self.lock();
            let Some(optimistic) = inner.state.begin() else {
                debug!("toggle ignored: already pending");
                return ToggleOutcome::Ignored;
            };
            inner.pending_delta = 0;
            if let Some(count) = inner.count {
                let next = if optimistic {
                    count.saturating_add(1)
                } else {
                    count.saturating_sub(1)
                };
                inner.pending_delta = next as i64 - count as i64;
                inner.count = Some(next);
            }
            self.publish(&inner);
        }

        let result = self.relations.toggle(key).await;

        let mut inner = self.lock();
        let outcome = match result {
            Ok(remote) => {
                inner.state.settle(true);
                let value = inner.state.value();
                if remote != value {
                    debug!(remote, local = value, "remote state diverged from local intent");
                }
                ToggleOutcome::Confirmed(value)
            }
            Err(error) => {
                warn!(%error, "toggle failed, rolling back");
                inner.state.settle(false);
                let delta = inner.pending_delta;
                inner.count = inner.count.map(|c| (c as i64 - delta).max(0) as u64);
                ToggleOutcome::RolledBack(inner.state.value())
            }
        };
        inner.pending_delta = 0;
        self.publish(&inner);
        outcome
    }

    /// Real-time counter push. Never settles a pending toggle.
    pub fn apply_remote_count(&self, count: u64) {
        let mut inner = self.lock();
        if inner.count.is_none() {
            return;
        }
        inner.count = Some(count);
        // The push is authoritative; a later rollback must not subtract from it.
        inner.pending_delta = 0;
        self.publish(&inner);
    }

    /// Real-time existence push, applied only while idle.
    pub fn apply_remote_presence(&self, present: bool) {
        if self.key.is_none() {
            return;
        }
        let mut inner = self.lock();
        if let ToggleState::Idle { value } = &mut inner.state {
            if *value != present {
                *value = present;
                self.publish(&inner);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.view.send_replace(Self::render(inner, self.key.is_some()));
    }

    fn render(inner: &Inner, enabled: bool) -> ToggleView {
        ToggleView {
            active: inner.state.value(),
            count: inner.count,
            busy: inner.state.is_pending(),
            enabled,
        }
    }
}

/// A toggle bound to a mounted view. Dropping it stops the pumps and releases
/// their subscriptions; [`MountedToggle::unmount`] also waits for that to finish.
pub struct MountedToggle {
    engine: Arc<ToggleEngine>,
    pumps: Vec<JoinHandle<()>>,
}

impl MountedToggle {
    /// Runs the initial count and existence checks, then starts listening for pushes.
    /// Likes follow the shared counter; favorites follow the actor's own record.
    pub async fn mount(
        relations: RelationRepository,
        actor: Option<&Actor>,
        subject: RelationSubject,
    ) -> Self {
        let key = actor.map(|a| subject.clone().for_actor(a.id.clone()));
        let counted = subject.counter_collection().is_some();

        // Checks that failed read as `None` here, so the first push is applied.
        let checked_count = if counted {
            relations
                .count(&subject)
                .await
                .inspect_err(|error| warn!(%error, ?subject, "initial count failed"))
                .ok()
        } else {
            None
        };
        let checked_value = match &key {
            Some(key) => relations
                .exists(key)
                .await
                .inspect_err(|error| warn!(%error, ?subject, "initial existence check failed"))
                .ok(),
            None => None,
        };
        let initial_count = counted.then(|| checked_count.unwrap_or(0));
        let initial_value = checked_value.unwrap_or(false);

        let engine = Arc::new(ToggleEngine::new(
            relations.clone(),
            subject.clone(),
            actor,
            initial_value,
            initial_count,
        ));

        let mut pumps = Vec::new();
        if counted {
            match relations.watch_count(&subject) {
                Ok(counts) => pumps.push(spawn_pump(
                    counts,
                    checked_count,
                    engine.clone(),
                    ToggleEngine::apply_remote_count,
                )),
                Err(error) => warn!(%error, ?subject, "count subscription failed"),
            }
        }
        if let (Some(key), RelationKind::Favorite) = (&key, subject.kind()) {
            match relations.watch_exists(key) {
                Ok(presence) => {
                    pumps.push(spawn_pump(
                        presence,
                        checked_value,
                        engine.clone(),
                        ToggleEngine::apply_remote_presence,
                    ))
                }
                Err(error) => warn!(%error, ?subject, "presence subscription failed"),
            }
        }

        Self { engine, pumps }
    }

    pub async fn route_like(relations: RelationRepository, actor: Option<&Actor>, route: RouteId) -> Self {
        Self::mount(relations, actor, RelationSubject::RouteLike(route)).await
    }

    pub async fn favorite(relations: RelationRepository, actor: Option<&Actor>, route: RouteId) -> Self {
        Self::mount(relations, actor, RelationSubject::Favorite(route)).await
    }

    pub fn engine(&self) -> &Arc<ToggleEngine> {
        &self.engine
    }

    pub async fn toggle(&self) -> ToggleOutcome {
        self.engine.toggle().await
    }

    pub fn view(&self) -> ToggleView {
        self.engine.view()
    }

    pub fn subscribe(&self) -> watch::Receiver<ToggleView> {
        self.engine.subscribe()
    }

    /// Stops the pumps and waits until their subscriptions are released.
    pub async fn unmount(mut self) {
        for pump in std::mem::take(&mut self.pumps) {
            pump.abort();
            // Cancellation is the expected outcome here.
            let _ = pump.await;
        }
    }
}

impl Drop for MountedToggle {
    fn drop(&mut self) {
        for pump in &self.pumps {
            pump.abort();
        }
    }
}

/// Subscriptions open with a snapshot. When it repeats `checked`, the value the mount
/// already read, it is dropped: applying it after an early toggle would undo that toggle.
fn spawn_pump<T: PartialEq + Send + 'static>(
    mut pushes: Subscription<T>,
    checked: Option<T>,
    engine: Arc<ToggleEngine>,
    apply: fn(&ToggleEngine, T),
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match pushes.next().await {
            Some(first) if checked.as_ref() == Some(&first) => {}
            Some(first) => apply(&engine, first),
            None => return,
        }
        while let Some(item) = pushes.next().await {
            apply(&engine, item);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockDocumentStore, StoreError, UserId};
    use storage_adapters::MemoryStore;

    fn actor(id: &str) -> Actor {
        Actor {
            id: UserId::from(id),
            display_name: None,
            email: None,
            photo_url: None,
        }
    }

    fn route_like() -> RelationSubject {
        RelationSubject::RouteLike(RouteId::from("r1"))
    }

    #[test]
    fn state_machine_transitions() {
        let mut state = ToggleState::Idle { value: false };
        assert_eq!(state.begin(), Some(true));
        assert_eq!(
            state,
            ToggleState::Pending {
                optimistic: true,
                previous: false
            }
        );
        assert_eq!(state.begin(), None);
        state.settle(false);
        assert_eq!(state, ToggleState::Idle { value: false });

        state.begin();
        state.settle(true);
        assert_eq!(state, ToggleState::Idle { value: true });
    }

    #[tokio::test]
    async fn sequential_toggles_follow_parity() {
        let store = Arc::new(MemoryStore::new());
        let anna = actor("anna");
        let engine = ToggleEngine::new(
            RelationRepository::new(store.clone()),
            route_like(),
            Some(&anna),
            false,
            Some(0),
        );

        for n in 1..=5 {
            engine.toggle().await;
            assert_eq!(engine.state(), ToggleState::Idle { value: n % 2 == 1 });
        }
        assert_eq!(engine.view().count, Some(1));
        assert_eq!(store.write_attempts(), 5);
    }

    #[tokio::test]
    async fn failed_write_restores_state_and_counter() {
        let store = Arc::new(MemoryStore::new());
        let anna = actor("anna");
        let engine = ToggleEngine::new(
            RelationRepository::new(store.clone()),
            route_like(),
            Some(&anna),
            false,
            Some(7),
        );
        let before = engine.view();

        store.fail_next_write(StoreError::Unavailable("offline".into()));
        assert_eq!(engine.toggle().await, ToggleOutcome::RolledBack(false));
        assert_eq!(engine.view(), before);
    }

    #[tokio::test]
    async fn rollback_from_zero_keeps_counter_floored() {
        let store = Arc::new(MemoryStore::new());
        let anna = actor("anna");
        let engine = ToggleEngine::new(
            RelationRepository::new(store.clone()),
            route_like(),
            Some(&anna),
            true,
            Some(0),
        );

        store.fail_next_write(StoreError::Unavailable("offline".into()));
        assert_eq!(engine.toggle().await, ToggleOutcome::RolledBack(true));
        assert_eq!(engine.view().count, Some(0));
    }

    #[tokio::test]
    async fn toggles_while_pending_send_nothing() {
        let store = Arc::new(MemoryStore::new());
        let anna = actor("anna");
        let engine = Arc::new(ToggleEngine::new(
            RelationRepository::new(store.clone()),
            route_like(),
            Some(&anna),
            false,
            Some(0),
        ));

        let hold = store.hold_writes();
        let first = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle().await }
        });
        let mut views = engine.subscribe();
        views.wait_for(|v| v.busy).await.unwrap();

        assert_eq!(engine.toggle().await, ToggleOutcome::Ignored);
        assert_eq!(engine.toggle().await, ToggleOutcome::Ignored);
        assert_eq!(engine.view(), ToggleView { active: true, count: Some(1), busy: true, enabled: true });

        hold.release();
        assert_eq!(first.await.unwrap(), ToggleOutcome::Confirmed(true));
        assert_eq!(store.write_attempts(), 1);
    }

    #[tokio::test]
    async fn signed_out_toggle_makes_no_remote_call() {
        // No expectations: any store call fails the test.
        let store = MockDocumentStore::new();
        let engine = ToggleEngine::new(
            RelationRepository::new(Arc::new(store)),
            route_like(),
            None,
            true,
            Some(3),
        );

        assert_eq!(engine.toggle().await, ToggleOutcome::Disabled);
        assert_eq!(engine.state(), ToggleState::Idle { value: false });
        assert!(!engine.view().enabled);
    }

    #[tokio::test]
    async fn count_push_during_pending_does_not_settle() {
        let store = Arc::new(MemoryStore::new());
        let anna = actor("anna");
        let engine = Arc::new(ToggleEngine::new(
            RelationRepository::new(store.clone()),
            route_like(),
            Some(&anna),
            false,
            Some(2),
        ));

        let hold = store.hold_writes();
        let pending = tokio::spawn({
            let engine = engine.clone();
            async move { engine.toggle().await }
        });
        engine.subscribe().wait_for(|v| v.busy).await.unwrap();

        engine.apply_remote_count(10);
        assert!(engine.state().is_pending());
        assert_eq!(engine.view().count, Some(10));

        store.fail_next_write(StoreError::Unavailable("offline".into()));
        hold.release();
        assert_eq!(pending.await.unwrap(), ToggleOutcome::RolledBack(false));
        assert_eq!(engine.view().count, Some(10));
    }

    #[tokio::test]
    async fn mounted_like_follows_other_actors_and_releases_on_unmount() {
        let store = Arc::new(MemoryStore::new());
        let relations = RelationRepository::new(store.clone());
        let anna = actor("anna");
        let mounted = MountedToggle::route_like(relations.clone(), Some(&anna), RouteId::from("r1")).await;
        assert_eq!(mounted.view().count, Some(0));
        assert_eq!(store.listener_count(), 1);

        relations
            .toggle(&route_like().for_actor(UserId::from("ben")))
            .await
            .unwrap();
        mounted.subscribe().wait_for(|v| v.count == Some(1)).await.unwrap();
        assert!(!mounted.view().active);

        mounted.unmount().await;
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn early_toggle_is_not_undone_by_the_opening_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let relations = RelationRepository::new(store.clone());
        let anna = actor("anna");
        let mounted = MountedToggle::favorite(relations.clone(), Some(&anna), RouteId::from("r1")).await;

        // The pump has not run yet; its snapshot still says "absent".
        assert_eq!(mounted.toggle().await, ToggleOutcome::Confirmed(true));
        let mut rx = mounted.subscribe();
        rx.borrow_and_update();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(mounted.view().active);
        assert_eq!(mounted.engine().state(), ToggleState::Idle { value: true });
        assert!(!rx.has_changed().unwrap());
        mounted.unmount().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn early_like_keeps_its_optimistic_count() {
        let store = Arc::new(MemoryStore::new());
        let relations = RelationRepository::new(store.clone());
        let anna = actor("anna");
        let mounted = MountedToggle::route_like(relations.clone(), Some(&anna), RouteId::from("r1")).await;

        assert_eq!(mounted.toggle().await, ToggleOutcome::Confirmed(true));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(mounted.view().count, Some(1));
        mounted.unmount().await;
    }

    #[tokio::test]
    async fn mounted_favorite_picks_up_changes_from_other_sessions() {
        let store = Arc::new(MemoryStore::new());
        let relations = RelationRepository::new(store.clone());
        let anna = actor("anna");
        let mounted = MountedToggle::favorite(relations.clone(), Some(&anna), RouteId::from("r1")).await;
        assert_eq!(mounted.view().count, None);

        relations
            .toggle(&RelationSubject::Favorite(RouteId::from("r1")).for_actor(anna.id.clone()))
            .await
            .unwrap();
        mounted.subscribe().wait_for(|v| v.active).await.unwrap();

        mounted.unmount().await;
        assert_eq!(store.listener_count(), 0);
    }
}
