use super::factory::{LiveSession, SessionFactory};
use super::state::{AttachOutcome, DetachOutcome, SessionPhase};
use crate::connection_registry::ConnectionRegistry;
use crate::dispatch::OutboundSink;
use jaby_core::engine::FactHandle;
use jaby_core::error::Result;
use jaby_core::fact::{Fact, FactKind, FactRecord};
use jaby_core::repository::FactRepository;
use jaby_core::user::UserProfile;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tokio_util::sync::CancellationToken;

type SlotMap = Arc<RwLock<HashMap<String, Arc<UserSlot>>>>;

/// Per-user entry in the session map.
struct UserSlot {
    user_id: String,
    /// The per-user critical section. Every operation on the user's session
    /// runs under this lock, in arrival order.
    state: Mutex<SlotState>,
    /// Sequence number of the last snapshot written to the repository.
    saved: Mutex<u64>,
}

impl UserSlot {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            state: Mutex::new(SlotState::default()),
            saved: Mutex::new(0),
        }
    }
}

#[derive(Default)]
struct SlotState {
    phase: SessionPhase,
    session: Option<LiveSession>,
    /// Persisted facts are being loaded outside the lock.
    loading: bool,
    retirement: Option<CancellationToken>,
    snapshots: u64,
}

/// Persistable facts of a session at one point in time.
struct Snapshot {
    session_id: String,
    seq: u64,
    records: Vec<FactRecord>,
}

/// Owns the map from user id to live inference session.
///
/// `SessionManager` is responsible for:
/// - Compiling a session on a user's first attach (once, even when attaches race)
/// - Sharing that session across all of the user's connections
/// - Mediating assert/retract/modify and match cycles
/// - Saving facts and retiring the session after the last connection leaves
///
/// Engine and persistence failures are logged and never propagated to callers.
pub struct SessionManager {
    slots: SlotMap,
    registry: Arc<ConnectionRegistry>,
    fact_repository: Arc<dyn FactRepository>,
    outbound: Arc<dyn OutboundSink>,
    factory: SessionFactory,
    grace_window: Duration,
    compilations: AtomicUsize,
}

impl SessionManager {
    /// Creates a new `SessionManager`.
    ///
    /// # Arguments
    ///
    /// * `registry` - Connection registry shared with the outbound fan-out
    /// * `fact_repository` - Where persistable facts are loaded from and saved to
    /// * `outbound` - Receives the deliveries requested by fired rules
    /// * `factory` - Compiles the rule book for each user
    /// * `grace_window` - How long a session outlives its last connection
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        fact_repository: Arc<dyn FactRepository>,
        outbound: Arc<dyn OutboundSink>,
        factory: SessionFactory,
        grace_window: Duration,
    ) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            registry,
            fact_repository,
            outbound,
            factory,
            grace_window,
            compilations: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }

    /// Attaches a connection to the user's session, creating the session if
    /// needed.
    ///
    /// A new session gets the identity and `Flags` facts, then persisted facts
    /// are loaded without holding the user's lock and an initial match runs.
    /// A draining session is resumed rather than recompiled.
    ///
    /// A connection still registered under another user is detached from
    /// that user first, so their session drains as if it had closed.
    pub async fn attach(&self, user: &UserProfile, connection_id: &str) -> AttachOutcome {
        if let Some(previous) = self
            .registry
            .user_of(connection_id)
            .await
            .filter(|owner| *owner != user.id)
        {
            tracing::warn!(connection_id, from = %previous, to = %user.id, "connection switched user");
            self.detach(&previous, connection_id).await;
        }

        loop {
            let slot = self.slot_for(&user.id).await;
            let mut state = slot.state.lock().await;

            if state.phase == SessionPhase::Retired {
                // Retired between lookup and lock; its map entry is already gone.
                continue;
            }

            self.registry.add(&user.id, connection_id).await;
            let session_id = state.session.as_ref().map(|session| session.id.clone());

            return match (state.phase, session_id) {
                (SessionPhase::Active, Some(session_id)) => {
                    tracing::debug!(user_id = %user.id, connection_id, %session_id, "connection joined session");
                    AttachOutcome::Joined { session_id }
                }
                (SessionPhase::Draining, Some(session_id)) => {
                    if let Some(token) = state.retirement.take() {
                        token.cancel();
                    }
                    state.phase = SessionPhase::Active;
                    tracing::info!(user_id = %user.id, connection_id, %session_id, "session resumed");
                    AttachOutcome::Resumed { session_id }
                }
                _ => self.create_session(&slot, state, user, connection_id).await,
            };
        }
    }

    async fn create_session(
        &self,
        slot: &Arc<UserSlot>,
        mut state: MutexGuard<'_, SlotState>,
        user: &UserProfile,
        connection_id: &str,
    ) -> AttachOutcome {
        let session = match self.factory.create(user) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(
                    user_id = %user.id,
                    connection_id,
                    error = %e,
                    "session compilation failed, events for this user are dropped"
                );
                state.phase = SessionPhase::Unloaded;
                return AttachOutcome::Degraded {
                    reason: e.to_string(),
                };
            }
        };
        self.compilations.fetch_add(1, Ordering::SeqCst);

        let session_id = session.id.clone();
        state.session = Some(session);
        state.phase = SessionPhase::Active;
        state.loading = true;
        drop(state);
        tracing::info!(user_id = %user.id, connection_id, %session_id, "session created");

        let facts = self.load_persisted(&user.id).await;

        let mut state = slot.state.lock().await;
        state.loading = false;
        let Some(session) = state
            .session
            .as_mut()
            .filter(|session| session.id == session_id)
        else {
            return AttachOutcome::Created { session_id };
        };

        for fact in facts {
            let summary = fact.summary();
            if let Err(e) = session.engine.assert(fact) {
                tracing::warn!(user_id = %user.id, %session_id, fact = %summary, error = %e, "failed to restore fact");
            }
        }
        self.fire(&user.id, session).await;

        if state.phase == SessionPhase::Draining {
            // Every connection left while facts were loading.
            self.begin_drain(slot, state).await;
        }
        AttachOutcome::Created { session_id }
    }

    async fn load_persisted(&self, user_id: &str) -> Vec<Fact> {
        let records = match self.fact_repository.load_facts(user_id).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "failed to load facts, starting empty");
                return Vec::new();
            }
        };

        records
            .into_iter()
            .filter_map(|record| match record.into_fact() {
                Ok(fact) => Some(fact),
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "skipping unreadable fact record");
                    None
                }
            })
            .collect()
    }

    /// Detaches a connection. When it was the user's last one, the session's
    /// facts are saved and retirement is scheduled after the grace window.
    pub async fn detach(&self, user_id: &str, connection_id: &str) -> DetachOutcome {
        let Some(slot) = self.existing_slot(user_id).await else {
            self.registry.remove(user_id, connection_id).await;
            return DetachOutcome::NotAttached;
        };
        let mut state = slot.state.lock().await;

        if !self.registry.remove(user_id, connection_id).await {
            return DetachOutcome::NotAttached;
        }
        let remaining = self.registry.connection_count(user_id).await;
        if remaining > 0 {
            return DetachOutcome::Remaining(remaining);
        }

        let session_id = state.session.as_ref().map(|session| session.id.clone());
        match (state.phase, session_id) {
            (SessionPhase::Active, Some(session_id)) => {
                state.phase = SessionPhase::Draining;
                tracing::info!(user_id, connection_id, %session_id, "last connection closed, draining");
                if state.loading {
                    tracing::debug!(user_id, %session_id, "drain deferred until facts are loaded");
                } else {
                    self.begin_drain(&slot, state).await;
                }
                DetachOutcome::Draining { session_id }
            }
            (SessionPhase::Unloaded, _) => {
                state.phase = SessionPhase::Retired;
                remove_slot(&self.slots, &slot).await;
                DetachOutcome::Released
            }
            _ => DetachOutcome::Remaining(0),
        }
    }

    /// Saves the draining session, then retires it now or after the grace
    /// window. Save failures do not keep the session alive.
    async fn begin_drain(&self, slot: &Arc<UserSlot>, mut state: MutexGuard<'_, SlotState>) {
        let Some(snapshot) = take_snapshot(&slot.user_id, &mut state) else {
            return;
        };
        let session_id = snapshot.session_id.clone();
        let token = CancellationToken::new();
        state.retirement = Some(token.clone());
        drop(state);

        let _ = self.write_snapshot(slot, snapshot).await;

        if self.grace_window.is_zero() {
            retire(&self.slots, slot, &session_id, &token).await;
            return;
        }

        let slots = Arc::clone(&self.slots);
        let slot = Arc::clone(slot);
        let grace_window = self.grace_window;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(user_id = %slot.user_id, %session_id, "retirement cancelled");
                }
                _ = tokio::time::sleep(grace_window) => {
                    retire(&slots, &slot, &session_id, &token).await;
                }
            }
        });
    }

    /// Asserts `fact` into the user's session, optionally followed by a match.
    ///
    /// No-op without a session or without a fact. Engine failures are logged.
    pub async fn assert_fact(
        &self,
        user_id: &str,
        fact: Option<Fact>,
        match_after: bool,
    ) -> Option<FactHandle> {
        let fact = fact?;
        let slot = self.existing_slot(user_id).await?;
        let mut state = slot.state.lock().await;
        let Some(session) = state.session.as_mut() else {
            tracing::debug!(user_id, fact = %fact.summary(), "no session, fact dropped");
            return None;
        };

        let summary = fact.summary();
        let handle = match session.engine.assert(fact) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(user_id, session_id = %session.id, fact = %summary, error = %e, "assert failed");
                return None;
            }
        };
        if match_after {
            self.fire(user_id, session).await;
        }
        Some(handle)
    }

    /// Retracts a fact, optionally followed by a match.
    pub async fn retract_fact(
        &self,
        user_id: &str,
        handle: FactHandle,
        match_after: bool,
    ) -> Option<Fact> {
        let slot = self.existing_slot(user_id).await?;
        let mut state = slot.state.lock().await;
        let session = state.session.as_mut()?;

        let fact = match session.engine.retract(handle) {
            Ok(fact) => fact,
            Err(e) => {
                tracing::warn!(user_id, session_id = %session.id, %handle, error = %e, "retract failed");
                return None;
            }
        };
        if match_after {
            self.fire(user_id, session).await;
        }
        Some(fact)
    }

    /// Replaces a fact in place, optionally followed by a match.
    pub async fn modify_fact(
        &self,
        user_id: &str,
        handle: FactHandle,
        fact: Fact,
        match_after: bool,
    ) -> bool {
        let Some(slot) = self.existing_slot(user_id).await else {
            return false;
        };
        let mut state = slot.state.lock().await;
        let Some(session) = state.session.as_mut() else {
            return false;
        };

        let summary = fact.summary();
        if let Err(e) = session.engine.modify(handle, fact) {
            tracing::warn!(user_id, session_id = %session.id, %handle, fact = %summary, error = %e, "modify failed");
            return false;
        }
        if match_after {
            self.fire(user_id, session).await;
        }
        true
    }

    /// Runs a match cycle for the user. Returns the number of rules fired.
    pub async fn run_match(&self, user_id: &str) -> usize {
        let Some(slot) = self.existing_slot(user_id).await else {
            return 0;
        };
        let mut state = slot.state.lock().await;
        match state.session.as_mut() {
            Some(session) => self.fire(user_id, session).await,
            None => 0,
        }
    }

    /// Fires the session's agenda and delivers what the rules emitted, in
    /// firing order, before the user's lock is released. A cycle that stops
    /// on a failing rule still delivers what earlier firings emitted.
    async fn fire(&self, user_id: &str, session: &mut LiveSession) -> usize {
        let outcome = session.engine.match_cycle();
        for delivery in &outcome.deliveries {
            self.outbound.deliver(delivery).await;
        }
        match &outcome.error {
            None => {
                tracing::debug!(user_id, session_id = %session.id, fired = outcome.fired, "match cycle complete");
            }
            Some(e) => {
                tracing::error!(
                    user_id,
                    session_id = %session.id,
                    fired = outcome.fired,
                    delivered = outcome.deliveries.len(),
                    error = %e,
                    "match cycle failed"
                );
            }
        }
        outcome.fired
    }

    /// Writes the session's persistable facts through the fact repository.
    ///
    /// Returns the number of records written; `0` when the user has no
    /// session.
    pub async fn save_session(&self, user_id: &str) -> Result<usize> {
        let Some(slot) = self.existing_slot(user_id).await else {
            return Ok(0);
        };
        let snapshot = {
            let mut state = slot.state.lock().await;
            take_snapshot(user_id, &mut state)
        };
        match snapshot {
            Some(snapshot) => self.write_snapshot(&slot, snapshot).await,
            None => Ok(0),
        }
    }

    async fn write_snapshot(&self, slot: &UserSlot, snapshot: Snapshot) -> Result<usize> {
        let mut saved = slot.saved.lock().await;
        if *saved > snapshot.seq {
            tracing::debug!(user_id = %slot.user_id, seq = snapshot.seq, "newer snapshot already saved");
            return Ok(0);
        }

        let count = snapshot.records.len();
        match self
            .fact_repository
            .save_facts(&slot.user_id, &snapshot.records)
            .await
        {
            Ok(()) => {
                *saved = snapshot.seq;
                tracing::info!(user_id = %slot.user_id, session_id = %snapshot.session_id, count, "session saved");
                Ok(count)
            }
            Err(e) => {
                tracing::error!(
                    user_id = %slot.user_id,
                    session_id = %snapshot.session_id,
                    count,
                    error = %e,
                    "failed to save session facts, unsaved facts are lost"
                );
                Err(e)
            }
        }
    }

    pub async fn phase(&self, user_id: &str) -> SessionPhase {
        let Some(slot) = self.existing_slot(user_id).await else {
            return SessionPhase::Unloaded;
        };
        let state = slot.state.lock().await;
        state.phase
    }

    pub async fn session_id(&self, user_id: &str) -> Option<String> {
        let slot = self.existing_slot(user_id).await?;
        let state = slot.state.lock().await;
        state.session.as_ref().map(|session| session.id.clone())
    }

    /// Copies of the facts in the user's session, optionally of one kind.
    pub async fn facts(&self, user_id: &str, kind: Option<FactKind>) -> Vec<Fact> {
        let Some(slot) = self.existing_slot(user_id).await else {
            return Vec::new();
        };
        let state = slot.state.lock().await;
        state
            .session
            .as_ref()
            .map(|session| {
                session
                    .engine
                    .get_facts(kind)
                    .into_iter()
                    .map(|(_, fact)| fact.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Users that currently hold a compiled session, sorted.
    pub async fn active_users(&self) -> Vec<String> {
        let slots: Vec<Arc<UserSlot>> = self.slots.read().await.values().cloned().collect();
        let mut users = Vec::new();
        for slot in slots {
            if slot.state.lock().await.session.is_some() {
                users.push(slot.user_id.clone());
            }
        }
        users.sort();
        users
    }

    pub async fn live_sessions(&self) -> usize {
        self.active_users().await.len()
    }

    /// Number of sessions compiled since startup.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    async fn slot_for(&self, user_id: &str) -> Arc<UserSlot> {
        if let Some(slot) = self.existing_slot(user_id).await {
            return slot;
        }
        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(UserSlot::new(user_id))),
        )
    }

    async fn existing_slot(&self, user_id: &str) -> Option<Arc<UserSlot>> {
        self.slots.read().await.get(user_id).cloned()
    }
}

fn take_snapshot(user_id: &str, state: &mut SlotState) -> Option<Snapshot> {
    let (session_id, records) = {
        let session = state.session.as_ref()?;
        let mut records = Vec::new();
        for (_, fact) in session.engine.get_facts(None) {
            match fact.to_record() {
                Ok(Some(record)) => records.push(record),
                // Rebuilt on every session start.
                Ok(None) if matches!(fact.kind(), FactKind::User | FactKind::Flags) => {}
                Ok(None) => {
                    tracing::warn!(user_id, fact = %fact.summary(), "non-persistable fact skipped");
                }
                Err(e) => {
                    tracing::warn!(user_id, fact = %fact.summary(), error = %e, "fact could not be serialized");
                }
            }
        }
        (session.id.clone(), records)
    };

    state.snapshots += 1;
    Some(Snapshot {
        session_id,
        seq: state.snapshots,
        records,
    })
}

/// Disposes the session unless it was resumed or replaced in the meantime.
/// The map entry is removed while the user's lock is held.
async fn retire(
    slots: &SlotMap,
    slot: &Arc<UserSlot>,
    session_id: &str,
    token: &CancellationToken,
) -> bool {
    let mut state = slot.state.lock().await;
    let current = state
        .session
        .as_ref()
        .is_some_and(|session| session.id == session_id);
    if token.is_cancelled() || state.phase != SessionPhase::Draining || !current {
        return false;
    }

    if let Some(session) = state.session.take() {
        let lifetime = chrono::Utc::now() - session.created_at;
        tracing::info!(
            user_id = %slot.user_id,
            session_id,
            lifetime_secs = lifetime.num_seconds(),
            "session retired"
        );
    }
    state.phase = SessionPhase::Retired;
    state.retirement = None;
    remove_slot(slots, slot).await;
    true
}

async fn remove_slot(slots: &SlotMap, slot: &Arc<UserSlot>) {
    let mut slots = slots.write().await;
    if slots
        .get(&slot.user_id)
        .is_some_and(|current| Arc::ptr_eq(current, slot))
    {
        slots.remove(&slot.user_id);
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
