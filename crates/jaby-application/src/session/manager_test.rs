use super::*;
use crate::rules::RuleBook;
use async_trait::async_trait;
use jaby_core::JabyError;
use jaby_core::engine::{EngineError, FactTypes, Rule};
use jaby_core::fact::{Knowledge, Message};
use jaby_core::protocol::{Delivery, OutboundEvent};
use std::sync::Mutex as StdMutex;
use tokio::sync::Notify;

// Mock FactRepository for testing
#[derive(Default)]
struct MockFactRepository {
    facts: StdMutex<HashMap<String, Vec<FactRecord>>>,
    saves: AtomicUsize,
    fail_loads: bool,
    fail_saves: bool,
    gate: Option<Arc<Notify>>,
}

impl MockFactRepository {
    fn failing_saves() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    fn failing_loads() -> Self {
        Self {
            fail_loads: true,
            ..Self::default()
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    fn stored(&self, user_id: &str) -> Vec<FactRecord> {
        self.facts
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl FactRepository for MockFactRepository {
    async fn load_facts(&self, user_id: &str) -> Result<Vec<FactRecord>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_loads {
            return Err(JabyError::data_access("store offline"));
        }
        Ok(self.stored(user_id))
    }

    async fn save_facts(&self, user_id: &str, facts: &[FactRecord]) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(JabyError::data_access("store offline"));
        }
        self.facts
            .lock()
            .unwrap()
            .insert(user_id.to_string(), facts.to_vec());
        Ok(())
    }
}

// Records every delivery instead of sending it
#[derive(Default)]
struct RecordingSink {
    deliveries: StdMutex<Vec<Delivery>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<OutboundEvent> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .map(|delivery| delivery.event.clone())
            .collect()
    }
}

#[async_trait]
impl OutboundSink for RecordingSink {
    async fn deliver(&self, delivery: &Delivery) -> usize {
        self.deliveries.lock().unwrap().push(delivery.clone());
        1
    }
}

fn user() -> UserProfile {
    UserProfile::new("u1").with_name("Ada")
}

fn knowledge() -> Fact {
    Fact::Knowledge(Knowledge::new("favourite").with_field("colour", "teal"))
}

fn manager_with_book(
    repository: Arc<dyn FactRepository>,
    book: RuleBook,
    grace_window: Duration,
) -> (SessionManager, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let manager = SessionManager::new(
        Arc::new(ConnectionRegistry::new()),
        repository,
        sink.clone(),
        SessionFactory::new(book),
        grace_window,
    );
    (manager, sink)
}

fn manager_with(
    repository: Arc<dyn FactRepository>,
    grace_window: Duration,
) -> (SessionManager, Arc<RecordingSink>) {
    manager_with_book(repository, RuleBook::core(), grace_window)
}

async fn wait_for_phase(manager: &SessionManager, user_id: &str, phase: SessionPhase) {
    for _ in 0..100 {
        if manager.phase(user_id).await == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{} never reached {}", user_id, phase);
}

#[tokio::test]
async fn test_attach_creates_session_and_asks_question() {
    let (manager, sink) = manager_with(Arc::new(MockFactRepository::default()), Duration::ZERO);

    let outcome = manager.attach(&user(), "c1").await;

    assert!(matches!(outcome, AttachOutcome::Created { .. }));
    assert_eq!(manager.phase("u1").await, SessionPhase::Active);
    assert_eq!(manager.session_id("u1").await.as_deref(), outcome.session_id());
    assert_eq!(manager.facts("u1", Some(FactKind::User)).await.len(), 1);
    assert_eq!(manager.facts("u1", Some(FactKind::Flags)).await.len(), 1);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], OutboundEvent::Question { answers, .. } if !answers.is_empty()));
}

#[tokio::test]
async fn test_connections_share_one_session() {
    let (manager, _sink) = manager_with(Arc::new(MockFactRepository::default()), Duration::ZERO);

    let first = manager.attach(&user(), "c1").await;
    let second = manager.attach(&user(), "c2").await;

    assert!(matches!(second, AttachOutcome::Joined { .. }));
    assert_eq!(first.session_id(), second.session_id());
    assert_eq!(manager.compilations(), 1);
    assert_eq!(manager.registry().connection_count("u1").await, 2);
    assert_eq!(manager.active_users().await, vec!["u1"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_attach_compiles_once() {
    let (manager, _sink) = manager_with(Arc::new(MockFactRepository::default()), Duration::ZERO);
    let manager = Arc::new(manager);

    let attaches: Vec<_> = (0..8)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.attach(&user(), &format!("c{}", i)).await })
        })
        .collect();

    let mut session_ids = Vec::new();
    for attach in attaches {
        let outcome = attach.await.unwrap();
        session_ids.push(outcome.session_id().map(str::to_string));
    }

    assert_eq!(manager.compilations(), 1);
    assert!(session_ids.iter().all(|id| id.is_some() && *id == session_ids[0]));
    assert_eq!(manager.registry().connection_count("u1").await, 8);
}

#[tokio::test]
async fn test_detach_with_remaining_connection_keeps_session() {
    let (manager, _sink) = manager_with(Arc::new(MockFactRepository::default()), Duration::ZERO);
    manager.attach(&user(), "c1").await;
    manager.attach(&user(), "c2").await;

    assert_eq!(manager.detach("u1", "c1").await, DetachOutcome::Remaining(1));
    assert_eq!(manager.phase("u1").await, SessionPhase::Active);
    assert_eq!(manager.detach("u1", "c1").await, DetachOutcome::NotAttached);
}

#[tokio::test]
async fn test_last_detach_saves_and_retires() {
    let repository = Arc::new(MockFactRepository::default());
    let (manager, _sink) = manager_with(repository.clone(), Duration::ZERO);
    manager.attach(&user(), "c1").await;
    manager.assert_fact("u1", Some(knowledge()), false).await.unwrap();

    let outcome = manager.detach("u1", "c1").await;

    assert!(matches!(outcome, DetachOutcome::Draining { .. }));
    assert_eq!(manager.phase("u1").await, SessionPhase::Unloaded);
    assert!(manager.active_users().await.is_empty());

    let stored = repository.stored("u1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].fact_type, FactKind::Knowledge);

    assert!(manager.assert_fact("u1", Some(knowledge()), true).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reattach_within_grace_window_resumes() {
    let (manager, _sink) = manager_with(
        Arc::new(MockFactRepository::default()),
        Duration::from_secs(30),
    );
    let created = manager.attach(&user(), "c1").await;
    manager.detach("u1", "c1").await;
    assert_eq!(manager.phase("u1").await, SessionPhase::Draining);

    tokio::time::sleep(Duration::from_secs(10)).await;
    let resumed = manager.attach(&user(), "c2").await;

    assert!(matches!(resumed, AttachOutcome::Resumed { .. }));
    assert_eq!(resumed.session_id(), created.session_id());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(manager.phase("u1").await, SessionPhase::Active);
    assert_eq!(manager.compilations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_retires_after_grace_window() {
    let (manager, _sink) = manager_with(
        Arc::new(MockFactRepository::default()),
        Duration::from_secs(30),
    );
    manager.attach(&user(), "c1").await;
    manager.detach("u1", "c1").await;

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(manager.phase("u1").await, SessionPhase::Draining);

    tokio::time::sleep(Duration::from_secs(2)).await;
    wait_for_phase(&manager, "u1", SessionPhase::Unloaded).await;
    assert!(manager.assert_fact("u1", Some(knowledge()), true).await.is_none());

    let again = manager.attach(&user(), "c1").await;
    assert!(matches!(again, AttachOutcome::Created { .. }));
    assert_eq!(manager.compilations(), 2);
}

#[tokio::test]
async fn test_knowledge_round_trip() {
    let repository = Arc::new(MockFactRepository::default());
    let (manager, _sink) = manager_with(repository, Duration::ZERO);

    let first = manager.attach(&user(), "c1").await;
    manager.assert_fact("u1", Some(knowledge()), true).await;
    manager.detach("u1", "c1").await;

    let second = manager.attach(&user(), "c2").await;
    assert_ne!(first.session_id(), second.session_id());

    let restored = manager.facts("u1", Some(FactKind::Knowledge)).await;
    assert_eq!(restored, vec![knowledge()]);
}

#[tokio::test]
async fn test_compile_failure_degrades_user() {
    let book = RuleBook::new(Vec::new(), FactTypes::new([FactKind::Message]));
    let (manager, sink) =
        manager_with_book(Arc::new(MockFactRepository::default()), book, Duration::ZERO);

    let outcome = manager.attach(&user(), "c1").await;

    assert!(matches!(outcome, AttachOutcome::Degraded { .. }));
    assert_eq!(manager.phase("u1").await, SessionPhase::Unloaded);
    assert!(manager.registry().has_connections("u1").await);
    assert!(manager
        .assert_fact("u1", Some(Fact::Message(Message::new("hi"))), true)
        .await
        .is_none());
    assert!(sink.events().is_empty());

    assert_eq!(manager.detach("u1", "c1").await, DetachOutcome::Released);
    assert!(!manager.registry().has_connections("u1").await);
}

#[tokio::test]
async fn test_save_failure_does_not_block_retirement() {
    let repository = Arc::new(MockFactRepository::failing_saves());
    let (manager, _sink) = manager_with(repository.clone(), Duration::ZERO);
    manager.attach(&user(), "c1").await;
    manager.assert_fact("u1", Some(knowledge()), false).await;

    manager.detach("u1", "c1").await;

    assert_eq!(repository.saves.load(Ordering::SeqCst), 1);
    assert_eq!(manager.phase("u1").await, SessionPhase::Unloaded);
}

#[tokio::test]
async fn test_load_failure_starts_with_defaults() {
    let (manager, sink) = manager_with(
        Arc::new(MockFactRepository::failing_loads()),
        Duration::ZERO,
    );

    let outcome = manager.attach(&user(), "c1").await;

    assert!(matches!(outcome, AttachOutcome::Created { .. }));
    assert_eq!(manager.facts("u1", None).await.len(), 3);
    assert_eq!(sink.events().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_detach_while_loading_drains_after_load() {
    let gate = Arc::new(Notify::new());
    let repository = Arc::new(MockFactRepository::gated(gate.clone()));
    let (manager, _sink) = manager_with(repository.clone(), Duration::ZERO);
    let manager = Arc::new(manager);

    let attach = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.attach(&user(), "c1").await })
    };
    while !manager.registry().has_connections("u1").await {
        tokio::task::yield_now().await;
    }

    let detached = manager.detach("u1", "c1").await;
    assert!(matches!(detached, DetachOutcome::Draining { .. }));
    assert_eq!(repository.saves.load(Ordering::SeqCst), 0);

    gate.notify_one();
    assert!(matches!(attach.await.unwrap(), AttachOutcome::Created { .. }));

    assert_eq!(repository.saves.load(Ordering::SeqCst), 1);
    assert_eq!(manager.phase("u1").await, SessionPhase::Unloaded);
}

#[tokio::test]
async fn test_retract_and_modify_facts() {
    let (manager, _sink) = manager_with(Arc::new(MockFactRepository::default()), Duration::ZERO);
    manager.attach(&user(), "c1").await;

    let handle = manager.assert_fact("u1", Some(knowledge()), false).await.unwrap();
    let updated = Fact::Knowledge(Knowledge::new("favourite").with_field("colour", "plum"));
    assert!(manager.modify_fact("u1", handle, updated.clone(), false).await);
    assert_eq!(
        manager.facts("u1", Some(FactKind::Knowledge)).await,
        vec![updated.clone()]
    );

    assert!(!manager
        .modify_fact("u1", handle, Fact::Message(Message::new("x")), false)
        .await);
    assert_eq!(manager.retract_fact("u1", handle, true).await, Some(updated));
    assert_eq!(manager.retract_fact("u1", handle, true).await, None);
}

#[tokio::test]
async fn test_assert_without_session_or_fact_is_noop() {
    let (manager, _sink) = manager_with(Arc::new(MockFactRepository::default()), Duration::ZERO);
    assert!(manager.assert_fact("ghost", Some(knowledge()), true).await.is_none());

    manager.attach(&user(), "c1").await;
    assert!(manager.assert_fact("u1", None, true).await.is_none());
    assert_eq!(manager.run_match("ghost").await, 0);
}

#[tokio::test]
async fn test_duplicate_assert_returns_same_handle() {
    let (manager, _sink) = manager_with(Arc::new(MockFactRepository::default()), Duration::ZERO);
    manager.attach(&user(), "c1").await;

    let first = manager.assert_fact("u1", Some(knowledge()), false).await;
    let second = manager.assert_fact("u1", Some(knowledge()), false).await;

    assert_eq!(first, second);
    assert_eq!(manager.facts("u1", Some(FactKind::Knowledge)).await.len(), 1);
}

#[tokio::test]
async fn test_match_failure_is_contained() {
    let broken = Rule::builder("Broken")
        .when(FactKind::Message, |_| true)
        .then(|firing| Err(EngineError::rule_failed(firing.rule(), "boom")));
    let book = RuleBook::new(vec![broken], FactTypes::all());
    let (manager, _sink) =
        manager_with_book(Arc::new(MockFactRepository::default()), book, Duration::ZERO);
    manager.attach(&user(), "c1").await;

    let handle = manager
        .assert_fact("u1", Some(Fact::Message(Message::new("hi"))), true)
        .await;

    assert!(handle.is_some());
    assert_eq!(manager.phase("u1").await, SessionPhase::Active);
    assert!(manager
        .assert_fact("u1", Some(knowledge()), true)
        .await
        .is_some());
}

#[tokio::test]
async fn test_failed_cycle_still_delivers_earlier_events() {
    let broken = Rule::builder("Broken")
        .when(FactKind::Flags, |_| true)
        .then(|firing| Err(EngineError::rule_failed(firing.rule(), "boom")));
    let mut rules = RuleBook::core().rules;
    rules.push(broken);
    let book = RuleBook::new(rules, FactTypes::all());
    let (manager, sink) =
        manager_with_book(Arc::new(MockFactRepository::default()), book, Duration::ZERO);

    manager.attach(&user(), "c1").await;

    assert_eq!(manager.facts("u1", Some(FactKind::Question)).await.len(), 1);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], OutboundEvent::Question { .. }));
}

#[tokio::test]
async fn test_connection_moving_to_another_user_drains_previous_owner() {
    let repository = Arc::new(MockFactRepository::default());
    let (manager, _sink) = manager_with(repository.clone(), Duration::ZERO);
    manager.attach(&user(), "c1").await;

    let outcome = manager
        .attach(&UserProfile::new("u2").with_name("Bo"), "c1")
        .await;

    assert!(matches!(outcome, AttachOutcome::Created { .. }));
    assert_eq!(manager.phase("u1").await, SessionPhase::Unloaded);
    assert_eq!(manager.phase("u2").await, SessionPhase::Active);
    assert_eq!(repository.saves.load(Ordering::SeqCst), 1);
    assert!(!repository.stored("u1").is_empty());
    assert_eq!(manager.registry().user_of("c1").await.as_deref(), Some("u2"));
    assert_eq!(manager.detach("u1", "c1").await, DetachOutcome::NotAttached);
    assert_eq!(manager.active_users().await, vec!["u2"]);
}

#[tokio::test]
async fn test_message_chain_delivered_in_firing_order() {
    let (manager, sink) = manager_with(Arc::new(MockFactRepository::default()), Duration::ZERO);
    manager.attach(&user(), "c1").await;

    manager
        .assert_fact("u1", Some(Fact::Message(Message::new("hello"))), true)
        .await;

    let events = sink.events();
    assert_eq!(
        &events[1..],
        &[
            OutboundEvent::message("hello goodbye"),
            OutboundEvent::reply("Got the message: hello goodbye"),
        ]
    );
    assert!(manager.facts("u1", Some(FactKind::Message)).await.is_empty());
}

#[tokio::test]
async fn test_save_session_skips_ephemeral_facts() {
    let repository = Arc::new(MockFactRepository::default());
    let (manager, _sink) = manager_with(repository.clone(), Duration::ZERO);
    manager.attach(&user(), "c1").await;
    manager
        .assert_fact("u1", Some(Fact::Message(Message::new("unmatched"))), false)
        .await;
    manager.assert_fact("u1", Some(knowledge()), false).await;

    assert_eq!(manager.save_session("u1").await.unwrap(), 2);
    let kinds: Vec<FactKind> = repository
        .stored("u1")
        .iter()
        .map(|record| record.fact_type)
        .collect();
    assert!(kinds.contains(&FactKind::Knowledge));
    assert!(kinds.contains(&FactKind::Question));
    assert_eq!(manager.save_session("ghost").await.unwrap(), 0);
}
