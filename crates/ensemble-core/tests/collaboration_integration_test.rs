use async_trait::async_trait;
use ensemble_core::config::{AgentDefinition, CollaborationConfig};
use ensemble_core::core_types::{LLMResponse, Message, Role};
use ensemble_core::errors::EnsembleError;
use ensemble_core::llm::{ToolMetadata, LLM};
use ensemble_core::memory::{
    InMemoryStore, LongTermQuery, LongTermRecord, MemoryStore, NewLongTermRecord, TaskRecord,
    TaskStatus, TaskUpdate, TieredMemory,
};
use ensemble_core::orchestrator::{
    CollaborationEvent, CollaborationOrchestrator, CollaborationRequest, EventRole, StreamMessage,
};
use ensemble_core::registry::AgentRegistry;
use ensemble_core::Agent;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies "<name> reply <n>" and records every request.
struct RecordingLLM {
    name: String,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
}

impl RecordingLLM {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    fn last_prompt(&self, call: usize) -> String {
        let requests = self.requests.lock().unwrap();
        requests[call].last().unwrap().content.clone()
    }

    fn system_prompt(&self, call: usize) -> String {
        let requests = self.requests.lock().unwrap();
        let first = &requests[call][0];
        assert_eq!(first.role, Role::System);
        first.content.clone()
    }
}

#[async_trait]
impl LLM for RecordingLLM {
    async fn generate(
        &self,
        messages: Vec<Message>,
        _tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, EnsembleError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(messages);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(LLMResponse::text(format!("{} reply {}", self.name, n)))
    }
}

struct FailingLLM;

#[async_trait]
impl LLM for FailingLLM {
    async fn generate(
        &self,
        _messages: Vec<Message>,
        _tools: Option<Vec<ToolMetadata>>,
    ) -> Result<LLMResponse, EnsembleError> {
        Err(EnsembleError::LLMError("model unavailable".to_string()))
    }
}

async fn orchestrator_with(agents: Vec<(&str, &str, Arc<dyn LLM>)>) -> CollaborationOrchestrator {
    let registry = Arc::new(AgentRegistry::new());
    for (id, name, llm) in agents {
        let profile = AgentDefinition::new(name).with_description(format!("{} agent", name));
        registry.register(Agent::new(id, profile, llm)).await.unwrap();
    }
    CollaborationOrchestrator::new(registry, CollaborationConfig::default())
}

fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn shape(events: &[CollaborationEvent]) -> Vec<(EventRole, String)> {
    events.iter().map(|e| (e.role, e.content.clone())).collect()
}

#[tokio::test]
async fn test_two_agents_two_rounds_produce_eight_events() {
    let lead = RecordingLLM::new("Lead");
    let coder = RecordingLLM::new("Coder");
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", lead.clone()),
        ("b", "Coder", coder.clone()),
    ])
    .await;

    let events = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a", "b"]), "Build a CLI").with_max_rounds(2))
        .await
        .unwrap();

    let contents: Vec<&str> = events.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(
        contents,
        vec![
            "Starting collaboration on task: Build a CLI",
            "[Lead]: Lead reply 1",
            "[Coder]: Coder reply 1",
            "Round 1 completed",
            "[Lead]: Lead reply 2",
            "[Coder]: Coder reply 2",
            "Round 2 completed",
            "Collaboration completed after 2 rounds",
        ]
    );

    let first_turn = &events[1];
    assert_eq!(first_turn.role, EventRole::Agent);
    assert_eq!(first_turn.metadata.agent_id.as_deref(), Some("a"));
    assert_eq!(first_turn.metadata.agent_name.as_deref(), Some("Lead"));
    assert_eq!(first_turn.metadata.round, Some(1));
    assert_eq!(first_turn.metadata.completed, Some(true));

    assert_eq!(events[3].metadata.all_completed, Some(true));
    assert!(events[3].metadata.duration.is_some());
    assert_eq!(events[7].metadata.total_rounds, Some(2));
}

#[tokio::test]
async fn test_failing_agent_never_aborts_rounds() {
    let lead = RecordingLLM::new("Lead");
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", lead.clone()),
        ("b", "Broken", Arc::new(FailingLLM)),
    ])
    .await;

    let events = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a", "b"]), "Write docs").with_max_rounds(3))
        .await
        .unwrap();

    let summaries: Vec<&CollaborationEvent> = events.iter().filter(|e| e.is_round_summary()).collect();
    assert_eq!(summaries.len(), 3);
    assert!(summaries.iter().all(|s| s.metadata.all_completed == Some(false)));

    let errors: Vec<&CollaborationEvent> = events.iter().filter(|e| e.is_error()).collect();
    assert_eq!(errors.len(), 3);
    assert!(errors[0].content.starts_with("[Broken]: Error - "));
    assert!(errors[0].content.contains("model unavailable"));
    assert_eq!(errors[0].metadata.completed, Some(false));

    assert_eq!(events.last().unwrap().metadata.total_rounds, Some(3));
    assert_eq!(events.len(), 1 + 3 * 3 + 1);

    // Without worker output the review prompt says so.
    assert!(lead
        .last_prompt(1)
        .contains("No worker responses were received in the previous round."));
}

#[tokio::test]
async fn test_prompts_follow_coordinator_output() {
    let lead = RecordingLLM::new("Lead");
    let coder = RecordingLLM::new("Coder");
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", lead.clone()),
        ("b", "Coder", coder.clone()),
    ])
    .await;

    orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a", "b"]), "Ship it").with_max_rounds(2))
        .await
        .unwrap();

    let assignment = lead.last_prompt(0);
    assert!(assignment.contains("- Coder: Coder agent"));
    assert!(assignment.contains("2 rounds"));

    assert!(coder.last_prompt(0).contains("Lead reply 1"));
    assert!(lead.last_prompt(1).contains("Coder: Coder reply 1"));
    assert!(coder.last_prompt(1).contains("Lead reply 2"));

    // Collaboration context is part of every agent's system prompt during the run.
    let system = coder.system_prompt(0);
    assert!(system.contains("in_collaboration: true"));
    assert!(system.contains("\"coordinator_id\":\"a\""));

    // Earlier turns arrive as history, own turns as assistant messages.
    let requests = lead.requests.lock().unwrap();
    let second_call = &requests[1];
    assert!(second_call
        .iter()
        .any(|m| m.role == Role::Assistant && m.content == "[Lead]: Lead reply 1"));
    assert!(second_call
        .iter()
        .any(|m| m.role == Role::User && m.content == "[Coder]: Coder reply 1"));
}

#[tokio::test]
async fn test_context_cleared_and_collaboration_remembered() {
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", RecordingLLM::new("Lead")),
        ("b", "Coder", RecordingLLM::new("Coder")),
    ])
    .await;

    orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a", "b"]), "Ship it").with_max_rounds(1))
        .await
        .unwrap();

    let handle = orchestrator.registry().get("b").await.unwrap();
    let agent = handle.agent.lock().await;
    let context = agent.memory().get_environment_context();
    assert_eq!(context.get("in_collaboration"), Some(&serde_json::json!(false)));
    assert!(context.get("collaboration").is_none());

    let remembered = agent
        .memory()
        .search_long_term(Some("collaboration"), 10, 0.0)
        .await
        .unwrap();
    assert_eq!(remembered.len(), 1);
    assert!(remembered[0].content.contains("Ship it"));

    let tasks = agent.memory().get_task_history(10, None).await.unwrap();
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn test_stream_matches_buffered_timeline() {
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", RecordingLLM::new("Lead")),
        ("b", "Coder", RecordingLLM::new("Coder")),
    ])
    .await;
    let buffered = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a", "b"]), "Ship it").with_max_rounds(2))
        .await
        .unwrap();

    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", RecordingLLM::new("Lead")),
        ("b", "Coder", RecordingLLM::new("Coder")),
    ])
    .await;
    let mut stream = orchestrator
        .collaborate_stream(CollaborationRequest::new(ids(&["a", "b"]), "Ship it").with_max_rounds(2))
        .await
        .unwrap();

    let mut streamed = Vec::new();
    while let Some(item) = stream.next().await {
        streamed.push(item.unwrap());
    }

    assert_eq!(shape(&streamed), shape(&buffered));
    assert_eq!(streamed.len(), 8);
}

#[tokio::test]
async fn test_stream_ends_with_done_marker() {
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", RecordingLLM::new("Lead")),
        ("b", "Broken", Arc::new(FailingLLM)),
    ])
    .await;
    let mut stream = orchestrator
        .collaborate_stream(CollaborationRequest::new(ids(&["a", "b"]), "Ship it").with_max_rounds(2))
        .await
        .unwrap();

    let mut data = 0;
    let terminal = loop {
        match stream.recv().await {
            Some(StreamMessage::Data(_)) => data += 1,
            other => break other,
        }
    };
    assert!(matches!(terminal, Some(StreamMessage::Done)));
    assert_eq!(data, 8);
    assert!(stream.recv().await.is_none());
}

#[tokio::test]
async fn test_dropping_stream_cancels_producer() {
    let lead = RecordingLLM::slow("Lead", Duration::from_millis(100));
    let coder = RecordingLLM::slow("Coder", Duration::from_millis(100));
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", lead.clone()),
        ("b", "Coder", coder.clone()),
    ])
    .await;

    let mut stream = orchestrator
        .collaborate_stream(CollaborationRequest::new(ids(&["a", "b"]), "Ship it").with_max_rounds(5))
        .await
        .unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.content, "Starting collaboration on task: Ship it");
    drop(stream);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let calls = lead.calls.load(Ordering::SeqCst) + coder.calls.load(Ordering::SeqCst);
    assert!(calls <= 1, "producer kept running after drop: {} calls", calls);

    let handle = orchestrator.registry().get("a").await.unwrap();
    let agent = handle.agent.lock().await;
    assert!(agent.memory().get_environment_context().get("collaboration").is_none());
}

#[tokio::test]
async fn test_preconditions_abort_before_any_event() {
    let lead = RecordingLLM::new("Lead");
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", lead.clone()),
        ("b", "Coder", RecordingLLM::new("Coder")),
    ])
    .await;

    let cases = vec![
        CollaborationRequest::new(vec![], "task"),
        CollaborationRequest::new(ids(&["a", "missing"]), "task"),
        CollaborationRequest::new(ids(&["a", "b"]), "task").with_coordinator("ghost"),
        CollaborationRequest::new(ids(&["a", "a"]), "task"),
        CollaborationRequest::new(ids(&["a"]), "task").with_max_rounds(0),
    ];
    for request in cases {
        let buffered = orchestrator.collaborate(request.clone()).await;
        assert!(matches!(buffered, Err(EnsembleError::Precondition(_))));
        let streamed = orchestrator.collaborate_stream(request).await;
        assert!(matches!(streamed, Err(EnsembleError::Precondition(_))));
    }
    assert_eq!(lead.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_coordinator_outside_list_takes_no_turns() {
    let lead = RecordingLLM::new("Lead");
    let coder = RecordingLLM::new("Coder");
    let orchestrator = orchestrator_with(vec![
        ("a", "Lead", lead.clone()),
        ("b", "Coder", coder.clone()),
    ])
    .await;

    let events = orchestrator
        .collaborate(
            CollaborationRequest::new(ids(&["b"]), "Ship it")
                .with_coordinator("a")
                .with_max_rounds(2),
        )
        .await
        .unwrap();

    assert_eq!(events.len(), 1 + 2 * 2 + 1);
    assert!(events.iter().all(|e| e.agent_id() != Some("a")));
    assert_eq!(lead.calls.load(Ordering::SeqCst), 0);
    assert!(coder.last_prompt(0).contains("await your assignment"));
    assert!(coder.system_prompt(0).contains("\"coordinator_id\":\"a\""));
}

#[tokio::test]
async fn test_single_agent_collaboration() {
    let orchestrator = orchestrator_with(vec![("a", "Solo", RecordingLLM::new("Solo"))]).await;
    let events = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a"]), "Think").with_max_rounds(2))
        .await
        .unwrap();
    assert_eq!(events.len(), 1 + 2 * 2 + 1);
}

#[tokio::test]
async fn test_concurrent_collaborations_share_agents_safely() {
    let orchestrator = Arc::new(
        orchestrator_with(vec![
            ("a", "Lead", RecordingLLM::slow("Lead", Duration::from_millis(5))),
            ("b", "Coder", RecordingLLM::slow("Coder", Duration::from_millis(5))),
        ])
        .await,
    );

    let first = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a", "b"]), "First").with_max_rounds(2));
    let second = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["b", "a"]), "Second").with_max_rounds(2));
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap().len(), 8);
    assert_eq!(second.unwrap().len(), 8);

    let handle = orchestrator.registry().get("a").await.unwrap();
    let agent = handle.agent.lock().await;
    assert_eq!(agent.memory().get_task_history(100, None).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_shared_agent_keeps_each_collaboration_context() {
    let coder = RecordingLLM::slow("Coder", Duration::from_millis(20));
    let orchestrator = Arc::new(
        orchestrator_with(vec![
            ("a", "Lead", RecordingLLM::slow("Lead", Duration::from_millis(20))),
            ("b", "Coder", coder.clone()),
        ])
        .await,
    );

    let first = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a", "b"]), "FIRST_TASK").with_max_rounds(3));
    let second = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["b"]), "SECOND_TASK").with_max_rounds(1));
    let (first, second) = tokio::join!(first, second);
    assert_eq!(first.unwrap().len(), 1 + 3 * 3 + 1);
    assert_eq!(second.unwrap().len(), 1 + 2 + 1);

    let calls = coder.calls.load(Ordering::SeqCst);
    assert_eq!(calls, 4);
    let mut mismatched = 0;
    for call in 0..calls {
        let prompt = coder.last_prompt(call);
        let task = if prompt.contains("FIRST_TASK") {
            "FIRST_TASK"
        } else {
            "SECOND_TASK"
        };
        let system = coder.system_prompt(call);
        if !system.contains("in_collaboration: true")
            || !system.contains(&format!("\"task\":\"{}\"", task))
        {
            mismatched += 1;
        }
    }
    assert_eq!(mismatched, 0);

    let handle = orchestrator.registry().get("b").await.unwrap();
    let agent = handle.agent.lock().await;
    let context = agent.memory().get_environment_context();
    assert_eq!(context.get("in_collaboration"), Some(&serde_json::json!(false)));
    assert!(context.get("collaboration").is_none());
}

/// Rejects long-term inserts of one memory type and delegates everything else.
struct RejectingStore {
    inner: InMemoryStore,
    memory_type: &'static str,
}

#[async_trait]
impl MemoryStore for RejectingStore {
    async fn insert_long_term(&self, record: NewLongTermRecord) -> Result<i64, EnsembleError> {
        if record.memory_type == self.memory_type {
            return Err(EnsembleError::StorageError("disk full".to_string()));
        }
        self.inner.insert_long_term(record).await
    }

    async fn search_long_term(
        &self,
        query: &LongTermQuery,
    ) -> Result<Vec<LongTermRecord>, EnsembleError> {
        self.inner.search_long_term(query).await
    }

    async fn insert_task(&self, record: TaskRecord) -> Result<(), EnsembleError> {
        self.inner.insert_task(record).await
    }

    async fn update_task(
        &self,
        agent_id: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<bool, EnsembleError> {
        self.inner.update_task(agent_id, task_id, update).await
    }

    async fn get_task(
        &self,
        agent_id: &str,
        task_id: &str,
    ) -> Result<Option<TaskRecord>, EnsembleError> {
        self.inner.get_task(agent_id, task_id).await
    }

    async fn task_history(
        &self,
        agent_id: &str,
        limit: usize,
        status: Option<TaskStatus>,
    ) -> Result<Vec<TaskRecord>, EnsembleError> {
        self.inner.task_history(agent_id, limit, status).await
    }
}

async fn orchestrator_with_rejecting_lead() -> CollaborationOrchestrator {
    let registry = Arc::new(AgentRegistry::new());
    let store: Arc<dyn MemoryStore> = Arc::new(RejectingStore {
        inner: InMemoryStore::new(),
        memory_type: "collaboration",
    });
    let lead = Agent::new("a", AgentDefinition::new("Lead"), RecordingLLM::new("Lead"))
        .with_memory(TieredMemory::new("a", 20, store));
    let coder = Agent::new("b", AgentDefinition::new("Coder"), RecordingLLM::new("Coder"));
    registry.register(lead).await.unwrap();
    registry.register(coder).await.unwrap();
    CollaborationOrchestrator::new(registry, CollaborationConfig::default())
}

async fn assert_context_cleared(orchestrator: &CollaborationOrchestrator, id: &str) {
    let handle = orchestrator.registry().get(id).await.unwrap();
    let agent = handle.agent.lock().await;
    let context = agent.memory().get_environment_context();
    assert_eq!(context.get("in_collaboration"), Some(&serde_json::json!(false)));
    assert!(context.get("collaboration").is_none());
}

#[tokio::test]
async fn test_finalize_survives_collaboration_memory_failure() {
    let orchestrator = orchestrator_with_rejecting_lead().await;
    let events = orchestrator
        .collaborate(CollaborationRequest::new(ids(&["a", "b"]), "Ship it").with_max_rounds(2))
        .await
        .unwrap();
    assert_eq!(events.len(), 8);
    assert_eq!(events.last().unwrap().metadata.total_rounds, Some(2));

    assert_context_cleared(&orchestrator, "a").await;
    assert_context_cleared(&orchestrator, "b").await;

    let handle = orchestrator.registry().get("b").await.unwrap();
    let agent = handle.agent.lock().await;
    let remembered = agent
        .memory()
        .search_long_term(Some("collaboration"), 10, 0.0)
        .await
        .unwrap();
    assert_eq!(remembered.len(), 1);
}

#[tokio::test]
async fn test_stream_finishes_despite_collaboration_memory_failure() {
    let orchestrator = orchestrator_with_rejecting_lead().await;
    let stream = orchestrator
        .collaborate_stream(CollaborationRequest::new(ids(&["a", "b"]), "Ship it").with_max_rounds(2))
        .await
        .unwrap();

    let events = stream.collect_events().await.unwrap();
    assert_eq!(events.len(), 8);
    assert_context_cleared(&orchestrator, "a").await;
    assert_context_cleared(&orchestrator, "b").await;
}
