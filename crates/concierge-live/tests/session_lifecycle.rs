//! End-to-end session behaviour against an in-memory engine.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use concierge_live::engine::EngineEvents;
use concierge_live::protocol::{MessageKind, ServerContent};
use concierge_live::tools::{
    ContextEnricher, Enrichment, RecentEntityMemory, StaticToolRegistry, ToolExecutor, ToolSpec,
};
use concierge_live::{
    BackgroundJobBridge, ChannelRelay, ClientEnvelope, DispatchContext, Direction, EngineCommand,
    EngineConnector, EngineEvent, EngineHandle, EngineSetup, InboundMessage, JobBus, JobEvent,
    LiveError, OrchestratorSettings, PageContext, RelayReceiver, SessionOrchestrator, SessionRegistry,
    StartRequest, StaticPersona, ToolCall, ToolCallDispatcher, TranscriptFragment,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

struct FakeConnection {
    setup: EngineSetup,
    commands: mpsc::Receiver<EngineCommand>,
    events: mpsc::Sender<EngineEvent>,
}

#[derive(Default)]
struct FakeConnector {
    refuse: bool,
    delay: Duration,
    /// Events already waiting when the connection is handed over.
    queued: Vec<EngineEvent>,
    connections: Mutex<Vec<FakeConnection>>,
}

impl FakeConnector {
    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Default::default()
        }
    }

    fn take_all(&self) -> Vec<FakeConnection> {
        std::mem::take(&mut *self.connections.lock().unwrap())
    }

    fn take_one(&self) -> FakeConnection {
        let mut all = self.take_all();
        assert_eq!(all.len(), 1, "expected exactly one connection");
        all.remove(0)
    }
}

#[async_trait]
impl EngineConnector for FakeConnector {
    async fn connect(&self, setup: EngineSetup) -> Result<(EngineHandle, EngineEvents), LiveError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.refuse {
            return Err(LiveError::Connect("refused".into()));
        }
        let (handle, commands) = EngineHandle::channel(64);
        let (events, events_rx) = mpsc::channel(64);
        for event in &self.queued {
            events.try_send(event.clone()).unwrap();
        }
        self.connections.lock().unwrap().push(FakeConnection {
            setup,
            commands,
            events,
        });
        Ok((handle, events_rx))
    }
}

struct Backend;

#[async_trait]
impl ToolExecutor for Backend {
    async fn execute(
        &self,
        tool: &ToolSpec,
        args: Value,
        ctx: &DispatchContext,
    ) -> Result<Value, LiveError> {
        assert!(ctx.voice_mode);
        match tool.name.as_str() {
            "contacts.search" => Ok(json!([{ "id": "c1", "name": "Dana" }])),
            "tasks.create" => Ok(json!({ "id": "t1", "title": args["title"] })),
            _ => Err(LiveError::Tool("not available".into())),
        }
    }
}

struct NoEnrichment;

#[async_trait]
impl ContextEnricher for NoEnrichment {
    async fn scan_for_context(
        &self,
        _user_id: &str,
        _intent: &str,
        _entity_type: &str,
        _draft: &Value,
    ) -> Result<Enrichment, LiveError> {
        Ok(Enrichment::default())
    }
}

struct Fixture {
    orchestrator: SessionOrchestrator,
    registry: SessionRegistry,
    connector: Arc<FakeConnector>,
    bus: JobBus,
}

fn fixture_with(connector: FakeConnector) -> Fixture {
    let connector = Arc::new(connector);
    let registry = SessionRegistry::new();
    let bus = JobBus::new(32);
    let tools = StaticToolRegistry::new(vec![
        ToolSpec::new("contacts.search", "Search contacts"),
        ToolSpec::new("tasks.create", "Create a task"),
        ToolSpec::new("reports.export", "Export a report"),
    ])
    .unwrap();
    let dispatcher = ToolCallDispatcher::new(
        Arc::new(tools),
        Arc::new(Backend),
        Arc::new(NoEnrichment),
        Arc::new(RecentEntityMemory::new()),
    );
    let settings = OrchestratorSettings {
        greeting_delay: Duration::from_millis(10),
        tool_domains: vec!["contacts".into(), "tasks".into()],
        blocked_source_hosts: vec!["spam.example".into()],
        include_search: true,
    };
    let orchestrator = SessionOrchestrator::new(
        registry.clone(),
        connector.clone(),
        Arc::new(StaticPersona("You are a helpful real estate concierge.".into())),
        Arc::new(dispatcher),
        BackgroundJobBridge::new(bus.clone(), "one short sentence"),
        settings,
    );
    Fixture {
        orchestrator,
        registry,
        connector,
        bus,
    }
}

fn fixture() -> Fixture {
    fixture_with(FakeConnector::default())
}

fn request(user: &str) -> (StartRequest, RelayReceiver) {
    let (relay, rx) = ChannelRelay::channel(64);
    (StartRequest::new(user, Arc::new(relay)), rx)
}

async fn next_command(conn: &mut FakeConnection) -> EngineCommand {
    timeout(WAIT, conn.commands.recv())
        .await
        .expect("timed out waiting for engine command")
        .expect("engine command channel closed")
}

async fn next_envelope(rx: &mut RelayReceiver) -> ClientEnvelope {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for client envelope")
        .expect("client channel closed")
}

async fn wait_for_empty(registry: &SessionRegistry) {
    timeout(WAIT, async {
        while !registry.is_empty().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("registry never emptied");
}

fn content(content: ServerContent) -> EngineEvent {
    EngineEvent::Message(InboundMessage {
        kind: MessageKind::Content(content),
        grounding: Vec::new(),
    })
}

fn user_speech(text: &str, finished: bool) -> EngineEvent {
    content(ServerContent {
        input_transcript: Some(TranscriptFragment {
            text: text.into(),
            finished,
            direction: Direction::User,
        }),
        ..Default::default()
    })
}

fn job(user: &str) -> JobEvent {
    JobEvent {
        id: "job-7".into(),
        user_id: user.into(),
        tool_name: "reports.generate_export".into(),
        result: None,
        output_summary: Some("Your export has 42 rows".into()),
    }
}

#[tokio::test]
async fn start_connects_registers_and_greets() {
    let f = fixture();
    let (mut req, mut client) = request("alice");
    req.page_context = Some(PageContext {
        page: "deals".into(),
        ..Default::default()
    });

    let id = f.orchestrator.start(req).await.unwrap();

    assert_eq!(next_envelope(&mut client).await, ClientEnvelope::Connected);
    assert_eq!(f.registry.get("alice").await.unwrap().id, id);

    let mut conn = f.connector.take_one();
    assert!(conn.setup.instruction.contains("real estate concierge"));
    assert!(conn.setup.include_search);
    let names: Vec<_> = conn
        .setup
        .function_declarations
        .iter()
        .map(|d| d["name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(names, ["contacts.search", "tasks.create"]);

    match next_command(&mut conn).await {
        EngineCommand::UserText { text } => assert!(text.starts_with("I'm on the deals page")),
        other => panic!("expected greeting, got {other:?}"),
    }
}

#[tokio::test]
async fn no_page_context_means_no_greeting() {
    let f = fixture();
    let (req, _client) = request("alice");
    f.orchestrator.start(req).await.unwrap();

    let mut conn = f.connector.take_one();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(conn.commands.try_recv().is_err());
}

#[tokio::test]
async fn connect_failure_reports_error_and_registers_nothing() {
    let f = fixture_with(FakeConnector::refusing());
    let (req, mut client) = request("alice");

    let err = f.orchestrator.start(req).await.unwrap_err();
    assert!(matches!(err, LiveError::Connect(_)));

    match next_envelope(&mut client).await {
        ClientEnvelope::Error { message } => assert!(message.contains("refused")),
        other => panic!("expected error envelope, got {other:?}"),
    }
    assert!(f.registry.is_empty().await);
}

#[tokio::test]
async fn second_start_replaces_and_closes_first() {
    let f = fixture();
    let (req1, _client1) = request("alice");
    let first = f.orchestrator.start(req1).await.unwrap();
    let (req2, _client2) = request("alice");
    let second = f.orchestrator.start(req2).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(f.registry.len().await, 1);
    assert_eq!(f.registry.get("alice").await.unwrap().id, second);

    let mut conns = f.connector.take_all();
    assert_eq!(conns.len(), 2);
    assert_eq!(next_command(&mut conns[0]).await, EngineCommand::Close);

    // The old connection closing must not remove the replacement.
    conns[0]
        .events
        .send(EngineEvent::Closed { reason: None })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(f.registry.get("alice").await.unwrap().id, second);

    // Only the live session hears about jobs; the first one unsubscribed.
    f.bus.publish(job("alice"));
    assert!(matches!(
        next_command(&mut conns[1]).await,
        EngineCommand::SystemTurn { .. }
    ));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!matches!(
        conns[0].commands.try_recv(),
        Ok(EngineCommand::SystemTurn { .. })
    ));
}

#[tokio::test]
async fn stop_closes_connection_and_later_input_is_ignored() {
    let f = fixture();
    let (req, mut client) = request("alice");
    f.orchestrator.start(req).await.unwrap();
    let mut conn = f.connector.take_one();
    assert_eq!(next_envelope(&mut client).await, ClientEnvelope::Connected);

    f.orchestrator.send_audio("alice", "AAAA".into()).await;
    assert_eq!(
        next_command(&mut conn).await,
        EngineCommand::Audio { data: "AAAA".into() }
    );

    f.orchestrator.stop("alice").await;
    assert!(f.registry.is_empty().await);
    assert_eq!(next_command(&mut conn).await, EngineCommand::Close);

    f.orchestrator.send_audio("alice", "BBBB".into()).await;
    f.orchestrator.send_text("alice", "hello?".into()).await;
    f.orchestrator.stop("alice").await;

    // Messages racing in after stop change nothing.
    let _ = conn.events.send(user_speech("too late", true)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(client.try_recv().is_err());
    assert!(!matches!(
        conn.commands.try_recv(),
        Ok(EngineCommand::Audio { .. } | EngineCommand::UserText { .. })
    ));
}

#[tokio::test]
async fn jobs_stop_arriving_after_stop() {
    let f = fixture();
    let (req, _client) = request("alice");
    f.orchestrator.start(req).await.unwrap();
    let mut conn = f.connector.take_one();

    f.bus.publish(job("bob"));
    f.bus.publish(job("alice"));
    match next_command(&mut conn).await {
        EngineCommand::SystemTurn { text } => {
            assert!(text.contains("Generate export"));
            assert!(text.contains("one short sentence"));
            assert!(text.ends_with("Your export has 42 rows"));
        }
        other => panic!("expected job turn, got {other:?}"),
    }

    f.orchestrator.stop("alice").await;
    assert_eq!(next_command(&mut conn).await, EngineCommand::Close);
    f.bus.publish(job("alice"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(conn.commands.try_recv().is_err());
}

#[tokio::test]
async fn engine_messages_drive_the_turn() {
    let f = fixture();
    let (req, mut client) = request("alice");
    f.orchestrator.start(req).await.unwrap();
    let conn = f.connector.take_one();
    assert_eq!(next_envelope(&mut client).await, ClientEnvelope::Connected);

    conn.events.send(user_speech("Hi there", true)).await.unwrap();
    conn.events.send(user_speech("how are you", true)).await.unwrap();
    conn.events
        .send(content(ServerContent {
            audio: vec!["UklGRg==".into()],
            turn_complete: true,
            ..Default::default()
        }))
        .await
        .unwrap();

    assert_eq!(
        next_envelope(&mut client).await,
        ClientEnvelope::InputTranscript {
            text: "Hi there".into(),
            is_final: true
        }
    );
    assert_eq!(
        next_envelope(&mut client).await,
        ClientEnvelope::InputTranscript {
            text: "how are you".into(),
            is_final: true
        }
    );
    assert_eq!(
        next_envelope(&mut client).await,
        ClientEnvelope::Audio {
            data: "UklGRg==".into()
        }
    );
    assert_eq!(
        next_envelope(&mut client).await,
        ClientEnvelope::UserTurnComplete {
            text: "Hi there how are you".into()
        }
    );
    assert_eq!(next_envelope(&mut client).await, ClientEnvelope::TurnComplete);
}

#[tokio::test]
async fn tool_calls_round_trip_through_the_engine() {
    let f = fixture();
    let (req, _client) = request("alice");
    f.orchestrator.start(req).await.unwrap();
    let mut conn = f.connector.take_one();

    conn.events
        .send(EngineEvent::Message(InboundMessage {
            kind: MessageKind::ToolCall(vec![
                ToolCall {
                    id: "call-1".into(),
                    name: "contacts.search".into(),
                    arguments: json!({ "query": "Dana" }),
                },
                ToolCall {
                    id: "call-2".into(),
                    name: "tasks.create".into(),
                    arguments: json!({ "title": "Call Dana" }),
                },
                ToolCall {
                    id: "call-3".into(),
                    name: "reports.export".into(),
                    arguments: json!({}),
                },
            ]),
            grounding: Vec::new(),
        }))
        .await
        .unwrap();

    match next_command(&mut conn).await {
        EngineCommand::ToolResponse { results } => {
            let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
            assert_eq!(ids, ["call-1", "call-2", "call-3"]);
            assert!(results[0].success && results[1].success);
            assert_eq!(results[2].error.as_deref(), Some("not available"));
        }
        other => panic!("expected tool response, got {other:?}"),
    }
    match next_command(&mut conn).await {
        EngineCommand::SystemTurn { text } => assert!(text.contains("task")),
        other => panic!("expected follow-up, got {other:?}"),
    }
}

#[tokio::test]
async fn engine_close_tears_down_session() {
    let f = fixture();
    let (req, _client) = request("alice");
    f.orchestrator.start(req).await.unwrap();
    let conn = f.connector.take_one();

    conn.events
        .send(EngineEvent::Closed {
            reason: Some("deadline".into()),
        })
        .await
        .unwrap();
    wait_for_empty(&f.registry).await;

    f.orchestrator.send_text("alice", "anyone?".into()).await;
}

#[tokio::test]
async fn stop_while_connecting_cancels_the_start() {
    let f = fixture_with(FakeConnector {
        delay: Duration::from_millis(100),
        ..Default::default()
    });
    let (req, _client) = request("alice");
    let starting = {
        let orchestrator = f.orchestrator.clone();
        tokio::spawn(async move { orchestrator.start(req).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    f.orchestrator.stop("alice").await;

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(LiveError::Cancelled)));
    assert!(f.registry.is_empty().await);

    let mut conn = f.connector.take_one();
    assert_eq!(next_command(&mut conn).await, EngineCommand::Close);

    // The cancelled start never subscribed to jobs.
    f.bus.publish(job("alice"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(conn.commands.try_recv().is_err());
}

#[tokio::test]
async fn newer_start_supersedes_one_still_connecting() {
    let f = fixture_with(FakeConnector {
        delay: Duration::from_millis(100),
        ..Default::default()
    });
    let (req1, _client1) = request("alice");
    let first = {
        let orchestrator = f.orchestrator.clone();
        tokio::spawn(async move { orchestrator.start(req1).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let (req2, _client2) = request("alice");
    let second = f.orchestrator.start(req2).await.unwrap();

    assert!(matches!(first.await.unwrap(), Err(LiveError::Cancelled)));
    assert_eq!(f.registry.len().await, 1);
    assert_eq!(f.registry.get("alice").await.unwrap().id, second);
}

#[tokio::test]
async fn connected_precedes_early_engine_output() {
    let f = fixture_with(FakeConnector {
        queued: vec![user_speech("already talking", true)],
        ..Default::default()
    });
    let (req, mut client) = request("alice");
    f.orchestrator.start(req).await.unwrap();

    assert_eq!(next_envelope(&mut client).await, ClientEnvelope::Connected);
    assert_eq!(
        next_envelope(&mut client).await,
        ClientEnvelope::InputTranscript {
            text: "already talking".into(),
            is_final: true
        }
    );
}

#[tokio::test]
async fn slow_client_still_sees_the_turn_end() {
    let f = fixture();
    let (relay, mut client) = ChannelRelay::channel(16);
    f.orchestrator
        .start(StartRequest::new("alice", Arc::new(relay)))
        .await
        .unwrap();
    let conn = f.connector.take_one();

    conn.events
        .send(content(ServerContent {
            audio: (0..20).map(|i| format!("chunk-{i}")).collect(),
            turn_complete: true,
            ..Default::default()
        }))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut received = Vec::new();
    while let Ok(envelope) = client.try_recv() {
        received.push(envelope);
    }
    let audio = received
        .iter()
        .filter(|e| matches!(e, ClientEnvelope::Audio { .. }))
        .count();
    assert_eq!(received.first(), Some(&ClientEnvelope::Connected));
    assert!(audio > 0 && audio < 20, "audio delivered: {audio}");
    assert_eq!(received.last(), Some(&ClientEnvelope::TurnComplete));
}

#[tokio::test]
async fn shutdown_drains_all_sessions() {
    let f = fixture();
    for user in ["alice", "bob", "carol"] {
        let (req, _client) = request(user);
        f.orchestrator.start(req).await.unwrap();
    }
    assert_eq!(f.registry.len().await, 3);

    f.orchestrator.shutdown().await;
    assert!(f.registry.is_empty().await);
    for mut conn in f.connector.take_all() {
        assert_eq!(next_command(&mut conn).await, EngineCommand::Close);
    }
}
