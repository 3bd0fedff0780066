// [tests/mirror/apps/coordinator/dispatch_claim_test.rs]
//! End-to-end certification of one dispatch tick: a pending chunk claimed
//! by an eligible, connected agent, with the `task_assignment` envelope
//! actually landing on that agent's registered socket.

use axum::extract::ws::Message;
use chrono::Utc;
use prospector_coordinator::services::dispatcher;
use prospector_coordinator::state::AppState;
use prospector_domain_models::chunk::{Chunk, ChunkStatus, DetailedStatus};
use prospector_domain_models::job::{AttackConfig, AttackMode, Job, JobStatus, KeyspaceAccounting};
use prospector_domain_models::message::MessageKind;
use prospector_infra_db::DbClient;
use uuid::Uuid;

async fn test_state() -> AppState {
    let client = DbClient::connect(":memory:", None).await.expect("in-memory db must connect");
    AppState::new(client, std::env::temp_dir(), "test-token".into(), "hashcat".into(), Default::default())
}

fn pending_chunk(job_id: Uuid) -> Chunk {
    Chunk {
        id: Uuid::new_v4(),
        job_id,
        chunk_number: 1,
        assigned_agent_id: None,
        keyspace_start: 0,
        keyspace_end: 100_000,
        effective_keyspace_start: 0,
        effective_keyspace_end: 100_000,
        effective_keyspace_processed: 0,
        rule_start_index: None,
        rule_end_index: None,
        rule_chunk_path: None,
        is_rule_split_task: false,
        chunk_actual_keyspace: None,
        status: ChunkStatus::Pending,
        detailed_status: DetailedStatus::None,
        retry_count: 0,
        consecutive_failures: 0,
        benchmark_speed: None,
        chunk_duration_seconds: 1200,
        progress_percent: 0.0,
        crack_count: 0,
        average_speed: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[tokio::test]
async fn a_pending_chunk_is_claimed_and_assigned_to_a_connected_agent() {
    let state = test_state().await;

    let agent_id = state.agent_repository.register("tester", 1).await.unwrap();
    state.agent_repository.record_heartbeat(agent_id).await.unwrap();
    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel::<Message>();
    state.agent_registry.register(agent_id, sender);

    let job = Job {
        id: Uuid::new_v4(),
        hashlist_id: Uuid::new_v4(),
        hash_algorithm_id: 0,
        priority: 0,
        attack: AttackConfig { mode: AttackMode::Dictionary, wordlist_refs: vec!["rockyou.txt".into()], rule_file_refs: vec![], mask: None },
        keyspace: KeyspaceAccounting::naive(100_000, 1),
        uses_rule_splitting: false,
        rule_split_count: 0,
        status: JobStatus::Running,
        consecutive_failures: 0,
        max_agents: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        progress_percent: 0.0,
    };
    state.job_repository.create(&job).await.unwrap();

    let chunk = pending_chunk(job.id);
    state.chunk_repository.create(&chunk).await.unwrap();

    dispatcher::run_dispatch_tick(&state).await.unwrap();

    let fetched = state.chunk_repository.fetch(chunk.id).await.unwrap();
    assert_eq!(fetched.status, ChunkStatus::Assigned);
    assert_eq!(fetched.assigned_agent_id, Some(agent_id));

    let frame = receiver.try_recv().expect("the agent's socket should have received a task_assignment frame");
    let Message::Text(raw) = frame else { panic!("expected a text frame") };
    let envelope: prospector_domain_models::message::MessageEnvelope = serde_json::from_str(&raw).unwrap();
    match envelope.kind {
        MessageKind::TaskAssignment(payload) => assert_eq!(payload.task_id, chunk.id),
        other => panic!("expected a task_assignment envelope, got {other:?}"),
    }

    let agent = state.agent_repository.fetch(agent_id).await.unwrap();
    assert_eq!(agent.current_task_id, Some(chunk.id));
}

#[tokio::test]
async fn a_chunk_is_not_dispatched_twice_in_the_same_tick_when_only_one_agent_is_eligible() {
    let state = test_state().await;

    let agent_id = state.agent_repository.register("tester", 1).await.unwrap();
    state.agent_repository.record_heartbeat(agent_id).await.unwrap();
    let (sender, _receiver) = tokio::sync::mpsc::unbounded_channel::<Message>();
    state.agent_registry.register(agent_id, sender);

    let job = Job {
        id: Uuid::new_v4(),
        hashlist_id: Uuid::new_v4(),
        hash_algorithm_id: 0,
        priority: 0,
        attack: AttackConfig { mode: AttackMode::Dictionary, wordlist_refs: vec![], rule_file_refs: vec![], mask: None },
        keyspace: KeyspaceAccounting::naive(200_000, 1),
        uses_rule_splitting: false,
        rule_split_count: 0,
        status: JobStatus::Running,
        consecutive_failures: 0,
        max_agents: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        progress_percent: 0.0,
    };
    state.job_repository.create(&job).await.unwrap();

    let mut first = pending_chunk(job.id);
    first.chunk_number = 1;
    let mut second = pending_chunk(job.id);
    second.id = Uuid::new_v4();
    second.chunk_number = 2;
    second.keyspace_start = 100_000;
    second.keyspace_end = 200_000;
    second.effective_keyspace_start = 100_000;
    second.effective_keyspace_end = 200_000;
    state.chunk_repository.create(&first).await.unwrap();
    state.chunk_repository.create(&second).await.unwrap();

    dispatcher::run_dispatch_tick(&state).await.unwrap();

    let first_fetched = state.chunk_repository.fetch(first.id).await.unwrap();
    let second_fetched = state.chunk_repository.fetch(second.id).await.unwrap();
    let assigned_count = [&first_fetched, &second_fetched].iter().filter(|c| c.status == ChunkStatus::Assigned).count();
    assert_eq!(assigned_count, 1, "exactly one chunk should claim the single eligible agent");
}
