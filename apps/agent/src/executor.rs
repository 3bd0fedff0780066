// [apps/agent/src/executor.rs]
//! Drives one agent's connection to the coordinator: the reconnect loop,
//! the per-connection select! over heartbeats, outbox drains, inbound
//! coordinator traffic, and outbound messages produced by whatever task
//! is currently running; plus the task lifecycle itself — file sync,
//! single-instance enforcement, subprocess spawn, stdout parsing, crack
//! batching, and progress reporting.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prospector_domain_models::{
    AgentReportedStatus, AgentStatusPayload, CrackedBatchPayload, CrackedEntry, MessageEnvelope, MessageKind,
    TaskAssignmentPayload, TaskProgressPayload,
};
use prospector_infra_agent_client::{ws_channel, AgentHttpClient, AgentSocket, FileSyncClient, SyncRequest};
use prospector_infra_transport::DurableOutbox;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::cracker::{self, EngineProgress};
use crate::errors::AgentError;
use crate::single_instance::{terminate_process, SingleInstanceGuard};

const HEARTBEAT_INTERVAL_SECS: u64 = 20;
const OUTBOX_FLUSH_INTERVAL_SECS: u64 = 2;
const RECONNECT_BACKOFF_SECS: u64 = 5;
const CRACK_BATCH_MAX_ENTRIES: usize = 50;
const CRACK_BATCH_MAX_DELAY: Duration = Duration::from_millis(100);
const MAX_ALREADY_RUNNING_RETRIES: u32 = 5;
const ALREADY_RUNNING_RETRY_DELAY_SECS: u64 = 5;

struct TaskOutcome {
    status: AgentReportedStatus,
    total_cracked: u64,
}

struct RunningTask {
    task_id: Uuid,
    abort_handle: tokio::task::AbortHandle,
}

pub struct AgentExecutor {
    agent_id: i64,
    coordinator_ws_url: String,
    bearer_token: String,
    cache_dir: PathBuf,
    cracking_binary_name: String,
    http: Arc<AgentHttpClient>,
    file_sync: Arc<FileSyncClient>,
    outbox: Arc<DurableOutbox>,
    terminated: Arc<AtomicBool>,
    task_in_flight: AtomicBool,
    current_task: AsyncMutex<Option<RunningTask>>,
    internal_sender: std::sync::Mutex<Option<mpsc::UnboundedSender<MessageEnvelope>>>,
}

impl AgentExecutor {
    pub fn new(
        agent_id: i64,
        coordinator_ws_url: String,
        bearer_token: String,
        cache_dir: PathBuf,
        cracking_binary_name: String,
        http: Arc<AgentHttpClient>,
        file_sync: Arc<FileSyncClient>,
        outbox: Arc<DurableOutbox>,
        terminated: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            agent_id,
            coordinator_ws_url,
            bearer_token,
            cache_dir,
            cracking_binary_name,
            http,
            file_sync,
            outbox,
            terminated,
            task_in_flight: AtomicBool::new(false),
            current_task: AsyncMutex::new(None),
            internal_sender: std::sync::Mutex::new(None),
        })
    }

    /// Top-level reconnect loop. Runs until the termination signal flips,
    /// reconnecting with a fixed backoff whenever the channel drops.
    pub async fn run(self: Arc<Self>) {
        while !self.terminated.load(Ordering::SeqCst) {
            match ws_channel::connect(&self.coordinator_ws_url, self.agent_id, &self.bearer_token).await {
                Ok(socket) => {
                    info!(agent_id = self.agent_id, "agent channel established");
                    if let Err(err) = self.drive_channel(socket).await {
                        warn!(%err, "agent channel closed, will reconnect");
                    }
                }
                Err(err) => warn!(%err, "failed to reach coordinator, retrying shortly"),
            }

            if self.terminated.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_secs(RECONNECT_BACKOFF_SECS)).await;
        }
    }

    async fn drive_channel(self: &Arc<Self>, mut socket: AgentSocket) -> Result<(), AgentError> {
        self.drain_outbox(&mut socket).await;

        let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<MessageEnvelope>();
        *self.internal_sender.lock().unwrap() = Some(internal_tx);

        self.send_over(&mut socket, MessageEnvelope::new(MessageKind::AgentStatus(AgentStatusPayload {
            status: "idle".to_string(),
            device_metrics: Vec::new(),
            sync_status: "idle".to_string(),
            files_to_sync: 0,
            files_synced: 0,
        })))
        .await
        .ok();

        let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        let mut outbox_flush = tokio::time::interval(Duration::from_secs(OUTBOX_FLUSH_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if let Err(err) = self.send_over(&mut socket, MessageEnvelope::new(MessageKind::Heartbeat)).await {
                        warn!(%err, "heartbeat send failed");
                        return Err(err.into());
                    }
                }
                _ = outbox_flush.tick() => {
                    self.drain_outbox(&mut socket).await;
                }
                outbound = internal_rx.recv() => {
                    if let Some(envelope) = outbound {
                        self.relay(&mut socket, envelope).await;
                    }
                }
                inbound = ws_channel::recv_envelope(&mut socket) => {
                    match inbound? {
                        Some(envelope) => self.handle_inbound(envelope).await,
                        None => {
                            *self.internal_sender.lock().unwrap() = None;
                            return Ok(());
                        }
                    }
                }
            }

            if self.terminated.load(Ordering::SeqCst) {
                *self.internal_sender.lock().unwrap() = None;
                return Ok(());
            }
        }
    }

    /// Critical messages go through the durable outbox and ride out on
    /// the next flush tick; everything else is sent immediately and
    /// dropped silently on failure, since live progress and heartbeats
    /// are explicitly lossy.
    async fn relay(&self, socket: &mut AgentSocket, envelope: MessageEnvelope) {
        if envelope.is_critical() {
            if let Err(err) = self.outbox.enqueue(&envelope) {
                error!(%err, "failed to persist a critical message to the durable outbox");
            }
            self.drain_outbox(socket).await;
        } else if let Err(err) = self.send_over(socket, envelope).await {
            warn!(%err, "dropped a non-critical message after a failed send");
        }
    }

    async fn drain_outbox(&self, socket: &mut AgentSocket) {
        for envelope in self.outbox.drain_pending() {
            let id = envelope.id;
            match ws_channel::send_envelope(socket, &envelope).await {
                Ok(()) => {
                    if let Err(err) = self.outbox.ack(id) {
                        warn!(%err, "failed to ack an outbox entry after a successful send");
                    }
                }
                Err(err) => {
                    warn!(%err, "outbox send failed, leaving entry pending for the next drain");
                    let _ = self.outbox.release(id);
                }
            }
        }
    }

    async fn send_over(&self, socket: &mut AgentSocket, envelope: MessageEnvelope) -> Result<(), prospector_infra_agent_client::ClientError> {
        ws_channel::send_envelope(socket, &envelope).await
    }

    async fn handle_inbound(self: &Arc<Self>, envelope: MessageEnvelope) {
        match envelope.kind {
            MessageKind::TaskAssignment(payload) => self.begin_task(payload).await,
            MessageKind::TaskCancellation { task_id } => self.cancel_task(task_id).await,
            MessageKind::FileSyncRequest(request) => self.handle_sync_request(request).await,
            MessageKind::BenchmarkRequest(_) => {
                // Benchmark probing is out of scope for this agent build; the
                // coordinator falls back to its configured defaults when no
                // benchmark_result arrives.
            }
            MessageKind::Heartbeat | MessageKind::AgentStatus(_) | MessageKind::TaskProgress(_) | MessageKind::CrackedBatch(_) | MessageKind::BenchmarkResult(_) => {
                // Agent-originated message types; the coordinator never sends these.
            }
        }
    }

    async fn handle_sync_request(&self, request: prospector_domain_models::FileSyncRequestPayload) {
        let destination = self.cache_dir.join(&request.category).join(&request.name);
        let sync_request = SyncRequest { category: request.category, name: request.name, destination };
        if let Err(err) = self.file_sync.sync_all(vec![sync_request]).await {
            warn!(%err, "ad-hoc file sync request failed");
        }
    }

    async fn cancel_task(&self, task_id: Uuid) {
        let mut slot = self.current_task.lock().await;
        match slot.take() {
            Some(running) if running.task_id == task_id => {
                running.abort_handle.abort();
                self.task_in_flight.store(false, Ordering::SeqCst);
                info!(%task_id, "task cancelled by coordinator");
            }
            Some(other) => *slot = Some(other),
            None => {}
        }
    }

    pub async fn begin_task(self: &Arc<Self>, payload: TaskAssignmentPayload) {
        if self.task_in_flight.swap(true, Ordering::SeqCst) {
            warn!(task_id = %payload.task_id, "refusing a task assignment, a cracker is already running");
            self.emit(failed_progress(payload.task_id, "agent already running a task"));
            return;
        }

        let task_id = payload.task_id;
        let executor = Arc::clone(self);

        let join_handle = tokio::spawn(async move {
            executor.run_task(payload).await;
            executor.task_in_flight.store(false, Ordering::SeqCst);
            *executor.current_task.lock().await = None;
        });

        *self.current_task.lock().await = Some(RunningTask { task_id, abort_handle: join_handle.abort_handle() });
    }

    #[instrument(skip(self, payload), fields(task_id = %payload.task_id))]
    async fn run_task(&self, payload: TaskAssignmentPayload) {
        if let Err(err) = self.run_task_inner(&payload).await {
            error!(%err, "task execution failed");
            self.emit(failed_progress(payload.task_id, &err.to_string()));
        }
    }

    async fn run_task_inner(&self, payload: &TaskAssignmentPayload) -> Result<(), AgentError> {
        let (hashlist_dest, local_wordlists, local_rules, binary_dest) = self.sync_task_inputs(payload).await?;

        let guard = self.acquire_single_instance().await?;

        let mut attempt = 0u32;
        let outcome = loop {
            let args = cracker::build_args(payload, &hashlist_dest, &local_wordlists, &local_rules);
            let mut child = cracker::spawn(&binary_dest, &args).map_err(|e| AgentError::SpawnFailed(e.to_string()))?;
            if let Some(pid) = child.id() {
                guard.claim(pid)?;
            }

            let outcome = self.drive_cracker(payload, &mut child).await?;

            if outcome.status == AgentReportedStatus::AlreadyRunningRetryable && attempt < MAX_ALREADY_RUNNING_RETRIES {
                attempt += 1;
                warn!(attempt, "cracker reported an existing instance, retrying after backoff");
                tokio::time::sleep(Duration::from_secs(ALREADY_RUNNING_RETRY_DELAY_SECS)).await;
                continue;
            }

            break outcome;
        };

        guard.release();
        info!(status = ?outcome.status, total_cracked = outcome.total_cracked, "task finished");
        Ok(())
    }

    async fn sync_task_inputs(&self, payload: &TaskAssignmentPayload) -> Result<(PathBuf, Vec<String>, Vec<String>, PathBuf), AgentError> {
        let hashlist_dest = self.cache_dir.join("hashlists").join(&payload.hashlist_path);
        let binary_dest = self.cache_dir.join("binaries").join(&payload.binary_path);

        let mut requests = vec![
            SyncRequest { category: "hashlists".to_string(), name: payload.hashlist_path.clone(), destination: hashlist_dest.clone() },
            SyncRequest { category: "binaries".to_string(), name: payload.binary_path.clone(), destination: binary_dest.clone() },
        ];

        let mut local_wordlists = Vec::new();
        for name in &payload.wordlist_paths {
            let destination = self.cache_dir.join("wordlists").join(name);
            requests.push(SyncRequest { category: "wordlists".to_string(), name: name.clone(), destination: destination.clone() });
            local_wordlists.push(destination.display().to_string());
        }

        let mut local_rules = Vec::new();
        for name in &payload.rule_paths {
            let category = if name.contains('/') { "rule-chunks" } else { "rules" };
            let destination = self.cache_dir.join(category).join(name);
            requests.push(SyncRequest { category: category.to_string(), name: name.clone(), destination: destination.clone() });
            local_rules.push(destination.display().to_string());
        }

        self.file_sync.sync_all(requests).await?;
        Ok((hashlist_dest, local_wordlists, local_rules, binary_dest))
    }

    async fn acquire_single_instance(&self) -> Result<SingleInstanceGuard, AgentError> {
        match SingleInstanceGuard::acquire(&self.cache_dir, &self.cracking_binary_name) {
            Ok(guard) => Ok(guard),
            Err(stale_pid) => {
                warn!(pid = stale_pid, "a stale cracker process is blocking this assignment, terminating it");
                terminate_process(stale_pid).await;
                SingleInstanceGuard::acquire(&self.cache_dir, &self.cracking_binary_name).map_err(AgentError::CrackerAlreadyRunning)
            }
        }
    }

    async fn drive_cracker(&self, payload: &TaskAssignmentPayload, child: &mut Child) -> Result<TaskOutcome, AgentError> {
        let stdout = child.stdout.take().expect("cracker spawned with a piped stdout");
        let mut lines = BufReader::new(stdout).lines();

        let mut first_update_sent = false;
        let mut total_cracked: u64 = 0;
        let mut crack_buffer: Vec<CrackedEntry> = Vec::new();
        let mut last_progress: Option<EngineProgress> = None;
        let mut batch_deadline: Option<tokio::time::Instant> = None;

        let mut report_timer = tokio::time::interval(Duration::from_secs(payload.report_interval.max(1) as u64));

        loop {
            let batch_sleep = async {
                match batch_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(raw) => {
                            let parsed = cracker::parse_line(&raw);
                            if let Some(progress) = parsed.status {
                                last_progress = Some(progress);
                            }
                            if let Some(crack) = parsed.crack {
                                crack_buffer.push(crack);
                                total_cracked += 1;
                                if batch_deadline.is_none() {
                                    batch_deadline = Some(tokio::time::Instant::now() + CRACK_BATCH_MAX_DELAY);
                                }
                                if crack_buffer.len() >= CRACK_BATCH_MAX_ENTRIES {
                                    self.flush_crack_batch(payload.task_id, &mut crack_buffer);
                                    batch_deadline = None;
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = batch_sleep => {
                    self.flush_crack_batch(payload.task_id, &mut crack_buffer);
                    batch_deadline = None;
                }
                _ = report_timer.tick() => {
                    if let Some(progress) = &last_progress {
                        self.emit_progress(payload, progress, total_cracked, !first_update_sent, AgentReportedStatus::Running, None);
                        first_update_sent = true;
                    }
                }
            }
        }

        self.flush_crack_batch(payload.task_id, &mut crack_buffer);

        let exit_status = child.wait().await?;
        let mut stderr_tail = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut stderr_tail).await;
        }

        let status = cracker::classify_exit(exit_status.code(), &stderr_tail);

        let window = payload.keyspace_end.saturating_sub(payload.keyspace_start);
        let final_progress = last_progress.unwrap_or(EngineProgress {
            processed: window,
            total: window,
            restore_point: None,
            devices: Vec::new(),
            all_hashes_cracked: false,
        });

        let error_message = matches!(status, AgentReportedStatus::Failed | AgentReportedStatus::Aborted).then(|| stderr_tail.trim().to_string());

        self.emit_final_progress(payload, &final_progress, total_cracked, !first_update_sent, status, error_message);

        Ok(TaskOutcome { status, total_cracked })
    }

    fn flush_crack_batch(&self, task_id: Uuid, buffer: &mut Vec<CrackedEntry>) {
        if buffer.is_empty() {
            return;
        }
        let cracks = std::mem::take(buffer);
        self.emit(MessageEnvelope::new(MessageKind::CrackedBatch(CrackedBatchPayload { task_id, cracks })));
    }

    fn emit_progress(
        &self,
        payload: &TaskAssignmentPayload,
        progress: &EngineProgress,
        cracked_count: u64,
        is_first_update: bool,
        status: AgentReportedStatus,
        error_message: Option<String>,
    ) {
        self.emit(build_progress_envelope(payload, progress, cracked_count, is_first_update, status, error_message));
    }

    fn emit_final_progress(
        &self,
        payload: &TaskAssignmentPayload,
        progress: &EngineProgress,
        cracked_count: u64,
        is_first_update: bool,
        status: AgentReportedStatus,
        error_message: Option<String>,
    ) {
        self.emit(build_progress_envelope(payload, progress, cracked_count, is_first_update, status, error_message));
    }

    fn emit(&self, envelope: MessageEnvelope) {
        let sender = self.internal_sender.lock().unwrap().clone();
        match sender {
            Some(tx) => {
                let _ = tx.send(envelope);
            }
            None => warn!("dropping an outbound message, no channel is currently connected"),
        }
    }
}

fn build_progress_envelope(
    payload: &TaskAssignmentPayload,
    progress: &EngineProgress,
    cracked_count: u64,
    is_first_update: bool,
    status: AgentReportedStatus,
    error_message: Option<String>,
) -> MessageEnvelope {
    let keyspace_processed = payload.keyspace_start + progress.processed;
    let effective_progress = payload.effective_keyspace_start + progress.processed;
    let total = progress.total.max(1);
    let progress_percent = 100.0 * progress.processed as f64 / total as f64;
    let hash_rate: u64 = progress.devices.iter().map(|d| d.hashrate).sum();
    let remaining = progress.total.saturating_sub(progress.processed);
    let time_remaining_secs = if hash_rate > 0 { Some(remaining / hash_rate) } else { None };

    MessageEnvelope::new(MessageKind::TaskProgress(TaskProgressPayload {
        task_id: payload.task_id,
        keyspace_processed,
        effective_progress,
        progress_percent,
        total_effective_keyspace: Some(payload.effective_keyspace_end.saturating_sub(payload.effective_keyspace_start)),
        is_first_update,
        hash_rate,
        time_remaining_secs,
        cracked_count,
        cracked_hashes: Vec::new(),
        status,
        error_message,
        device_metrics: progress.devices.clone(),
        all_hashes_cracked: progress.all_hashes_cracked,
    }))
}

fn failed_progress(task_id: Uuid, reason: &str) -> MessageEnvelope {
    MessageEnvelope::new(MessageKind::TaskProgress(TaskProgressPayload {
        task_id,
        keyspace_processed: 0,
        effective_progress: 0,
        progress_percent: 0.0,
        total_effective_keyspace: None,
        is_first_update: true,
        hash_rate: 0,
        time_remaining_secs: None,
        cracked_count: 0,
        cracked_hashes: Vec::new(),
        status: AgentReportedStatus::Failed,
        error_message: Some(reason.to_string()),
        device_metrics: Vec::new(),
        all_hashes_cracked: false,
    }))
}
