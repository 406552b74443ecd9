//! End to end pipeline tests over in-memory adapters

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use voxbot::application::aggregator::{BatchAggregator, BatchDispatch};
use voxbot::application::formatting::{FormatBackendKind, FormattingChain};
use voxbot::application::ledger::BalanceLedger;
use voxbot::application::ports::{
    ChatClient, ChatError, JobQueue, JobStore, MediaConverter, MediaError, MessageId, MetricsSink,
    PreparedAudio, QueueError, SpeechError, SpeechToText, UserStore,
};
use voxbot::application::settlement::{SettleOutcome, SettlementService};
use voxbot::application::worker::JobWorker;
use voxbot::application::{AdmissionService, ServiceContext};
use voxbot::domain::{
    IncomingFile, Job, JobResult, JobStatus, MediaKind, TranscribeBackend, User,
};
use voxbot::infrastructure::{DashScopeFormatter, GatewayFormatter, MemoryQueue, MemoryStore};

// Test doubles

#[derive(Default)]
struct RecordingChat {
    sent: Mutex<Vec<(i64, String)>>,
    edited: Mutex<Vec<(MessageId, String)>>,
    documents: Mutex<Vec<(i64, String)>>,
    deleted: Mutex<Vec<MessageId>>,
}

impl RecordingChat {
    fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        _reply_to: Option<MessageId>,
    ) -> Result<Option<MessageId>, ChatError> {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        sent.push((chat_id, text.to_string()));
        Ok(Some(sent.len() as MessageId))
    }

    async fn edit_message(
        &self,
        _chat_id: i64,
        message_id: MessageId,
        text: &str,
    ) -> Result<Option<MessageId>, ChatError> {
        self.edited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((message_id, text.to_string()));
        Ok(Some(message_id))
    }

    async fn delete_message(&self, _chat_id: i64, message_id: MessageId) -> Result<(), ChatError> {
        self.deleted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message_id);
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        _path: &Path,
        caption: &str,
    ) -> Result<Option<MessageId>, ChatError> {
        self.documents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((chat_id, caption.to_string()));
        Ok(Some(0))
    }

    async fn download_file(&self, _file_id: &str, dest: &Path) -> Result<(), ChatError> {
        tokio::fs::write(dest, b"audio-bytes")
            .await
            .map_err(|e| ChatError::RequestFailed(e.to_string()))
    }
}

struct PassthroughConverter;

#[async_trait]
impl MediaConverter for PassthroughConverter {
    async fn prepare_for_asr(&self, input: &Path) -> Result<PreparedAudio, MediaError> {
        Ok(PreparedAudio {
            path: input.to_path_buf(),
            duration_secs: 60.0,
        })
    }
}

/// Converter that records the job's stored status at conversion time
struct StatusObservingConverter {
    jobs: Arc<MemoryStore>,
    job_id: String,
    observed: Mutex<Option<JobStatus>>,
}

#[async_trait]
impl MediaConverter for StatusObservingConverter {
    async fn prepare_for_asr(&self, input: &Path) -> Result<PreparedAudio, MediaError> {
        let status = self
            .jobs
            .get_job(&self.job_id)
            .await
            .ok()
            .flatten()
            .map(|j| j.status);
        *self.observed.lock().unwrap_or_else(|e| e.into_inner()) = status;
        Ok(PreparedAudio {
            path: input.to_path_buf(),
            duration_secs: 60.0,
        })
    }
}

/// Converter that trips a shutdown flag, as if a drain signal landed mid-job
struct ShutdownTrippingConverter {
    flag: Arc<AtomicBool>,
}

#[async_trait]
impl MediaConverter for ShutdownTrippingConverter {
    async fn prepare_for_asr(&self, input: &Path) -> Result<PreparedAudio, MediaError> {
        self.flag.store(true, Ordering::SeqCst);
        Ok(PreparedAudio {
            path: input.to_path_buf(),
            duration_secs: 60.0,
        })
    }
}

struct FixedSpeech {
    text: String,
}

#[async_trait]
impl SpeechToText for FixedSpeech {
    async fn transcribe(&self, _path: &Path) -> Result<String, SpeechError> {
        Ok(self.text.clone())
    }

    fn backend(&self) -> TranscribeBackend {
        TranscribeBackend::CloudApi
    }
}

struct SilentSpeech;

#[async_trait]
impl SpeechToText for SilentSpeech {
    async fn transcribe(&self, _path: &Path) -> Result<String, SpeechError> {
        Err(SpeechError::NoSpeech)
    }

    fn backend(&self) -> TranscribeBackend {
        TranscribeBackend::CloudApi
    }
}

/// Queue wrapper whose publish fails for chosen file ids
struct FlakyQueue {
    inner: MemoryQueue,
    failing_file_id: String,
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn publish(&self, job: &Job) -> Result<(), QueueError> {
        if job.file_id == self.failing_file_id {
            return Err(QueueError::PublishFailed("broker unavailable".to_string()));
        }
        self.inner.publish(job).await
    }

    async fn receive(
        &self,
        wait: Duration,
    ) -> Result<Option<voxbot::application::ports::QueueMessage>, QueueError> {
        self.inner.receive(wait).await
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        self.inner.delete(receipt).await
    }

    async fn change_visibility(&self, receipt: &str, timeout: Duration) -> Result<(), QueueError> {
        self.inner.change_visibility(receipt, timeout).await
    }
}

struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn record_api_call(&self, _backend: &str, _latency: Duration, _success: bool) {}
}

fn file(file_id: &str, duration_secs: u32, group: Option<&str>) -> IncomingFile {
    IncomingFile {
        file_id: file_id.to_string(),
        file_size: 1024,
        duration_secs,
        kind: MediaKind::Voice,
        group_id: group.map(str::to_string),
    }
}

fn admission(
    store: Arc<MemoryStore>,
    queue: Arc<dyn JobQueue>,
    chat: Arc<RecordingChat>,
) -> AdmissionService {
    AdmissionService::new(store.clone(), store, queue, chat, 50 * 1024 * 1024, 5.0)
}

fn context(
    store: Arc<MemoryStore>,
    queue: Arc<dyn JobQueue>,
    chat: Arc<RecordingChat>,
    speech: Arc<dyn SpeechToText>,
) -> Arc<ServiceContext> {
    context_with_media(store, queue, chat, speech, Arc::new(PassthroughConverter))
}

fn context_with_media(
    store: Arc<MemoryStore>,
    queue: Arc<dyn JobQueue>,
    chat: Arc<RecordingChat>,
    speech: Arc<dyn SpeechToText>,
    media: Arc<dyn MediaConverter>,
) -> Arc<ServiceContext> {
    let ledger = Arc::new(BalanceLedger::new(store.clone(), 3));
    let settlement = Arc::new(SettlementService::new(store.clone(), store.clone(), ledger));
    Arc::new(ServiceContext {
        users: store.clone(),
        jobs: store,
        queue,
        chat,
        media,
        speech,
        formatting: Arc::new(FormattingChain::new(
            Arc::new(DashScopeFormatter::new(None)),
            Arc::new(GatewayFormatter::new(None, None)),
            FormatBackendKind::Qwen,
            Arc::new(NullMetrics),
        )),
        settlement,
        queue_wait: Duration::from_millis(100),
        max_message_length: 4_000,
    })
}

// Admission

#[tokio::test]
async fn insufficient_balance_rejects_the_submission() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 10)).await.unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let service = admission(store.clone(), queue.clone(), chat.clone());
    let user = store.get_user(1).await.unwrap().unwrap();

    // 15 minutes of audio against a 10 minute balance
    let jobs = service
        .admit(&user, 1, vec![file("f1", 15 * 60, None)], None)
        .await;

    assert!(jobs.is_empty());
    assert!(queue.receive(Duration::from_millis(50)).await.unwrap().is_none());
    let texts = chat.sent_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("15"), "mentions required minutes: {}", texts[0]);
    assert!(texts[0].contains("10"), "mentions available minutes: {}", texts[0]);
}

#[tokio::test]
async fn oversize_file_is_rejected_before_balance_math() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 1000)).await.unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let service = admission(store.clone(), queue.clone(), chat.clone());
    let user = store.get_user(1).await.unwrap().unwrap();

    let mut big = file("f1", 60, None);
    big.file_size = 200 * 1024 * 1024;
    let jobs = service.admit(&user, 1, vec![big], None).await;

    assert!(jobs.is_empty());
    assert!(chat.sent_texts()[0].contains("too large"));
}

#[tokio::test]
async fn batch_creates_one_job_per_file_with_one_status_handle() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let service = admission(store.clone(), queue.clone(), chat.clone());
    let user = store.get_user(1).await.unwrap().unwrap();

    let jobs = service
        .admit(
            &user,
            1,
            vec![
                file("f1", 60, Some("G1")),
                file("f2", 60, Some("G1")),
                file("f3", 60, Some("G1")),
            ],
            None,
        )
        .await;

    assert_eq!(jobs.len(), 3);
    // Exactly one status message was posted
    assert_eq!(chat.sent_texts().len(), 1);
    assert!(chat.sent_texts()[0].contains("3 files"));
    // Only the last job carries the handle and the batch flag
    assert!(jobs[0].status_message_id.is_none());
    assert!(jobs[1].status_message_id.is_none());
    assert!(jobs[2].status_message_id.is_some());
    assert!(!jobs[0].is_batch_confirmation);
    assert!(jobs[2].is_batch_confirmation);
}

#[tokio::test]
async fn publish_failure_fails_one_job_and_continues() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue = Arc::new(FlakyQueue {
        inner: MemoryQueue::new(),
        failing_file_id: "f2".to_string(),
    });
    let chat = Arc::new(RecordingChat::default());

    let service = admission(store.clone(), queue.clone(), chat.clone());
    let user = store.get_user(1).await.unwrap().unwrap();

    let jobs = service
        .admit(
            &user,
            1,
            vec![
                file("f1", 60, Some("G1")),
                file("f2", 60, Some("G1")),
                file("f3", 60, Some("G1")),
            ],
            None,
        )
        .await;

    // f1 and f3 made it onto the queue
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].file_id, "f1");
    assert_eq!(jobs[1].file_id, "f3");
    // The failed one is terminal in the job store with the cause recorded
    let failed: Vec<_> = store
        .jobs()
        .into_iter()
        .filter(|j| j.status == JobStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].file_id, "f2");
    let recorded = failed[0].error.as_deref().unwrap();
    assert!(recorded.contains("broker unavailable"), "got {recorded}");
    let notified = chat
        .sent_texts()
        .iter()
        .any(|t| t.contains("Could not queue"));
    assert!(notified, "user was told about the failed file");
}

// Aggregation feeding admission

#[tokio::test(start_paused = true)]
async fn flushed_batch_lands_as_jobs_via_admission() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let service: Arc<dyn BatchDispatch> =
        Arc::new(admission(store.clone(), queue.clone(), chat.clone()));
    let aggregator = Arc::new(BatchAggregator::new(Duration::from_secs(2), service));

    aggregator.submit(1, 1, file("f1", 60, Some("G1"))).await;
    aggregator.submit(1, 1, file("f2", 60, Some("G1"))).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    let first = queue.receive(Duration::from_millis(50)).await.unwrap();
    let second = queue.receive(Duration::from_millis(50)).await.unwrap();
    let third = queue.receive(Duration::from_millis(50)).await.unwrap();
    assert!(first.is_some());
    assert!(second.is_some());
    assert!(third.is_none(), "exactly two jobs were queued");
}

// Worker

#[tokio::test]
async fn worker_completes_a_job_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let job = Job::new(1, 1, "Ann", &file("f1", 120, None), Some(7), false);
    store.put_job(&job).await.unwrap();
    queue.publish(&job).await.unwrap();

    let speech: Arc<dyn SpeechToText> = Arc::new(FixedSpeech {
        text: "short transcript".to_string(),
    });
    let ctx = context(store.clone(), queue.clone(), chat.clone(), speech);
    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = JobWorker::new(ctx, shutdown.clone());

    let handle = tokio::spawn(async move { worker.run(0).await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.store(true, Ordering::SeqCst);
    handle.await.unwrap();

    // Job is terminal, charged two minutes, transcript was delivered
    let stored = store.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    let user = store.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.balance_minutes(), 98.0);
    let records = store.usage_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].minutes_charged, 2);
    let edits = chat.edited.lock().unwrap();
    assert!(edits.iter().any(|(_, t)| t == "short transcript"));
}

#[tokio::test]
async fn worker_marks_the_job_processing_before_conversion() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let job = Job::new(1, 1, "Ann", &file("f1", 120, None), None, false);
    store.put_job(&job).await.unwrap();
    queue.publish(&job).await.unwrap();

    let converter = Arc::new(StatusObservingConverter {
        jobs: store.clone(),
        job_id: job.job_id.clone(),
        observed: Mutex::new(None),
    });
    let speech: Arc<dyn SpeechToText> = Arc::new(FixedSpeech {
        text: "short transcript".to_string(),
    });
    let ctx = context_with_media(
        store.clone(),
        queue.clone(),
        chat.clone(),
        speech,
        converter.clone(),
    );
    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = JobWorker::new(ctx, shutdown.clone());

    let handle = tokio::spawn(async move { worker.run(0).await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.store(true, Ordering::SeqCst);
    handle.await.unwrap();

    // By the conversion stage the stored job is already processing
    let observed = *converter.observed.lock().unwrap();
    assert_eq!(observed, Some(JobStatus::Processing));
    let stored = store.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
}

#[tokio::test]
async fn silent_audio_fails_without_charging() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let job = Job::new(1, 1, "Ann", &file("f1", 120, None), None, false);
    store.put_job(&job).await.unwrap();
    queue.publish(&job).await.unwrap();

    let ctx = context(store.clone(), queue.clone(), chat.clone(), Arc::new(SilentSpeech));
    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = JobWorker::new(ctx, shutdown.clone());

    let handle = tokio::spawn(async move { worker.run(0).await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.store(true, Ordering::SeqCst);
    handle.await.unwrap();

    let stored = store.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    // Nothing charged, nothing logged
    let user = store.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.balance_minutes(), 100.0);
    assert!(store.usage_records().is_empty());
    // The user heard about it
    assert!(chat
        .sent_texts()
        .iter()
        .any(|t| t.contains("No speech")));
}

#[tokio::test]
async fn long_transcripts_go_out_as_documents() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue: Arc<dyn JobQueue> = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let job = Job::new(1, 1, "Ann", &file("f1", 60, None), Some(9), false);
    store.put_job(&job).await.unwrap();
    queue.publish(&job).await.unwrap();

    let long_text = format!("Opening sentence. {}", "word ".repeat(2000));
    let speech: Arc<dyn SpeechToText> = Arc::new(FixedSpeech { text: long_text });
    let ctx = context(store.clone(), queue.clone(), chat.clone(), speech);
    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = JobWorker::new(ctx, shutdown.clone());

    let handle = tokio::spawn(async move { worker.run(0).await });
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.store(true, Ordering::SeqCst);
    handle.await.unwrap();

    let documents = chat.documents.lock().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].1, "Opening sentence.");
    // The progress message is cleaned up once the document replaces it
    assert_eq!(chat.deleted.lock().unwrap().as_slice(), &[9]);
}

// Settlement idempotency

#[tokio::test]
async fn settling_twice_charges_once() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let ledger = Arc::new(BalanceLedger::new(store.clone(), 3));
    let settlement = SettlementService::new(store.clone(), store.clone(), ledger);

    let job = Job::new(1, 1, "Ann", &file("f1", 180, None), None, false);
    store.put_job(&job).await.unwrap();
    let result = JobResult {
        raw_text: "raw".to_string(),
        formatted_text: "formatted".to_string(),
        char_count: 9,
    };

    let first = settlement.settle_success(&job, &result).await.unwrap();
    assert_eq!(first, SettleOutcome::Settled);
    let second = settlement.settle_success(&job, &result).await.unwrap();
    assert_eq!(second, SettleOutcome::AlreadySettled);

    let user = store.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.balance_minutes(), 97.0);
    assert_eq!(store.usage_records().len(), 1);
}

#[tokio::test]
async fn failure_settlement_is_idempotent_and_free() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let ledger = Arc::new(BalanceLedger::new(store.clone(), 3));
    let settlement = SettlementService::new(store.clone(), store.clone(), ledger);

    let job = Job::new(1, 1, "Ann", &file("f1", 180, None), None, false);
    store.put_job(&job).await.unwrap();

    settlement.settle_failure(&job, "boom").await.unwrap();
    let second = settlement.settle_failure(&job, "boom").await.unwrap();
    assert_eq!(second, SettleOutcome::AlreadySettled);

    let user = store.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.balance_minutes(), 100.0);
    assert!(store.usage_records().is_empty());
}

#[tokio::test]
async fn settlement_charges_the_clamped_debit_when_balance_ran_low() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 1)).await.unwrap();
    let ledger = Arc::new(BalanceLedger::new(store.clone(), 3));
    let settlement = SettlementService::new(store.clone(), store.clone(), ledger);

    // Three minutes of work against a one minute balance
    let job = Job::new(1, 1, "Ann", &file("f1", 180, None), None, false);
    store.put_job(&job).await.unwrap();
    let result = JobResult {
        raw_text: "raw".to_string(),
        formatted_text: "formatted".to_string(),
        char_count: 9,
    };

    let outcome = settlement.settle_success(&job, &result).await.unwrap();
    assert_eq!(outcome, SettleOutcome::Settled);

    // The debit clamps at zero instead of failing the settlement
    let user = store.get_user(1).await.unwrap().unwrap();
    assert_eq!(user.balance_minutes(), 0.0);
    assert_eq!(store.usage_records()[0].minutes_charged, 3);
}

// Shutdown

#[tokio::test]
async fn preempted_job_is_left_for_redelivery() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let job = Job::new(1, 1, "Ann", &file("f1", 120, None), None, false);
    store.put_job(&job).await.unwrap();
    queue.publish(&job).await.unwrap();

    // Shutdown is already set when the message arrives
    let speech: Arc<dyn SpeechToText> = Arc::new(FixedSpeech {
        text: "never used".to_string(),
    });
    let ctx = context(store.clone(), queue.clone(), chat.clone(), speech);
    let shutdown = Arc::new(AtomicBool::new(false));
    let worker = JobWorker::new(ctx, shutdown.clone());

    let message = queue
        .receive(Duration::from_millis(100))
        .await
        .unwrap()
        .unwrap();
    // Make the message visible again immediately, as if the worker died
    queue
        .change_visibility(&message.receipt, Duration::from_millis(0))
        .await
        .unwrap();
    shutdown.store(true, Ordering::SeqCst);
    worker.run(0).await;

    // The job is still pending and still on the queue
    let stored = store.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
    let redelivered = queue.receive(Duration::from_millis(100)).await.unwrap();
    assert!(redelivered.is_some());
}

#[tokio::test]
async fn shutdown_after_conversion_abandons_without_acknowledging() {
    let store = Arc::new(MemoryStore::new());
    store.put_user(&User::new(1, "Ann", 100)).await.unwrap();
    let queue = Arc::new(MemoryQueue::new());
    let chat = Arc::new(RecordingChat::default());

    let job = Job::new(1, 1, "Ann", &file("f1", 120, None), None, false);
    store.put_job(&job).await.unwrap();
    queue.publish(&job).await.unwrap();

    let speech: Arc<dyn SpeechToText> = Arc::new(FixedSpeech {
        text: "never used".to_string(),
    });
    let shutdown = Arc::new(AtomicBool::new(false));
    // The flag trips during conversion, right before the expensive stage
    let ctx = context_with_media(
        store.clone(),
        queue.clone(),
        chat.clone(),
        speech,
        Arc::new(ShutdownTrippingConverter {
            flag: shutdown.clone(),
        }),
    );
    let worker = JobWorker::new(ctx, shutdown.clone());

    worker.run(0).await;

    // Abandoned: not terminal, never transcribed, message left unacknowledged
    let stored = store.get_job(&job.job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Processing);
    assert!(store.usage_records().is_empty());
    assert!(chat.edited.lock().unwrap().is_empty());
    assert_eq!(queue.in_flight_len(), 1);
}
