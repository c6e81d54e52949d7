//! In-memory stand-ins for the service's external collaborators, used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::llm_client::{ImageInput, LlmError};
use crate::models::analysis::{status, AnalysisOutcome, AnalysisSnapshot};
use crate::pipeline::render::{ConvertedResume, RenderedPage, ResumeConverter};
use crate::pipeline::stages::ReviewModel;
use crate::queue::{AnalysisJob, JobQueue, QueueError};
use crate::records::AnalysisStore;
use crate::storage::{BlobStore, StorageError};

// ────────────────────────────────────────────────────────────────────────────
// Records
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryAnalysisStore {
    records: Mutex<HashMap<Uuid, AnalysisSnapshot>>,
    history: Mutex<HashMap<Uuid, Vec<String>>>,
}

impl MemoryAnalysisStore {
    /// Every status written to a record, oldest first.
    pub fn status_history(&self, id: Uuid) -> Vec<String> {
        self.history
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<AnalysisSnapshot> {
        self.records.lock().unwrap().values().cloned().collect()
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut AnalysisSnapshot)) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| anyhow!("record {id} does not exist"))?;
        apply(record);
        record.updated_at = Utc::now();
        self.history
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push(record.status.clone());
        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn create(&self, id: Uuid, name: &str, job_description: &str) -> Result<()> {
        let now = Utc::now();
        self.records.lock().unwrap().insert(
            id,
            AnalysisSnapshot {
                id,
                name: name.to_string(),
                status: status::SAVING.to_string(),
                job_description: job_description.to_string(),
                enhanced_job_description: None,
                result: None,
                analysis: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        self.history
            .lock()
            .unwrap()
            .insert(id, vec![status::SAVING.to_string()]);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<AnalysisSnapshot>> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn set_status(&self, id: Uuid, status: &str) -> Result<()> {
        self.update(id, |r| r.status = status.to_string())
    }

    async fn set_enhanced_job_description(&self, id: Uuid, text: &str) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| anyhow!("record {id} does not exist"))?;
        record.enhanced_job_description = Some(text.to_string());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn complete(&self, id: Uuid, outcome: &AnalysisOutcome) -> Result<()> {
        self.update(id, |r| {
            r.status = status::COMPLETED.to_string();
            r.analysis = Some(outcome.analysis.clone());
            r.result = Some(outcome.result.clone());
            r.error = outcome.error.clone();
        })
    }

    async fn fail(&self, id: Uuid, message: &str) -> Result<()> {
        self.update(id, |r| {
            r.status = status::ERROR.to_string();
            r.error = Some(message.to_string());
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Blobs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Bytes>>,
    fail_writes: AtomicBool,
}

impl MemoryBlobStore {
    pub fn failing_writes() -> Self {
        let store = Self::default();
        store.set_failing_writes(true);
        store
    }

    /// Makes every later `put` fail. Objects already stored stay readable.
    pub fn set_failing_writes(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::S3 {
                key: key.to_string(),
                message: "bucket unavailable".to_string(),
            });
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Queue
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<VecDeque<AnalysisJob>>,
    fail_enqueue: bool,
}

impl MemoryJobQueue {
    /// A queue whose `enqueue` always fails as if Redis were down.
    pub fn failing() -> Self {
        Self {
            fail_enqueue: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn jobs(&self) -> Vec<AnalysisJob> {
        self.jobs.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &AnalysisJob) -> Result<(), QueueError> {
        if self.fail_enqueue {
            return Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))));
        }
        self.jobs.lock().unwrap().push_back(job.clone());
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<AnalysisJob>, QueueError> {
        let next = self.jobs.lock().unwrap().pop_front();
        if next.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(next)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Conversion
// ────────────────────────────────────────────────────────────────────────────

pub struct FakeConverter {
    result: std::result::Result<usize, String>,
}

impl FakeConverter {
    /// Converts any input into `count` placeholder pages.
    pub fn pages(count: usize) -> Self {
        Self { result: Ok(count) }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl ResumeConverter for FakeConverter {
    async fn convert(&self, _pdf: Bytes) -> std::result::Result<ConvertedResume, PipelineError> {
        match &self.result {
            Ok(count) => Ok(ConvertedResume {
                pages: (0..*count)
                    .map(|index| RenderedPage {
                        index,
                        png: Bytes::from(format!("page-{index}")),
                    })
                    .collect(),
                text: Some("Jane Doe, Rust engineer".to_string()),
            }),
            Err(message) => Err(PipelineError::Render(message.clone())),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Model
// ────────────────────────────────────────────────────────────────────────────

type Reply = std::result::Result<String, LlmError>;

/// Answers the first text call and the first vision call with canned replies, recording what
/// it was sent. Later calls get `LlmError::EmptyContent`.
pub struct ScriptedModel {
    text_reply: Mutex<Option<Reply>>,
    vision_reply: Mutex<Option<Reply>>,
    text_prompts: Mutex<Vec<String>>,
    vision_image_counts: Mutex<Vec<usize>>,
}

impl ScriptedModel {
    pub fn new(text_reply: Reply, vision_reply: Reply) -> Self {
        Self {
            text_reply: Mutex::new(Some(text_reply)),
            vision_reply: Mutex::new(Some(vision_reply)),
            text_prompts: Mutex::new(Vec::new()),
            vision_image_counts: Mutex::new(Vec::new()),
        }
    }

    pub fn text_prompts(&self) -> Vec<String> {
        self.text_prompts.lock().unwrap().clone()
    }

    pub fn vision_image_counts(&self) -> Vec<usize> {
        self.vision_image_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewModel for ScriptedModel {
    async fn complete_text(&self, prompt: &str, _system: &str) -> Reply {
        self.text_prompts.lock().unwrap().push(prompt.to_string());
        self.text_reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(LlmError::EmptyContent))
    }

    async fn complete_vision(&self, _prompt: &str, images: &[ImageInput], _system: &str) -> Reply {
        self.vision_image_counts.lock().unwrap().push(images.len());
        self.vision_reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(LlmError::EmptyContent))
    }
}
