//! Background worker: pulls one job at a time off the queue and walks it through
//! conversion → enhancement → scoring, writing the record's status before and after each step.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::models::analysis::status;
use crate::pipeline::render::{ResumeConverter, PAGE_IMAGE_EXTENSION};
use crate::pipeline::stages::{analyze_resume_match, enhance_job_description, ReviewModel};
use crate::queue::{AnalysisJob, JobQueue};
use crate::records::AnalysisStore;
use crate::storage::{page_image_key, BlobStore};

#[derive(Clone)]
pub struct Worker {
    records: Arc<dyn AnalysisStore>,
    blobs: Arc<dyn BlobStore>,
    converter: Arc<dyn ResumeConverter>,
    model: Arc<dyn ReviewModel>,
}

impl Worker {
    pub fn new(
        records: Arc<dyn AnalysisStore>,
        blobs: Arc<dyn BlobStore>,
        converter: Arc<dyn ResumeConverter>,
        model: Arc<dyn ReviewModel>,
    ) -> Self {
        Self {
            records,
            blobs,
            converter,
            model,
        }
    }

    /// Consumes jobs until `shutdown` resolves. A job already in hand is finished first.
    pub async fn run<F>(self, queue: Arc<dyn JobQueue>, poll_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        info!("Worker started (poll interval {}s)", poll_interval.as_secs());

        loop {
            let next = tokio::select! {
                _ = &mut shutdown => break,
                next = queue.dequeue(poll_interval) => next,
            };

            match next {
                Ok(Some(job)) => {
                    // Failures are already logged and written to the record.
                    let _ = self.process_job(&job).await;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Queue unavailable: {e}; retrying in {}s", poll_interval.as_secs());
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        info!("Worker stopped");
    }

    /// Runs one job to completion. Any failure is logged and recorded on the record with
    /// status `error` before being returned.
    pub async fn process_job(&self, job: &AnalysisJob) -> Result<(), PipelineError> {
        let started = Instant::now();
        info!("Processing job {}", job.file_id);

        match self.run_pipeline(job).await {
            Ok(()) => {
                info!(
                    "Job {} completed in {}ms",
                    job.file_id,
                    started.elapsed().as_millis()
                );
                Ok(())
            }
            Err(e) => {
                error!("Job {} failed: {e}", job.file_id);
                if let Err(write_err) = self.records.fail(job.file_id, &e.to_string()).await {
                    error!("Could not record failure for job {}: {write_err:?}", job.file_id);
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, job: &AnalysisJob) -> Result<(), PipelineError> {
        let id = job.file_id;
        self.set_status(id, status::PROCESSING).await?;

        // Conversion
        let step = Instant::now();
        let pdf = self.blobs.get(&job.file_key).await?;
        let resume = self.converter.convert(pdf).await?;
        for page in &resume.pages {
            let key = page_image_key(id, page.index, PAGE_IMAGE_EXTENSION);
            self.blobs
                .put(&key, page.png.clone())
                .await
                .map_err(PipelineError::StoreImages)?;
        }
        info!(
            "Job {id}: converted {} pages in {}ms",
            resume.pages.len(),
            step.elapsed().as_millis()
        );
        self.set_status(id, status::CONVERSION_COMPLETE).await?;

        // Stage 1
        self.set_status(id, status::ENHANCING_JOB_DESCRIPTION).await?;
        let step = Instant::now();
        let enhanced = enhance_job_description(self.model.as_ref(), &job.job_description).await?;
        self.records
            .set_enhanced_job_description(id, &enhanced)
            .await
            .map_err(PipelineError::Record)?;
        info!("Job {id}: stage 1 finished in {}ms", step.elapsed().as_millis());

        // Stage 2
        self.set_status(id, status::ANALYZING_RESUME_MATCH).await?;
        let step = Instant::now();
        let images: Vec<_> = resume.pages.iter().map(|p| p.to_image_input()).collect();
        let outcome = analyze_resume_match(
            self.model.as_ref(),
            &enhanced,
            resume.text.as_deref(),
            &images,
        )
        .await?;
        info!("Job {id}: stage 2 finished in {}ms", step.elapsed().as_millis());

        self.records
            .complete(id, &outcome)
            .await
            .map_err(PipelineError::Record)
    }

    async fn set_status(&self, id: Uuid, status: &str) -> Result<(), PipelineError> {
        self.records
            .set_status(id, status)
            .await
            .map_err(PipelineError::Record)
    }
}
