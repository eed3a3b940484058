//! In-memory job tracker shared by pipeline tasks and status queries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::JobError;
use crate::jobs::state::{CreatedRecords, Job, JobResult, JobStep, StepStatus};

/// Process-wide table of jobs keyed by job id.
///
/// Every mutation happens under the write lock, so a concurrent `get_job`
/// sees either the state before or after an update, never a partial one.
/// Readers always receive an owned snapshot.
///
/// Nothing is persisted. Without `spawn_sweeper` the table grows by one
/// entry per submitted email for the life of the process.
#[derive(Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<String, Job>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job. An existing id is never overwritten.
    pub async fn create_job(&self, job_id: impl Into<String>) -> Result<Job, JobError> {
        let job_id = job_id.into();
        let mut jobs = self.jobs.write().await;

        if jobs.contains_key(&job_id) {
            return Err(JobError::AlreadyExists { id: job_id });
        }

        let job = Job::new(job_id.clone());
        jobs.insert(job_id.clone(), job.clone());
        debug!(job_id = %job_id, "Job created");
        Ok(job)
    }

    pub async fn update_step(
        &self,
        job_id: &str,
        step: JobStep,
        status: StepStatus,
        message: Option<String>,
    ) -> Result<(), JobError> {
        self.with_job(job_id, |job| job.update_step(step, status, message))
            .await?;
        debug!(job_id = %job_id, step = %step, status = %status, "Job step updated");
        Ok(())
    }

    pub async fn complete_job(
        &self,
        job_id: &str,
        case_id: i64,
        case_reference: impl Into<String>,
    ) -> Result<(), JobError> {
        let result = JobResult {
            case_id,
            case_reference: case_reference.into(),
        };
        self.with_job(job_id, |job| job.complete(result)).await
    }

    pub async fn fail_job(&self, job_id: &str, error: impl Into<String>) -> Result<(), JobError> {
        let error = error.into();
        self.with_job(job_id, |job| job.fail(error)).await
    }

    /// Note backend records as they are created.
    pub async fn record_created<F>(&self, job_id: &str, f: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut CreatedRecords),
    {
        self.with_job(job_id, |job| job.record_created(f)).await
    }

    /// Snapshot of a job.
    pub async fn get_job(&self, job_id: &str) -> Result<Job, JobError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound {
                id: job_id.to_string(),
            })
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Drop completed and failed jobs last touched at least `older_than`
    /// ago. Running jobs are never removed. Returns how many were dropped.
    pub async fn purge_finished(&self, older_than: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at <= cutoff));
        before - jobs.len()
    }

    /// Periodically purge finished jobs older than `retention`.
    pub fn spawn_sweeper(self: Arc<Self>, retention: Duration, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = self.purge_finished(retention).await;
                if purged > 0 {
                    let remaining = self.len().await;
                    info!(purged, remaining, "Purged finished jobs");
                }
            }
        })
    }

    async fn with_job<F>(&self, job_id: &str, f: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(job_id).ok_or_else(|| JobError::NotFound {
            id: job_id.to_string(),
        })?;
        f(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::state::JobStatus;

    #[tokio::test]
    async fn create_then_get_returns_initial_snapshot() {
        let tracker = JobTracker::new();
        tracker.create_job("j1").await.unwrap();

        let job = tracker.get_job("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.current_step, JobStep::EmailAnalysis);
        assert_eq!(
            job.step(JobStep::EmailAnalysis).unwrap().status,
            StepStatus::Processing
        );
        for step in [
            JobStep::ClientCreation,
            JobStep::CaseCreation,
            JobStep::DocumentUpload,
            JobStep::TicketCreation,
        ] {
            assert_eq!(job.step(step).unwrap().status, StepStatus::Pending);
        }
    }

    #[tokio::test]
    async fn duplicate_create_does_not_overwrite() {
        let tracker = JobTracker::new();
        tracker.create_job("j1").await.unwrap();
        tracker
            .update_step("j1", JobStep::EmailAnalysis, StepStatus::Completed, None)
            .await
            .unwrap();

        let err = tracker.create_job("j1").await.unwrap_err();
        assert!(matches!(err, JobError::AlreadyExists { .. }));

        let job = tracker.get_job("j1").await.unwrap();
        assert_eq!(
            job.step(JobStep::EmailAnalysis).unwrap().status,
            StepStatus::Completed
        );
    }

    #[tokio::test]
    async fn update_step_then_get_reflects_change() {
        let tracker = JobTracker::new();
        tracker.create_job("j1").await.unwrap();
        tracker
            .update_step(
                "j1",
                JobStep::CaseCreation,
                StepStatus::Completed,
                Some("done".into()),
            )
            .await
            .unwrap();

        let job = tracker.get_job("j1").await.unwrap();
        let state = job.step(JobStep::CaseCreation).unwrap();
        assert_eq!(state.status, StepStatus::Completed);
        assert_eq!(state.message, "done");
        assert_eq!(job.current_step, JobStep::CaseCreation);
    }

    #[tokio::test]
    async fn complete_attaches_result() {
        let tracker = JobTracker::new();
        tracker.create_job("j1").await.unwrap();
        tracker.complete_job("j1", 42, "AZ-42").await.unwrap();

        let job = tracker.get_job("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(
            job.result,
            Some(JobResult {
                case_id: 42,
                case_reference: "AZ-42".into()
            })
        );

        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["result"]["case_id"], 42);
        assert_eq!(json["result"]["case_reference"], "AZ-42");
    }

    #[tokio::test]
    async fn terminal_job_ignores_later_updates() {
        let tracker = JobTracker::new();
        tracker.create_job("j1").await.unwrap();
        tracker.fail_job("j1", "Backend API Error: 500").await.unwrap();

        let err = tracker
            .update_step("j1", JobStep::ClientCreation, StepStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Terminal { .. }));
        assert!(tracker.complete_job("j1", 1, "AZ-1").await.is_err());

        let job = tracker.get_job("j1").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Backend API Error: 500"));
        assert_eq!(
            job.step(JobStep::ClientCreation).unwrap().status,
            StepStatus::Pending
        );
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let tracker = JobTracker::new();
        assert!(matches!(
            tracker.get_job("nope").await,
            Err(JobError::NotFound { .. })
        ));
        assert!(matches!(
            tracker
                .update_step("nope", JobStep::CaseCreation, StepStatus::Processing, None)
                .await,
            Err(JobError::NotFound { .. })
        ));
        assert!(matches!(
            tracker.fail_job("nope", "x").await,
            Err(JobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_tracker() {
        let tracker = JobTracker::new();
        tracker.create_job("j1").await.unwrap();

        let mut snapshot = tracker.get_job("j1").await.unwrap();
        snapshot.error = Some("tampered".into());
        snapshot.created.case_id = Some(99);

        let fresh = tracker.get_job("j1").await.unwrap();
        assert!(fresh.error.is_none());
        assert!(fresh.created.case_id.is_none());
    }

    #[tokio::test]
    async fn record_created_accumulates() {
        let tracker = JobTracker::new();
        tracker.create_job("j1").await.unwrap();
        tracker
            .record_created("j1", |r| r.client_id = Some(11))
            .await
            .unwrap();
        tracker
            .record_created("j1", |r| r.documents_uploaded += 2)
            .await
            .unwrap();

        let job = tracker.get_job("j1").await.unwrap();
        assert_eq!(job.created.client_id, Some(11));
        assert_eq!(job.created.documents_uploaded, 2);
    }

    #[tokio::test]
    async fn purge_drops_only_finished_jobs() {
        let tracker = JobTracker::new();
        tracker.create_job("done").await.unwrap();
        tracker.complete_job("done", 1, "AZ-1").await.unwrap();
        tracker.create_job("broken").await.unwrap();
        tracker.fail_job("broken", "Backend API Error: 500").await.unwrap();
        tracker.create_job("running").await.unwrap();

        assert_eq!(tracker.purge_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(tracker.len().await, 3);

        assert_eq!(tracker.purge_finished(Duration::ZERO).await, 2);
        assert_eq!(tracker.len().await, 1);
        assert!(tracker.get_job("running").await.is_ok());
        assert!(matches!(
            tracker.get_job("done").await,
            Err(JobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn sweeper_purges_in_background() {
        let tracker = Arc::new(JobTracker::new());
        tracker.create_job("done").await.unwrap();
        tracker.complete_job("done", 1, "AZ-1").await.unwrap();

        let handle = Arc::clone(&tracker).spawn_sweeper(Duration::ZERO, Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(5), async {
            while tracker.len().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sweeper did not purge");
        handle.abort();
    }

    #[tokio::test]
    async fn concurrent_jobs_are_independent() {
        let tracker = Arc::new(JobTracker::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                let id = format!("job-{i}");
                tracker.create_job(id.clone()).await.unwrap();
                tracker
                    .update_step(&id, JobStep::EmailAnalysis, StepStatus::Completed, None)
                    .await
                    .unwrap();
                tracker.complete_job(&id, i, format!("AZ-{i}")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tracker.len().await, 16);
        let job = tracker.get_job("job-7").await.unwrap();
        assert_eq!(job.result.unwrap().case_reference, "AZ-7");
    }
}
