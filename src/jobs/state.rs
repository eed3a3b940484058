//! Job record and step state machine.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Top-level status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs accept no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Status of a single pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StepStatus {
    /// Steps move forward only: a pending step may be started or settled
    /// directly, a running step may only be settled, settled steps are final.
    pub fn can_transition_to(&self, target: StepStatus) -> bool {
        use StepStatus::*;

        matches!(
            (self, target),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StepStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(JobError::UnknownStatus(other.to_string())),
        }
    }
}

/// The fixed step sequence of the email-to-case pipeline.
///
/// Declaration order is pipeline order; the derived `Ord` keeps the step
/// map sorted that way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    EmailAnalysis,
    ClientCreation,
    CaseCreation,
    DocumentUpload,
    TicketCreation,
}

impl JobStep {
    pub const ALL: [JobStep; 5] = [
        Self::EmailAnalysis,
        Self::ClientCreation,
        Self::CaseCreation,
        Self::DocumentUpload,
        Self::TicketCreation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailAnalysis => "email_analysis",
            Self::ClientCreation => "client_creation",
            Self::CaseCreation => "case_creation",
            Self::DocumentUpload => "document_upload",
            Self::TicketCreation => "ticket_creation",
        }
    }

    /// Message shown while the step has not reported anything yet.
    fn initial_message(&self) -> &'static str {
        match self {
            Self::EmailAnalysis => "E-Mail wird analysiert...",
            Self::ClientCreation => "Mandant erstellen",
            Self::CaseCreation => "Akte erstellen",
            Self::DocumentUpload => "Dokumente hochladen",
            Self::TicketCreation => "Ticket erstellen",
        }
    }
}

impl std::fmt::Display for JobStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStep {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| JobError::UnknownStep(s.to_string()))
    }
}

/// Progress of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    pub status: StepStatus,
    pub message: String,
}

/// Outcome of a successful job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub case_id: i64,
    pub case_reference: String,
}

/// Backend records created so far. On a failed job these are the records
/// left behind for manual cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecords {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insurer_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<i64>,
    pub documents_uploaded: usize,
}

/// One run of the email-to-case pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub current_step: JobStep,
    pub steps: BTreeMap<JobStep, StepState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created: CreatedRecords,
}

impl Job {
    /// A fresh job: first step running, the rest pending.
    pub fn new(job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        let steps = JobStep::ALL
            .into_iter()
            .map(|step| {
                let status = if step == JobStep::EmailAnalysis {
                    StepStatus::Processing
                } else {
                    StepStatus::Pending
                };
                (
                    step,
                    StepState {
                        status,
                        message: step.initial_message().to_string(),
                    },
                )
            })
            .collect();

        Self {
            job_id: job_id.into(),
            status: JobStatus::Processing,
            current_step: JobStep::EmailAnalysis,
            steps,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
            created: CreatedRecords::default(),
        }
    }

    pub fn step(&self, step: JobStep) -> Option<&StepState> {
        self.steps.get(&step)
    }

    /// Set a step's status (and message, if given) and make it current.
    pub fn update_step(
        &mut self,
        step: JobStep,
        status: StepStatus,
        message: Option<String>,
    ) -> Result<(), JobError> {
        self.ensure_active()?;

        let state = self
            .steps
            .get_mut(&step)
            .ok_or_else(|| JobError::UnknownStep(step.to_string()))?;

        if !state.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                id: self.job_id.clone(),
                step: step.to_string(),
                from: state.status.to_string(),
                to: status.to_string(),
            });
        }

        state.status = status;
        if let Some(message) = message {
            state.message = message;
        }
        self.current_step = step;
        self.touch();
        Ok(())
    }

    pub fn complete(&mut self, result: JobResult) -> Result<(), JobError> {
        self.ensure_active()?;
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.touch();
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), JobError> {
        self.ensure_active()?;
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.touch();
        Ok(())
    }

    pub fn record_created<F>(&mut self, f: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut CreatedRecords),
    {
        self.ensure_active()?;
        f(&mut self.created);
        self.touch();
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), JobError> {
        if self.status.is_terminal() {
            return Err(JobError::Terminal {
                id: self.job_id.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Refresh `updated_at`, never moving it backwards.
    fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.updated_at);
    }
}
