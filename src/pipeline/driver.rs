//! Pipeline driver: one background run per job, from email bytes to a
//! case with documents and a review ticket.
//!
//! Flow:
//! 1. Parse the email
//! 2. Extract case data (never fails, may be degraded)
//! 3. Create client, resolve insurer, create case
//! 4. Upload the email and every attachment
//! 5. Create the review ticket and complete the job
//!
//! Backend failures abort the run and fail the job. Records created before
//! the failure stay in the backend and are listed in `Job::created`.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{CaseBackend, DocumentUpload};
use crate::email::{EmailAttachment, EmailParser, guess_mime, supported_mime};
use crate::error::{JobError, PipelineError};
use crate::jobs::{JobResult, JobStep, JobTracker, StepStatus};
use crate::llm::{Attachment, CaseExtractor, ExtractionRequest};
use crate::pipeline::payload;

/// A file uploaded next to the email.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Input of one pipeline run.
#[derive(Debug, Clone)]
pub struct EmailSubmission {
    pub email_filename: String,
    pub email_bytes: Vec<u8>,
    pub attachments: Vec<UploadedFile>,
}

/// Runs submissions against the tracker, extractor and backend.
#[derive(Clone)]
pub struct CasePipeline {
    tracker: Arc<JobTracker>,
    extractor: Arc<CaseExtractor>,
    backend: Arc<dyn CaseBackend>,
    parser: Arc<EmailParser>,
}

impl CasePipeline {
    pub fn new(
        tracker: Arc<JobTracker>,
        extractor: Arc<CaseExtractor>,
        backend: Arc<dyn CaseBackend>,
        parser: Arc<EmailParser>,
    ) -> Self {
        Self {
            tracker,
            extractor,
            backend,
            parser,
        }
    }

    pub fn tracker(&self) -> &Arc<JobTracker> {
        &self.tracker
    }

    pub fn extractor(&self) -> &Arc<CaseExtractor> {
        &self.extractor
    }

    /// Register a job under a fresh id and run it in the background.
    pub async fn submit(&self, submission: EmailSubmission) -> Result<String, JobError> {
        let job_id = Uuid::new_v4().to_string();
        self.tracker.create_job(job_id.clone()).await?;

        let pipeline = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run(&id, submission).await {
                debug!(job_id = %id, error = %e, "Background job ended with failure");
            }
        });

        info!(job_id = %job_id, "Pipeline job spawned");
        Ok(job_id)
    }

    /// Run the pipeline for an existing job and record the outcome.
    pub async fn run(
        &self,
        job_id: &str,
        submission: EmailSubmission,
    ) -> Result<JobResult, PipelineError> {
        let mut current = JobStep::EmailAnalysis;

        match self.execute(job_id, submission, &mut current).await {
            Ok(result) => {
                note(
                    job_id,
                    self.tracker
                        .complete_job(job_id, result.case_id, result.case_reference.clone())
                        .await,
                );
                info!(
                    job_id = %job_id,
                    case_id = result.case_id,
                    case_reference = %result.case_reference,
                    "Pipeline job completed"
                );
                Ok(result)
            }
            Err(e) => {
                let message = e.to_string();
                error!(job_id = %job_id, step = %current, error = %message, "Pipeline job failed");
                note(
                    job_id,
                    self.tracker
                        .update_step(job_id, current, StepStatus::Failed, Some(message.clone()))
                        .await,
                );
                note(job_id, self.tracker.fail_job(job_id, message).await);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job_id: &str,
        submission: EmailSubmission,
        current: &mut JobStep,
    ) -> Result<JobResult, PipelineError> {
        let EmailSubmission {
            email_filename,
            email_bytes,
            attachments: uploaded,
        } = submission;

        // Parse
        let email = self.parser.parse(&email_bytes, &email_filename)?;
        let attachments: Vec<EmailAttachment> = email
            .attachments
            .iter()
            .cloned()
            .chain(uploaded.into_iter().map(|file| EmailAttachment {
                mime_type: guess_mime(&file.filename),
                filename: file.filename,
                content: file.content,
            }))
            .collect();
        self.advance(
            job_id,
            current,
            JobStep::ClientCreation,
            format!("E-Mail analysiert ({} Anhänge)", attachments.len()),
        )
        .await;

        // Extract
        let request = ExtractionRequest {
            text: email.analysis_text(),
            attachments: attachments
                .iter()
                .filter_map(|a| {
                    supported_mime(&a.filename).map(|mime| Attachment {
                        filename: a.filename.clone(),
                        mime_type: mime.to_string(),
                        data: a.content.clone(),
                    })
                })
                .collect(),
        };
        let data = self.extractor.extract_case_data(&request).await;

        // Client
        let client = self
            .backend
            .create_client(&payload::client_payload(&data.mandant))
            .await?;
        note(
            job_id,
            self.tracker
                .record_created(job_id, |c| c.client_id = Some(client.id))
                .await,
        );
        info!(job_id = %job_id, client_id = client.id, "Client created");
        self.advance(
            job_id,
            current,
            JobStep::CaseCreation,
            format!("Mandant angelegt (ID {})", client.id),
        )
        .await;

        // Insurer and case
        let insurer = self
            .backend
            .resolve_or_create_insurer(&payload::insurer_payload(&data))
            .await?;
        note(
            job_id,
            self.tracker
                .record_created(job_id, |c| c.insurer_id = Some(insurer.id))
                .await,
        );

        let case = self
            .backend
            .create_case(&payload::case_payload(
                &data,
                client.id,
                insurer.id,
                &email.subject,
            ))
            .await?;
        note(
            job_id,
            self.tracker
                .record_created(job_id, |c| c.case_id = Some(case.id))
                .await,
        );
        info!(job_id = %job_id, case_id = case.id, case_reference = %case.aktenzeichen, "Case created");
        self.advance(
            job_id,
            current,
            JobStep::DocumentUpload,
            format!("Akte {} angelegt", case.aktenzeichen),
        )
        .await;

        // Documents: the email first, then each attachment
        let email_title = match email.subject.trim() {
            "" => "E-Mail".to_string(),
            subject => format!("E-Mail: {subject}"),
        };
        let uploads = std::iter::once(DocumentUpload {
            case_id: case.id,
            filename: email_filename,
            title: email_title,
            content: email_bytes,
        })
        .chain(attachments.into_iter().map(|a| DocumentUpload {
            case_id: case.id,
            title: a.filename.clone(),
            filename: a.filename,
            content: a.content,
        }));

        let mut uploaded_count = 0;
        for upload in uploads {
            let filename = upload.filename.clone();
            self.backend.upload_document(upload).await?;
            uploaded_count += 1;
            note(
                job_id,
                self.tracker
                    .record_created(job_id, |c| c.documents_uploaded += 1)
                    .await,
            );
            info!(job_id = %job_id, filename = %filename, "Document uploaded");
        }
        self.advance(
            job_id,
            current,
            JobStep::TicketCreation,
            format!("{uploaded_count} Dokumente hochgeladen"),
        )
        .await;

        // Ticket
        let today = Local::now().date_naive();
        self.backend
            .create_ticket(&payload::ticket_payload(
                &data,
                case.id,
                &case.aktenzeichen,
                today,
            ))
            .await?;
        note(
            job_id,
            self.tracker
                .update_step(
                    job_id,
                    JobStep::TicketCreation,
                    StepStatus::Completed,
                    Some("Ticket erstellt".to_string()),
                )
                .await,
        );

        Ok(JobResult {
            case_id: case.id,
            case_reference: case.aktenzeichen,
        })
    }

    /// Complete `current` with `message` and start `next`.
    async fn advance(&self, job_id: &str, current: &mut JobStep, next: JobStep, message: String) {
        note(
            job_id,
            self.tracker
                .update_step(job_id, *current, StepStatus::Completed, Some(message))
                .await,
        );
        note(
            job_id,
            self.tracker
                .update_step(job_id, next, StepStatus::Processing, None)
                .await,
        );
        *current = next;
    }
}

/// Tracker failures never abort a run.
fn note(job_id: &str, result: Result<(), JobError>) {
    if let Err(e) = result {
        warn!(job_id = %job_id, error = %e, "Job tracker update ignored");
    }
}
