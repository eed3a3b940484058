//! Email-to-case pipeline.
//!
//! - `driver`: `CasePipeline`, the background run behind every job
//! - `payload`: mapping `CaseData` onto backend request bodies

pub mod driver;
pub mod payload;

pub use driver::{CasePipeline, EmailSubmission, UploadedFile};
