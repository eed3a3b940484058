//! Kanzlei Intake: turns inbound accident emails into cases in the
//! case-management backend.

pub mod api;
pub mod backend;
pub mod case;
pub mod config;
pub mod email;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod pipeline;
