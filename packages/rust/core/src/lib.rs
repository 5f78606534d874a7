//! Core pipeline orchestration and domain logic for gradreach.
//!
//! This crate ties together collection, parsing, validation, message
//! composition, and file output into the end-to-end outreach workflow
//! (see [`pipeline::run_outreach`]).

pub mod compose;
pub mod parser;
pub mod pipeline;
pub mod validator;
pub mod writer;

pub use compose::{MessageComposer, compose};
pub use parser::{ParseMode, parse};
pub use pipeline::{
    CompletionStatus, OutreachSettings, OutreachSummary, PipelineState, ProgressReporter,
    RunFailure, RunOutcome, RunReport, SilentProgress, orchestrate, run_outreach,
};
pub use validator::validate;
pub use writer::{OutreachWriter, WriteCollision, WriteResult, destination_key};
