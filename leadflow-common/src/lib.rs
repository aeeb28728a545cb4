//! # Leadflow Common Library
//!
//! Shared code for the leadflow services:
//! - Error type
//! - Configuration loading
//! - Identity key normalization (phone, CPF, name)
//! - Tri-state verdict predicates
//! - Source record and lead journey models
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod journey;
pub mod normalize;
pub mod records;
pub mod time;
pub mod verdict;

pub use error::{Error, Result};
pub use journey::{
    JourneyHistory, LeadJourney, MatchLevel, MatchTrace, PipelineStage, TimelineEvent, TimelineEventType,
};
pub use records::{
    ComplianceCheckRecord, ComplianceStatus, ContactRecord, FormStatus, FormSubmissionRecord,
    LeadUpdate, MeetingRecord, MeetingStatus,
};
pub use verdict::Verdict;
