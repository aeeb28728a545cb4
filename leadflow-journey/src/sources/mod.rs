//! Lead record sources
//!
//! A [`JourneySource`] yields the four record collections of one tenant.
//! [`fetch_snapshot`] reads all four concurrently and isolates failures:
//! a source that errors or times out contributes an empty collection.

pub mod index;
pub mod rest;
pub mod sqlite;

pub use index::{RecordIndex, RecordKeys, SourceRecord};
pub use rest::RestSource;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use leadflow_common::{
    ComplianceCheckRecord, ContactRecord, Error, FormSubmissionRecord, MeetingRecord, Result,
};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Read access to the four lead sources of a tenant.
///
/// Implementations return at most their configured fetch limit per call,
/// most recent first.
#[async_trait]
pub trait JourneySource: Send + Sync {
    async fn fetch_contacts(&self, tenant_id: &str) -> Result<Vec<ContactRecord>>;
    async fn fetch_form_submissions(&self, tenant_id: &str) -> Result<Vec<FormSubmissionRecord>>;
    async fn fetch_compliance_checks(&self, tenant_id: &str) -> Result<Vec<ComplianceCheckRecord>>;
    async fn fetch_meetings(&self, tenant_id: &str) -> Result<Vec<MeetingRecord>>;
}

/// Decrypts CPFs that compliance checks store encrypted
pub trait CpfDecryptor: Send + Sync {
    /// Plain CPF, or `None` when the value cannot be decrypted
    fn decrypt(&self, encrypted: &str) -> Option<String>;
}

/// Decryptor for deployments without a CPF key: nothing decrypts
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDecryptor;

impl CpfDecryptor for NoDecryptor {
    fn decrypt(&self, _encrypted: &str) -> Option<String> {
        None
    }
}

/// Everything one aggregation call reads
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub contacts: Vec<ContactRecord>,
    pub forms: Vec<FormSubmissionRecord>,
    pub checks: Vec<ComplianceCheckRecord>,
    pub meetings: Vec<MeetingRecord>,
    /// Sources that failed and were treated as empty
    pub unavailable: Vec<&'static str>,
}

impl SourceSnapshot {
    pub fn record_count(&self) -> usize {
        self.contacts.len() + self.forms.len() + self.checks.len() + self.meetings.len()
    }
}

/// Fetch all four sources of a tenant concurrently.
///
/// Each fetch is bounded by `timeout`. Errors and timeouts are logged and
/// the source degrades to empty; this function itself never fails.
pub async fn fetch_snapshot(source: &dyn JourneySource, tenant_id: &str, timeout: Duration) -> SourceSnapshot {
    let (contacts, forms, checks, meetings) = tokio::join!(
        bounded("contacts", timeout, source.fetch_contacts(tenant_id)),
        bounded("form_submissions", timeout, source.fetch_form_submissions(tenant_id)),
        bounded("compliance_checks", timeout, source.fetch_compliance_checks(tenant_id)),
        bounded("meetings", timeout, source.fetch_meetings(tenant_id)),
    );

    let mut snapshot = SourceSnapshot::default();
    snapshot.contacts = collect(contacts, &mut snapshot.unavailable);
    snapshot.forms = collect(forms, &mut snapshot.unavailable);
    snapshot.checks = collect(checks, &mut snapshot.unavailable);
    snapshot.meetings = collect(meetings, &mut snapshot.unavailable);

    tracing::debug!(
        tenant_id,
        contacts = snapshot.contacts.len(),
        forms = snapshot.forms.len(),
        checks = snapshot.checks.len(),
        meetings = snapshot.meetings.len(),
        "Fetched source snapshot"
    );
    snapshot
}

async fn bounded<T, F>(name: &'static str, timeout: Duration, fetch: F) -> (&'static str, Result<Vec<T>>)
where
    F: Future<Output = Result<Vec<T>>>,
{
    let result = match tokio::time::timeout(timeout, fetch).await {
        Ok(result) => result,
        Err(_) => Err(Error::SourceUnavailable(format!(
            "{} fetch timed out after {}ms",
            name,
            timeout.as_millis()
        ))),
    };
    (name, result)
}

fn collect<T>((name, result): (&'static str, Result<Vec<T>>), unavailable: &mut Vec<&'static str>) -> Vec<T> {
    match result {
        Ok(records) => records,
        Err(e) => {
            warn!(source = name, error = %e, "Source unavailable, continuing without it");
            unavailable.push(name);
            Vec::new()
        }
    }
}
