//! SQLite-backed store
//!
//! One handle serves the aggregator (as a [`JourneySource`]) and the
//! reconciliation poller (as [`ComplianceResultProvider`] and [`LeadStore`]).

use super::JourneySource;
use crate::db;
use crate::poller::{ComplianceResultProvider, LeadStore};
use async_trait::async_trait;
use leadflow_common::normalize::{normalize_id, normalize_phone};
use leadflow_common::{
    ComplianceCheckRecord, ContactRecord, Error, FormSubmissionRecord, LeadUpdate, MeetingRecord, Result,
};
use sqlx::SqlitePool;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    fetch_limit: u32,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, fetch_limit: u32) -> Self {
        Self { pool, fetch_limit }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Tag table-level failures so the aggregator reports them per source
fn unavailable(table: &str, e: Error) -> Error {
    if e.is_missing_table() {
        Error::SourceUnavailable(format!("{}: {}", table, e))
    } else {
        e
    }
}

#[async_trait]
impl JourneySource for SqliteStore {
    async fn fetch_contacts(&self, tenant_id: &str) -> Result<Vec<ContactRecord>> {
        db::contacts::fetch_contacts(&self.pool, tenant_id, self.fetch_limit)
            .await
            .map_err(|e| unavailable("contacts", e))
    }

    async fn fetch_form_submissions(&self, tenant_id: &str) -> Result<Vec<FormSubmissionRecord>> {
        db::forms::fetch_form_submissions(&self.pool, tenant_id, self.fetch_limit)
            .await
            .map_err(|e| unavailable("form_submissions", e))
    }

    async fn fetch_compliance_checks(&self, tenant_id: &str) -> Result<Vec<ComplianceCheckRecord>> {
        db::compliance::fetch_compliance_checks(&self.pool, tenant_id, self.fetch_limit)
            .await
            .map_err(|e| unavailable("compliance_checks", e))
    }

    async fn fetch_meetings(&self, tenant_id: &str) -> Result<Vec<MeetingRecord>> {
        db::meetings::fetch_meetings(&self.pool, tenant_id, self.fetch_limit)
            .await
            .map_err(|e| unavailable("meetings", e))
    }
}

#[async_trait]
impl ComplianceResultProvider for SqliteStore {
    /// Unprocessed approved/rejected results.
    ///
    /// Older provider schemas lack `person_phone`; in that case the phone is
    /// backfilled from form submissions sharing the normalized CPF.
    async fn fetch_pending_results(&self) -> Result<Vec<ComplianceCheckRecord>> {
        match db::compliance::fetch_pending_with_phone(&self.pool, self.fetch_limit).await {
            Ok(results) => Ok(results),
            Err(e) if e.is_missing_column() => {
                info!("compliance_checks has no person_phone column, backfilling phones from form submissions");
                let mut results = db::compliance::fetch_pending_without_phone(&self.pool, self.fetch_limit).await?;
                let phones = db::forms::phones_by_cpf(&self.pool).await?;

                let mut backfilled = 0usize;
                for result in results.iter_mut() {
                    let cpf_key = result.cpf.as_deref().map(normalize_id).unwrap_or_default();
                    if let Some(phone) = phones.get(&cpf_key) {
                        result.person_phone = Some(phone.clone());
                        backfilled += 1;
                    }
                }
                debug!(total = results.len(), backfilled, "Backfilled compliance result phones");
                Ok(results)
            }
            Err(e) => Err(e),
        }
    }

    async fn mark_processed(&self, result_id: &str) -> Result<()> {
        if db::compliance::mark_processed(&self.pool, result_id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("compliance result {}", result_id)))
        }
    }

    async fn is_processed(&self, result_id: &str) -> Result<bool> {
        db::compliance::is_processed(&self.pool, result_id).await
    }
}

#[async_trait]
impl LeadStore for SqliteStore {
    /// Rows written by other tools since the last lookup get their
    /// normalized keys filled first, so they are matchable immediately.
    async fn find_leads_by_cpf(&self, cpf: &str) -> Result<Vec<ContactRecord>> {
        db::contacts::backfill_normalized_keys(&self.pool).await?;
        db::contacts::find_by_cpf(&self.pool, &normalize_id(cpf)).await
    }

    async fn find_leads_by_phone(&self, phone: &str) -> Result<Vec<ContactRecord>> {
        db::contacts::backfill_normalized_keys(&self.pool).await?;
        db::contacts::find_by_phone(&self.pool, &normalize_phone(phone)).await
    }

    async fn apply_lead_update(&self, lead_id: &str, update: &LeadUpdate) -> Result<()> {
        match db::contacts::apply_lead_update(&self.pool, lead_id, update).await? {
            0 => Err(Error::NotFound(format!("lead {}", lead_id))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_table_reports_source_unavailable() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteStore::new(pool, 10);

        let err = store.fetch_meetings("t1").await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_pending_results_backfill_phone_on_older_schema() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::init_tables(&pool).await.unwrap();
        // Rebuild compliance_checks the way older provider versions shipped it
        sqlx::query("DROP TABLE compliance_checks").execute(&pool).await.unwrap();
        sqlx::query(
            "CREATE TABLE compliance_checks (id TEXT PRIMARY KEY, tenant_id TEXT NOT NULL, cpf TEXT, \
             cpf_encrypted TEXT, person_name TEXT, status TEXT, aprovado TEXT, risk_score REAL, \
             lawsuits TEXT, consulted_at TEXT, payload TEXT, processed_at TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO compliance_checks (id, tenant_id, cpf, status) VALUES \
             ('r1', 't1', '123.456.789-09', 'approved'), ('r2', 't1', '98765432100', 'rejected')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO form_submissions (id, tenant_id, contact_cpf, contact_phone) \
             VALUES ('f1', 't1', '12345678909', '31999972368')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = SqliteStore::new(pool, 10);
        let pending = store.fetch_pending_results().await.unwrap();
        let by_id = |id: &str| pending.iter().find(|r| r.id == id).unwrap().person_phone.clone();
        assert_eq!(by_id("r1").as_deref(), Some("5531999972368"));
        assert_eq!(by_id("r2"), None);
    }

    #[tokio::test]
    async fn test_lead_lookup_sees_rows_inserted_without_normalized_keys() {
        let pool = db::init_in_memory_pool().await.unwrap();
        let store = SqliteStore::new(pool.clone(), 10);
        assert!(store.find_leads_by_cpf("12345678909").await.unwrap().is_empty());

        sqlx::query(
            "INSERT INTO contacts (id, tenant_id, telefone, cpf) \
             VALUES ('x', 't1', '(31) 99997-2368', '123.456.789-09')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let by_cpf = store.find_leads_by_cpf("12345678909").await.unwrap();
        assert_eq!(by_cpf.len(), 1);
        assert_eq!(by_cpf[0].id, "x");
        let by_phone = store.find_leads_by_phone("31999972368").await.unwrap();
        assert_eq!(by_phone.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_update_to_unknown_lead_is_not_found() {
        let pool = db::init_in_memory_pool().await.unwrap();
        let store = SqliteStore::new(pool, 10);
        let update = LeadUpdate {
            status: "approved".to_string(),
            label: "CPF Aprovado".to_string(),
            checked_at: chrono::Utc::now(),
        };
        assert!(matches!(
            store.apply_lead_update("nope", &update).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(store.mark_processed("nope").await, Err(Error::NotFound(_))));
    }
}
