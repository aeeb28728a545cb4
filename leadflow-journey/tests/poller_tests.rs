//! Reconciliation poller against the SQLite store

mod helpers;

use async_trait::async_trait;
use helpers::*;
use leadflow_common::{ComplianceCheckRecord, Error, PipelineStage, Result};
use leadflow_journey::poller::{
    ComplianceResultProvider, LocalMarkerFile, PollerConfig, ProcessedMarkers, ReconciliationPoller,
};
use leadflow_journey::sources::SqliteStore;
use serde_json::json;
use std::sync::Arc;

async fn sqlite_poller(store: &Arc<SqliteStore>, dir: &tempfile::TempDir) -> Arc<ReconciliationPoller> {
    let local = LocalMarkerFile::open(dir.path().join("processed_markers.json")).await;
    let markers = ProcessedMarkers::new(store.clone(), local);
    Arc::new(ReconciliationPoller::new(
        store.clone(),
        store.clone(),
        markers,
        PollerConfig::default(),
    ))
}

/// Reads from the store but cannot write markers (read-only replica)
struct ReadOnlyProvider(Arc<SqliteStore>);

#[async_trait]
impl ComplianceResultProvider for ReadOnlyProvider {
    async fn fetch_pending_results(&self) -> Result<Vec<ComplianceCheckRecord>> {
        self.0.fetch_pending_results().await
    }

    async fn mark_processed(&self, _result_id: &str) -> Result<()> {
        Err(Error::SourceUnavailable("attempt to write a readonly database".to_string()))
    }

    async fn is_processed(&self, result_id: &str) -> Result<bool> {
        self.0.is_processed(result_id).await
    }
}

#[tokio::test]
async fn test_results_update_leads_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let (pool, store) = create_test_store().await;
    seed_contacts(
        &pool,
        json!([
            {"id": "c1", "telefone": "31999972368", "cpf": "123.456.789-09"},
            {"id": "c2", "telefone": "31988887777"},
            {"id": "c3", "telefone": "31977776666"}
        ]),
    )
    .await;
    seed_checks(
        &pool,
        json!([
            {"id": "k1", "cpf": "12345678909", "status": "approved"},
            {"id": "k2", "cpf": "98765432100", "personPhone": "(31) 98888-7777", "status": "rejected"},
            {"id": "k3", "cpf": "11111111111", "status": "pending"}
        ]),
    )
    .await;

    let poller = sqlite_poller(&store, &dir).await;
    let first = poller.poll_once().await;
    assert_eq!(first.processed_count, 2);
    assert_eq!(first.applied_count, 2);
    assert!(first.error.is_none());

    assert_eq!(
        lead_status(&pool, "c1").await,
        (Some("approved".to_string()), Some("CPF Aprovado".to_string()))
    );
    assert_eq!(
        lead_status(&pool, "c2").await,
        (Some("rejected".to_string()), Some("CPF Reprovado".to_string()))
    );
    assert_eq!(lead_status(&pool, "c3").await, (None, None));

    // Stamp the lead rows so a second application would be visible
    sqlx::query("UPDATE contacts SET cpf_label = 'manual'").execute(&pool).await.unwrap();

    let second = poller.poll_once().await;
    assert_eq!(second.processed_count, 0);
    assert_eq!(lead_status(&pool, "c1").await.1.as_deref(), Some("manual"));

    let status = poller.status().await;
    assert_eq!(status.runs, 2);
    assert_eq!(status.total_processed, 2);
    assert_eq!(status.local_markers, 0);
}

#[tokio::test]
async fn test_lead_written_by_another_tool_after_startup_is_updated() {
    let dir = tempfile::tempdir().unwrap();
    let (pool, store) = create_test_store().await;
    let poller = sqlite_poller(&store, &dir).await;

    // No normalized key columns, as a foreign writer would leave them
    sqlx::query(
        "INSERT INTO contacts (id, tenant_id, telefone, cpf) VALUES ('x', 't1', '(31) 99997-2368', '123.456.789-09')",
    )
    .execute(&pool)
    .await
    .unwrap();
    seed_checks(
        &pool,
        json!({"id": "k1", "cpf": "12345678909", "personPhone": "31999972368", "status": "approved"}),
    )
    .await;

    let outcome = poller.poll_once().await;
    assert_eq!(outcome.applied_count, 1);
    assert_eq!(outcome.unmatched_count, 0);
    assert_eq!(
        lead_status(&pool, "x").await,
        (Some("approved".to_string()), Some("CPF Aprovado".to_string()))
    );
}

#[tokio::test]
async fn test_phone_backfilled_from_forms_on_older_schema() {
    let dir = tempfile::tempdir().unwrap();
    let (pool, store) = create_test_store().await;
    seed_contacts(&pool, json!({"id": "c1", "telefone": "31999972368"})).await;
    seed_forms(
        &pool,
        json!({"id": "f1", "contactPhone": "31999972368", "contactCpf": "123.456.789-09", "passed": true}),
    )
    .await;
    seed_checks(&pool, json!({"id": "k1", "cpf": "12345678909", "status": "reprovado"})).await;
    sqlx::query("ALTER TABLE compliance_checks DROP COLUMN person_phone")
        .execute(&pool)
        .await
        .unwrap();

    let outcome = sqlite_poller(&store, &dir).await.poll_once().await;

    assert_eq!(outcome.applied_count, 1);
    assert_eq!(lead_status(&pool, "c1").await.0.as_deref(), Some("rejected"));
}

#[tokio::test]
async fn test_unmatched_result_is_marked_and_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let (pool, store) = create_test_store().await;
    seed_checks(&pool, json!({"id": "k1", "cpf": "12345678909", "status": "approved"})).await;

    let poller = sqlite_poller(&store, &dir).await;
    let outcome = poller.poll_once().await;
    assert_eq!(outcome.unmatched_count, 1);
    assert!(leadflow_journey::db::compliance::is_processed(&pool, "k1").await.unwrap());

    // A lead created later does not resurrect the result
    seed_contacts(&pool, json!({"id": "c1", "telefone": "31999972368", "cpf": "12345678909"})).await;
    assert_eq!(poller.poll_once().await.processed_count, 0);
    assert_eq!(lead_status(&pool, "c1").await, (None, None));
}

#[tokio::test]
async fn test_read_only_provider_falls_back_to_marker_file() {
    let dir = tempfile::tempdir().unwrap();
    let marker_path = dir.path().join("processed_markers.json");
    let (pool, store) = create_test_store().await;
    seed_contacts(&pool, json!({"id": "c1", "telefone": "31999972368", "cpf": "12345678909"})).await;
    seed_checks(&pool, json!({"id": "k1", "cpf": "12345678909", "status": "approved"})).await;

    let provider: Arc<dyn ComplianceResultProvider> = Arc::new(ReadOnlyProvider(store.clone()));
    let build = |local: LocalMarkerFile| {
        Arc::new(ReconciliationPoller::new(
            provider.clone(),
            store.clone(),
            ProcessedMarkers::new(provider.clone(), local),
            PollerConfig::default(),
        ))
    };

    let poller = build(LocalMarkerFile::open(&marker_path).await);
    assert_eq!(poller.poll_once().await.applied_count, 1);
    assert!(!leadflow_journey::db::compliance::is_processed(&pool, "k1").await.unwrap());
    assert!(marker_path.exists());

    sqlx::query("UPDATE contacts SET cpf_label = 'manual'").execute(&pool).await.unwrap();

    // A restarted poller reads the marker file and skips k1
    let restarted = build(LocalMarkerFile::open(&marker_path).await);
    assert_eq!(restarted.poll_once().await.processed_count, 0);
    assert_eq!(lead_status(&pool, "c1").await.1.as_deref(), Some("manual"));
}

#[tokio::test]
async fn test_reconciled_status_feeds_the_classifier() {
    let dir = tempfile::tempdir().unwrap();
    let (pool, store) = create_test_store().await;
    seed_contacts(&pool, json!({"id": "c1", "telefone": "31999972368", "cpf": "12345678909"})).await;
    seed_checks(
        &pool,
        json!({"id": "k1", "cpf": "12345678909", "status": "approved", "tenantId": "other-tenant"}),
    )
    .await;

    let service = journey_service(&store);
    let before = service.get_lead_journey_by_phone(TENANT, "31999972368").await.unwrap();
    assert_eq!(before.pipeline_status, PipelineStage::ContatoInicial);

    sqlite_poller(&store, &dir).await.poll_once().await;

    let after = service.get_lead_journey_by_phone(TENANT, "31999972368").await.unwrap();
    assert_eq!(after.pipeline_status, PipelineStage::CpfAprovado);
}
