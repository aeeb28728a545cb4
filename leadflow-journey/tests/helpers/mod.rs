//! Test Helper Utilities
//!
//! Shared fixtures for leadflow-journey integration tests: an in-memory
//! store, JSON record builders and seeding.

#![allow(dead_code)]

use leadflow_common::{ComplianceCheckRecord, ContactRecord, FormSubmissionRecord, MeetingRecord};
use leadflow_journey::db;
use leadflow_journey::sources::SqliteStore;
use leadflow_journey::JourneyService;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

pub const TENANT: &str = "t1";

/// In-memory database with the full schema, wrapped in a store
pub async fn create_test_store() -> (SqlitePool, Arc<SqliteStore>) {
    let pool = db::init_in_memory_pool().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool.clone(), 500));
    (pool, store)
}

pub fn journey_service(store: &Arc<SqliteStore>) -> Arc<JourneyService> {
    Arc::new(JourneyService::new(store.clone(), Duration::from_secs(5)))
}

/// Build a record from JSON; `tenantId` defaults to [`TENANT`]
pub fn record<T: DeserializeOwned>(mut value: Value) -> T {
    if let Some(obj) = value.as_object_mut() {
        obj.entry("tenantId").or_insert_with(|| Value::String(TENANT.to_string()));
    }
    serde_json::from_value(value).unwrap()
}

fn each(values: Value) -> Vec<Value> {
    match values {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

pub async fn seed_contacts(pool: &SqlitePool, contacts: Value) {
    for value in each(contacts) {
        let contact: ContactRecord = record(value);
        db::contacts::upsert_contact(pool, &contact).await.unwrap();
    }
}

pub async fn seed_forms(pool: &SqlitePool, forms: Value) {
    for value in each(forms) {
        let form: FormSubmissionRecord = record(value);
        db::forms::upsert_form_submission(pool, &form).await.unwrap();
    }
}

pub async fn seed_checks(pool: &SqlitePool, checks: Value) {
    for value in each(checks) {
        let check: ComplianceCheckRecord = record(value);
        db::compliance::upsert_compliance_check(pool, &check).await.unwrap();
    }
}

pub async fn seed_meetings(pool: &SqlitePool, meetings: Value) {
    for value in each(meetings) {
        let meeting: MeetingRecord = record(value);
        db::meetings::upsert_meeting(pool, &meeting).await.unwrap();
    }
}

/// `(cpf_status, cpf_label)` of a contact row
pub async fn lead_status(pool: &SqlitePool, lead_id: &str) -> (Option<String>, Option<String>) {
    sqlx::query_as("SELECT cpf_status, cpf_label FROM contacts WHERE id = ?")
        .bind(lead_id)
        .fetch_one(pool)
        .await
        .unwrap()
}
