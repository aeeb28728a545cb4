//! Form submissions table

use super::ts;
use leadflow_common::normalize::{normalize_id, normalize_phone};
use leadflow_common::time::{epoch, parse_timestamp};
use leadflow_common::{FormStatus, FormSubmissionRecord, Result, Verdict};
use sqlx::SqlitePool;
use std::collections::HashMap;

#[derive(Debug, sqlx::FromRow)]
struct FormRow {
    id: String,
    tenant_id: String,
    form_id: Option<String>,
    contact_name: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    contact_cpf: Option<String>,
    status: Option<String>,
    passed: Option<String>,
    total_score: Option<f64>,
    answers: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl From<FormRow> for FormSubmissionRecord {
    fn from(row: FormRow) -> Self {
        let created_at = row.created_at.as_deref().and_then(parse_timestamp).unwrap_or_else(epoch);
        FormSubmissionRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            form_id: row.form_id.unwrap_or_default(),
            contact_name: row.contact_name,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            contact_cpf: row.contact_cpf,
            status: row.status.as_deref().map(FormStatus::parse).unwrap_or_default(),
            passed: Verdict::from_opt_text(row.passed.as_deref()),
            total_score: row.total_score.unwrap_or_default(),
            answers: row
                .answers
                .as_deref()
                .and_then(|a| serde_json::from_str(a).ok())
                .unwrap_or_default(),
            created_at,
            updated_at: row.updated_at.as_deref().and_then(parse_timestamp).unwrap_or(created_at),
        }
    }
}

/// Most recent form submissions of a tenant
pub async fn fetch_form_submissions(
    pool: &SqlitePool,
    tenant_id: &str,
    limit: u32,
) -> Result<Vec<FormSubmissionRecord>> {
    let rows: Vec<FormRow> = sqlx::query_as(
        "SELECT id, tenant_id, form_id, contact_name, contact_email, contact_phone, contact_cpf, \
                status, passed, total_score, answers, created_at, updated_at \
         FROM form_submissions WHERE tenant_id = ? \
         ORDER BY COALESCE(updated_at, created_at) DESC LIMIT ?",
    )
    .bind(tenant_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(FormSubmissionRecord::from).collect())
}

pub async fn upsert_form_submission(pool: &SqlitePool, form: &FormSubmissionRecord) -> Result<()> {
    let passed = form.passed.as_bool().map(|b| b.to_string());
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO form_submissions
            (id, tenant_id, form_id, contact_name, contact_email, contact_phone, contact_cpf,
             status, passed, total_score, answers, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&form.id)
    .bind(&form.tenant_id)
    .bind(&form.form_id)
    .bind(&form.contact_name)
    .bind(&form.contact_email)
    .bind(&form.contact_phone)
    .bind(&form.contact_cpf)
    .bind(form.status.as_str())
    .bind(passed)
    .bind(form.total_score)
    .bind(serde_json::to_string(&form.answers)?)
    .bind(ts(&form.created_at))
    .bind(ts(&form.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Normalized CPF → normalized phone, newest submission first wins.
///
/// Used to backfill phones for compliance results stored without one.
pub async fn phones_by_cpf(pool: &SqlitePool) -> Result<HashMap<String, String>> {
    let rows: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT contact_cpf, contact_phone FROM form_submissions \
         WHERE contact_cpf IS NOT NULL AND contact_phone IS NOT NULL \
         ORDER BY COALESCE(updated_at, created_at) DESC",
    )
    .fetch_all(pool)
    .await?;

    let mut map = HashMap::new();
    for (cpf, phone) in rows {
        let cpf_key = cpf.as_deref().map(normalize_id).unwrap_or_default();
        let phone_key = phone.as_deref().map(normalize_phone).unwrap_or_default();
        if !cpf_key.is_empty() && !phone_key.is_empty() {
            map.entry(cpf_key).or_insert(phone_key);
        }
    }
    Ok(map)
}
