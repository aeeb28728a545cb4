//! Compliance checks table (mirror of the identity-check provider)
//!
//! The same rows serve two readers: the aggregator reads them per tenant, the
//! reconciliation poller reads unprocessed terminal rows across tenants and
//! stamps `processed_at` once a result has been applied.

use super::ts;
use leadflow_common::records::LawsuitCounts;
use leadflow_common::time::{epoch, parse_timestamp};
use leadflow_common::{ComplianceCheckRecord, ComplianceStatus, Error, Result};
use sqlx::SqlitePool;

/// Columns present in every schema version
const BASE_COLUMNS: &str = "id, tenant_id, cpf, cpf_encrypted, person_name, status, aprovado, \
                            risk_score, lawsuits, consulted_at, payload, processed_at";

/// Terminal statuses the poller cares about, in every spelling seen upstream
const TERMINAL_FILTER: &str =
    "LOWER(status) IN ('approved', 'aprovado', 'rejected', 'reprovado')";

#[derive(Debug, sqlx::FromRow)]
struct CheckRow {
    id: String,
    tenant_id: String,
    cpf: Option<String>,
    cpf_encrypted: Option<String>,
    person_name: Option<String>,
    #[sqlx(default)]
    person_phone: Option<String>,
    status: Option<String>,
    aprovado: Option<String>,
    risk_score: Option<f64>,
    lawsuits: Option<String>,
    consulted_at: Option<String>,
    payload: Option<String>,
    processed_at: Option<String>,
}

impl From<CheckRow> for ComplianceCheckRecord {
    fn from(row: CheckRow) -> Self {
        ComplianceCheckRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            cpf: row.cpf,
            cpf_encrypted: row.cpf_encrypted,
            person_name: row.person_name,
            person_phone: row.person_phone,
            status: row.status.as_deref().map(ComplianceStatus::parse).unwrap_or_default(),
            aprovado: leadflow_common::Verdict::from_opt_text(row.aprovado.as_deref()).as_bool(),
            risk_score: row.risk_score,
            lawsuits: row
                .lawsuits
                .as_deref()
                .and_then(|l| serde_json::from_str::<LawsuitCounts>(l).ok())
                .unwrap_or_default(),
            consulted_at: row.consulted_at.as_deref().and_then(parse_timestamp).unwrap_or_else(epoch),
            payload: row
                .payload
                .as_deref()
                .and_then(|p| serde_json::from_str(p).ok())
                .unwrap_or_default(),
            processed_at: row.processed_at.as_deref().and_then(parse_timestamp),
        }
    }
}

/// Most recent checks of a tenant
pub async fn fetch_compliance_checks(
    pool: &SqlitePool,
    tenant_id: &str,
    limit: u32,
) -> Result<Vec<ComplianceCheckRecord>> {
    let sql = format!(
        "SELECT {BASE_COLUMNS}, person_phone FROM compliance_checks WHERE tenant_id = ? \
         ORDER BY consulted_at DESC LIMIT ?"
    );
    let rows = match sqlx::query_as::<_, CheckRow>(&sql)
        .bind(tenant_id)
        .bind(limit as i64)
        .fetch_all(pool)
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            let err = Error::from(e);
            if !err.is_missing_column() {
                return Err(err);
            }
            sqlx::query_as::<_, CheckRow>(&format!(
                "SELECT {BASE_COLUMNS} FROM compliance_checks WHERE tenant_id = ? \
                 ORDER BY consulted_at DESC LIMIT ?"
            ))
            .bind(tenant_id)
            .bind(limit as i64)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(ComplianceCheckRecord::from).collect())
}

/// Unprocessed terminal results, including the denormalized phone column.
///
/// Fails with a "no such column" database error on older schemas; the caller
/// then falls back to [`fetch_pending_without_phone`].
pub async fn fetch_pending_with_phone(pool: &SqlitePool, limit: u32) -> Result<Vec<ComplianceCheckRecord>> {
    let rows: Vec<CheckRow> = sqlx::query_as(&format!(
        "SELECT {BASE_COLUMNS}, person_phone FROM compliance_checks \
         WHERE processed_at IS NULL AND {TERMINAL_FILTER} \
         ORDER BY consulted_at ASC LIMIT ?"
    ))
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ComplianceCheckRecord::from).collect())
}

/// Unprocessed terminal results for schemas without `person_phone`
pub async fn fetch_pending_without_phone(pool: &SqlitePool, limit: u32) -> Result<Vec<ComplianceCheckRecord>> {
    let rows: Vec<CheckRow> = sqlx::query_as(&format!(
        "SELECT {BASE_COLUMNS} FROM compliance_checks \
         WHERE processed_at IS NULL AND {TERMINAL_FILTER} \
         ORDER BY consulted_at ASC LIMIT ?"
    ))
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ComplianceCheckRecord::from).collect())
}

/// Stamp `processed_at`; returns false when no row has that id
pub async fn mark_processed(pool: &SqlitePool, result_id: &str) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE compliance_checks SET processed_at = ? WHERE id = ? AND processed_at IS NULL",
    )
    .bind(ts(&chrono::Utc::now()))
    .bind(result_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Either already stamped or unknown id
        return is_processed(pool, result_id).await;
    }
    Ok(true)
}

pub async fn is_processed(pool: &SqlitePool, result_id: &str) -> Result<bool> {
    let stamped: Option<(Option<String>,)> =
        sqlx::query_as("SELECT processed_at FROM compliance_checks WHERE id = ?")
            .bind(result_id)
            .fetch_optional(pool)
            .await?;

    Ok(matches!(stamped, Some((Some(_),))))
}

pub async fn upsert_compliance_check(pool: &SqlitePool, check: &ComplianceCheckRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO compliance_checks
            (id, tenant_id, cpf, cpf_encrypted, person_name, person_phone, status, aprovado,
             risk_score, lawsuits, consulted_at, payload, processed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&check.id)
    .bind(&check.tenant_id)
    .bind(&check.cpf)
    .bind(&check.cpf_encrypted)
    .bind(&check.person_name)
    .bind(&check.person_phone)
    .bind(check.status.as_str())
    .bind(check.aprovado.map(|b| b.to_string()))
    .bind(check.risk_score)
    .bind(serde_json::to_string(&check.lawsuits)?)
    .bind(ts(&check.consulted_at))
    .bind(serde_json::to_string(&check.payload)?)
    .bind(check.processed_at.as_ref().map(ts))
    .execute(pool)
    .await?;

    Ok(())
}
