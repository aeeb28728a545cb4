//! Contacts table (also the lead rows the poller updates)

use super::ts;
use leadflow_common::normalize::{normalize_id, normalize_phone};
use leadflow_common::time::{epoch, parse_timestamp};
use leadflow_common::{ContactRecord, LeadUpdate, Result};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, tenant_id, nome, email, telefone, cpf, origem, created_at, updated_at, \
                       cpf_status, cpf_label, cpf_checked_at";

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id: String,
    tenant_id: String,
    nome: Option<String>,
    email: Option<String>,
    telefone: Option<String>,
    cpf: Option<String>,
    origem: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    cpf_status: Option<String>,
    cpf_label: Option<String>,
    cpf_checked_at: Option<String>,
}

impl From<ContactRow> for ContactRecord {
    fn from(row: ContactRow) -> Self {
        let created_at = row.created_at.as_deref().and_then(parse_timestamp).unwrap_or_else(epoch);
        ContactRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            nome: row.nome.unwrap_or_default(),
            email: row.email,
            telefone: row.telefone.unwrap_or_default(),
            cpf: row.cpf,
            origem: row.origem.unwrap_or_default(),
            created_at,
            updated_at: row.updated_at.as_deref().and_then(parse_timestamp).unwrap_or(created_at),
            cpf_status: row.cpf_status,
            cpf_label: row.cpf_label,
            cpf_checked_at: row.cpf_checked_at.as_deref().and_then(parse_timestamp),
        }
    }
}

/// Most recent contacts of a tenant
pub async fn fetch_contacts(pool: &SqlitePool, tenant_id: &str, limit: u32) -> Result<Vec<ContactRecord>> {
    let rows: Vec<ContactRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM contacts WHERE tenant_id = ? \
         ORDER BY COALESCE(updated_at, created_at) DESC LIMIT ?"
    ))
    .bind(tenant_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ContactRecord::from).collect())
}

/// Insert or replace a contact, maintaining the normalized key columns
pub async fn upsert_contact(pool: &SqlitePool, contact: &ContactRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contacts (id, tenant_id, nome, email, telefone, telefone_normalizado, cpf,
                              cpf_normalizado, origem, created_at, updated_at,
                              cpf_status, cpf_label, cpf_checked_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            tenant_id = excluded.tenant_id,
            nome = excluded.nome,
            email = excluded.email,
            telefone = excluded.telefone,
            telefone_normalizado = excluded.telefone_normalizado,
            cpf = excluded.cpf,
            cpf_normalizado = excluded.cpf_normalizado,
            origem = excluded.origem,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&contact.id)
    .bind(&contact.tenant_id)
    .bind(&contact.nome)
    .bind(&contact.email)
    .bind(&contact.telefone)
    .bind(normalize_phone(&contact.telefone))
    .bind(&contact.cpf)
    .bind(contact.cpf.as_deref().map(normalize_id).unwrap_or_default())
    .bind(&contact.origem)
    .bind(ts(&contact.created_at))
    .bind(ts(&contact.updated_at))
    .bind(&contact.cpf_status)
    .bind(&contact.cpf_label)
    .bind(contact.cpf_checked_at.as_ref().map(ts))
    .execute(pool)
    .await?;

    Ok(())
}

/// Leads (any tenant) whose normalized CPF equals `cpf_key`
pub async fn find_by_cpf(pool: &SqlitePool, cpf_key: &str) -> Result<Vec<ContactRecord>> {
    if cpf_key.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<ContactRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM contacts WHERE cpf_normalizado = ? ORDER BY id"
    ))
    .bind(cpf_key)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ContactRecord::from).collect())
}

/// Leads (any tenant) whose normalized phone equals `phone_key`
pub async fn find_by_phone(pool: &SqlitePool, phone_key: &str) -> Result<Vec<ContactRecord>> {
    if phone_key.is_empty() {
        return Ok(Vec::new());
    }
    let rows: Vec<ContactRow> = sqlx::query_as(&format!(
        "SELECT {COLUMNS} FROM contacts WHERE telefone_normalizado = ? ORDER BY id"
    ))
    .bind(phone_key)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ContactRecord::from).collect())
}

/// Write a reconciled compliance status onto one lead row
pub async fn apply_lead_update(pool: &SqlitePool, lead_id: &str, update: &LeadUpdate) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE contacts SET cpf_status = ?, cpf_label = ?, cpf_checked_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&update.status)
    .bind(&update.label)
    .bind(ts(&update.checked_at))
    .bind(ts(&update.checked_at))
    .bind(lead_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Fill normalized key columns for rows written by other tools
pub async fn backfill_normalized_keys(pool: &SqlitePool) -> Result<usize> {
    let rows: Vec<(String, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT id, telefone, cpf FROM contacts WHERE telefone_normalizado IS NULL OR cpf_normalizado IS NULL",
    )
    .fetch_all(pool)
    .await?;

    for (id, telefone, cpf) in &rows {
        sqlx::query("UPDATE contacts SET telefone_normalizado = ?, cpf_normalizado = ? WHERE id = ?")
            .bind(telefone.as_deref().map(normalize_phone).unwrap_or_default())
            .bind(cpf.as_deref().map(normalize_id).unwrap_or_default())
            .bind(id)
            .execute(pool)
            .await?;
    }

    if !rows.is_empty() {
        tracing::info!(count = rows.len(), "Backfilled normalized contact keys");
    }
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory_pool;
    use chrono::{Duration, Utc};

    fn contact(id: &str, tenant: &str, phone: &str, cpf: Option<&str>) -> ContactRecord {
        let now = Utc::now();
        ContactRecord {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            nome: format!("Lead {id}"),
            email: None,
            telefone: phone.to_string(),
            cpf: cpf.map(str::to_string),
            origem: "whatsapp".to_string(),
            created_at: now,
            updated_at: now,
            cpf_status: None,
            cpf_label: None,
            cpf_checked_at: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_is_tenant_scoped_and_most_recent_first() {
        let pool = init_in_memory_pool().await.unwrap();
        let mut older = contact("a", "t1", "31999972368", None);
        older.updated_at = Utc::now() - Duration::days(2);
        upsert_contact(&pool, &older).await.unwrap();
        upsert_contact(&pool, &contact("b", "t1", "31988887777", None)).await.unwrap();
        upsert_contact(&pool, &contact("c", "t2", "31977776666", None)).await.unwrap();

        let fetched = fetch_contacts(&pool, "t1", 10).await.unwrap();
        let ids: Vec<_> = fetched.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let limited = fetch_contacts(&pool, "t1", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_normalized_keys_across_tenants() {
        let pool = init_in_memory_pool().await.unwrap();
        upsert_contact(&pool, &contact("a", "t1", "+55 31 99997-2368", Some("123.456.789-09")))
            .await
            .unwrap();
        upsert_contact(&pool, &contact("b", "t2", "31999972368", Some("12345678909")))
            .await
            .unwrap();

        assert_eq!(find_by_cpf(&pool, "12345678909").await.unwrap().len(), 2);
        assert_eq!(find_by_phone(&pool, "5531999972368").await.unwrap().len(), 2);
        assert!(find_by_phone(&pool, "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_lead_update_sets_status_columns() {
        let pool = init_in_memory_pool().await.unwrap();
        upsert_contact(&pool, &contact("a", "t1", "31999972368", None)).await.unwrap();

        let update = LeadUpdate {
            status: "approved".to_string(),
            label: "CPF Aprovado".to_string(),
            checked_at: Utc::now(),
        };
        assert_eq!(apply_lead_update(&pool, "a", &update).await.unwrap(), 1);
        assert_eq!(apply_lead_update(&pool, "missing", &update).await.unwrap(), 0);

        let stored = fetch_contacts(&pool, "t1", 10).await.unwrap();
        assert_eq!(stored[0].cpf_status.as_deref(), Some("approved"));
        assert_eq!(stored[0].cpf_label.as_deref(), Some("CPF Aprovado"));
        assert!(stored[0].cpf_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_backfill_normalized_keys() {
        let pool = init_in_memory_pool().await.unwrap();
        sqlx::query("INSERT INTO contacts (id, tenant_id, telefone, cpf) VALUES ('x', 't1', '31999972368', '1234567890')")
            .execute(&pool)
            .await
            .unwrap();

        assert_eq!(backfill_normalized_keys(&pool).await.unwrap(), 1);
        assert_eq!(find_by_cpf(&pool, "01234567890").await.unwrap().len(), 1);
        assert_eq!(backfill_normalized_keys(&pool).await.unwrap(), 0);
    }
}
