//! Meetings table

use super::ts;
use leadflow_common::time::{epoch, parse_date, parse_timestamp};
use leadflow_common::{MeetingRecord, MeetingStatus, Result, Verdict};
use sqlx::SqlitePool;

#[derive(Debug, sqlx::FromRow)]
struct MeetingRow {
    id: String,
    tenant_id: String,
    contact_name: Option<String>,
    contact_phone: Option<String>,
    contact_cpf: Option<String>,
    status: Option<String>,
    compareceu: Option<String>,
    data: Option<String>,
    hora: Option<String>,
    local: Option<String>,
    tipo: Option<String>,
    link: Option<String>,
    consultor_nome: Option<String>,
    consultor_email: Option<String>,
    resultado_reuniao: Option<String>,
    motivo_recusa: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

impl From<MeetingRow> for MeetingRecord {
    fn from(row: MeetingRow) -> Self {
        let created_at = row.created_at.as_deref().and_then(parse_timestamp).unwrap_or_else(epoch);
        MeetingRecord {
            id: row.id,
            tenant_id: row.tenant_id,
            contact_name: row.contact_name,
            contact_phone: row.contact_phone,
            contact_cpf: row.contact_cpf,
            status: row.status.as_deref().map(MeetingStatus::parse).unwrap_or_default(),
            compareceu: Verdict::from_opt_text(row.compareceu.as_deref()).as_bool(),
            data: row.data.as_deref().and_then(parse_date),
            hora: row.hora,
            local: row.local,
            tipo: row.tipo,
            link: row.link,
            consultor_nome: row.consultor_nome,
            consultor_email: row.consultor_email,
            resultado_reuniao: row.resultado_reuniao,
            motivo_recusa: row.motivo_recusa,
            created_at,
            updated_at: row.updated_at.as_deref().and_then(parse_timestamp).unwrap_or(created_at),
        }
    }
}

/// Most recent meetings of a tenant
pub async fn fetch_meetings(pool: &SqlitePool, tenant_id: &str, limit: u32) -> Result<Vec<MeetingRecord>> {
    let rows: Vec<MeetingRow> = sqlx::query_as(
        "SELECT id, tenant_id, contact_name, contact_phone, contact_cpf, status, compareceu, data, hora, \
                local, tipo, link, consultor_nome, consultor_email, resultado_reuniao, motivo_recusa, \
                created_at, updated_at \
         FROM meetings WHERE tenant_id = ? \
         ORDER BY COALESCE(updated_at, created_at) DESC LIMIT ?",
    )
    .bind(tenant_id)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MeetingRecord::from).collect())
}

pub async fn upsert_meeting(pool: &SqlitePool, meeting: &MeetingRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO meetings
            (id, tenant_id, contact_name, contact_phone, contact_cpf, status, compareceu, data, hora,
             local, tipo, link, consultor_nome, consultor_email, resultado_reuniao, motivo_recusa,
             created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&meeting.id)
    .bind(&meeting.tenant_id)
    .bind(&meeting.contact_name)
    .bind(&meeting.contact_phone)
    .bind(&meeting.contact_cpf)
    .bind(meeting.status.as_str())
    .bind(meeting.compareceu.map(|b| b.to_string()))
    .bind(meeting.data.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(&meeting.hora)
    .bind(&meeting.local)
    .bind(&meeting.tipo)
    .bind(&meeting.link)
    .bind(&meeting.consultor_nome)
    .bind(&meeting.consultor_email)
    .bind(&meeting.resultado_reuniao)
    .bind(&meeting.motivo_recusa)
    .bind(ts(&meeting.created_at))
    .bind(ts(&meeting.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}
