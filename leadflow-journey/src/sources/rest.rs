//! Remote data API source
//!
//! Reads the four tables through a PostgREST-style HTTP API:
//! `GET {base}/rest/v1/{table}?tenant_id=eq.{tenant}&order={column}.desc&limit={n}`.
//!
//! In remote mode the same API also backs the reconciliation poller: pending
//! results and lead rows are read with filtered GETs, and marker / status
//! writes are `PATCH {base}/rest/v1/{table}?id=eq.{id}`.

use super::JourneySource;
use crate::poller::{ComplianceResultProvider, LeadStore};
use async_trait::async_trait;
use leadflow_common::config::RemoteConfig;
use leadflow_common::normalize::{normalize_id, normalize_phone};
use leadflow_common::{
    ComplianceCheckRecord, ContactRecord, Error, FormSubmissionRecord, LeadUpdate, MeetingRecord, Result,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const USER_AGENT: &str = concat!("leadflow-journey/", env!("CARGO_PKG_VERSION"));

pub struct RestSource {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    fetch_limit: u32,
}

impl RestSource {
    pub fn new(remote: &RemoteConfig, fetch_limit: u32, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            api_key: remote.api_key.clone(),
            fetch_limit,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn fetch_table<T: DeserializeOwned>(&self, table: &str, order_by: &str, tenant_id: &str) -> Result<Vec<T>> {
        let params = [
            ("select", "*".to_string()),
            ("tenant_id", format!("eq.{}", tenant_id)),
            ("order", format!("{}.desc", order_by)),
            ("limit", self.fetch_limit.to_string()),
        ];

        tracing::debug!(table, tenant_id, "Querying remote data API");
        let rows: Vec<T> = self.get_rows(table, &params).await?;
        tracing::debug!(table, rows = rows.len(), "Remote fetch complete");
        Ok(rows)
    }

    async fn get_rows<T: DeserializeOwned>(&self, table: &str, params: &[(&str, String)]) -> Result<Vec<T>> {
        let response = self
            .http_client
            .get(self.table_url(table))
            .query(params)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", table, e)))?;

        Self::read_rows(table, response).await
    }

    /// PATCH the row with `id`; NotFound when the API reports no row changed
    async fn patch_row(&self, table: &str, id: &str, body: &Value) -> Result<()> {
        let response = self
            .http_client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))])
            .header("apikey", &self.api_key)
            .header("Prefer", "return=representation")
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("{}: {}", table, e)))?;

        let changed: Vec<Value> = Self::read_rows(table, response).await?;
        if changed.is_empty() {
            return Err(Error::NotFound(format!("{} row {}", table, id)));
        }
        Ok(())
    }

    async fn read_rows<T: DeserializeOwned>(table: &str, response: reqwest::Response) -> Result<Vec<T>> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::SourceUnavailable(format!("{}: table not exposed by remote API", table)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Http(format!("{} returned {}: {}", table, status.as_u16(), body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Http(format!("{}: invalid response body: {}", table, e)))
    }

    /// Contacts whose `column` matches `pattern`, kept only when `key_of`
    /// maps the raw value onto `key`
    async fn find_contacts(
        &self,
        column: &str,
        pattern: String,
        key: &str,
        key_of: impl Fn(&ContactRecord) -> String,
    ) -> Result<Vec<ContactRecord>> {
        let params = [
            ("select", "*".to_string()),
            (column, format!("like.{}", pattern)),
            ("order", "id.asc".to_string()),
            ("limit", self.fetch_limit.to_string()),
        ];
        let candidates: Vec<ContactRecord> = self.get_rows("contacts", &params).await?;
        Ok(candidates.into_iter().filter(|c| key_of(c) == key).collect())
    }
}

/// Remote rows hold raw, user-formatted values. The API narrows candidates
/// with a LIKE on digit runs that survive any formatting; exact matching
/// happens on the normalized key.
fn cpf_pattern(cpf_key: &str) -> Option<String> {
    let n = cpf_key.len();
    (n >= 5).then(|| format!("*{}*{}", &cpf_key[n - 5..n - 2], &cpf_key[n - 2..]))
}

fn phone_pattern(phone_key: &str) -> Option<String> {
    (phone_key.len() >= 4).then(|| format!("*{}", &phone_key[phone_key.len() - 4..]))
}

#[derive(Debug, Deserialize)]
struct MarkerRow {
    #[serde(default)]
    processed_at: Option<String>,
}

#[async_trait]
impl JourneySource for RestSource {
    async fn fetch_contacts(&self, tenant_id: &str) -> Result<Vec<ContactRecord>> {
        self.fetch_table("contacts", "created_at", tenant_id).await
    }

    async fn fetch_form_submissions(&self, tenant_id: &str) -> Result<Vec<FormSubmissionRecord>> {
        self.fetch_table("form_submissions", "created_at", tenant_id).await
    }

    async fn fetch_compliance_checks(&self, tenant_id: &str) -> Result<Vec<ComplianceCheckRecord>> {
        self.fetch_table("compliance_checks", "consulted_at", tenant_id).await
    }

    async fn fetch_meetings(&self, tenant_id: &str) -> Result<Vec<MeetingRecord>> {
        self.fetch_table("meetings", "created_at", tenant_id).await
    }
}

#[async_trait]
impl ComplianceResultProvider for RestSource {
    async fn fetch_pending_results(&self) -> Result<Vec<ComplianceCheckRecord>> {
        let params = [
            ("select", "*".to_string()),
            ("processed_at", "is.null".to_string()),
            (
                "or",
                "(status.ilike.approved,status.ilike.aprovado,status.ilike.rejected,status.ilike.reprovado)"
                    .to_string(),
            ),
            ("order", "consulted_at.asc".to_string()),
            ("limit", self.fetch_limit.to_string()),
        ];
        self.get_rows("compliance_checks", &params).await
    }

    async fn mark_processed(&self, result_id: &str) -> Result<()> {
        let now = leadflow_common::time::now().to_rfc3339();
        self.patch_row("compliance_checks", result_id, &json!({ "processed_at": now }))
            .await
    }

    async fn is_processed(&self, result_id: &str) -> Result<bool> {
        let params = [
            ("select", "id,processed_at".to_string()),
            ("id", format!("eq.{}", result_id)),
        ];
        let rows: Vec<MarkerRow> = self.get_rows("compliance_checks", &params).await?;
        Ok(rows.iter().any(|r| r.processed_at.is_some()))
    }
}

#[async_trait]
impl LeadStore for RestSource {
    async fn find_leads_by_cpf(&self, cpf: &str) -> Result<Vec<ContactRecord>> {
        let key = normalize_id(cpf);
        let Some(pattern) = cpf_pattern(&key) else {
            return Ok(Vec::new());
        };
        self.find_contacts("cpf", pattern, &key, |c| {
            c.cpf.as_deref().map(normalize_id).unwrap_or_default()
        })
        .await
    }

    async fn find_leads_by_phone(&self, phone: &str) -> Result<Vec<ContactRecord>> {
        let key = normalize_phone(phone);
        let Some(pattern) = phone_pattern(&key) else {
            return Ok(Vec::new());
        };
        self.find_contacts("telefone", pattern, &key, |c| normalize_phone(&c.telefone))
            .await
    }

    async fn apply_lead_update(&self, lead_id: &str, update: &LeadUpdate) -> Result<()> {
        let checked_at = update.checked_at.to_rfc3339();
        let body = json!({
            "cpf_status": update.status,
            "cpf_label": update.label,
            "cpf_checked_at": checked_at,
            "updated_at": checked_at,
        });
        self.patch_row("contacts", lead_id, &body).await
    }
}
