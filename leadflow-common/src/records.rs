//! Source record models
//!
//! One struct per upstream source. Field names follow the upstream tables;
//! serialization is camelCase for API consumers, deserialization also accepts
//! the snake_case column names the remote data API returns.

use crate::time::{deserialize_date_opt, deserialize_lenient, deserialize_lenient_opt, epoch, parse_time};
use crate::verdict::Verdict;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Accept string or numeric ids (Postgres bigint ids arrive as numbers)
pub fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!("unsupported id: {}", other))),
    }
}

/// Null-tolerant string: `null` or a missing value becomes `""`
fn deserialize_string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Boolean tolerant of the verdict encodings
fn deserialize_flag_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Verdict::deserialize(deserializer)?.as_bool())
}

/// Number tolerant of text encodings
fn deserialize_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) => s.trim().replace(',', ".").parse().unwrap_or_default(),
        _ => 0.0,
    })
}

// ============================================================================
// Contacts (lead rows)
// ============================================================================

/// A person as first seen by chat or manual entry.
///
/// The contacts table doubles as the lead table: the reconciliation poller
/// writes `cpf_status`, `cpf_label` and `cpf_checked_at` here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, alias = "tenant_id")]
    pub tenant_id: String,
    #[serde(default, deserialize_with = "deserialize_string_or_empty")]
    pub nome: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_empty")]
    pub telefone: String,
    #[serde(default)]
    pub cpf: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_empty")]
    pub origem: String,
    #[serde(default = "epoch", alias = "created_at", deserialize_with = "deserialize_lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "epoch", alias = "updated_at", deserialize_with = "deserialize_lenient")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, alias = "cpf_status")]
    pub cpf_status: Option<String>,
    #[serde(default, alias = "cpf_label")]
    pub cpf_label: Option<String>,
    #[serde(default, alias = "cpf_checked_at", deserialize_with = "deserialize_lenient_opt")]
    pub cpf_checked_at: Option<DateTime<Utc>>,
}

impl ContactRecord {
    /// Verdict written back by the reconciliation poller, if any
    pub fn reconciled_verdict(&self) -> Verdict {
        self.cpf_status
            .as_deref()
            .map(ComplianceStatus::parse)
            .map(|s| s.verdict())
            .unwrap_or_default()
    }
}

// ============================================================================
// Form submissions
// ============================================================================

/// Lifecycle of a form submission row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FormStatus {
    /// Form link sent to the lead, not yet filled
    Sent,
    #[default]
    Completed,
}

impl FormStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "sent" | "enviado" | "enviada" | "pending" | "pendente" | "nao_preenchido" => FormStatus::Sent,
            _ => FormStatus::Completed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FormStatus::Sent => "sent",
            FormStatus::Completed => "completed",
        }
    }
}

impl Serialize for FormStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FormStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .map(|s| FormStatus::parse(&s))
            .unwrap_or_default())
    }
}

/// A qualification form filled (or sent) to a lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSubmissionRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, alias = "tenant_id")]
    pub tenant_id: String,
    #[serde(default, alias = "form_id", deserialize_with = "deserialize_id")]
    pub form_id: String,
    #[serde(default, alias = "contact_name")]
    pub contact_name: Option<String>,
    #[serde(default, alias = "contact_email")]
    pub contact_email: Option<String>,
    #[serde(default, alias = "contact_phone")]
    pub contact_phone: Option<String>,
    #[serde(default, alias = "contact_cpf")]
    pub contact_cpf: Option<String>,
    #[serde(default)]
    pub status: FormStatus,
    #[serde(default)]
    pub passed: Verdict,
    #[serde(default, alias = "total_score", deserialize_with = "deserialize_number")]
    pub total_score: f64,
    #[serde(default)]
    pub answers: Value,
    #[serde(default = "epoch", alias = "created_at", deserialize_with = "deserialize_lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "epoch", alias = "updated_at", deserialize_with = "deserialize_lenient")]
    pub updated_at: DateTime<Utc>,
}

impl FormSubmissionRecord {
    /// A sent form that has not been answered yet
    pub fn is_unfilled(&self) -> bool {
        self.status == FormStatus::Sent && !self.passed.is_set()
    }
}

// ============================================================================
// Compliance checks
// ============================================================================

/// Status reported by the identity-compliance provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComplianceStatus {
    Approved,
    Rejected,
    Pending,
    ManualReview,
    Error,
    Other(String),
}

impl ComplianceStatus {
    /// Parse a provider status; approval/rejection words go through the
    /// shared verdict predicates
    pub fn parse(raw: &str) -> Self {
        match Verdict::from_text(raw) {
            Verdict::Approved => return ComplianceStatus::Approved,
            Verdict::Rejected => return ComplianceStatus::Rejected,
            Verdict::Unset => {}
        }
        match raw.trim().to_lowercase().as_str() {
            "pending" | "pendente" | "" => ComplianceStatus::Pending,
            "manual_review" | "revisao_manual" => ComplianceStatus::ManualReview,
            "error" | "erro" => ComplianceStatus::Error,
            other => ComplianceStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ComplianceStatus::Approved => "approved",
            ComplianceStatus::Rejected => "rejected",
            ComplianceStatus::Pending => "pending",
            ComplianceStatus::ManualReview => "manual_review",
            ComplianceStatus::Error => "error",
            ComplianceStatus::Other(s) => s,
        }
    }

    /// Terminal statuses are never revisited by the provider
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComplianceStatus::Approved | ComplianceStatus::Rejected)
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            ComplianceStatus::Approved => Verdict::Approved,
            ComplianceStatus::Rejected => Verdict::Rejected,
            _ => Verdict::Unset,
        }
    }
}

impl Default for ComplianceStatus {
    fn default() -> Self {
        ComplianceStatus::Pending
    }
}

impl Serialize for ComplianceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ComplianceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => ComplianceStatus::parse(&s),
            Value::Null => ComplianceStatus::Pending,
            other => match Verdict::from_json(&other) {
                Verdict::Approved => ComplianceStatus::Approved,
                Verdict::Rejected => ComplianceStatus::Rejected,
                Verdict::Unset => ComplianceStatus::Other(other.to_string()),
            },
        })
    }
}

/// Lawsuit tallies attached to a compliance check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LawsuitCounts {
    pub total: u32,
    #[serde(alias = "as_author")]
    pub as_author: u32,
    #[serde(alias = "as_defendant")]
    pub as_defendant: u32,
    #[serde(alias = "last_30_days")]
    pub last_30_days: u32,
    #[serde(alias = "last_90_days")]
    pub last_90_days: u32,
    #[serde(alias = "last_180_days")]
    pub last_180_days: u32,
    #[serde(alias = "last_365_days")]
    pub last_365_days: u32,
}

/// The national ID carried by a compliance check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CpfValue<'a> {
    Plain(&'a str),
    Encrypted(&'a str),
    Missing,
}

/// An identity-compliance check for a national ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceCheckRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, alias = "tenant_id")]
    pub tenant_id: String,
    /// Plain CPF when the provider stored it unencrypted
    #[serde(default)]
    pub cpf: Option<String>,
    /// Encrypted CPF, decrypted through a `CpfDecryptor`
    #[serde(default, alias = "cpf_encrypted", skip_serializing)]
    pub cpf_encrypted: Option<String>,
    #[serde(default, alias = "person_name")]
    pub person_name: Option<String>,
    #[serde(default, alias = "person_phone")]
    pub person_phone: Option<String>,
    #[serde(default)]
    pub status: ComplianceStatus,
    #[serde(default, deserialize_with = "deserialize_flag_opt")]
    pub aprovado: Option<bool>,
    #[serde(default, alias = "risk_score")]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub lawsuits: LawsuitCounts,
    #[serde(default = "epoch", alias = "consulted_at", deserialize_with = "deserialize_lenient")]
    pub consulted_at: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, alias = "processed_at", deserialize_with = "deserialize_lenient_opt")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl ComplianceCheckRecord {
    pub fn cpf_value(&self) -> CpfValue<'_> {
        match (self.cpf.as_deref(), self.cpf_encrypted.as_deref()) {
            (Some(plain), _) if !plain.trim().is_empty() => CpfValue::Plain(plain),
            (_, Some(enc)) if !enc.trim().is_empty() => CpfValue::Encrypted(enc),
            _ => CpfValue::Missing,
        }
    }

    /// Rejection wins over approval: an explicit `aprovado = false` rejects
    /// even when the status text is missing.
    pub fn verdict(&self) -> Verdict {
        if self.status == ComplianceStatus::Rejected || self.aprovado == Some(false) {
            Verdict::Rejected
        } else if self.status == ComplianceStatus::Approved || self.aprovado == Some(true) {
            Verdict::Approved
        } else {
            Verdict::Unset
        }
    }
}

// ============================================================================
// Meetings
// ============================================================================

/// Meeting lifecycle status
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MeetingStatus {
    Pendente,
    Agendada,
    Realizada,
    NaoCompareceu,
    Cancelada,
    Other(String),
}

impl MeetingStatus {
    /// Parse a status, accepting the alias spellings found in older rows
    pub fn parse(raw: &str) -> Self {
        let folded = crate::normalize::normalize_name(raw).replace(' ', "_");
        match folded.as_str() {
            "pendente" | "" => MeetingStatus::Pendente,
            "agendada" | "agendado" => MeetingStatus::Agendada,
            "realizada" | "realizado" => MeetingStatus::Realizada,
            "nao_compareceu" | "naocompareceu" => MeetingStatus::NaoCompareceu,
            "cancelada" | "cancelado" => MeetingStatus::Cancelada,
            other => MeetingStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MeetingStatus::Pendente => "pendente",
            MeetingStatus::Agendada => "agendada",
            MeetingStatus::Realizada => "realizada",
            MeetingStatus::NaoCompareceu => "nao_compareceu",
            MeetingStatus::Cancelada => "cancelada",
            MeetingStatus::Other(s) => s,
        }
    }
}

impl Default for MeetingStatus {
    fn default() -> Self {
        MeetingStatus::Pendente
    }
}

impl Serialize for MeetingStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MeetingStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?
            .map(|s| MeetingStatus::parse(&s))
            .unwrap_or_default())
    }
}

/// A meeting proposed to, or held with, a lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default, alias = "tenant_id")]
    pub tenant_id: String,
    #[serde(default, alias = "contact_name")]
    pub contact_name: Option<String>,
    #[serde(default, alias = "contact_phone")]
    pub contact_phone: Option<String>,
    #[serde(default, alias = "contact_cpf")]
    pub contact_cpf: Option<String>,
    #[serde(default)]
    pub status: MeetingStatus,
    #[serde(default, deserialize_with = "deserialize_flag_opt")]
    pub compareceu: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_date_opt")]
    pub data: Option<NaiveDate>,
    #[serde(default)]
    pub hora: Option<String>,
    #[serde(default)]
    pub local: Option<String>,
    #[serde(default)]
    pub tipo: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, alias = "consultor_nome")]
    pub consultor_nome: Option<String>,
    #[serde(default, alias = "consultor_email")]
    pub consultor_email: Option<String>,
    #[serde(default, alias = "resultado_reuniao")]
    pub resultado_reuniao: Option<String>,
    #[serde(default, alias = "motivo_recusa")]
    pub motivo_recusa: Option<String>,
    #[serde(default = "epoch", alias = "created_at", deserialize_with = "deserialize_lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "epoch", alias = "updated_at", deserialize_with = "deserialize_lenient")]
    pub updated_at: DateTime<Utc>,
}

impl MeetingRecord {
    /// Scheduled date and time; midnight when no usable time is set
    pub fn scheduled_at(&self) -> Option<NaiveDateTime> {
        let time = self
            .hora
            .as_deref()
            .and_then(parse_time)
            .unwrap_or(NaiveTime::MIN);
        self.data.map(|d| d.and_time(time))
    }

    /// Non-blank meeting outcome recorded by the consultant
    pub fn outcome(&self) -> Option<&str> {
        self.resultado_reuniao
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// Poller write-back
// ============================================================================

/// Lead update produced by one reconciled compliance result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadUpdate {
    pub status: String,
    pub label: String,
    pub checked_at: DateTime<Utc>,
}

impl LeadUpdate {
    /// Build the update for a terminal status, `None` for anything else
    pub fn for_status(status: &ComplianceStatus, checked_at: DateTime<Utc>) -> Option<Self> {
        let label = match status {
            ComplianceStatus::Approved => "CPF Aprovado",
            ComplianceStatus::Rejected => "CPF Reprovado",
            _ => return None,
        };
        Some(Self {
            status: status.as_str().to_string(),
            label: label.to_string(),
            checked_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_contact_accepts_snake_case_and_numeric_id() {
        let contact: ContactRecord = serde_json::from_value(json!({
            "id": 42,
            "tenant_id": "t1",
            "nome": "Maria",
            "telefone": "31999972368",
            "created_at": "2024-01-02T03:04:05Z",
            "origem": null
        }))
        .unwrap();
        assert_eq!(contact.id, "42");
        assert_eq!(contact.tenant_id, "t1");
        assert_eq!(contact.origem, "");
        assert_eq!(contact.updated_at, epoch());
    }

    #[test]
    fn test_form_status_and_passed_shapes() {
        let form: FormSubmissionRecord = serde_json::from_value(json!({
            "id": "f1",
            "status": "enviado",
            "passed": null,
            "total_score": "40,5"
        }))
        .unwrap();
        assert_eq!(form.status, FormStatus::Sent);
        assert!(form.is_unfilled());
        assert_eq!(form.total_score, 40.5);
    }

    #[test]
    fn test_compliance_status_parse() {
        assert_eq!(ComplianceStatus::parse("Aprovado"), ComplianceStatus::Approved);
        assert_eq!(ComplianceStatus::parse("reprovado"), ComplianceStatus::Rejected);
        assert_eq!(ComplianceStatus::parse("manual_review"), ComplianceStatus::ManualReview);
        assert_eq!(ComplianceStatus::parse("erro"), ComplianceStatus::Error);
        assert_eq!(
            ComplianceStatus::parse("weird"),
            ComplianceStatus::Other("weird".to_string())
        );
    }

    #[test]
    fn test_compliance_verdict_rejection_wins() {
        let mut check: ComplianceCheckRecord = serde_json::from_value(json!({
            "id": "c1",
            "status": "approved",
            "aprovado": "false"
        }))
        .unwrap();
        assert_eq!(check.verdict(), Verdict::Rejected);

        check.aprovado = Some(true);
        assert_eq!(check.verdict(), Verdict::Approved);

        check.status = ComplianceStatus::Pending;
        check.aprovado = None;
        assert_eq!(check.verdict(), Verdict::Unset);
    }

    #[test]
    fn test_cpf_value_prefers_plain() {
        let check: ComplianceCheckRecord = serde_json::from_value(json!({
            "id": "c1",
            "cpf": " ",
            "cpf_encrypted": "enc:abc"
        }))
        .unwrap();
        assert_eq!(check.cpf_value(), CpfValue::Encrypted("enc:abc"));
    }

    #[test]
    fn test_meeting_status_aliases() {
        assert_eq!(MeetingStatus::parse("naocompareceu"), MeetingStatus::NaoCompareceu);
        assert_eq!(MeetingStatus::parse("Não compareceu"), MeetingStatus::NaoCompareceu);
        assert_eq!(MeetingStatus::parse("agendado"), MeetingStatus::Agendada);
    }

    #[test]
    fn test_meeting_scheduled_at() {
        let meeting: MeetingRecord = serde_json::from_value(json!({
            "id": "m1",
            "data": "2024-01-01",
            "hora": "14:30",
            "compareceu": 0
        }))
        .unwrap();
        let at = meeting.scheduled_at().unwrap();
        assert_eq!(at.to_string(), "2024-01-01 14:30:00");
        assert_eq!(meeting.compareceu, Some(false));
    }

    #[test]
    fn test_lead_update_only_for_terminal_status() {
        let now = crate::time::now();
        let update = LeadUpdate::for_status(&ComplianceStatus::Approved, now).unwrap();
        assert_eq!(update.label, "CPF Aprovado");
        assert!(LeadUpdate::for_status(&ComplianceStatus::Pending, now).is_none());
    }
}
