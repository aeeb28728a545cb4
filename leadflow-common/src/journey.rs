//! Lead journey view types
//!
//! A `LeadJourney` is rebuilt on every aggregation call and never persisted.

use crate::records::{ComplianceCheckRecord, ContactRecord, FormSubmissionRecord, MeetingRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The eleven pipeline stages, in Kanban column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipelineStage {
    #[serde(rename = "contato-inicial")]
    ContatoInicial,
    #[serde(rename = "formulario-nao-preenchido")]
    FormularioNaoPreenchido,
    #[serde(rename = "formulario-aprovado")]
    FormularioAprovado,
    #[serde(rename = "formulario-reprovado")]
    FormularioReprovado,
    #[serde(rename = "cpf-aprovado")]
    CpfAprovado,
    #[serde(rename = "cpf-reprovado")]
    CpfReprovado,
    #[serde(rename = "reuniao-pendente")]
    ReuniaoPendente,
    #[serde(rename = "reuniao-agendada")]
    ReuniaoAgendada,
    #[serde(rename = "reuniao-nao-compareceu")]
    ReuniaoNaoCompareceu,
    #[serde(rename = "reuniao-completo")]
    ReuniaoCompleto,
    #[serde(rename = "consultor")]
    Consultor,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 11] = [
        PipelineStage::ContatoInicial,
        PipelineStage::FormularioNaoPreenchido,
        PipelineStage::FormularioAprovado,
        PipelineStage::FormularioReprovado,
        PipelineStage::CpfAprovado,
        PipelineStage::CpfReprovado,
        PipelineStage::ReuniaoPendente,
        PipelineStage::ReuniaoAgendada,
        PipelineStage::ReuniaoNaoCompareceu,
        PipelineStage::ReuniaoCompleto,
        PipelineStage::Consultor,
    ];

    /// Stable identifier used by the Kanban UI
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::ContatoInicial => "contato-inicial",
            PipelineStage::FormularioNaoPreenchido => "formulario-nao-preenchido",
            PipelineStage::FormularioAprovado => "formulario-aprovado",
            PipelineStage::FormularioReprovado => "formulario-reprovado",
            PipelineStage::CpfAprovado => "cpf-aprovado",
            PipelineStage::CpfReprovado => "cpf-reprovado",
            PipelineStage::ReuniaoPendente => "reuniao-pendente",
            PipelineStage::ReuniaoAgendada => "reuniao-agendada",
            PipelineStage::ReuniaoNaoCompareceu => "reuniao-nao-compareceu",
            PipelineStage::ReuniaoCompleto => "reuniao-completo",
            PipelineStage::Consultor => "consultor",
        }
    }

    /// Column title shown to users
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::ContatoInicial => "Contato Inicial",
            PipelineStage::FormularioNaoPreenchido => "Formulário Não Preenchido",
            PipelineStage::FormularioAprovado => "Formulário Aprovado",
            PipelineStage::FormularioReprovado => "Formulário Reprovado",
            PipelineStage::CpfAprovado => "CPF Aprovado",
            PipelineStage::CpfReprovado => "CPF Reprovado",
            PipelineStage::ReuniaoPendente => "Reunião Pendente",
            PipelineStage::ReuniaoAgendada => "Reunião Agendada",
            PipelineStage::ReuniaoNaoCompareceu => "Não Compareceu",
            PipelineStage::ReuniaoCompleto => "Reunião Realizada",
            PipelineStage::Consultor => "Consultor",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a source record was linked to a journey, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLevel {
    Id,
    Phone,
    Name,
    /// The record seeded an orphan journey
    Seed,
}

/// Match levels used per source; kept for inspection, not classification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTrace {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<MatchLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<MatchLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance: Option<MatchLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting: Option<MatchLevel>,
}

/// Older records of the same lead that lost to a more recent one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyHistory {
    pub contacts: Vec<ContactRecord>,
    pub forms: Vec<FormSubmissionRecord>,
    pub checks: Vec<ComplianceCheckRecord>,
    pub meetings: Vec<MeetingRecord>,
}

impl JourneyHistory {
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.forms.is_empty() && self.checks.is_empty() && self.meetings.is_empty()
    }
}

/// Source signal a timeline event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineEventType {
    Contact,
    Form,
    Compliance,
    Meeting,
}

/// One discrete step in a lead's journey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: TimelineEventType,
    /// Stage this signal stands for; `None` for signals with no stage yet
    pub stage: Option<PipelineStage>,
    pub title: String,
    pub description: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Value,
}

/// Canonical per-lead view built from all four sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadJourney {
    pub id: String,
    pub tenant_id: String,
    pub telefone: String,
    pub telefone_normalizado: String,
    /// Other phone keys that resolved to this lead
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phone_aliases: Vec<String>,
    pub nome: String,
    pub email: Option<String>,
    pub cpf: Option<String>,
    pub pipeline_status: PipelineStage,
    pub pipeline_stage_label: String,
    pub contact: Option<ContactRecord>,
    pub form: Option<FormSubmissionRecord>,
    pub cpf_data: Option<ComplianceCheckRecord>,
    pub meeting: Option<MeetingRecord>,
    #[serde(default, skip_serializing_if = "JourneyHistory::is_empty")]
    pub history: JourneyHistory,
    #[serde(default)]
    pub matches: MatchTrace,
    /// Built from a record no phone-keyed lead claimed
    #[serde(default)]
    pub orphan: bool,
    pub updated_at: DateTime<Utc>,
    pub timeline: Vec<TimelineEvent>,
}

impl LeadJourney {
    /// Empty journey for a tenant; the aggregator fills it in
    pub fn empty(id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        let stage = PipelineStage::ContatoInicial;
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            telefone: String::new(),
            telefone_normalizado: String::new(),
            phone_aliases: Vec::new(),
            nome: String::new(),
            email: None,
            cpf: None,
            pipeline_status: stage,
            pipeline_stage_label: stage.label().to_string(),
            contact: None,
            form: None,
            cpf_data: None,
            meeting: None,
            history: JourneyHistory::default(),
            matches: MatchTrace::default(),
            orphan: false,
            updated_at: crate::time::epoch(),
            timeline: Vec::new(),
        }
    }

    /// True when the normalized key or one of the aliases equals `key`
    pub fn answers_to_phone(&self, key: &str) -> bool {
        !key.is_empty() && (self.telefone_normalizado == key || self.phone_aliases.iter().any(|a| a == key))
    }

    pub fn set_stage(&mut self, stage: PipelineStage) {
        self.pipeline_status = stage;
        self.pipeline_stage_label = stage.label().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ids_round_trip_through_parse() {
        for stage in PipelineStage::ALL {
            assert_eq!(PipelineStage::parse(stage.as_str()), Some(stage));
            assert_eq!(
                serde_json::to_value(stage).unwrap(),
                serde_json::Value::String(stage.as_str().to_string())
            );
        }
        assert_eq!(PipelineStage::parse("lead-frio"), None);
    }

    #[test]
    fn test_set_stage_updates_label() {
        let mut journey = LeadJourney::empty("j1", "t1");
        journey.set_stage(PipelineStage::CpfReprovado);
        assert_eq!(journey.pipeline_status, PipelineStage::CpfReprovado);
        assert_eq!(journey.pipeline_stage_label, "CPF Reprovado");
    }

    #[test]
    fn test_answers_to_phone_checks_aliases() {
        let mut journey = LeadJourney::empty("j1", "t1");
        journey.telefone_normalizado = "5531999972368".to_string();
        journey.phone_aliases.push("5531988887777".to_string());
        assert!(journey.answers_to_phone("5531999972368"));
        assert!(journey.answers_to_phone("5531988887777"));
        assert!(!journey.answers_to_phone(""));
    }
}
