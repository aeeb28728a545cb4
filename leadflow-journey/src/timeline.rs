//! Timeline synthesizer
//!
//! One event per signal present on a journey, using the classifier's stage
//! vocabulary, in chronological order.

use crate::classifier::{compliance_stage, form_stage, meeting_stage};
use chrono::{DateTime, TimeZone, Utc};
use leadflow_common::records::CpfValue;
use leadflow_common::{
    ComplianceCheckRecord, ContactRecord, FormSubmissionRecord, LeadJourney, MeetingRecord, PipelineStage,
    TimelineEvent, TimelineEventType,
};
use serde_json::json;

/// Build the timeline of a journey as of `now`
pub fn synthesize(journey: &LeadJourney, now: DateTime<Utc>) -> Vec<TimelineEvent> {
    let mut events = Vec::with_capacity(4);

    if let Some(contact) = &journey.contact {
        events.push(contact_event(contact));
    }
    if let Some(form) = &journey.form {
        events.push(form_event(form));
    }
    if let Some(check) = &journey.cpf_data {
        events.push(compliance_event(check));
    }
    if let Some(meeting) = &journey.meeting {
        events.push(meeting_event(meeting, now));
    }

    events.sort_by(|a, b| (a.timestamp, a.event_type).cmp(&(b.timestamp, b.event_type)));
    events
}

fn contact_event(contact: &ContactRecord) -> TimelineEvent {
    let origem = if contact.origem.is_empty() { "desconhecida" } else { contact.origem.as_str() };
    TimelineEvent {
        id: format!("contact-{}", contact.id),
        event_type: TimelineEventType::Contact,
        stage: Some(PipelineStage::ContatoInicial),
        title: "Primeiro contato".to_string(),
        description: format!("Contato recebido via {}", origem),
        status: "created".to_string(),
        timestamp: contact.created_at,
        metadata: json!({
            "origem": contact.origem,
            "telefone": contact.telefone,
            "email": contact.email,
        }),
    }
}

fn form_event(form: &FormSubmissionRecord) -> TimelineEvent {
    let stage = form_stage(form);
    let (title, status) = match stage {
        Some(PipelineStage::FormularioReprovado) => ("Formulário reprovado", "rejected"),
        Some(PipelineStage::FormularioAprovado) => ("Formulário aprovado", "approved"),
        Some(PipelineStage::FormularioNaoPreenchido) => ("Formulário enviado", "sent"),
        _ => ("Formulário preenchido", "completed"),
    };
    TimelineEvent {
        id: format!("form-{}", form.id),
        event_type: TimelineEventType::Form,
        stage,
        title: title.to_string(),
        description: format!("Pontuação total: {}", form.total_score),
        status: status.to_string(),
        timestamp: form.created_at,
        metadata: json!({
            "formId": form.form_id,
            "totalScore": form.total_score,
            "passed": form.passed,
        }),
    }
}

fn compliance_event(check: &ComplianceCheckRecord) -> TimelineEvent {
    let verdict = check.verdict();
    let stage = compliance_stage(verdict);
    let title = match stage {
        Some(PipelineStage::CpfAprovado) => "CPF aprovado",
        Some(PipelineStage::CpfReprovado) => "CPF reprovado",
        _ => "Consulta de CPF em andamento",
    };
    let encrypted = matches!(check.cpf_value(), CpfValue::Encrypted(_));
    TimelineEvent {
        id: format!("compliance-{}", check.id),
        event_type: TimelineEventType::Compliance,
        stage,
        title: title.to_string(),
        description: format!("{} processo(s) encontrados", check.lawsuits.total),
        status: check.status.as_str().to_string(),
        timestamp: check.consulted_at,
        metadata: json!({
            "riskScore": check.risk_score,
            "lawsuits": check.lawsuits,
            "cpfEncrypted": encrypted,
        }),
    }
}

fn meeting_event(meeting: &MeetingRecord, now: DateTime<Utc>) -> TimelineEvent {
    let stage = meeting_stage(meeting, now);
    let title = match stage {
        Some(PipelineStage::Consultor) => "Encaminhado ao consultor",
        Some(PipelineStage::ReuniaoCompleto) => "Reunião realizada",
        Some(PipelineStage::ReuniaoNaoCompareceu) => "Não compareceu à reunião",
        Some(PipelineStage::ReuniaoAgendada) => "Reunião agendada",
        Some(PipelineStage::ReuniaoPendente) => "Reunião pendente",
        _ => "Reunião registrada",
    };
    let description = match (meeting.data, meeting.hora.as_deref()) {
        (Some(data), Some(hora)) => format!("{} às {}", data.format("%d/%m/%Y"), hora),
        (Some(data), None) => data.format("%d/%m/%Y").to_string(),
        (None, _) => "Sem data definida".to_string(),
    };
    // Scheduled meetings sit on the timeline at their scheduled time
    let timestamp = meeting
        .scheduled_at()
        .map(|at| Utc.from_utc_datetime(&at))
        .unwrap_or(meeting.created_at);

    TimelineEvent {
        id: format!("meeting-{}", meeting.id),
        event_type: TimelineEventType::Meeting,
        stage,
        title: title.to_string(),
        description,
        status: meeting.status.as_str().to_string(),
        timestamp,
        metadata: json!({
            "tipo": meeting.tipo,
            "local": meeting.local,
            "link": meeting.link,
            "consultor": meeting.consultor_nome,
            "resultado": meeting.outcome(),
            "motivoRecusa": meeting.motivo_recusa,
        }),
    }
}
