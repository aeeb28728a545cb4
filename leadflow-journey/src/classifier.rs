//! Pipeline stage classifier
//!
//! A strict priority cascade over the journey's signals: meeting outcome,
//! then form rejection, then the compliance verdict, then form approval.
//! The first rule that applies decides the stage; the function is total.

use chrono::{DateTime, Utc};
use leadflow_common::{FormSubmissionRecord, LeadJourney, MeetingRecord, MeetingStatus, PipelineStage, Verdict};

/// Classify a journey as of `now`
pub fn classify(journey: &LeadJourney, now: DateTime<Utc>) -> PipelineStage {
    if let Some(stage) = journey.meeting.as_ref().and_then(|m| meeting_stage(m, now)) {
        return stage;
    }

    // A current form rejection outranks any compliance verdict
    if let Some(form) = &journey.form {
        if form.passed.is_rejected() {
            return PipelineStage::FormularioReprovado;
        }
    }

    if let Some(stage) = compliance_stage(compliance_verdict(journey)) {
        return stage;
    }

    journey.form.as_ref().and_then(form_stage).unwrap_or(PipelineStage::ContatoInicial)
}

/// Stage implied by a meeting alone, if it implies one
pub fn meeting_stage(meeting: &MeetingRecord, now: DateTime<Utc>) -> Option<PipelineStage> {
    if meeting.outcome().is_some() {
        return Some(PipelineStage::Consultor);
    }

    match meeting.status {
        MeetingStatus::Realizada => return Some(PipelineStage::ReuniaoCompleto),
        MeetingStatus::NaoCompareceu => return Some(PipelineStage::ReuniaoNaoCompareceu),
        _ => {}
    }

    // Attendance flag only counts once the meeting time has passed
    if meeting.compareceu == Some(false) {
        let passed = match meeting.scheduled_at() {
            None => true,
            Some(at) => at < now.naive_utc(),
        };
        if passed {
            return Some(PipelineStage::ReuniaoNaoCompareceu);
        }
    }

    match meeting.status {
        MeetingStatus::Agendada => Some(PipelineStage::ReuniaoAgendada),
        MeetingStatus::Pendente if meeting.data.is_some() => Some(PipelineStage::ReuniaoPendente),
        MeetingStatus::Pendente | MeetingStatus::Cancelada | MeetingStatus::Other(_) => None,
        MeetingStatus::Realizada | MeetingStatus::NaoCompareceu => None,
    }
}

/// Stage implied by a form alone (approved, rejected or still unfilled)
pub fn form_stage(form: &FormSubmissionRecord) -> Option<PipelineStage> {
    match form.passed {
        Verdict::Rejected => Some(PipelineStage::FormularioReprovado),
        Verdict::Approved => Some(PipelineStage::FormularioAprovado),
        Verdict::Unset if form.is_unfilled() => Some(PipelineStage::FormularioNaoPreenchido),
        Verdict::Unset => None,
    }
}

/// Compliance verdict of a journey: its check, else the status the
/// reconciliation poller wrote onto the contact
pub fn compliance_verdict(journey: &LeadJourney) -> Verdict {
    let from_check = journey.cpf_data.as_ref().map(|c| c.verdict()).unwrap_or_default();
    if from_check.is_set() {
        return from_check;
    }
    journey
        .contact
        .as_ref()
        .map(|c| c.reconciled_verdict())
        .unwrap_or_default()
}

/// Stage for a compliance verdict; `None` while the check is not terminal
pub fn compliance_stage(verdict: Verdict) -> Option<PipelineStage> {
    match verdict {
        Verdict::Approved => Some(PipelineStage::CpfAprovado),
        Verdict::Rejected => Some(PipelineStage::CpfReprovado),
        Verdict::Unset => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn journey() -> LeadJourney {
        LeadJourney::empty("j1", "t1")
    }

    fn meeting(value: serde_json::Value) -> MeetingRecord {
        let mut value = value;
        value["id"] = json!("m1");
        serde_json::from_value(value).unwrap()
    }

    fn form(value: serde_json::Value) -> FormSubmissionRecord {
        let mut value = value;
        value["id"] = json!("f1");
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_empty_journey_is_initial_contact() {
        assert_eq!(classify(&journey(), now()), PipelineStage::ContatoInicial);
    }

    #[test]
    fn test_meeting_cascade() {
        let cases = [
            (json!({"status": "agendada", "resultadoReuniao": "fechou"}), Some(PipelineStage::Consultor)),
            (json!({"status": "realizada"}), Some(PipelineStage::ReuniaoCompleto)),
            (json!({"status": "naocompareceu"}), Some(PipelineStage::ReuniaoNaoCompareceu)),
            (json!({"status": "agendada", "compareceu": false, "data": "2024-01-01"}), Some(PipelineStage::ReuniaoNaoCompareceu)),
            (json!({"status": "cancelada", "compareceu": false}), Some(PipelineStage::ReuniaoNaoCompareceu)),
            (json!({"status": "agendado", "compareceu": false, "data": "2024-12-01"}), Some(PipelineStage::ReuniaoAgendada)),
            (json!({"status": "pendente", "data": "2024-07-01"}), Some(PipelineStage::ReuniaoPendente)),
            (json!({"status": "pendente"}), None),
            (json!({"status": "cancelada"}), None),
            (json!({"status": "agendada", "resultadoReuniao": "   "}), Some(PipelineStage::ReuniaoAgendada)),
        ];

        for (value, expected) in cases {
            let m = meeting(value.clone());
            assert_eq!(meeting_stage(&m, now()), expected, "meeting {}", value);
        }
    }

    #[test]
    fn test_no_show_on_meeting_day_waits_for_meeting_time() {
        let m = meeting(json!({"status": "agendada", "compareceu": false, "data": "2024-06-01", "hora": "15:00"}));
        assert_eq!(meeting_stage(&m, now()), Some(PipelineStage::ReuniaoAgendada));

        let m = meeting(json!({"status": "agendada", "compareceu": false, "data": "2024-06-01", "hora": "09:00"}));
        assert_eq!(meeting_stage(&m, now()), Some(PipelineStage::ReuniaoNaoCompareceu));
    }

    #[test]
    fn test_rejected_form_outranks_approved_check() {
        let mut j = journey();
        j.form = Some(form(json!({"passed": false, "totalScore": 40})));
        j.cpf_data = Some(serde_json::from_value(json!({"id": "c1", "status": "approved", "aprovado": true})).unwrap());
        assert_eq!(classify(&j, now()), PipelineStage::FormularioReprovado);
    }

    #[test]
    fn test_compliance_before_form_approval() {
        let mut j = journey();
        j.form = Some(form(json!({"passed": "aprovado"})));
        assert_eq!(classify(&j, now()), PipelineStage::FormularioAprovado);

        j.cpf_data = Some(serde_json::from_value(json!({"id": "c1", "status": "reprovado"})).unwrap());
        assert_eq!(classify(&j, now()), PipelineStage::CpfReprovado);

        j.cpf_data = Some(serde_json::from_value(json!({"id": "c1", "status": "pending", "aprovado": 1})).unwrap());
        assert_eq!(classify(&j, now()), PipelineStage::CpfAprovado);
    }

    #[test]
    fn test_meeting_outranks_everything_else() {
        let mut j = journey();
        j.form = Some(form(json!({"passed": false})));
        j.meeting = Some(meeting(json!({"status": "realizada"})));
        assert_eq!(classify(&j, now()), PipelineStage::ReuniaoCompleto);

        // A meeting with no implied stage falls through to the form rules
        j.meeting = Some(meeting(json!({"status": "cancelada"})));
        assert_eq!(classify(&j, now()), PipelineStage::FormularioReprovado);
    }

    #[test]
    fn test_unfilled_form() {
        let mut j = journey();
        j.form = Some(form(json!({"status": "enviado"})));
        assert_eq!(classify(&j, now()), PipelineStage::FormularioNaoPreenchido);

        j.form = Some(form(json!({"status": "completed"})));
        assert_eq!(classify(&j, now()), PipelineStage::ContatoInicial);
    }

    #[test]
    fn test_reconciled_contact_status_counts_as_compliance() {
        let mut j = journey();
        j.contact = Some(
            serde_json::from_value(json!({"id": "c1", "telefone": "31999972368", "cpfStatus": "approved"})).unwrap(),
        );
        assert_eq!(classify(&j, now()), PipelineStage::CpfAprovado);

        // A pending check does not hide the reconciled status
        j.cpf_data = Some(serde_json::from_value(json!({"id": "k1", "status": "pending"})).unwrap());
        assert_eq!(classify(&j, now()), PipelineStage::CpfAprovado);
    }

    #[test]
    fn test_classifier_is_total_over_signal_combinations() {
        let meetings = [
            None,
            Some(json!({"status": "pendente"})),
            Some(json!({"status": "agendada", "compareceu": false})),
            Some(json!({"status": "weird"})),
        ];
        let forms = [None, Some(json!({"passed": null})), Some(json!({"passed": "0"})), Some(json!({"passed": 1}))];
        let checks = [None, Some("approved"), Some("rejected"), Some("manual_review"), Some("error")];

        for m in &meetings {
            for f in &forms {
                for c in &checks {
                    let mut j = journey();
                    j.meeting = m.clone().map(meeting);
                    j.form = f.clone().map(form);
                    j.cpf_data = c.map(|s| serde_json::from_value(json!({"id": "c1", "status": s})).unwrap());
                    let stage = classify(&j, now());
                    assert!(PipelineStage::ALL.contains(&stage));
                }
            }
        }
    }
}
