//! Per-source lookup maps
//!
//! Records are first put into preference order (see [`sort_by_preference`]),
//! then indexed by normalized phone, normalized CPF and folded name. Every
//! map value is a list of positions in ascending order, so the first
//! position in a list is the preferred record for that key.

use super::CpfDecryptor;
use chrono::{DateTime, Utc};
use leadflow_common::normalize::{normalize_id, normalize_name, normalize_phone};
use leadflow_common::records::CpfValue;
use leadflow_common::{ComplianceCheckRecord, ContactRecord, FormStatus, FormSubmissionRecord, MeetingRecord};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Identity keys of one record; empty string when the record has none
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordKeys {
    pub phone: String,
    pub id: String,
    pub name: String,
}

/// Common view over the four source record types
pub trait SourceRecord {
    /// Source name used in logs and orphan journey ids
    const SOURCE: &'static str;

    fn record_id(&self) -> &str;
    fn raw_phone(&self) -> Option<&str>;
    fn raw_name(&self) -> Option<&str>;
    fn id_key(&self, decryptor: &dyn CpfDecryptor) -> String;
    fn updated_at(&self) -> DateTime<Utc>;

    /// Lower ranks are preferred over more recent records of a higher rank
    fn rank(&self) -> u8 {
        0
    }

    fn keys(&self, decryptor: &dyn CpfDecryptor) -> RecordKeys {
        RecordKeys {
            phone: self.raw_phone().map(normalize_phone).unwrap_or_default(),
            id: self.id_key(decryptor),
            name: self.raw_name().map(normalize_name).unwrap_or_default(),
        }
    }
}

fn id_of(raw: Option<&str>) -> String {
    raw.map(normalize_id).unwrap_or_default()
}

impl SourceRecord for ContactRecord {
    const SOURCE: &'static str = "contact";

    fn record_id(&self) -> &str {
        &self.id
    }
    fn raw_phone(&self) -> Option<&str> {
        Some(&self.telefone)
    }
    fn raw_name(&self) -> Option<&str> {
        Some(&self.nome)
    }
    fn id_key(&self, _decryptor: &dyn CpfDecryptor) -> String {
        id_of(self.cpf.as_deref())
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl SourceRecord for FormSubmissionRecord {
    const SOURCE: &'static str = "form";

    fn record_id(&self) -> &str {
        &self.id
    }
    fn raw_phone(&self) -> Option<&str> {
        self.contact_phone.as_deref()
    }
    fn raw_name(&self) -> Option<&str> {
        self.contact_name.as_deref()
    }
    fn id_key(&self, _decryptor: &dyn CpfDecryptor) -> String {
        id_of(self.contact_cpf.as_deref())
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // A completed form beats a more recent "sent" placeholder
    fn rank(&self) -> u8 {
        match self.status {
            FormStatus::Completed => 0,
            FormStatus::Sent => 1,
        }
    }
}

impl SourceRecord for ComplianceCheckRecord {
    const SOURCE: &'static str = "compliance";

    fn record_id(&self) -> &str {
        &self.id
    }
    fn raw_phone(&self) -> Option<&str> {
        self.person_phone.as_deref()
    }
    fn raw_name(&self) -> Option<&str> {
        self.person_name.as_deref()
    }
    fn id_key(&self, decryptor: &dyn CpfDecryptor) -> String {
        match self.cpf_value() {
            CpfValue::Plain(cpf) => normalize_id(cpf),
            CpfValue::Encrypted(enc) => match decryptor.decrypt(enc) {
                Some(cpf) => normalize_id(&cpf),
                None => {
                    tracing::debug!(check_id = %self.id, "CPF could not be decrypted; ID matching skipped");
                    String::new()
                }
            },
            CpfValue::Missing => String::new(),
        }
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.consulted_at
    }

    // Terminal results beat newer pending re-checks
    fn rank(&self) -> u8 {
        if self.verdict().is_set() {
            0
        } else {
            1
        }
    }
}

impl SourceRecord for MeetingRecord {
    const SOURCE: &'static str = "meeting";

    fn record_id(&self) -> &str {
        &self.id
    }
    fn raw_phone(&self) -> Option<&str> {
        self.contact_phone.as_deref()
    }
    fn raw_name(&self) -> Option<&str> {
        self.contact_name.as_deref()
    }
    fn id_key(&self, _decryptor: &dyn CpfDecryptor) -> String {
        id_of(self.contact_cpf.as_deref())
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Order records by rank, then most recent first, then id
pub fn sort_by_preference<R: SourceRecord>(records: &mut [R]) {
    records.sort_by(|a, b| {
        (a.rank(), Reverse(a.updated_at()), a.record_id()).cmp(&(b.rank(), Reverse(b.updated_at()), b.record_id()))
    });
}

/// Lookup maps for one source
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    /// Keys of the record at each position
    pub keys: Vec<RecordKeys>,
    pub by_phone: HashMap<String, Vec<usize>>,
    pub by_id: HashMap<String, Vec<usize>>,
    pub by_name: HashMap<String, Vec<usize>>,
}

impl RecordIndex {
    /// Index records that are already in preference order
    pub fn build<R: SourceRecord>(records: &[R], decryptor: &dyn CpfDecryptor) -> Self {
        let mut index = RecordIndex::default();
        for (pos, record) in records.iter().enumerate() {
            let keys = record.keys(decryptor);
            if !keys.phone.is_empty() {
                index.by_phone.entry(keys.phone.clone()).or_default().push(pos);
            }
            if !keys.id.is_empty() {
                index.by_id.entry(keys.id.clone()).or_default().push(pos);
            }
            if !keys.name.is_empty() {
                index.by_name.entry(keys.name.clone()).or_default().push(pos);
            }
            index.keys.push(keys);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn phone_keys(&self) -> impl Iterator<Item = &String> {
        self.by_phone.keys()
    }
}
