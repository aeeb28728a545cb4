//! Tri-state approval verdicts
//!
//! Form builders and compliance providers encode "passed" in whatever shape
//! they like: booleans, `"true"`, `"aprovado"`, `1`, `"0"`. All readers of
//! those fields go through the two predicates below so the equivalence sets
//! live in exactly one place.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

const APPROVAL_WORDS: &[&str] = &["true", "approved", "aprovado", "1"];
const REJECTION_WORDS: &[&str] = &["false", "rejected", "reprovado", "0"];

/// True when `value` is one of the approval encodings
/// (`true`, `"true"`, `"approved"`, `"aprovado"`, `1`).
pub fn is_approval_equivalent(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => word_in(s, APPROVAL_WORDS),
        _ => false,
    }
}

/// True when `value` is one of the rejection encodings
/// (`false`, `"false"`, `"rejected"`, `"reprovado"`, `0`).
pub fn is_rejection_equivalent(value: &Value) -> bool {
    match value {
        Value::Bool(b) => !*b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => word_in(s, REJECTION_WORDS),
        _ => false,
    }
}

fn word_in(raw: &str, words: &[&str]) -> bool {
    let word = raw.trim().to_lowercase();
    words.contains(&word.as_str())
}

/// Normalized tri-state outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Verdict {
    Approved,
    Rejected,
    #[default]
    Unset,
}

impl Verdict {
    /// Classify an arbitrary JSON value
    pub fn from_json(value: &Value) -> Self {
        if is_approval_equivalent(value) {
            Verdict::Approved
        } else if is_rejection_equivalent(value) {
            Verdict::Rejected
        } else {
            Verdict::Unset
        }
    }

    /// Classify a text column (SQLite stores booleans and numbers as text here)
    pub fn from_text(raw: &str) -> Self {
        Self::from_json(&Value::String(raw.to_string()))
    }

    /// Classify an optional text column
    pub fn from_opt_text(raw: Option<&str>) -> Self {
        raw.map(Self::from_text).unwrap_or_default()
    }

    pub fn is_approved(self) -> bool {
        self == Verdict::Approved
    }

    pub fn is_rejected(self) -> bool {
        self == Verdict::Rejected
    }

    pub fn is_set(self) -> bool {
        self != Verdict::Unset
    }

    /// Boolean view, `None` when unset
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Verdict::Approved => Some(true),
            Verdict::Rejected => Some(false),
            Verdict::Unset => None,
        }
    }
}

impl From<Option<bool>> for Verdict {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Verdict::Approved,
            Some(false) => Verdict::Rejected,
            None => Verdict::Unset,
        }
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.as_bool() {
            Some(b) => serializer.serialize_bool(b),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Verdict::from_json(&value))
    }
}
