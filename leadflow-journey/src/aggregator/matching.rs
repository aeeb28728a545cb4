//! Match precedence chain
//!
//! A journey's identity (phone key, CPF keys, folded names) is matched
//! against a source index by an ordered list of matchers. The first matcher
//! that finds an available record wins; its level is kept on the journey.

use crate::sources::{RecordIndex, RecordKeys};
use leadflow_common::MatchLevel;

/// Keys a journey is known by, accumulated as records are linked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub phone: String,
    pub ids: Vec<String>,
    pub names: Vec<String>,
}

impl Identity {
    pub fn with_phone(phone: &str) -> Self {
        Self {
            phone: phone.to_string(),
            ..Self::default()
        }
    }

    pub fn from_keys(keys: &RecordKeys) -> Self {
        let mut identity = Self::with_phone(&keys.phone);
        identity.absorb(keys);
        identity
    }

    /// Add a linked record's keys; the phone key is only taken when unset
    pub fn absorb(&mut self, keys: &RecordKeys) {
        if self.phone.is_empty() && !keys.phone.is_empty() {
            self.phone = keys.phone.clone();
        }
        if !keys.id.is_empty() && !self.ids.contains(&keys.id) {
            self.ids.push(keys.id.clone());
        }
        if !keys.name.is_empty() && !self.names.contains(&keys.name) {
            self.names.push(keys.name.clone());
        }
    }
}

/// Returns the position of the matched record, if any
pub type Matcher = fn(&RecordIndex, &Identity, &dyn Fn(usize) -> bool) -> Option<usize>;

/// Strongest first
pub const MATCHERS: [(MatchLevel, Matcher); 3] = [
    (MatchLevel::Id, match_by_id),
    (MatchLevel::Phone, match_by_phone),
    (MatchLevel::Name, match_by_name),
];

fn first_available(positions: Option<&Vec<usize>>, available: &dyn Fn(usize) -> bool) -> Option<usize> {
    positions?.iter().copied().find(|&pos| available(pos))
}

pub fn match_by_id(index: &RecordIndex, identity: &Identity, available: &dyn Fn(usize) -> bool) -> Option<usize> {
    identity
        .ids
        .iter()
        .find_map(|id| first_available(index.by_id.get(id), available))
}

pub fn match_by_phone(index: &RecordIndex, identity: &Identity, available: &dyn Fn(usize) -> bool) -> Option<usize> {
    if identity.phone.is_empty() {
        return None;
    }
    first_available(index.by_phone.get(&identity.phone), available)
}

pub fn match_by_name(index: &RecordIndex, identity: &Identity, available: &dyn Fn(usize) -> bool) -> Option<usize> {
    identity
        .names
        .iter()
        .find_map(|name| first_available(index.by_name.get(name), available))
}

/// Run the chain; first non-empty result wins
pub fn resolve(
    index: &RecordIndex,
    identity: &Identity,
    available: &dyn Fn(usize) -> bool,
) -> Option<(usize, MatchLevel)> {
    MATCHERS
        .iter()
        .find_map(|(level, matcher)| matcher(index, identity, available).map(|pos| (pos, *level)))
}
