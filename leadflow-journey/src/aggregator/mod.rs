//! Journey aggregation
//!
//! Builds one [`LeadJourney`] per normalized phone key seen in any source,
//! then hands every record no key claimed to the orphan pass. Each source
//! record ends up in exactly one journey, either as that journey's selected
//! record or in its history.
//!
//! Passes:
//! 1. Index every source (preference order: rank, most recent, id).
//! 2. For each phone key, pick one candidate per source through the match
//!    chain. Contacts are anchored on the phone key itself.
//! 3. Resolve records claimed by several keys: strongest level wins, then the
//!    key equal to the record's own phone, then a key anchored on a contact,
//!    then the first key. Claims resting on a CPF or name from a record the
//!    key lost are withdrawn, and keys rematch until nothing changes.
//! 4. Keys that kept no record become aliases of the journey that won them.
//! 5. Leftovers attach to a journey sharing their phone or CPF, or seed
//!    orphan journeys (see [`orphans`]).

pub mod matching;
pub mod orphans;

use crate::classifier::classify;
use crate::sources::index::sort_by_preference;
use crate::sources::{CpfDecryptor, RecordIndex, RecordKeys, SourceRecord, SourceSnapshot};
use crate::timeline::synthesize;
use chrono::{DateTime, Utc};
use leadflow_common::time::epoch;
use leadflow_common::{JourneyHistory, LeadJourney, MatchLevel, MatchTrace};
use matching::{resolve, Identity};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// The four sources, in field order of a journey
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Contact = 0,
    Form = 1,
    Compliance = 2,
    Meeting = 3,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Contact, Source::Form, Source::Compliance, Source::Meeting];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Contact => "contact",
            Source::Form => "form",
            Source::Compliance => "compliance",
            Source::Meeting => "meeting",
        }
    }

    fn idx(self) -> usize {
        self as usize
    }
}

/// A journey under construction: positions into the snapshot
#[derive(Debug, Clone, Default)]
pub(crate) struct Draft {
    pub phone_key: String,
    pub aliases: Vec<String>,
    /// Source of the record that seeded an orphan journey
    pub seed: Option<Source>,
    pub identity: Identity,
    pub selected: [Option<(usize, MatchLevel)>; 4],
    pub history: [Vec<usize>; 4],
}

/// Shared state of one aggregation call
pub(crate) struct Linker {
    pub indexes: [RecordIndex; 4],
    /// Journey (draft) holding each record, per source
    pub owners: [Vec<Option<usize>>; 4],
    pub drafts: Vec<Draft>,
    pub phone_owner: HashMap<String, usize>,
    pub id_owner: HashMap<String, usize>,
}

impl Linker {
    fn new(snapshot: &SourceSnapshot, decryptor: &dyn CpfDecryptor) -> Self {
        let indexes = [
            RecordIndex::build(&snapshot.contacts, decryptor),
            RecordIndex::build(&snapshot.forms, decryptor),
            RecordIndex::build(&snapshot.checks, decryptor),
            RecordIndex::build(&snapshot.meetings, decryptor),
        ];
        let owners = [
            vec![None; indexes[0].len()],
            vec![None; indexes[1].len()],
            vec![None; indexes[2].len()],
            vec![None; indexes[3].len()],
        ];
        Self {
            indexes,
            owners,
            drafts: Vec::new(),
            phone_owner: HashMap::new(),
            id_owner: HashMap::new(),
        }
    }

    pub fn index(&self, source: Source) -> &RecordIndex {
        &self.indexes[source.idx()]
    }

    pub fn is_owned(&self, source: Source, pos: usize) -> bool {
        self.owners[source.idx()][pos].is_some()
    }

    pub fn new_draft(&mut self, draft: Draft) -> usize {
        self.drafts.push(draft);
        self.drafts.len() - 1
    }

    /// Make `pos` the selected record of `source` on draft `d`
    pub fn select(&mut self, d: usize, source: Source, pos: usize, level: MatchLevel) {
        let keys = &self.indexes[source.idx()].keys[pos];
        let draft = &mut self.drafts[d];
        draft.selected[source.idx()] = Some((pos, level));
        draft.identity.absorb(keys);
        for id in &draft.identity.ids {
            self.id_owner.entry(id.clone()).or_insert(d);
        }
        self.owners[source.idx()][pos] = Some(d);
    }

    pub fn add_history(&mut self, d: usize, source: Source, pos: usize) {
        self.drafts[d].history[source.idx()].push(pos);
        self.owners[source.idx()][pos] = Some(d);
    }

    pub fn register_phone(&mut self, phone_key: &str, d: usize) {
        if !phone_key.is_empty() {
            self.phone_owner.entry(phone_key.to_string()).or_insert(d);
        }
    }

    /// Best available record of `source` for draft `d`, among unowned records
    pub fn resolve_unowned(&self, d: usize, source: Source) -> Option<(usize, MatchLevel)> {
        let owners = &self.owners[source.idx()];
        resolve(self.index(source), &self.drafts[d].identity, &|pos| owners[pos].is_none())
    }
}

/// One key's claim on a record
#[derive(Debug, Clone, Copy)]
struct Claim {
    key: usize,
    level: MatchLevel,
}

/// A key's pick from one source
#[derive(Debug, Clone, Copy)]
struct Found {
    pos: usize,
    level: MatchLevel,
    /// Record whose CPF or name led to this one; `None` when the phone key did
    via: Option<(Source, usize)>,
}

type Candidates = [Option<Found>; 4];

/// Which linked record first contributed each CPF / name key
#[derive(Default)]
struct Suppliers {
    ids: HashMap<String, (Source, usize)>,
    names: HashMap<String, (Source, usize)>,
}

impl Suppliers {
    fn absorb(&mut self, identity: &mut Identity, keys: &RecordKeys, record: (Source, usize)) {
        identity.absorb(keys);
        if !keys.id.is_empty() {
            self.ids.entry(keys.id.clone()).or_insert(record);
        }
        if !keys.name.is_empty() {
            self.names.entry(keys.name.clone()).or_insert(record);
        }
    }

    fn via(&self, keys: &RecordKeys, level: MatchLevel) -> Option<(Source, usize)> {
        match level {
            MatchLevel::Id => self.ids.get(&keys.id).copied(),
            MatchLevel::Name => self.names.get(&keys.name).copied(),
            _ => None,
        }
    }
}

/// Aggregate a tenant's snapshot into journeys, newest first
pub fn aggregate(
    tenant_id: &str,
    mut snapshot: SourceSnapshot,
    decryptor: &dyn CpfDecryptor,
    now: DateTime<Utc>,
) -> Vec<LeadJourney> {
    sort_by_preference(&mut snapshot.contacts);
    sort_by_preference(&mut snapshot.forms);
    sort_by_preference(&mut snapshot.checks);
    sort_by_preference(&mut snapshot.meetings);

    let mut linker = Linker::new(&snapshot, decryptor);
    link_phone_keys(&mut linker);
    orphans::attach_siblings(&mut linker);
    orphans::seed_orphans(&mut linker);

    let mut journeys: Vec<LeadJourney> = linker
        .drafts
        .iter()
        .map(|draft| materialize(tenant_id, draft, &snapshot, now))
        .collect();
    journeys.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

    info!(
        tenant_id,
        journeys = journeys.len(),
        orphans = journeys.iter().filter(|j| j.orphan).count(),
        aliases = journeys.iter().map(|j| j.phone_aliases.len()).sum::<usize>(),
        records = snapshot.record_count(),
        "Aggregated lead journeys"
    );
    journeys
}

/// Run the match chain for one phone key, skipping records it already lost
fn find_candidates(linker: &Linker, key: &str, lost: &BTreeSet<(Source, usize)>) -> Candidates {
    let mut found: Candidates = [None; 4];
    let mut identity = Identity::with_phone(key);
    let mut suppliers = Suppliers::default();

    let contacts = linker.index(Source::Contact);
    let anchor = contacts
        .by_phone
        .get(key)
        .and_then(|positions| positions.iter().copied().find(|&p| !lost.contains(&(Source::Contact, p))));
    if let Some(pos) = anchor {
        found[Source::Contact.idx()] = Some(Found {
            pos,
            level: MatchLevel::Phone,
            via: None,
        });
        suppliers.absorb(&mut identity, &contacts.keys[pos], (Source::Contact, pos));
    }

    for source in [Source::Form, Source::Compliance, Source::Meeting] {
        let index = linker.index(source);
        if let Some((pos, level)) = resolve(index, &identity, &|p| !lost.contains(&(source, p))) {
            debug!(phone = %key, source = source.as_str(), level = ?level, "Matched record");
            let via = suppliers.via(&index.keys[pos], level);
            found[source.idx()] = Some(Found { pos, level, via });
            suppliers.absorb(&mut identity, &index.keys[pos], (source, pos));
        }
    }
    found
}

/// Winning key per claimed record.
///
/// Strongest level wins, then the key equal to the record's own phone, then
/// a key anchored on a contact, then the first key. A claim stands only while
/// its key also holds the record that led to it; claims that lose that
/// record are withdrawn and the contest rerun.
fn resolve_claims(linker: &Linker, keys: &[String], candidates: &[Candidates]) -> HashMap<(Source, usize), usize> {
    let mut withdrawn: HashSet<(Source, usize, usize)> = HashSet::new();
    loop {
        let mut claims: HashMap<(Source, usize), Vec<Claim>> = HashMap::new();
        for (k, found) in candidates.iter().enumerate() {
            for source in Source::ALL {
                if let Some(f) = found[source.idx()] {
                    if !withdrawn.contains(&(source, f.pos, k)) {
                        claims.entry((source, f.pos)).or_default().push(Claim { key: k, level: f.level });
                    }
                }
            }
        }

        let winners: HashMap<(Source, usize), usize> = claims
            .iter()
            .filter_map(|(&(source, pos), record_claims)| {
                let own_phone = &linker.index(source).keys[pos].phone;
                record_claims
                    .iter()
                    .min_by_key(|c| {
                        let anchored = candidates[c.key][Source::Contact.idx()].is_some();
                        (c.level, keys[c.key] != *own_phone, !anchored, c.key)
                    })
                    .map(|c| ((source, pos), c.key))
            })
            .collect();

        let mut changed = false;
        for (k, found) in candidates.iter().enumerate() {
            for source in Source::ALL {
                let Some(Found { pos, via: Some(via), .. }) = found[source.idx()] else {
                    continue;
                };
                if winners.get(&via) != Some(&k) {
                    changed |= withdrawn.insert((source, pos, k));
                }
            }
        }
        if !changed {
            return winners;
        }
    }
}

/// Passes 2-4: one draft per phone key that keeps at least one record.
///
/// Keys rerun their match chain without the records they lost until every
/// key holds exactly what it matched, so no key links a record through a
/// CPF or name it does not own.
fn link_phone_keys(linker: &mut Linker) {
    let keys: Vec<String> = Source::ALL
        .iter()
        .flat_map(|&s| linker.index(s).phone_keys().cloned().collect::<Vec<_>>())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut lost: Vec<BTreeSet<(Source, usize)>> = vec![BTreeSet::new(); keys.len()];
    let mut rounds = 0usize;
    let (candidates, winners) = loop {
        rounds += 1;
        let candidates: Vec<Candidates> = keys
            .iter()
            .zip(&lost)
            .map(|(key, lost)| find_candidates(linker, key, lost))
            .collect();
        let winners = resolve_claims(linker, &keys, &candidates);

        let mut grew = false;
        for (k, found) in candidates.iter().enumerate() {
            for source in Source::ALL {
                if let Some(f) = found[source.idx()] {
                    if winners.get(&(source, f.pos)) != Some(&k) {
                        grew |= lost[k].insert((source, f.pos));
                    }
                }
            }
        }
        if !grew {
            break (candidates, winners);
        }
    };
    if rounds > 1 {
        debug!(rounds, "Phone key linking settled");
    }

    let mut key_draft: Vec<Option<usize>> = vec![None; keys.len()];
    for (k, key) in keys.iter().enumerate() {
        let won: Vec<(Source, Found)> = Source::ALL
            .iter()
            .filter_map(|&s| candidates[k][s.idx()].map(|f| (s, f)))
            .collect();
        if won.is_empty() {
            continue;
        }

        let d = linker.new_draft(Draft {
            phone_key: key.clone(),
            identity: Identity::with_phone(key),
            ..Draft::default()
        });
        for (source, f) in won {
            linker.select(d, source, f.pos, f.level);
        }
        linker.register_phone(key, d);
        key_draft[k] = Some(d);
    }

    // Keys whose every candidate went elsewhere resolve to the winner's journey
    for (k, key) in keys.iter().enumerate() {
        if key_draft[k].is_some() {
            continue;
        }
        let target = lost[k]
            .iter()
            .find_map(|sp| winners.get(sp).and_then(|&w| key_draft[w]));
        if let Some(d) = target {
            debug!(phone = %key, owner = %linker.drafts[d].phone_key, "Phone key resolved as alias");
            linker.drafts[d].aliases.push(key.clone());
            linker.register_phone(key, d);
        }
    }
}

fn first_non_empty<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    values
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn pick<T: Clone>(records: &[T], selected: Option<(usize, MatchLevel)>) -> Option<T> {
    selected.map(|(pos, _)| records[pos].clone())
}

fn pick_all<T: Clone>(records: &[T], positions: &[usize]) -> Vec<T> {
    positions.iter().map(|&pos| records[pos].clone()).collect()
}

/// Turn a draft into the public journey, classified and with its timeline
fn materialize(tenant_id: &str, draft: &Draft, snapshot: &SourceSnapshot, now: DateTime<Utc>) -> LeadJourney {
    let contact = pick(&snapshot.contacts, draft.selected[Source::Contact.idx()]);
    let form = pick(&snapshot.forms, draft.selected[Source::Form.idx()]);
    let check = pick(&snapshot.checks, draft.selected[Source::Compliance.idx()]);
    let meeting = pick(&snapshot.meetings, draft.selected[Source::Meeting.idx()]);

    let id = match draft.seed {
        Some(source) => {
            let (pos, _) = draft.selected[source.idx()].unwrap_or((0, MatchLevel::Seed));
            let record_id = match source {
                Source::Contact => snapshot.contacts[pos].record_id(),
                Source::Form => snapshot.forms[pos].record_id(),
                Source::Compliance => snapshot.checks[pos].record_id(),
                Source::Meeting => snapshot.meetings[pos].record_id(),
            };
            format!("orphan-{}-{}", source.as_str(), record_id)
        }
        None => draft.phone_key.clone(),
    };

    let mut journey = LeadJourney::empty(id, tenant_id);
    journey.telefone = first_non_empty([
        contact.as_ref().map(|c| c.telefone.as_str()),
        form.as_ref().and_then(|f| f.contact_phone.as_deref()),
        check.as_ref().and_then(|c| c.person_phone.as_deref()),
        meeting.as_ref().and_then(|m| m.contact_phone.as_deref()),
    ])
    .unwrap_or_default();
    journey.telefone_normalizado = draft.phone_key.clone();
    journey.phone_aliases = draft.aliases.clone();
    journey.nome = first_non_empty([
        contact.as_ref().map(|c| c.nome.as_str()),
        form.as_ref().and_then(|f| f.contact_name.as_deref()),
        check.as_ref().and_then(|c| c.person_name.as_deref()),
        meeting.as_ref().and_then(|m| m.contact_name.as_deref()),
    ])
    .unwrap_or_default();
    journey.email = first_non_empty([
        contact.as_ref().and_then(|c| c.email.as_deref()),
        form.as_ref().and_then(|f| f.contact_email.as_deref()),
    ]);
    journey.cpf = first_non_empty([
        contact.as_ref().and_then(|c| c.cpf.as_deref()),
        form.as_ref().and_then(|f| f.contact_cpf.as_deref()),
        check.as_ref().and_then(|c| c.cpf.as_deref()),
        meeting.as_ref().and_then(|m| m.contact_cpf.as_deref()),
    ]);
    journey.updated_at = [
        contact.as_ref().map(SourceRecord::updated_at),
        form.as_ref().map(SourceRecord::updated_at),
        check.as_ref().map(SourceRecord::updated_at),
        meeting.as_ref().map(SourceRecord::updated_at),
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or_else(epoch);

    journey.matches = MatchTrace {
        contact: draft.selected[Source::Contact.idx()].map(|(_, l)| l),
        form: draft.selected[Source::Form.idx()].map(|(_, l)| l),
        compliance: draft.selected[Source::Compliance.idx()].map(|(_, l)| l),
        meeting: draft.selected[Source::Meeting.idx()].map(|(_, l)| l),
    };
    journey.history = JourneyHistory {
        contacts: pick_all(&snapshot.contacts, &draft.history[Source::Contact.idx()]),
        forms: pick_all(&snapshot.forms, &draft.history[Source::Form.idx()]),
        checks: pick_all(&snapshot.checks, &draft.history[Source::Compliance.idx()]),
        meetings: pick_all(&snapshot.meetings, &draft.history[Source::Meeting.idx()]),
    };
    journey.orphan = draft.seed.is_some();
    journey.contact = contact;
    journey.form = form;
    journey.cpf_data = check;
    journey.meeting = meeting;

    journey.set_stage(classify(&journey, now));
    journey.timeline = synthesize(&journey, now);
    journey
}
