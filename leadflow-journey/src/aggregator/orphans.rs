//! Leftover records: sibling attachment and orphan journeys
//!
//! After the phone-key pass a record may still be unowned, e.g. an older
//! form of a lead whose newer form was selected, or a compliance check with
//! no phone. Such records first try to join an existing journey that answers
//! to their phone key or CPF; only then do they seed a journey of their own.

use super::matching::Identity;
use super::{Draft, Linker, Source};
use leadflow_common::MatchLevel;
use tracing::debug;

/// Orphan seeding order
const SEED_ORDER: [Source; 4] = [Source::Compliance, Source::Form, Source::Meeting, Source::Contact];

/// Attach a record to the journey owning its phone key or CPF.
///
/// Fills the journey's slot for that source when empty, else appends the
/// record to the journey's history. Returns false when no journey fits.
fn try_attach(linker: &mut Linker, source: Source, pos: usize) -> bool {
    let keys = &linker.index(source).keys[pos];
    let target = linker
        .phone_owner
        .get(&keys.phone)
        .map(|&d| (d, MatchLevel::Phone))
        .or_else(|| linker.id_owner.get(&keys.id).map(|&d| (d, MatchLevel::Id)));

    let Some((d, level)) = target else {
        return false;
    };

    if linker.drafts[d].selected[source.idx()].is_none() {
        linker.select(d, source, pos, level);
    } else {
        linker.add_history(d, source, pos);
    }
    true
}

/// Attach every unowned record that shares a phone key or CPF with a journey
pub(crate) fn attach_siblings(linker: &mut Linker) {
    let mut attached = 0usize;
    for source in Source::ALL {
        for pos in 0..linker.index(source).len() {
            if !linker.is_owned(source, pos) && try_attach(linker, source, pos) {
                attached += 1;
            }
        }
    }
    if attached > 0 {
        debug!(attached, "Attached sibling records to existing journeys");
    }
}

/// Give every record still unowned a journey of its own.
///
/// The seed still runs the match chain against the other sources' unowned
/// records, so an orphan check can pick up a form or meeting by name.
pub(crate) fn seed_orphans(linker: &mut Linker) {
    for source in SEED_ORDER {
        for pos in 0..linker.index(source).len() {
            if linker.is_owned(source, pos) || try_attach(linker, source, pos) {
                continue;
            }

            let keys = linker.index(source).keys[pos].clone();
            let d = linker.new_draft(Draft {
                phone_key: keys.phone.clone(),
                seed: Some(source),
                identity: Identity::from_keys(&keys),
                ..Draft::default()
            });
            linker.select(d, source, pos, MatchLevel::Seed);
            linker.register_phone(&keys.phone, d);

            for other in Source::ALL.into_iter().filter(|&s| s != source) {
                if let Some((found, level)) = linker.resolve_unowned(d, other) {
                    let phone = linker.index(other).keys[found].phone.clone();
                    linker.select(d, other, found, level);
                    linker.register_phone(&phone, d);
                }
            }

            debug!(
                source = source.as_str(),
                phone = %keys.phone,
                has_id = !keys.id.is_empty(),
                "Seeded orphan journey"
            );
        }
    }
}
