use std::collections::BTreeMap;

use famreg_core::{Delta, FieldValue, Fields, HistoryEntry, Member, MemberChanges, Record, Schema};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    pub track_added_members: bool,
}

impl From<&EngineConfig> for DiffOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            track_added_members: config.track_added_members,
        }
    }
}

/// Field-level deltas between `original` and `edited` over every declared
/// field. A missing original reads as all-null with no members.
///
/// Members of `edited` absent from `original` are skipped unless
/// `track_added_members` is set, in which case each non-null field becomes a
/// `Null -> value` delta and the member is marked `added`. Members removed
/// in `edited` produce nothing.
///
/// Returns `None` when nothing changed.
pub fn diff_records(
    original: Option<&Record>,
    edited: &Record,
    options: DiffOptions,
) -> Option<HistoryEntry> {
    let empty = Fields::new();
    let original_fields = original.map_or(&empty, |r| &r.fields);

    let mut entry = HistoryEntry::new(edited.id.clone(), edited.head().map(str::to_string));
    entry.fields = diff_fields(original_fields, &edited.fields);

    for (member_id, member) in &edited.members {
        let changes = match original.and_then(|r| r.members.get(member_id)) {
            Some(before) => diff_member(before, member),
            None if options.track_added_members => added_member(member),
            None => continue,
        };
        if !changes.is_empty() {
            entry.members.insert(member_id.clone(), changes);
        }
    }

    if entry.is_empty() { None } else { Some(entry) }
}

fn diff_fields<F: Schema>(before: &Fields<F>, after: &Fields<F>) -> BTreeMap<F, Delta> {
    F::ALL
        .iter()
        .copied()
        .filter_map(|field| {
            let old = before.get(field);
            let new = after.get(field);
            (old != new).then(|| (field, Delta::new(old.clone(), new.clone())))
        })
        .collect()
}

fn diff_member(before: &Member, after: &Member) -> MemberChanges {
    let mut changes = MemberChanges::new(after.id.clone(), after.name().map(str::to_string));
    changes.fields = diff_fields(&before.fields, &after.fields);
    changes
}

fn added_member(member: &Member) -> MemberChanges {
    let mut changes = MemberChanges::new(member.id.clone(), member.name().map(str::to_string));
    changes.fields = member
        .fields
        .iter()
        .map(|(field, value)| (field, Delta::new(FieldValue::Null, value.clone())))
        .collect();
    changes.added = true;
    changes
}
