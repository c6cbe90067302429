use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::field_value::FieldValue;
use crate::ids::{MemberId, RecordId};
use crate::schema::{MemberField, RecordField, Schema};

/// Before/after values of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub old: FieldValue,
    pub new: FieldValue,
}

impl Delta {
    pub fn new(old: FieldValue, new: FieldValue) -> Self {
        Self { old, new }
    }

    pub fn is_trivial(&self) -> bool {
        self.old == self.new
    }
}

/// Pending changes to one member of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberChanges {
    pub member_id: MemberId,
    /// Display name at the time of the latest edit.
    pub name: Option<String>,
    pub fields: BTreeMap<MemberField, Delta>,
    /// Set when the member did not exist in the record it was diffed against.
    #[serde(default)]
    pub added: bool,
}

impl MemberChanges {
    pub fn new(member_id: MemberId, name: Option<String>) -> Self {
        Self {
            member_id,
            name,
            fields: BTreeMap::new(),
            added: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn merge(&mut self, later: MemberChanges) {
        self.name = later.name;
        self.added |= later.added;
        merge_deltas(&mut self.fields, later.fields);
    }
}

/// Accumulated changes to one record since the last flush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub record_id: RecordId,
    /// Display copy of the record's current head. The head change itself,
    /// if any, is a `RecordField::Head` delta in `fields`.
    pub head: Option<String>,
    pub fields: BTreeMap<RecordField, Delta>,
    pub members: BTreeMap<MemberId, MemberChanges>,
}

impl HistoryEntry {
    pub fn new(record_id: RecordId, head: Option<String>) -> Self {
        Self {
            record_id,
            head,
            fields: BTreeMap::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.members.values().all(MemberChanges::is_empty)
    }

    /// Number of field deltas, scalar and member-level.
    pub fn field_count(&self) -> usize {
        self.fields.len() + self.members.values().map(|m| m.fields.len()).sum::<usize>()
    }

    /// Folds a later diff of the same record into this entry.
    ///
    /// `old` stays pinned to the value captured by the first diff of each
    /// field; `new` and the display head take the later values. Deltas that end up trivial (the
    /// field was edited back) are dropped, and so are members left empty.
    pub fn merge(&mut self, later: HistoryEntry) {
        self.head = later.head;
        merge_deltas(&mut self.fields, later.fields);

        for (member_id, changes) in later.members {
            match self.members.entry(member_id) {
                Entry::Occupied(mut existing) => existing.get_mut().merge(changes),
                Entry::Vacant(slot) => {
                    slot.insert(changes);
                }
            }
        }
        self.members.retain(|_, m| !m.is_empty());
    }
}

fn merge_deltas<F: Schema>(into: &mut BTreeMap<F, Delta>, later: BTreeMap<F, Delta>) {
    for (field, delta) in later {
        match into.entry(field) {
            Entry::Occupied(mut existing) => existing.get_mut().new = delta.new,
            Entry::Vacant(slot) => {
                slot.insert(delta);
            }
        }
    }
    into.retain(|_, d| !d.is_trivial());
}

/// Pending history for every edited record, keyed by record id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditHistory(BTreeMap<RecordId, HistoryEntry>);

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `entry` into the history. Returns the merged entry, or `None`
    /// when merging cancelled every change and the record was removed.
    pub fn merge(&mut self, entry: HistoryEntry) -> Option<&HistoryEntry> {
        let record_id = entry.record_id.clone();
        let merged = match self.0.entry(record_id.clone()) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().merge(entry);
                existing.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(entry),
        };
        if merged.is_empty() {
            self.0.remove(&record_id);
            return None;
        }
        self.0.get(&record_id)
    }

    pub fn get(&self, record_id: &RecordId) -> Option<&HistoryEntry> {
        self.0.get(record_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_count(&self) -> usize {
        self.0.values().map(HistoryEntry::field_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(s: &str) -> RecordId {
        RecordId::new(s).unwrap()
    }

    fn entry(record: &str, field: RecordField, old: &str, new: &str) -> HistoryEntry {
        let mut e = HistoryEntry::new(rid(record), Some("Ramesh".into()));
        e.fields.insert(field, Delta::new(old.into(), new.into()));
        e
    }

    #[test]
    fn merge_pins_first_old_value() {
        let mut history = EditHistory::new();
        history.merge(entry("f1", RecordField::Address, "X", "Y"));
        let merged = history
            .merge(entry("f1", RecordField::Address, "Y", "Z"))
            .unwrap();

        assert_eq!(
            merged.fields[&RecordField::Address],
            Delta::new("X".into(), "Z".into())
        );
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn merge_keeps_fields_from_earlier_edits() {
        let mut history = EditHistory::new();
        history.merge(entry("f1", RecordField::Address, "X", "Y"));
        history.merge(entry("f1", RecordField::Phone, "111", "222"));

        let e = history.get(&rid("f1")).unwrap();
        assert_eq!(e.fields.len(), 2);
        assert_eq!(history.field_count(), 2);
    }

    #[test]
    fn editing_back_cancels_entry() {
        let mut history = EditHistory::new();
        history.merge(entry("f1", RecordField::Address, "X", "Y"));
        assert!(history.merge(entry("f1", RecordField::Address, "Y", "X")).is_none());
        assert!(history.is_empty());
    }

    #[test]
    fn member_changes_merge_two_levels_deep() {
        let m1 = MemberId::new("m1").unwrap();
        let mut first = HistoryEntry::new(rid("f1"), None);
        let mut changes = MemberChanges::new(m1.clone(), Some("Sita".into()));
        changes
            .fields
            .insert(MemberField::Mobile, Delta::new("1".into(), "2".into()));
        first.members.insert(m1.clone(), changes);

        let mut second = HistoryEntry::new(rid("f1"), None);
        let mut changes = MemberChanges::new(m1.clone(), Some("Sita Ben".into()));
        changes
            .fields
            .insert(MemberField::Mobile, Delta::new("2".into(), "3".into()));
        changes
            .fields
            .insert(MemberField::Name, Delta::new("Sita".into(), "Sita Ben".into()));
        second.members.insert(m1.clone(), changes);

        let mut history = EditHistory::new();
        history.merge(first);
        let merged = history.merge(second).unwrap();
        let member = &merged.members[&m1];

        assert_eq!(member.name.as_deref(), Some("Sita Ben"));
        assert_eq!(
            member.fields[&MemberField::Mobile],
            Delta::new("1".into(), "3".into())
        );
        assert_eq!(merged.field_count(), 2);
        assert_eq!(merged.head.as_deref(), None);
    }

    #[test]
    fn cleared_head_replaces_display_name() {
        let mut history = EditHistory::new();
        history.merge(entry("f1", RecordField::Address, "X", "Y"));

        let mut later = HistoryEntry::new(rid("f1"), None);
        later
            .fields
            .insert(RecordField::Head, Delta::new("Ramesh".into(), FieldValue::Null));
        let merged = history.merge(later).unwrap();

        assert_eq!(merged.head, None);
        assert_eq!(merged.fields.len(), 2);
    }
}
