use std::collections::BTreeMap;

use famreg_core::{DocPath, EditHistory, FieldValue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Field paths written to the document store.
    pub committed_fields: usize,
    /// Records those fields belonged to.
    pub records: usize,
}

/// One sparse write per delta, carrying its `new` value. `id` and `members`
/// are structural keys, never schema fields, so they cannot appear here.
pub fn project(history: &EditHistory, root: &DocPath) -> BTreeMap<DocPath, FieldValue> {
    let mut writes = BTreeMap::new();
    for entry in history.iter() {
        for (field, delta) in &entry.fields {
            writes.insert(
                DocPath::record_field(root, &entry.record_id, *field),
                delta.new.clone(),
            );
        }
        for (member_id, changes) in &entry.members {
            for (field, delta) in &changes.fields {
                writes.insert(
                    DocPath::member_field(root, &entry.record_id, member_id, *field),
                    delta.new.clone(),
                );
            }
        }
    }
    writes
}
