use std::collections::BTreeMap;

use famreg_core::{Delta, DocPath, FieldValue, MemberField, RecordField};
use famreg_engine::{EngineConfig, EngineError, Reconciler};
use famreg_harness::{TestSession, family, init_tracing, member, mid, rid};
use famreg_storage::{Cache, DocumentStore, SqliteCache, StorageError};

/// Backend serving one fixed tree at every path, including keys the
/// SQLite store would refuse.
struct FixedTree(FieldValue);

impl DocumentStore for FixedTree {
    fn get(&self, _path: &DocPath) -> Result<Option<FieldValue>, StorageError> {
        Ok(Some(self.0.clone()))
    }

    fn update(
        &mut self,
        _root: &DocPath,
        _writes: &BTreeMap<DocPath, FieldValue>,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    fn push(&mut self, _parent: &DocPath) -> Result<String, StorageError> {
        Ok("k1".to_string())
    }
}

// ============================================================================
// Diff accumulation
// ============================================================================

#[test]
fn identical_edit_records_nothing() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    let record = family("f1", "A", "X");

    let entry = session.engine.reconcile(Some(&record), &record)?;
    assert!(entry.is_none());
    assert!(session.engine.history()?.is_empty());

    Ok(())
}

#[test]
fn single_field_change_yields_one_delta() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    let original = family("f1", "A", "X");
    let edited = family("f1", "B", "X");

    let entry = session
        .engine
        .reconcile(Some(&original), &edited)?
        .expect("head changed");

    assert_eq!(entry.record_id, rid("f1"));
    assert_eq!(entry.fields.len(), 1);
    assert_eq!(
        entry.fields[&RecordField::Head],
        Delta::new("A".into(), "B".into())
    );
    assert_eq!(entry.head.as_deref(), Some("B"));
    assert!(entry.members.is_empty());

    Ok(())
}

#[test]
fn later_edits_keep_first_old_value() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X")])?;

    session.edit(&rid("f1"), |r| r.fields.set(RecordField::Address, "Y"))?;
    let entry = session
        .edit(&rid("f1"), |r| r.fields.set(RecordField::Address, "Z"))?
        .expect("address still differs from first original");

    assert_eq!(
        entry.fields[&RecordField::Address],
        Delta::new("X".into(), "Z".into())
    );

    let stored = session.engine.history_for(&rid("f1"))?.expect("entry persisted");
    assert_eq!(stored, entry);

    Ok(())
}

#[test]
fn edits_to_different_fields_accumulate() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X")])?;

    session.edit(&rid("f1"), |r| r.fields.set(RecordField::Address, "Y"))?;
    session.edit(&rid("f1"), |r| r.fields.set(RecordField::Phone, "0281-2450"))?;

    let entry = session.engine.history_for(&rid("f1"))?.expect("entry persisted");
    assert_eq!(entry.fields.len(), 2);
    assert_eq!(
        entry.fields[&RecordField::Phone],
        Delta::new(FieldValue::Null, "0281-2450".into())
    );

    Ok(())
}

#[test]
fn editing_back_to_original_cancels_history() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X")])?;

    session.edit(&rid("f1"), |r| r.fields.set(RecordField::Address, "Y"))?;
    let entry = session.edit(&rid("f1"), |r| r.fields.set(RecordField::Address, "X"))?;

    assert!(entry.is_none());
    assert!(session.engine.history()?.is_empty());

    Ok(())
}

#[test]
fn member_edit_is_isolated() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X")
        .with_member(member("m1", "Sita", "111"))
        .with_member(member("m2", "Gita", "222"))])?;

    let entry = session
        .edit(&rid("f1"), |r| {
            if let Some(m) = r.members.get_mut(&mid("m1")) {
                m.fields.set(MemberField::Mobile, "999");
            }
        })?
        .expect("mobile changed");

    assert!(entry.fields.is_empty());
    assert_eq!(entry.members.len(), 1);
    let changes = &entry.members[&mid("m1")];
    assert_eq!(changes.member_id, mid("m1"));
    assert_eq!(changes.name.as_deref(), Some("Sita"));
    assert_eq!(changes.fields.len(), 1);
    assert_eq!(
        changes.fields[&MemberField::Mobile],
        Delta::new("111".into(), "999".into())
    );
    assert!(!entry.members.contains_key(&mid("m2")));

    Ok(())
}

#[test]
fn new_member_is_not_recorded() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X").with_member(member("m1", "Sita", "111"))])?;

    let entry = session
        .engine
        .save_members(&rid("f1"), [member("m3", "Ravi", "333")])?;

    assert!(entry.is_none());
    assert!(session.engine.history()?.is_empty());

    // The snapshot still carries the new member.
    let cached = session.engine.load_snapshot();
    assert!(cached[&rid("f1")].members.contains_key(&mid("m3")));

    Ok(())
}

#[test]
fn new_member_recorded_when_tracking_enabled() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = EngineConfig::default().with_track_added_members(true);
    let mut session = TestSession::with_config(config)?;
    session.seed([family("f1", "A", "X")])?;

    let entry = session
        .engine
        .save_members(&rid("f1"), [member("m3", "Ravi", "333")])?
        .expect("added member recorded");

    let changes = &entry.members[&mid("m3")];
    assert!(changes.added);
    assert_eq!(
        changes.fields[&MemberField::Name],
        Delta::new(FieldValue::Null, "Ravi".into())
    );
    assert_eq!(changes.fields.len(), 2);

    Ok(())
}

// ============================================================================
// Snapshot behaviour
// ============================================================================

#[test]
fn snapshot_written_even_without_deltas() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    let record = family("f1", "A", "X");

    session.engine.reconcile(Some(&record), &record)?;

    let cached = session.engine.load_snapshot();
    assert_eq!(cached.get(&rid("f1")), Some(&record));
    assert!(session.engine.history()?.is_empty());

    Ok(())
}

#[test]
fn malformed_snapshot_loads_empty() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session
        .engine
        .cache_mut()
        .inner_mut()
        .set_item("migratedData", b"\xc1 not msgpack")?;

    assert!(session.engine.load_snapshot().is_empty());

    Ok(())
}

#[test]
fn unreadable_cache_loads_empty() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X")])?;
    assert_eq!(session.engine.load_snapshot().len(), 1);

    session.engine.cache_mut().fail_reads(true);
    assert!(session.engine.load_snapshot().is_empty());

    Ok(())
}

#[test]
fn missing_original_diffs_every_field() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;

    // Not in the snapshot, e.g. deleted by another session.
    let entry = session
        .engine
        .save(family("f7", "Mohan", "Market Road"))?
        .expect("every field is new");

    assert_eq!(entry.fields.len(), 2);
    assert_eq!(
        entry.fields[&RecordField::Head],
        Delta::new(FieldValue::Null, "Mohan".into())
    );

    Ok(())
}

// ============================================================================
// Persistence failures
// ============================================================================

#[test]
fn cache_write_failure_keeps_visible_edit() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X")])?;

    session.engine.cache_mut().fail_writes(true);
    let result = session.edit(&rid("f1"), |r| r.fields.set(RecordField::Address, "Y"));

    let err = result.expect_err("cache write must fail");
    assert!(matches!(err, EngineError::Persist { .. }));
    assert!(!err.is_fatal());

    let visible = session.engine.record(&rid("f1")).cloned().expect("still listed");
    assert_eq!(visible.fields.get(RecordField::Address).as_text(), Some("Y"));

    // Nothing reached the cache, so the next save still sees the change.
    session.engine.cache_mut().fail_writes(false);
    let entry = session.engine.save(visible)?.expect("delta recorded on retry");
    assert_eq!(
        entry.fields[&RecordField::Address],
        Delta::new("X".into(), "Y".into())
    );

    Ok(())
}

#[test]
fn corrupt_history_is_not_overwritten() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X")])?;
    session
        .engine
        .cache_mut()
        .inner_mut()
        .set_item("editedHistory", b"\xc1")?;

    let result = session.edit(&rid("f1"), |r| r.fields.set(RecordField::Address, "Y"));
    assert!(matches!(result, Err(EngineError::Persist { .. })));

    let raw = session.engine.cache_mut().inner_mut().get_item("editedHistory")?;
    assert_eq!(raw.as_deref(), Some(&b"\xc1"[..]));

    // The snapshot is left alone so the edit can still be diffed later.
    let cached = session.engine.load_snapshot();
    assert_eq!(
        cached[&rid("f1")].fields.get(RecordField::Address).as_text(),
        Some("X")
    );

    Ok(())
}

// ============================================================================
// Record list
// ============================================================================

#[test]
fn delete_removes_from_list_and_snapshot() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([
        family("f1", "A", "X"),
        family("f2", "B", "Y"),
        family("f3", "C", "Z"),
    ])?;

    let removed = session.engine.delete_records(&[rid("f1"), rid("f3"), rid("f9")])?;
    assert_eq!(removed, 2);
    assert!(session.engine.record(&rid("f1")).is_none());

    let cached = session.engine.load_snapshot();
    assert_eq!(cached.keys().cloned().collect::<Vec<_>>(), vec![rid("f2")]);

    Ok(())
}

#[test]
fn refresh_skips_unusable_backend_entries() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let tree = FieldValue::Map(BTreeMap::from([
        ("f1".to_string(), family("f1", "A", "X").to_document()),
        ("bad.id".to_string(), family("f2", "B", "Y").to_document()),
        ("f3".to_string(), FieldValue::from("not a record")),
    ]));
    let mut engine = Reconciler::new(
        SqliteCache::open_in_memory()?,
        FixedTree(tree),
        EngineConfig::default(),
    )?;

    assert_eq!(engine.refresh_from_backend()?, 1);
    assert!(engine.record(&rid("f1")).is_some());
    assert_eq!(engine.load_snapshot().len(), 1);

    Ok(())
}

#[test]
fn search_and_native_filter() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([
        family("f1", "Ramesh Patel", "Station Road").with(RecordField::Native, "Morbi"),
        family("f2", "Suresh Shah", "Mill Para").with(RecordField::Native, "Gondal"),
        family("f3", "Mahesh Patel", "Kalawad Road").with(RecordField::Native, "Morbi"),
    ])?;

    let query = famreg_core::RecordQuery::new().search("patel").native("Morbi");
    let hits: Vec<_> = session.engine.search(&query).iter().map(|r| r.id.clone()).collect();
    assert_eq!(hits, vec![rid("f1"), rid("f3")]);

    let road = famreg_core::RecordQuery::new().search("road");
    assert_eq!(session.engine.search(&road).len(), 2);

    assert_eq!(session.engine.natives(), vec!["Gondal".to_string(), "Morbi".to_string()]);

    Ok(())
}

#[test]
fn cache_keys_list_snapshot_and_history() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let mut session = TestSession::new()?;
    session.seed([family("f1", "A", "X")])?;
    session.edit(&rid("f1"), |r| r.fields.set(RecordField::Head, "B"))?;

    assert_eq!(
        session.engine.cache_keys()?,
        vec!["editedHistory".to_string(), "migratedData".to_string()]
    );

    Ok(())
}
