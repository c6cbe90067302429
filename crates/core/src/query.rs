use crate::record::Record;
use crate::schema::RecordField;

/// Filter over the record list: case-insensitive substring match on head or
/// address, plus an exact native-place match.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub search: Option<String>,
    pub native: Option<String>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn native(mut self, native: impl Into<String>) -> Self {
        self.native = Some(native.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = [RecordField::Head, RecordField::Address]
                .into_iter()
                .filter_map(|f| record.fields.get(f).as_text())
                .any(|text| text.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(native) = self.native.as_deref().filter(|s| !s.is_empty()) {
            if record.fields.get(RecordField::Native).as_text() != Some(native) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RecordId;

    fn family(id: &str, head: &str, address: &str, native: &str) -> Record {
        Record::new(RecordId::new(id).unwrap())
            .with(RecordField::Head, head)
            .with(RecordField::Address, address)
            .with(RecordField::Native, native)
    }

    #[test]
    fn search_covers_head_and_address() {
        let f = family("f1", "Ramesh Patel", "12 Station Road", "Morbi");
        assert!(RecordQuery::new().search("patel").matches(&f));
        assert!(RecordQuery::new().search("STATION").matches(&f));
        assert!(!RecordQuery::new().search("shah").matches(&f));
    }

    #[test]
    fn native_filter_is_exact() {
        let f = family("f1", "Ramesh Patel", "12 Station Road", "Morbi");
        assert!(RecordQuery::new().native("Morbi").matches(&f));
        assert!(!RecordQuery::new().native("morbi").matches(&f));
        assert!(RecordQuery::new().native("").matches(&f));
    }
}
