use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{MemberId, RecordId};
use crate::schema::{MemberField, RecordField, Schema};

/// Key under a record that holds its members collection.
pub const MEMBERS_KEY: &str = "members";

const FORBIDDEN: &[char] = &['/', '.', '#', '$', '[', ']'];

pub(crate) fn validate_segment(segment: &str) -> Result<(), CoreError> {
    if segment.is_empty() {
        return Err(CoreError::InvalidSegment {
            segment: segment.to_string(),
            reason: "empty",
        });
    }
    if segment.contains(FORBIDDEN) {
        return Err(CoreError::InvalidSegment {
            segment: segment.to_string(),
            reason: "contains one of / . # $ [ ]",
        });
    }
    Ok(())
}

/// Slash-delimited path into the document store, e.g.
/// `records/{recordId}/members/{memberId}/mobile`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

impl DocPath {
    /// Parses a path; leading and trailing slashes are ignored.
    pub fn parse(path: &str) -> Result<Self, CoreError> {
        let trimmed = path.trim_matches('/');
        for segment in trimmed.split('/') {
            validate_segment(segment)?;
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn child(&self, segment: &str) -> Result<Self, CoreError> {
        validate_segment(segment)?;
        Ok(Self(format!("{}/{}", self.0, segment)))
    }

    /// `{root}/{recordId}/{field}`
    pub fn record_field(root: &DocPath, record_id: &RecordId, field: RecordField) -> Self {
        Self(format!("{}/{}/{}", root.0, record_id, field.key()))
    }

    /// `{root}/{recordId}/members/{memberId}/{field}`
    pub fn member_field(
        root: &DocPath,
        record_id: &RecordId,
        member_id: &MemberId,
        field: MemberField,
    ) -> Self {
        Self(format!(
            "{}/{}/{}/{}/{}",
            root.0,
            record_id,
            MEMBERS_KEY,
            member_id,
            field.key()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// True when `self` equals `ancestor` or lies beneath it.
    pub fn is_within(&self, ancestor: &DocPath) -> bool {
        self.relative_to(ancestor).is_some()
    }

    /// The remainder of `self` below `ancestor`; `Some("")` when equal.
    pub fn relative_to(&self, ancestor: &DocPath) -> Option<&str> {
        let rest = self.0.strip_prefix(ancestor.0.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }
}

impl TryFrom<String> for DocPath {
    type Error = CoreError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        Self::parse(&path)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> String {
        path.0
    }
}

impl fmt::Debug for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocPath({})", self.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_field_paths() {
        let root = DocPath::parse("records").unwrap();
        let record = RecordId::new("f1").unwrap();
        let member = MemberId::new("m1").unwrap();

        assert_eq!(
            DocPath::record_field(&root, &record, RecordField::Address).as_str(),
            "records/f1/address"
        );
        assert_eq!(
            DocPath::member_field(&root, &record, &member, MemberField::RelationWithHof).as_str(),
            "records/f1/members/m1/relationWithHOF"
        );
    }

    #[test]
    fn prefix_matching_respects_segments() {
        let root = DocPath::parse("/records/").unwrap();
        let inside = DocPath::parse("records/f1/head").unwrap();
        let sibling = DocPath::parse("recordsX/f1").unwrap();

        assert!(inside.is_within(&root));
        assert!(root.is_within(&root));
        assert!(!sibling.is_within(&root));
        assert_eq!(inside.relative_to(&root), Some("f1/head"));
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(DocPath::parse("records//f1").is_err());
        assert!(DocPath::parse("").is_err());
        assert!(DocPath::parse("records/f.1").is_err());
    }
}
