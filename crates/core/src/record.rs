use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field_value::FieldValue;
use crate::ids::{MemberId, RecordId};
use crate::path::MEMBERS_KEY;
use crate::schema::{Fields, MemberField, RecordField, Schema};

const ID_KEY: &str = "id";

/// A person in a family's household.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub fields: Fields<MemberField>,
}

impl Member {
    pub fn new(id: MemberId) -> Self {
        Self {
            id,
            fields: Fields::new(),
        }
    }

    pub fn with(mut self, field: MemberField, value: impl Into<FieldValue>) -> Self {
        self.fields.set(field, value);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get(MemberField::Name).as_text()
    }

    pub fn from_document(id: MemberId, doc: &FieldValue) -> Result<Self, CoreError> {
        Ok(Self {
            id,
            fields: fields_from_map(doc)?,
        })
    }

    pub fn to_document(&self) -> FieldValue {
        FieldValue::Map(fields_to_map(&self.fields))
    }
}

/// A family: head-of-household details plus its members keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: Fields<RecordField>,
    pub members: BTreeMap<MemberId, Member>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            fields: Fields::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn with(mut self, field: RecordField, value: impl Into<FieldValue>) -> Self {
        self.fields.set(field, value);
        self
    }

    pub fn with_member(mut self, member: Member) -> Self {
        self.members.insert(member.id.clone(), member);
        self
    }

    pub fn head(&self) -> Option<&str> {
        self.fields.get(RecordField::Head).as_text()
    }

    /// Builds a record from a document-store subtree. Keys outside the
    /// schema are ignored.
    pub fn from_document(id: RecordId, doc: &FieldValue) -> Result<Self, CoreError> {
        let map = doc
            .as_map()
            .ok_or_else(|| CoreError::InvalidData(format!("record {id} is not a map")))?;

        let mut members = BTreeMap::new();
        match map.get(MEMBERS_KEY) {
            None | Some(FieldValue::Null) => {}
            Some(FieldValue::Map(entries)) => {
                for (key, member_doc) in entries {
                    let member_id = MemberId::new(key.as_str())?;
                    let member = Member::from_document(member_id.clone(), member_doc)?;
                    members.insert(member_id, member);
                }
            }
            Some(_) => {
                return Err(CoreError::InvalidData(format!(
                    "members of record {id} is not a map"
                )));
            }
        }

        Ok(Self {
            fields: fields_from_map(doc)?,
            id,
            members,
        })
    }

    /// Full document for this record, including its `id` leaf and members.
    pub fn to_document(&self) -> FieldValue {
        let mut map = fields_to_map(&self.fields);
        map.insert(ID_KEY.to_string(), FieldValue::Text(self.id.to_string()));
        if !self.members.is_empty() {
            let members = self
                .members
                .iter()
                .map(|(id, m)| (id.to_string(), m.to_document()))
                .collect();
            map.insert(MEMBERS_KEY.to_string(), FieldValue::Map(members));
        }
        FieldValue::Map(map)
    }
}

fn fields_from_map<F: Schema>(doc: &FieldValue) -> Result<Fields<F>, CoreError> {
    let map = doc
        .as_map()
        .ok_or_else(|| CoreError::InvalidData("expected a map of fields".into()))?;
    let mut fields = Fields::new();
    for (key, value) in map {
        if let Some(field) = F::parse(key) {
            fields.set(field, value.clone());
        }
    }
    Ok(fields)
}

fn fields_to_map<F: Schema>(fields: &Fields<F>) -> BTreeMap<String, FieldValue> {
    fields
        .iter()
        .map(|(f, v)| (f.key().to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record::new(RecordId::new("f1").unwrap())
            .with(RecordField::Head, "Ramesh")
            .with(RecordField::Native, "Morbi")
            .with_member(
                Member::new(MemberId::new("m1").unwrap())
                    .with(MemberField::Name, "Sita")
                    .with(MemberField::Mobile, "98250"),
            )
    }

    #[test]
    fn document_round_trip_keeps_schema_fields() {
        let record = sample();
        let doc = record.to_document();
        let map = doc.as_map().unwrap();
        assert_eq!(map.get("id"), Some(&FieldValue::from("f1")));

        let parsed = Record::from_document(record.id.clone(), &doc).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn unknown_document_keys_are_ignored() {
        let mut map = BTreeMap::new();
        map.insert("head".to_string(), FieldValue::from("Ramesh"));
        map.insert("legacyFlag".to_string(), FieldValue::Boolean(true));
        let record =
            Record::from_document(RecordId::new("f9").unwrap(), &FieldValue::Map(map)).unwrap();

        assert_eq!(record.head(), Some("Ramesh"));
        assert_eq!(record.fields.len(), 1);
        assert!(record.members.is_empty());
    }

    #[test]
    fn non_map_documents_are_rejected() {
        let id = RecordId::new("f1").unwrap();
        assert!(Record::from_document(id, &FieldValue::from("oops")).is_err());
    }
}
