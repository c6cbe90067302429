use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::field_value::FieldValue;

/// A closed, ordered set of field names.
///
/// Diffing and projection walk `ALL` in declaration order, so adding a field
/// to a record or member is an explicit schema change.
pub trait Schema:
    Copy + Ord + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const ALL: &'static [Self];

    /// Key used in documents and in the backend path.
    fn key(self) -> &'static str;

    fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }
}

macro_rules! schema_fields {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $key:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
        pub enum $name {
            $($variant),+
        }

        impl Schema for $name {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn key(self) -> &'static str {
                match self {
                    $(Self::$variant => $key),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.key())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let key = String::deserialize(deserializer)?;
                Self::parse(&key).ok_or_else(|| {
                    serde::de::Error::unknown_variant(&key, &[$($key),+])
                })
            }
        }
    };
}

schema_fields!(
    /// Editable scalar fields of a family record.
    RecordField {
        Head => "head",
        Address => "address",
        Native => "native",
        City => "city",
        Phone => "phone",
        Ancestors => "ancestors",
        CreatedBy => "createdBy",
        ModifiedBy => "modifiedBy",
    }
);

schema_fields!(
    /// Editable fields of a household member.
    MemberField {
        Name => "name",
        Birthday => "birthday",
        Gender => "gender",
        RelationWithHof => "relationWithHOF",
        MaritalStatus => "maritalStatus",
        Education => "education",
        Occupation => "occupation",
        Mobile => "mobile",
        TemporaryAddress => "temporaryAddress",
        ModifiedBy => "modifiedBy",
    }
);

static NULL: FieldValue = FieldValue::Null;

/// Sparse field values keyed by a schema. Absent fields read as `Null`, and
/// storing `Null` removes the entry, so two field sets are equal exactly when
/// every declared field reads the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent, bound(serialize = "F: Schema", deserialize = "F: Schema"))]
pub struct Fields<F: Schema>(BTreeMap<F, FieldValue>);

impl<F: Schema> Default for Fields<F> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<F: Schema> Fields<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: F) -> &FieldValue {
        self.0.get(&field).unwrap_or(&NULL)
    }

    pub fn set(&mut self, field: F, value: impl Into<FieldValue>) {
        let value = value.into();
        if value.is_null() {
            self.0.remove(&field);
        } else {
            self.0.insert(field, value);
        }
    }

    pub fn with(mut self, field: F, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn remove(&mut self, field: F) -> Option<FieldValue> {
        self.0.remove(&field)
    }

    /// Non-null fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (F, &FieldValue)> {
        self.0.iter().map(|(f, v)| (*f, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_key() {
        for field in RecordField::ALL {
            assert_eq!(RecordField::parse(field.key()), Some(*field));
        }
        for field in MemberField::ALL {
            assert_eq!(MemberField::parse(field.key()), Some(*field));
        }
        assert_eq!(RecordField::parse("members"), None);
        assert_eq!(RecordField::parse("id"), None);
    }

    #[test]
    fn null_assignment_clears_field() {
        let mut fields = Fields::new().with(RecordField::Head, "Ramesh");
        assert_eq!(fields.get(RecordField::Head).as_text(), Some("Ramesh"));
        assert!(fields.get(RecordField::City).is_null());

        fields.set(RecordField::Head, FieldValue::Null);
        assert!(fields.is_empty());
        assert_eq!(fields, Fields::new());
    }

    #[test]
    fn iteration_follows_declaration_order() {
        let fields = Fields::new()
            .with(RecordField::ModifiedBy, "uid-7")
            .with(RecordField::Head, "Ramesh")
            .with(RecordField::Native, "Morbi");
        let order: Vec<RecordField> = fields.iter().map(|(f, _)| f).collect();
        assert_eq!(
            order,
            vec![RecordField::Head, RecordField::Native, RecordField::ModifiedBy]
        );
    }
}
