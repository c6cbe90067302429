pub mod delta;
pub mod error;
pub mod field_value;
pub mod ids;
pub mod path;
pub mod query;
pub mod record;
pub mod schema;

pub use delta::{Delta, EditHistory, HistoryEntry, MemberChanges};
pub use error::CoreError;
pub use field_value::FieldValue;
pub use ids::*;
pub use path::DocPath;
pub use query::RecordQuery;
pub use record::{Member, Record};
pub use schema::{Fields, MemberField, RecordField, Schema};
