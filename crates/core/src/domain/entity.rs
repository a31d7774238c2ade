// Entity and shape traits

use super::capability::{Creatable, Deletable, Modifiable};
use super::error::Result;
use super::schema::{FieldDef, Schema};
use super::value::{Record, Value};
use std::fmt::{Debug, Display};

/// Anything with a static field list that can be flattened into a record.
///
/// Entities and DTOs both implement this; field selection works on it.
pub trait Shape {
    const FIELDS: &'static [FieldDef];

    fn to_record(&self) -> Record;
}

/// A persisted entity.
///
/// Capability membership is declared per type in `SCHEMA.capabilities` (read
/// when composing queries) and per instance through the `as_*` accessors (read
/// by the save pipeline). The two must agree.
pub trait Entity: Shape + Clone + Debug + Send + Sync + 'static {
    type Id: Clone + Debug + Display + Into<Value> + Send + Sync + 'static;

    const SCHEMA: Schema;

    fn id(&self) -> Self::Id;

    /// Receive a key generated by the store after insert
    fn assign_key(&mut self, _key: i64) {}

    fn from_record(record: &Record) -> Result<Self>;

    fn as_creatable(&self) -> Option<&dyn Creatable> {
        None
    }

    fn as_creatable_mut(&mut self) -> Option<&mut dyn Creatable> {
        None
    }

    fn as_modifiable(&self) -> Option<&dyn Modifiable> {
        None
    }

    fn as_modifiable_mut(&mut self) -> Option<&mut dyn Modifiable> {
        None
    }

    fn as_deletable(&self) -> Option<&dyn Deletable> {
        None
    }

    fn as_deletable_mut(&mut self) -> Option<&mut dyn Deletable> {
        None
    }
}
