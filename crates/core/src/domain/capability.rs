// Capability Model - independent audit traits composed per entity

use super::error::Result;
use super::schema::FieldDef;
use super::value::Record;
use serde::{Deserialize, Serialize};

pub const CREATED_BY: FieldDef = FieldDef::text("created_by");
pub const CREATED_ON: FieldDef = FieldDef::integer("created_on");
pub const MODIFIED_BY: FieldDef = FieldDef::text("modified_by");
pub const MODIFIED_ON: FieldDef = FieldDef::integer("modified_on");
pub const IS_DELETED: FieldDef = FieldDef::bool("is_deleted");
pub const DELETED_BY: FieldDef = FieldDef::text("deleted_by");
pub const DELETED_ON: FieldDef = FieldDef::integer("deleted_on");

/// Written exactly once, when the row is inserted
pub trait Creatable {
    fn created_by(&self) -> &str;
    fn created_on(&self) -> i64;
    fn stamp_created(&mut self, actor: &str, at: i64);
}

/// Written at insert and at every update
pub trait Modifiable {
    fn modified_by(&self) -> Option<&str>;
    fn modified_on(&self) -> Option<i64>;
    fn stamp_modified(&mut self, actor: &str, at: i64);
}

/// Logical deletion: the row stays, flagged deleted
pub trait Deletable {
    fn is_deleted(&self) -> bool;
    fn deleted_by(&self) -> Option<&str>;
    fn deleted_on(&self) -> Option<i64>;
    fn mark_deleted(&mut self, actor: &str, at: i64);
}

/// Reusable block of all audit columns.
///
/// Entities that want the full set embed one and delegate the capability
/// traits to it; entities that want a subset implement only those traits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    pub created_by: String,
    pub created_on: i64,
    pub modified_by: Option<String>,
    pub modified_on: Option<i64>,
    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_on: Option<i64>,
}

impl AuditTrail {
    pub const FIELDS: [FieldDef; 7] = [
        CREATED_BY,
        CREATED_ON,
        MODIFIED_BY,
        MODIFIED_ON,
        IS_DELETED,
        DELETED_BY,
        DELETED_ON,
    ];

    pub fn write_to(&self, record: &mut Record) {
        record.set(CREATED_BY.name, self.created_by.clone());
        record.set(CREATED_ON.name, self.created_on);
        record.set(MODIFIED_BY.name, self.modified_by.clone());
        record.set(MODIFIED_ON.name, self.modified_on);
        record.set(IS_DELETED.name, self.is_deleted);
        record.set(DELETED_BY.name, self.deleted_by.clone());
        record.set(DELETED_ON.name, self.deleted_on);
    }

    pub fn read_from(record: &Record) -> Result<Self> {
        Ok(Self {
            created_by: record.opt_text(CREATED_BY.name)?.unwrap_or_default(),
            created_on: record.opt_i64(CREATED_ON.name)?.unwrap_or_default(),
            modified_by: record.opt_text(MODIFIED_BY.name)?,
            modified_on: record.opt_i64(MODIFIED_ON.name)?,
            is_deleted: record.bool(IS_DELETED.name)?,
            deleted_by: record.opt_text(DELETED_BY.name)?,
            deleted_on: record.opt_i64(DELETED_ON.name)?,
        })
    }
}

impl Creatable for AuditTrail {
    fn created_by(&self) -> &str {
        &self.created_by
    }

    fn created_on(&self) -> i64 {
        self.created_on
    }

    fn stamp_created(&mut self, actor: &str, at: i64) {
        self.created_by = actor.to_string();
        self.created_on = at;
    }
}

impl Modifiable for AuditTrail {
    fn modified_by(&self) -> Option<&str> {
        self.modified_by.as_deref()
    }

    fn modified_on(&self) -> Option<i64> {
        self.modified_on
    }

    fn stamp_modified(&mut self, actor: &str, at: i64) {
        self.modified_by = Some(actor.to_string());
        self.modified_on = Some(at);
    }
}

impl Deletable for AuditTrail {
    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn deleted_by(&self) -> Option<&str> {
        self.deleted_by.as_deref()
    }

    fn deleted_on(&self) -> Option<i64> {
        self.deleted_on
    }

    fn mark_deleted(&mut self, actor: &str, at: i64) {
        self.is_deleted = true;
        self.deleted_by = Some(actor.to_string());
        self.deleted_on = Some(at);
    }
}
