// Catalog entities: a fully audited `Article` and a plain `Label`

use super::capability::{
    AuditTrail, Creatable, Deletable, Modifiable, CREATED_BY, CREATED_ON, DELETED_BY, DELETED_ON,
    IS_DELETED, MODIFIED_BY, MODIFIED_ON,
};
use super::entity::{Entity, Shape};
use super::error::Result;
use super::schema::{Capabilities, FieldDef, Schema};
use super::value::Record;
use serde::{Deserialize, Serialize};

/// Article entity (creatable + modifiable + deletable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub body: Option<String>,
    pub label_id: Option<i64>,
    #[serde(flatten)]
    pub audit: AuditTrail,
}

impl Article {
    pub const ID: FieldDef = FieldDef::integer("id");
    pub const TITLE: FieldDef = FieldDef::text("title");
    pub const BODY: FieldDef = FieldDef::text("body");
    pub const LABEL_ID: FieldDef = FieldDef::integer("label_id");

    /// New, not yet persisted article (key assigned on save)
    pub fn new(title: impl Into<String>, body: Option<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            body,
            label_id: None,
            audit: AuditTrail::default(),
        }
    }

    pub fn with_label(mut self, label_id: i64) -> Self {
        self.label_id = Some(label_id);
        self
    }
}

impl Shape for Article {
    const FIELDS: &'static [FieldDef] = &[
        Article::ID,
        Article::TITLE,
        Article::BODY,
        Article::LABEL_ID,
        CREATED_BY,
        CREATED_ON,
        MODIFIED_BY,
        MODIFIED_ON,
        IS_DELETED,
        DELETED_BY,
        DELETED_ON,
    ];

    fn to_record(&self) -> Record {
        let mut record = Record::with_capacity(Self::FIELDS.len());
        record.set(Self::ID.name, self.id);
        record.set(Self::TITLE.name, self.title.clone());
        record.set(Self::BODY.name, self.body.clone());
        record.set(Self::LABEL_ID.name, self.label_id);
        self.audit.write_to(&mut record);
        record
    }
}

impl Entity for Article {
    type Id = i64;

    const SCHEMA: Schema = Schema {
        table: "articles",
        key: Article::ID,
        generated_key: true,
        fields: Article::FIELDS,
        capabilities: Capabilities::AUDITED,
    };

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_key(&mut self, key: i64) {
        self.id = key;
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.i64(Self::ID.name)?,
            title: record.text(Self::TITLE.name)?,
            body: record.opt_text(Self::BODY.name)?,
            label_id: record.opt_i64(Self::LABEL_ID.name)?,
            audit: AuditTrail::read_from(record)?,
        })
    }

    fn as_creatable(&self) -> Option<&dyn Creatable> {
        Some(&self.audit)
    }

    fn as_creatable_mut(&mut self) -> Option<&mut dyn Creatable> {
        Some(&mut self.audit)
    }

    fn as_modifiable(&self) -> Option<&dyn Modifiable> {
        Some(&self.audit)
    }

    fn as_modifiable_mut(&mut self) -> Option<&mut dyn Modifiable> {
        Some(&mut self.audit)
    }

    fn as_deletable(&self) -> Option<&dyn Deletable> {
        Some(&self.audit)
    }

    fn as_deletable_mut(&mut self) -> Option<&mut dyn Deletable> {
        Some(&mut self.audit)
    }
}

/// Label entity, no audit capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: i64,
    pub name: String,
}

impl Label {
    pub const ID: FieldDef = FieldDef::integer("id");
    pub const NAME: FieldDef = FieldDef::text("name");

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

impl Shape for Label {
    const FIELDS: &'static [FieldDef] = &[Label::ID, Label::NAME];

    fn to_record(&self) -> Record {
        Record::with_capacity(2)
            .with(Self::ID.name, self.id)
            .with(Self::NAME.name, self.name.clone())
    }
}

impl Entity for Label {
    type Id = i64;

    const SCHEMA: Schema = Schema {
        table: "labels",
        key: Label::ID,
        generated_key: true,
        fields: Label::FIELDS,
        capabilities: Capabilities::NONE,
    };

    fn id(&self) -> i64 {
        self.id
    }

    fn assign_key(&mut self, key: i64) {
        self.id = key;
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: record.i64(Self::ID.name)?,
            name: record.text(Self::NAME.name)?,
        })
    }
}

/// Read model for article listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub id: i64,
    pub title: String,
    pub label_id: Option<i64>,
    pub modified_on: Option<i64>,
}

impl From<Article> for ArticleSummary {
    fn from(article: Article) -> Self {
        Self {
            id: article.id,
            title: article.title,
            label_id: article.label_id,
            modified_on: article.audit.modified_on,
        }
    }
}

impl Shape for ArticleSummary {
    const FIELDS: &'static [FieldDef] = &[
        FieldDef::integer("id"),
        FieldDef::text("title"),
        FieldDef::integer("label_id"),
        FieldDef::integer("modified_on"),
    ];

    fn to_record(&self) -> Record {
        Record::with_capacity(4)
            .with("id", self.id)
            .with("title", self.title.clone())
            .with("label_id", self.label_id)
            .with("modified_on", self.modified_on)
    }
}
