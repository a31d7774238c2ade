// Domain Layer - entity model, capabilities and values

pub mod capability;
pub mod catalog;
pub mod entity;
pub mod error;
pub mod schema;
pub mod value;

// Re-exports
pub use capability::{AuditTrail, Creatable, Deletable, Modifiable};
pub use catalog::{Article, ArticleSummary, Label};
pub use entity::{Entity, Shape};
pub use error::DomainError;
pub use schema::{resolve_field, Capabilities, FieldDef, FieldKind, Schema};
pub use value::{Record, Value};
